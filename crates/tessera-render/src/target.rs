//! Offscreen colour + depth attachments.
//!
//! The pipeline keeps three of these: the main scene target, an intermediate
//! target for post-processing ping-pong, and the (possibly down-scaled) final
//! target that is presented.

use crate::error::RenderError;

/// A colour texture with an optional depth texture of the same size.
pub struct RenderTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: Option<DepthAttachment>,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    label: String,
}

pub struct DepthAttachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    /// 32-bit float depth, standard (non-reversed) Z.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Depth clears to the far plane.
    pub const DEPTH_CLEAR: f32 = 1.0;

    pub const DEPTH_COMPARE: wgpu::CompareFunction = wgpu::CompareFunction::Less;

    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        with_depth: bool,
    ) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSizedTarget {
                label: label.to_string(),
                width,
                height,
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = with_depth.then(|| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label}-depth")),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            DepthAttachment { texture, view }
        });

        Ok(Self {
            color,
            color_view,
            depth,
            format,
            width,
            height,
            label: label.to_string(),
        })
    }

    /// Recreate at a new size. No-op if the size is unchanged.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), RenderError> {
        if self.width == width && self.height == height {
            return Ok(());
        }
        *self = Self::new(
            device,
            &self.label,
            width,
            height,
            self.format,
            self.depth.is_some(),
        )?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|d| &d.view)
    }

    /// Clear colour and depth in their own pass.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, color: wgpu::Color) {
        let depth_stencil_attachment =
            self.depth_view()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(Self::DEPTH_CLEAR),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&format!("{}-clear", self.label)),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
    }
}

/// Size of a target down-scaled by `pixel_size`, never below 1×1.
pub fn pixel_target_size(width: u32, height: u32, pixel_size: u32) -> (u32, u32) {
    let p = pixel_size.max(1);
    ((width / p).max(1), (height / p).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_device;

    #[test]
    fn test_pixel_target_size() {
        assert_eq!(pixel_target_size(1280, 720, 1), (1280, 720));
        assert_eq!(pixel_target_size(1280, 720, 4), (320, 180));
        assert_eq!(pixel_target_size(3, 3, 8), (1, 1));
        assert_eq!(pixel_target_size(100, 50, 0), (100, 50));
    }

    #[test]
    fn test_zero_size_rejected() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let result = RenderTarget::new(
            &device,
            "zero",
            0,
            16,
            wgpu::TextureFormat::Rgba8Unorm,
            false,
        );
        assert!(matches!(
            result,
            Err(RenderError::ZeroSizedTarget { width: 0, height: 16, .. })
        ));
    }

    #[test]
    fn test_resize_keeps_format_and_depth() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut target = RenderTarget::new(
            &device,
            "main",
            64,
            32,
            wgpu::TextureFormat::Rgba8Unorm,
            true,
        )
        .unwrap();
        target.resize(&device, 128, 96).unwrap();
        assert_eq!(target.size(), (128, 96));
        assert_eq!(target.format(), wgpu::TextureFormat::Rgba8Unorm);
        assert!(target.depth.is_some());
        assert_eq!(target.color.width(), 128);
    }
}
