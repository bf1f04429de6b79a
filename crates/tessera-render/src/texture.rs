//! Nearest-filtered RGBA8 textures for pixel-art sampling.

use crate::error::RenderError;
use crate::post::nearest_sampler;

/// A 2D texture with its default view and a nearest sampler.
pub struct PixelTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    /// Width and height in texels.
    pub dimensions: (u32, u32),
}

/// Bytes an RGBA8 image of `width × height` must supply.
pub fn rgba8_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

fn validate(label: &str, width: u32, height: u32, pixels: &[u8]) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::ZeroSizedTarget {
            label: label.to_string(),
            width,
            height,
        });
    }
    let expected = rgba8_len(width, height);
    if pixels.len() != expected {
        return Err(RenderError::TextureData {
            label: label.to_string(),
            expected,
            actual: pixels.len(),
        });
    }
    Ok(())
}

/// Upload tightly packed RGBA8 `pixels`. No mipmaps: pixel art never
/// minifies smoothly.
pub fn load_texture_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<PixelTexture, RenderError> {
    validate(label, width, height, pixels)?;

    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: None,
        },
        size,
    );
    log::debug!("Loaded texture '{label}' ({width}x{height})");

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(PixelTexture {
        texture,
        view,
        sampler: nearest_sampler(device, label),
        dimensions: (width, height),
    })
}
