//! Pixelation post-pass: nearest-sample down-scaling, optional ordered
//! dithering, and optional palette quantisation.
//!
//! The pass renders into a target `pixel_size` times smaller than the scene,
//! so each output texel becomes one visible "pixel". Palette and dithering
//! are toggled independently.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::RenderError;
use crate::post::{
    FULLSCREEN_VS_WGSL, PostContext, PostProcessor, create_fullscreen_pipeline, nearest_sampler,
    run_fullscreen_pass, sampler_entry, texture_entry,
};
use crate::stage::StageInit;
use crate::target::RenderTarget;

/// Palette texture width; also the largest usable palette.
pub const MAX_PALETTE_COLORS: usize = 256;

/// Classic 4×4 ordered-dither matrix.
pub const BAYER_4X4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Threshold in `(0, 1)` for output pixel `(x, y)`: `(M + 0.5) / 16`.
pub fn bayer_threshold(x: u32, y: u32) -> f32 {
    let m = BAYER_4X4[(y % 4) as usize][(x % 4) as usize];
    (m as f32 + 0.5) / 16.0
}

/// Offset `color` by the pixel's threshold, scaled to one palette step.
pub fn dither(color: Vec3, x: u32, y: u32, strength: f32, palette_size: u32) -> Vec3 {
    let levels = (palette_size.max(2) - 1) as f32;
    color + Vec3::splat((bayer_threshold(x, y) - 0.5) * strength / levels)
}

/// Closest palette entry by squared RGB distance; first wins on ties.
/// Returns `color` unchanged for an empty palette.
pub fn nearest_palette_color(color: Vec3, palette: &[Vec3]) -> Vec3 {
    palette
        .iter()
        .copied()
        .fold(None::<(Vec3, f32)>, |best, candidate| {
            let d = candidate.distance_squared(color);
            match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((candidate, d)),
            }
        })
        .map_or(color, |(c, _)| c)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaletteGeneration {
    /// Evenly spaced samples of the RGB cube.
    RgbCube,
    /// Hues around the colour wheel with alternating saturation and value.
    HsvDistributed,
    Grayscale,
}

/// Build a palette of `size` colours, `size` clamped to `2..=256`.
pub fn generate_palette(method: PaletteGeneration, size: usize) -> Vec<Vec3> {
    let size = size.clamp(2, MAX_PALETTE_COLORS);
    let mut colors = Vec::with_capacity(size);
    match method {
        PaletteGeneration::RgbCube => {
            let side = (size as f32).cbrt().ceil().max(2.0) as usize;
            let step = |i: usize| i as f32 / (side - 1) as f32;
            'fill: for r in 0..side {
                for g in 0..side {
                    for b in 0..side {
                        if colors.len() == size {
                            break 'fill;
                        }
                        colors.push(Vec3::new(step(r), step(g), step(b)));
                    }
                }
            }
        }
        PaletteGeneration::HsvDistributed => {
            for i in 0..size {
                let hue = i as f32 / size as f32 * 360.0;
                let sat = 0.7 + 0.3 * ((i % 3) as f32 / 2.0);
                let val = 0.7 + 0.3 * (((i / 3) % 3) as f32 / 2.0);
                colors.push(hsv_to_rgb(hue, sat, val));
            }
        }
        PaletteGeneration::Grayscale => {
            for i in 0..size {
                colors.push(Vec3::splat(i as f32 / (size - 1) as f32));
            }
        }
    }
    colors
}

fn hsv_to_rgb(hue: f32, sat: f32, val: f32) -> Vec3 {
    let c = val * sat;
    let x = c * (1.0 - ((hue / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = val - c;
    let rgb = match hue {
        h if h < 60.0 => Vec3::new(c, x, 0.0),
        h if h < 120.0 => Vec3::new(x, c, 0.0),
        h if h < 180.0 => Vec3::new(0.0, c, x),
        h if h < 240.0 => Vec3::new(0.0, x, c),
        h if h < 300.0 => Vec3::new(x, 0.0, c),
        _ => Vec3::new(c, 0.0, x),
    };
    rgb + Vec3::splat(m)
}

/// User-facing pixel-art options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelArtSettings {
    pub pixel_size: u32,
    pub snap_to_grid: bool,
    pub palette_enabled: bool,
    pub palette_size: u32,
    pub dithering_enabled: bool,
    pub dither_strength: f32,
}

impl Default for PixelArtSettings {
    fn default() -> Self {
        Self {
            pixel_size: 1,
            snap_to_grid: true,
            palette_enabled: false,
            palette_size: 16,
            dithering_enabled: false,
            dither_strength: 0.5,
        }
    }
}

/// Uniform block of the pixel-art shader. 32 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PixelArtParams {
    pub output_size: [f32; 2],
    pub pixel_size: f32,
    pub dither_strength: f32,
    /// Colours actually sampled from the palette texture.
    pub palette_size: u32,
    pub palette_enabled: u32,
    pub dither_enabled: u32,
    pub snap: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<PixelArtParams>(), 32);

pub const PIXEL_ART_FS_WGSL: &str = r#"
struct PixelArtParams {
    output_size: vec2<f32>,
    pixel_size: f32,
    dither_strength: f32,
    palette_size: u32,
    palette_enabled: u32,
    dither_enabled: u32,
    snap: u32,
};

@group(0) @binding(0) var<uniform> params: PixelArtParams;
@group(1) @binding(0) var input_tex: texture_2d<f32>;
@group(1) @binding(1) var input_sampler: sampler;
@group(1) @binding(2) var palette_tex: texture_2d<f32>;
@group(1) @binding(3) var bayer_tex: texture_2d<u32>;

fn nearest_palette(color: vec3<f32>) -> vec3<f32> {
    var best = color;
    var best_d = 3.4e38;
    for (var i = 0u; i < params.palette_size; i++) {
        let candidate = textureLoad(palette_tex, vec2<i32>(i32(i), 0), 0).rgb;
        let delta = candidate - color;
        let d = dot(delta, delta);
        if (d < best_d) {
            best_d = d;
            best = candidate;
        }
    }
    return best;
}

@fragment
fn fs_pixelate(in: VertexOutput) -> @location(0) vec4<f32> {
    let pixel = floor(in.uv * params.output_size);
    var uv = in.uv;
    if (params.snap != 0u) {
        uv = (pixel + 0.5) / params.output_size;
    }
    var color = textureSampleLevel(input_tex, input_sampler, uv, 0.0).rgb;

    if (params.dither_enabled != 0u) {
        let cell = vec2<u32>(pixel) % vec2<u32>(4u);
        let m = textureLoad(bayer_tex, vec2<i32>(cell), 0).r;
        let threshold = (f32(m) + 0.5) / 16.0;
        let levels = f32(max(params.palette_size, 2u) - 1u);
        color += vec3<f32>((threshold - 0.5) * params.dither_strength / levels);
    }
    if (params.palette_enabled != 0u && params.palette_size > 0u) {
        color = nearest_palette(color);
    }
    return vec4<f32>(clamp(color, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

/// The pixelation pass and its palette/dither textures.
pub struct PixelArtPass {
    settings: PixelArtSettings,
    palette: Vec<Vec3>,
    palette_dirty: bool,
    resources: Option<PixelArtResources>,
}

struct PixelArtResources {
    pipeline: wgpu::RenderPipeline,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    palette_texture: wgpu::Texture,
    palette_view: wgpu::TextureView,
    bayer_view: wgpu::TextureView,
}

impl Default for PixelArtPass {
    fn default() -> Self {
        Self::new(PixelArtSettings::default())
    }
}

impl PixelArtPass {
    pub fn new(settings: PixelArtSettings) -> Self {
        Self {
            settings: PixelArtSettings {
                pixel_size: settings.pixel_size.max(1),
                palette_size: settings.palette_size.clamp(2, MAX_PALETTE_COLORS as u32),
                dither_strength: settings.dither_strength.clamp(0.0, 1.0),
                ..settings
            },
            palette: Vec::new(),
            palette_dirty: false,
            resources: None,
        }
    }

    pub fn settings(&self) -> &PixelArtSettings {
        &self.settings
    }

    pub fn set_pixel_size(&mut self, pixel_size: u32) {
        self.settings.pixel_size = pixel_size.max(1);
    }

    pub fn set_snap_to_grid(&mut self, snap: bool) {
        self.settings.snap_to_grid = snap;
    }

    /// Replace the palette. Colours past the texture width are dropped.
    pub fn set_palette(&mut self, colors: &[Vec3]) {
        if colors.len() > MAX_PALETTE_COLORS {
            log::warn!(
                "Palette has {} colours, keeping the first {MAX_PALETTE_COLORS}",
                colors.len()
            );
        }
        self.palette = colors.iter().take(MAX_PALETTE_COLORS).copied().collect();
        self.palette_dirty = true;
    }

    pub fn palette(&self) -> &[Vec3] {
        &self.palette
    }

    pub fn enable_palette(&mut self, enabled: bool) {
        self.settings.palette_enabled = enabled;
    }

    pub fn set_palette_size(&mut self, size: u32) {
        self.settings.palette_size = size.clamp(2, MAX_PALETTE_COLORS as u32);
    }

    pub fn enable_dithering(&mut self, strength: f32) {
        self.settings.dithering_enabled = true;
        self.settings.dither_strength = strength.clamp(0.0, 1.0);
    }

    pub fn disable_dithering(&mut self) {
        self.settings.dithering_enabled = false;
    }

    /// Shader parameters for an output of `width × height`.
    pub fn params(&self, width: u32, height: u32) -> PixelArtParams {
        let s = &self.settings;
        let sampled = (s.palette_size as usize).min(self.palette.len()) as u32;
        let palette_enabled = s.palette_enabled && sampled > 0;
        if s.palette_enabled && !palette_enabled {
            log::debug!("Palette quantisation skipped: no palette uploaded");
        }
        PixelArtParams {
            output_size: [width as f32, height as f32],
            pixel_size: s.pixel_size as f32,
            dither_strength: s.dither_strength,
            palette_size: sampled,
            palette_enabled: palette_enabled as u32,
            dither_enabled: s.dithering_enabled as u32,
            snap: s.snap_to_grid as u32,
        }
    }

    /// Nearest-colour lookup against the current palette, honouring the
    /// configured palette size.
    pub fn quantize(&self, color: Vec3) -> Vec3 {
        let n = (self.settings.palette_size as usize).min(self.palette.len());
        nearest_palette_color(color, &self.palette[..n])
    }

    fn upload_palette(&mut self, queue: &wgpu::Queue) {
        let Some(res) = &self.resources else {
            return;
        };
        if !self.palette_dirty {
            return;
        }
        let mut texels = vec![0u8; MAX_PALETTE_COLORS * 4];
        for (texel, color) in texels.chunks_exact_mut(4).zip(&self.palette) {
            let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
            texel.copy_from_slice(&[c.x as u8, c.y as u8, c.z as u8, 255]);
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &res.palette_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(MAX_PALETTE_COLORS as u32 * 4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: MAX_PALETTE_COLORS as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.palette_dirty = false;
    }

    /// Pixelate `input` into `output`.
    pub fn run(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        input: &RenderTarget,
        output: &RenderTarget,
    ) {
        self.upload_palette(queue);
        let params = self.params(output.width(), output.height());
        let Some(res) = &self.resources else {
            log::warn!("Pixel-art pass skipped: not initialized");
            return;
        };
        queue.write_buffer(&res.params_buffer, 0, bytemuck::bytes_of(&params));
        let textures = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pixel-art-textures"),
            layout: &res.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&res.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&res.palette_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&res.bayer_view),
                },
            ],
        });
        run_fullscreen_pass(
            encoder,
            &res.pipeline,
            &[&res.params_bind_group, &textures],
            &output.color_view,
            "pixel-art",
        );
    }
}

impl PostProcessor for PixelArtPass {
    fn name(&self) -> &str {
        "pixel-art"
    }

    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError> {
        let device = init.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pixel-art-shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_VS_WGSL}{PIXEL_ART_FS_WGSL}").into()),
        });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pixel-art-params-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pixel-art-texture-layout"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
                sampler_entry(1),
                texture_entry(2, wgpu::TextureSampleType::Float { filterable: true }),
                texture_entry(3, wgpu::TextureSampleType::Uint),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pixel-art-pipeline-layout"),
            bind_group_layouts: &[&params_layout, &texture_layout],
            immediate_size: 0,
        });
        let pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &pipeline_layout,
            "fs_pixelate",
            init.color_format,
            "pixel-art",
        );

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixel-art-params"),
            size: std::mem::size_of::<PixelArtParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pixel-art-params"),
            layout: &params_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let palette_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("palette"),
            size: wgpu::Extent3d {
                width: MAX_PALETTE_COLORS as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let palette_view = palette_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bayer_size = wgpu::Extent3d {
            width: 4,
            height: 4,
            depth_or_array_layers: 1,
        };
        let bayer_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("bayer-4x4"),
            size: bayer_size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let bayer: Vec<u8> = BAYER_4X4.iter().flatten().copied().collect();
        init.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &bayer_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bayer,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: None,
            },
            bayer_size,
        );
        let bayer_view = bayer_texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.resources = Some(PixelArtResources {
            pipeline,
            params_buffer,
            params_bind_group,
            texture_layout,
            sampler: nearest_sampler(device, "pixel-art-sampler"),
            palette_texture,
            palette_view,
            bayer_view,
        });
        self.palette_dirty = !self.palette.is_empty();
        self.upload_palette(init.queue);
        log::info!(
            "Pixel-art pass initialized (pixel size {}, palette {}, dithering {})",
            self.settings.pixel_size,
            self.settings.palette_enabled,
            self.settings.dithering_enabled
        );
        Ok(())
    }

    fn apply(&mut self, input: &RenderTarget, output: &RenderTarget, ctx: &mut PostContext<'_>) {
        self.run(ctx.device, ctx.queue, ctx.encoder, input, output);
    }
}
