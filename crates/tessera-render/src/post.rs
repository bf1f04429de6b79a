//! Post-processing chain.
//!
//! Processors run in registration order. The first reads the main scene
//! target, intermediate steps ping-pong between the intermediate and main
//! targets, and the last one writes the final target.

use crate::error::RenderError;
use crate::stage::StageInit;
use crate::target::RenderTarget;

/// Per-frame state handed to post-processors.
pub struct PostContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub delta_time: f32,
}

/// A full-screen pass reading one target and writing another.
pub trait PostProcessor {
    fn name(&self) -> &str;

    fn is_active(&self) -> bool {
        true
    }

    /// Create GPU resources. Called once when the processor is registered.
    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError>;

    fn apply(&mut self, input: &RenderTarget, output: &RenderTarget, ctx: &mut PostContext<'_>);
}

/// Which of the pipeline's targets a chain step reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetSlot {
    Main,
    Intermediate,
    Final,
}

/// `(input, output)` per step for a chain of `len` processors.
pub fn plan_post_chain(len: usize) -> Vec<(TargetSlot, TargetSlot)> {
    let mut steps = Vec::with_capacity(len);
    let mut input = TargetSlot::Main;
    for i in 0..len {
        let output = if i + 1 == len {
            TargetSlot::Final
        } else if input == TargetSlot::Main {
            TargetSlot::Intermediate
        } else {
            TargetSlot::Main
        };
        steps.push((input, output));
        input = output;
    }
    steps
}

/// Full-screen triangle from `vertex_index`, no vertex buffers.
pub const FULLSCREEN_VS_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

const BLIT_FS_WGSL: &str = r#"
@group(0) @binding(0) var input_tex: texture_2d<f32>;
@group(0) @binding(1) var input_sampler: sampler;

@fragment
fn fs_blit(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSampleLevel(input_tex, input_sampler, in.uv, 0.0);
}
"#;

/// Create a fullscreen render pipeline with the given fragment entry point.
pub(crate) fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    fragment_entry: &str,
    target_format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Draw one full-screen triangle into `target_view`.
pub(crate) fn run_fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind_groups: &[&wgpu::BindGroup],
    target_view: &wgpu::TextureView,
    label: &str,
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(pipeline);
    for (i, group) in bind_groups.iter().enumerate() {
        pass.set_bind_group(i as u32, *group, &[]);
    }
    pass.draw(0..3, 0..1);
}

/// Nearest-filtered sampler, the only kind pixel art wants.
pub(crate) fn nearest_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

pub(crate) fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Plain copy with nearest sampling. Used to move the scene into the final
/// target when nothing else does.
#[derive(Default)]
pub struct BlitPass {
    resources: Option<BlitResources>,
}

struct BlitResources {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl BlitPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    pub fn blit(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        let Some(res) = &self.resources else {
            log::warn!("Blit skipped: pass not initialized");
            return;
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit-bind-group"),
            layout: &res.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&res.sampler),
                },
            ],
        });
        run_fullscreen_pass(encoder, &res.pipeline, &[&bind_group], output, "blit");
    }
}

impl PostProcessor for BlitPass {
    fn name(&self) -> &str {
        "blit"
    }

    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError> {
        let device = init.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit-shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{FULLSCREEN_VS_WGSL}{BLIT_FS_WGSL}").into()),
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit-layout"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
                sampler_entry(1),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit-pipeline-layout"),
            bind_group_layouts: &[&layout],
            immediate_size: 0,
        });
        let pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &pipeline_layout,
            "fs_blit",
            init.color_format,
            "blit",
        );
        self.resources = Some(BlitResources {
            pipeline,
            layout,
            sampler: nearest_sampler(device, "blit-sampler"),
        });
        Ok(())
    }

    fn apply(&mut self, input: &RenderTarget, output: &RenderTarget, ctx: &mut PostContext<'_>) {
        self.blit(ctx.device, ctx.encoder, &input.color_view, &output.color_view);
    }
}
