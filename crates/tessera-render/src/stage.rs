//! Render stages: ordered passes that draw into the main scene target.
//!
//! Every stage binds the camera at group 0. Stages that shade with the
//! cluster system also bind [`ClusterBindings`] at group 1 and prepend
//! [`CLUSTER_SHADING_WGSL`] to their shader.

use std::cell::{Cell, RefCell};
use std::num::NonZeroU64;
use std::rc::Rc;

use glam::Mat4;
use tessera_grid::CubeGrid;
use tessera_math::Frustum;

use crate::buffer::{VertexPositionColor, VertexPositionNormalUv, VoxelInstance};
use crate::camera::{Camera, CameraUniform};
use crate::cluster_pass::{CLUSTER_SHADING_WGSL, ClusterBindings};
use crate::debug::LineBatch;
use crate::error::RenderError;
use crate::target::RenderTarget;
use crate::voxel_object::{VoxelRenderObject, VoxelRenderSettings, VoxelRenderStats};

/// Everything a stage or post-processor needs to build its GPU resources.
pub struct StageInit<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    /// Layout of [`ClusterBindings::bind_group`].
    pub shading_layout: &'a wgpu::BindGroupLayout,
}

/// Per-frame state handed to every stage.
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Already cleared; stages load and store.
    pub target: &'a RenderTarget,
    pub camera: &'a Camera,
    pub view_proj: Mat4,
    pub frustum: &'a Frustum,
    pub cluster: &'a ClusterBindings,
    pub delta_time: f32,
}

pub trait RenderStage {
    fn name(&self) -> &str;

    fn is_active(&self) -> bool {
        true
    }

    /// Create GPU resources. Called once when the stage is registered.
    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError>;

    fn execute(&mut self, ctx: &mut FrameContext<'_>);
}

/// Camera uniform buffer and its group-0 bind group.
struct CameraBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

fn camera_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<CameraUniform>() as u64),
            },
            count: None,
        }],
    })
}

impl CameraBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self { buffer, bind_group }
    }

    fn write(&self, queue: &wgpu::Queue, camera: &Camera, view_proj: Mat4) {
        let uniform = CameraUniform {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
        };
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&uniform));
    }
}

/// Open a pass on `target` that keeps what earlier stages drew.
fn begin_load_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    target: &'e RenderTarget,
    label: &str,
) -> Option<wgpu::RenderPass<'e>> {
    let Some(depth_view) = target.depth_view() else {
        log::warn!("{label} skipped: target '{}' has no depth", target.label());
        return None;
    };
    Some(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    }))
}

// ---- Voxel geometry ----

const VOXEL_WGSL: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct InstanceInput {
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
    @location(7) color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(instance.model_0, instance.model_1, instance.model_2, instance.model_3);
    let world = model * vec4<f32>(vertex.position, 1.0);
    var out: VertexOutput;
    out.clip_position = camera.view_proj * world;
    out.world_pos = world.xyz;
    // Uniform scale only, so the model matrix transforms normals directly.
    out.normal = normalize((model * vec4<f32>(vertex.normal, 0.0)).xyz);
    out.color = instance.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let frag = in.clip_position.xy;
    let base = apply_decals(frag, in.world_pos, in.color);
    let lit = base * cluster_lighting(frag, in.world_pos, normalize(in.normal));
    return vec4<f32>(apply_fog(lit, in.world_pos), 1.0);
}
"#;

/// Draws a shared [`CubeGrid`] with clustered lighting, decals and fog.
pub struct VoxelStage {
    grid: Rc<RefCell<CubeGrid>>,
    object: VoxelRenderObject,
    stats: Rc<Cell<VoxelRenderStats>>,
    resources: Option<VoxelStageResources>,
}

struct VoxelStageResources {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl VoxelStage {
    /// Subscribes the render object to `grid`'s chunk events.
    pub fn new(grid: Rc<RefCell<CubeGrid>>, settings: VoxelRenderSettings) -> Self {
        let mut object = VoxelRenderObject::new(settings);
        object.attach(&mut grid.borrow_mut());
        Self {
            grid,
            object,
            stats: Rc::new(Cell::new(VoxelRenderStats::default())),
            resources: None,
        }
    }

    pub fn grid(&self) -> &Rc<RefCell<CubeGrid>> {
        &self.grid
    }

    pub fn object(&self) -> &VoxelRenderObject {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut VoxelRenderObject {
        &mut self.object
    }

    pub fn stats(&self) -> &VoxelRenderStats {
        self.object.stats()
    }

    /// Statistics of the last executed frame, readable after the stage has
    /// been handed to the pipeline.
    pub fn stats_handle(&self) -> Rc<Cell<VoxelRenderStats>> {
        Rc::clone(&self.stats)
    }
}

impl RenderStage for VoxelStage {
    fn name(&self) -> &str {
        "voxels"
    }

    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError> {
        let device = init.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("voxel-shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{CLUSTER_SHADING_WGSL}{VOXEL_WGSL}").into()),
        });
        let camera_layout = camera_layout(device, "voxel-camera-layout");
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("voxel-pipeline-layout"),
            bind_group_layouts: &[&camera_layout, init.shading_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("voxel-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[VertexPositionNormalUv::layout(), VoxelInstance::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: init.depth_format,
                depth_write_enabled: true,
                depth_compare: RenderTarget::DEPTH_COMPARE,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: init.color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });

        self.resources = Some(VoxelStageResources {
            pipeline,
            camera: CameraBinding::new(device, &camera_layout, "voxel-camera"),
        });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        let Some(res) = &self.resources else {
            log::warn!("Voxel stage skipped: not initialized");
            return;
        };
        self.object
            .prepare(ctx.device, ctx.queue, &self.grid.borrow());
        res.camera.write(ctx.queue, ctx.camera, ctx.view_proj);

        let Some(mut pass) = begin_load_pass(ctx.encoder, ctx.target, "voxels") else {
            return;
        };
        pass.set_pipeline(&res.pipeline);
        pass.set_bind_group(0, &res.camera.bind_group, &[]);
        pass.set_bind_group(1, &ctx.cluster.bind_group, &[]);
        self.object.render(&mut pass, ctx.frustum, ctx.camera.position);
        drop(pass);
        self.stats.set(*self.object.stats());
    }
}

// ---- Debug lines ----

const LINE_WGSL: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec4<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;

/// Draws and then clears a shared [`LineBatch`].
pub struct DebugLineStage {
    batch: Rc<RefCell<LineBatch>>,
    active: bool,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_capacity: usize,
    resources: Option<LineStageResources>,
}

struct LineStageResources {
    pipeline: wgpu::RenderPipeline,
    camera: CameraBinding,
}

impl DebugLineStage {
    pub fn new(batch: Rc<RefCell<LineBatch>>) -> Self {
        Self {
            batch,
            active: true,
            vertex_buffer: None,
            vertex_capacity: 0,
            resources: None,
        }
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[VertexPositionColor]) {
        if self.vertex_buffer.is_none() || vertices.len() > self.vertex_capacity {
            self.vertex_capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("debug-line-vertices"),
                size: (self.vertex_capacity * std::mem::size_of::<VertexPositionColor>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let Some(buffer) = &self.vertex_buffer {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(vertices));
        }
    }
}

impl RenderStage for DebugLineStage {
    fn name(&self) -> &str {
        "debug-lines"
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn initialize(&mut self, init: &StageInit<'_>) -> Result<(), RenderError> {
        let device = init.device;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("debug-line-shader"),
            source: wgpu::ShaderSource::Wgsl(LINE_WGSL.into()),
        });
        let camera_layout = camera_layout(device, "debug-line-camera-layout");
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("debug-line-pipeline-layout"),
            bind_group_layouts: &[&camera_layout],
            immediate_size: 0,
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("debug-line-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[VertexPositionColor::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            // Tested against scene depth but never written.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: init.depth_format,
                depth_write_enabled: false,
                depth_compare: RenderTarget::DEPTH_COMPARE,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: init.color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview_mask: None,
            cache: None,
        });
        self.resources = Some(LineStageResources {
            pipeline,
            camera: CameraBinding::new(device, &camera_layout, "debug-line-camera"),
        });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut FrameContext<'_>) {
        let batch = Rc::clone(&self.batch);
        let mut batch = batch.borrow_mut();
        if batch.is_empty() {
            return;
        }
        if self.resources.is_none() {
            log::warn!("Debug line stage skipped: not initialized");
            batch.clear();
            return;
        }
        self.upload(ctx.device, ctx.queue, batch.vertices());
        let vertex_count = batch.vertices().len() as u32;
        batch.clear();

        let (Some(res), Some(buffer)) = (&self.resources, &self.vertex_buffer) else {
            return;
        };
        res.camera.write(ctx.queue, ctx.camera, ctx.view_proj);
        let Some(mut pass) = begin_load_pass(ctx.encoder, ctx.target, "debug-lines") else {
            return;
        };
        pass.set_pipeline(&res.pipeline);
        pass.set_bind_group(0, &res.camera.bind_group, &[]);
        pass.set_vertex_buffer(0, buffer.slice(..));
        pass.draw(0..vertex_count, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_pass::ClusterPasses;
    use crate::gpu::test_device;
    use glam::Vec3;

    #[test]
    fn test_voxel_shader_uses_cluster_helpers() {
        for helper in ["cluster_lighting(", "apply_decals(", "apply_fog("] {
            assert!(VOXEL_WGSL.contains(helper));
        }
        assert!(!VOXEL_WGSL.contains("@group(1)"));
    }

    #[test]
    fn test_voxel_stage_attaches_to_grid() {
        let grid = Rc::new(RefCell::new(CubeGrid::new(4, 1.0)));
        let stage = VoxelStage::new(Rc::clone(&grid), VoxelRenderSettings::default());
        assert!(stage.object().is_attached());
        assert_eq!(stage.name(), "voxels");
        assert!(stage.is_active());
    }

    #[test]
    fn test_debug_stage_toggle() {
        let mut stage = DebugLineStage::new(Rc::new(RefCell::new(LineBatch::new())));
        assert!(stage.is_active());
        stage.set_active(false);
        assert!(!stage.is_active());
    }

    #[test]
    fn test_stage_pipelines_build() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let passes = ClusterPasses::new(&device);
        let init = StageInit {
            device: &device,
            queue: &queue,
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            depth_format: RenderTarget::DEPTH_FORMAT,
            shading_layout: passes.shading_layout(),
        };

        let grid = Rc::new(RefCell::new(CubeGrid::new(4, 1.0)));
        let mut voxels = VoxelStage::new(grid, VoxelRenderSettings::default());
        voxels.initialize(&init).unwrap();

        let batch = Rc::new(RefCell::new(LineBatch::new()));
        batch.borrow_mut().add_line(Vec3::ZERO, Vec3::Y, [1.0; 4]);
        let mut lines = DebugLineStage::new(batch);
        lines.initialize(&init).unwrap();
        assert!(lines.resources.is_some());
    }
}
