//! Compute passes that build the cluster volume and bin lights and decals.
//!
//! Ordering is carried by types: [`ClusterPasses::build`] is the only way to
//! get a [`ClusterBuildResult`], both assignment passes borrow it, and the
//! shading bind group ([`ClusterBindings`]) needs both assignment results.
//! Each kernel runs in its own compute pass, so wgpu's usage tracking inserts
//! the barriers between a producer and its consumers.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tessera_lighting::{DecalGpu, EnvironmentUniform, LightGpu};

use crate::buffer::StorageArray;
use crate::camera::Camera;
use crate::cluster::{ClusterDims, ClusterParams, ClusterVolume, GRID_HEADER_BYTES};

/// Shared declarations for the cluster kernels.
pub const CLUSTER_COMMON_WGSL: &str = r#"
struct Params {
    inv_view_proj: mat4x4<f32>,
    dims: vec4<u32>,
    depth: vec4<f32>,
    counts: vec4<u32>,
};

@group(0) @binding(0) var<uniform> params: Params;

fn cluster_id_valid(id: vec3<u32>) -> bool {
    return id.x < params.dims.x && id.y < params.dims.y && id.z < params.dims.z;
}

fn cluster_id_index(id: vec3<u32>) -> u32 {
    return id.x + id.y * params.dims.x + id.z * params.dims.x * params.dims.y;
}
"#;

/// Computes one world-space AABB per cluster.
pub const CLUSTER_BUILD_WGSL: &str = r#"
@group(0) @binding(1) var<storage, read_write> aabbs: array<vec4<f32>>;

fn unproject(ndc: vec3<f32>) -> vec3<f32> {
    let p = params.inv_view_proj * vec4<f32>(ndc, 1.0);
    return p.xyz / p.w;
}

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!cluster_id_valid(id)) {
        return;
    }
    let index = cluster_id_index(id);

    let tile = vec2<f32>(2.0) / vec2<f32>(params.dims.xy);
    let lo = vec2<f32>(-1.0) + vec2<f32>(id.xy) * tile;
    let hi = lo + tile;

    let span = params.depth.y - params.depth.x;
    let d0 = params.depth.x + span * f32(id.z) / f32(params.dims.z);
    let d1 = params.depth.x + span * f32(id.z + 1u) / f32(params.dims.z);
    let cam_span = params.depth.w - params.depth.z;
    let t0 = (d0 - params.depth.z) / cam_span;
    let t1 = (d1 - params.depth.z) / cam_span;

    var mn = vec3<f32>(3.4e38);
    var mx = vec3<f32>(-3.4e38);
    for (var i = 0u; i < 4u; i++) {
        let corner = vec2<f32>(
            select(lo.x, hi.x, (i & 1u) != 0u),
            select(lo.y, hi.y, (i & 2u) != 0u),
        );
        let near = unproject(vec3<f32>(corner, 0.0));
        let far = unproject(vec3<f32>(corner, 1.0));
        let a = mix(near, far, t0);
        let b = mix(near, far, t1);
        mn = min(mn, min(a, b));
        mx = max(mx, max(a, b));
    }
    aabbs[index * 2u] = vec4<f32>(mn, 1.0);
    aabbs[index * 2u + 1u] = vec4<f32>(mx, 1.0);
}
"#;

/// Binning kernel body shared by lights and decals. The item-specific part
/// supplies `struct Item` and `fn touches(item: Item, mn: vec3<f32>, mx: vec3<f32>) -> bool`.
pub const CLUSTER_ASSIGN_WGSL: &str = r#"
struct Grid {
    counter: atomic<u32>,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    entries: array<vec2<u32>>,
};

@group(0) @binding(1) var<storage, read> aabbs: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> items: array<Item>;
@group(0) @binding(3) var<storage, read_write> grid: Grid;
@group(0) @binding(4) var<storage, read_write> indices: array<u32>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!cluster_id_valid(id)) {
        return;
    }
    let index = cluster_id_index(id);
    let mn = aabbs[index * 2u].xyz;
    let mx = aabbs[index * 2u + 1u].xyz;
    let item_count = params.counts.x;
    let cap = params.counts.y;

    var count = 0u;
    for (var i = 0u; i < item_count && count < cap; i++) {
        if (touches(items[i], mn, mx)) {
            count++;
        }
    }

    let offset = atomicAdd(&grid.counter, count);
    grid.entries[index] = vec2<u32>(offset, count);

    var written = 0u;
    for (var i = 0u; i < item_count && written < count; i++) {
        if (touches(items[i], mn, mx)) {
            indices[offset + written] = i;
            written++;
        }
    }
}
"#;

pub const LIGHT_ITEM_WGSL: &str = r#"
struct Item {
    position_kind: vec4<f32>,
    color_intensity: vec4<f32>,
    direction_range: vec4<f32>,
    params: vec4<f32>,
};

fn touches(light: Item, mn: vec3<f32>, mx: vec3<f32>) -> bool {
    if (u32(light.position_kind.w) == 0u) {
        return true;
    }
    let center = light.position_kind.xyz;
    let d = clamp(center, mn, mx) - center;
    let r = light.direction_range.w;
    return dot(d, d) <= r * r;
}
"#;

pub const DECAL_ITEM_WGSL: &str = r#"
struct Item {
    inverse_transform: mat4x4<f32>,
    color: vec4<f32>,
    properties: vec4<f32>,
    textures: vec4<f32>,
};

fn touches(decal: Item, mn: vec3<f32>, mx: vec3<f32>) -> bool {
    var lo = vec3<f32>(3.4e38);
    var hi = vec3<f32>(-3.4e38);
    for (var i = 0u; i < 8u; i++) {
        let corner = select(mn, mx, vec3<bool>((i & 1u) != 0u, (i & 2u) != 0u, (i & 4u) != 0u));
        let p = (decal.inverse_transform * vec4<f32>(corner, 1.0)).xyz;
        lo = min(lo, p);
        hi = max(hi, p);
    }
    let extent = vec3<f32>(0.5, 0.5, 0.5 * decal.properties.y);
    return all(lo <= extent) && all(hi >= -extent);
}
"#;

/// Group 1 of every clustered shading pipeline, plus helpers for looking up
/// a fragment's cluster and accumulating its lights and decals.
pub const CLUSTER_SHADING_WGSL: &str = r#"
struct Shading {
    dims: vec4<u32>,
    depth_viewport: vec4<f32>,
    camera_pos: vec4<f32>,
    camera_forward: vec4<f32>,
    fog_color_density: vec4<f32>,
    sky_tint_time: vec4<f32>,
    scattering: vec4<f32>,
    wind: vec4<f32>,
    precipitation: vec4<f32>,
};

struct Light {
    position_kind: vec4<f32>,
    color_intensity: vec4<f32>,
    direction_range: vec4<f32>,
    params: vec4<f32>,
};

struct Decal {
    inverse_transform: mat4x4<f32>,
    color: vec4<f32>,
    properties: vec4<f32>,
    textures: vec4<f32>,
};

struct ClusterGrid {
    counter: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
    entries: array<vec2<u32>>,
};

@group(1) @binding(0) var<uniform> shading: Shading;
@group(1) @binding(1) var<storage, read> lights: array<Light>;
@group(1) @binding(2) var<storage, read> light_grid: ClusterGrid;
@group(1) @binding(3) var<storage, read> light_indices: array<u32>;
@group(1) @binding(4) var<storage, read> decals: array<Decal>;
@group(1) @binding(5) var<storage, read> decal_grid: ClusterGrid;
@group(1) @binding(6) var<storage, read> decal_indices: array<u32>;

fn clusters_enabled() -> bool {
    return shading.dims.x * shading.dims.y * shading.dims.z > 0u;
}

fn cluster_of(frag_coord: vec2<f32>, world_pos: vec3<f32>) -> u32 {
    let uv = frag_coord / shading.depth_viewport.zw;
    let tx = min(u32(max(uv.x, 0.0) * f32(shading.dims.x)), shading.dims.x - 1u);
    let ty = min(u32(max(1.0 - uv.y, 0.0) * f32(shading.dims.y)), shading.dims.y - 1u);
    let depth = dot(world_pos - shading.camera_pos.xyz, shading.camera_forward.xyz);
    let t = (depth - shading.depth_viewport.x) / (shading.depth_viewport.y - shading.depth_viewport.x);
    let tz = u32(clamp(t * f32(shading.dims.z), 0.0, f32(shading.dims.z) - 1.0));
    return tx + ty * shading.dims.x + tz * shading.dims.x * shading.dims.y;
}

// 1 / (1 + d^2) floored to eighths, zero at or past the range.
fn stepped_attenuation(distance: f32, range: f32) -> f32 {
    let d = max(distance / range, 0.0);
    if (d >= 1.0) {
        return 0.0;
    }
    return floor(8.0 / (1.0 + d * d)) / 8.0;
}

fn shade_light(light: Light, world_pos: vec3<f32>, normal: vec3<f32>) -> vec3<f32> {
    let kind = u32(light.position_kind.w);
    var to_light = -light.direction_range.xyz;
    var attenuation = 1.0;
    if (kind != 0u) {
        let delta = light.position_kind.xyz - world_pos;
        let dist = length(delta);
        to_light = delta / max(dist, 1e-4);
        attenuation = stepped_attenuation(dist, light.direction_range.w);
        if (kind == 2u) {
            let cos_angle = dot(-to_light, light.direction_range.xyz);
            attenuation *= smoothstep(light.params.y, light.params.x, cos_angle);
        }
    }
    let lambert = max(dot(normal, to_light), 0.0);
    return light.color_intensity.rgb * light.color_intensity.w * lambert * attenuation;
}

fn ambient_light() -> vec3<f32> {
    let hour = shading.sky_tint_time.w;
    let daylight = clamp(sin((hour - 6.0) / 12.0 * 3.14159265), 0.1, 1.0);
    return shading.sky_tint_time.rgb * 0.15 * daylight * shading.scattering.z;
}

fn cluster_lighting(frag_coord: vec2<f32>, world_pos: vec3<f32>, normal: vec3<f32>) -> vec3<f32> {
    var total = ambient_light();
    if (!clusters_enabled()) {
        return total;
    }
    let entry = light_grid.entries[cluster_of(frag_coord, world_pos)];
    for (var i = 0u; i < entry.y; i++) {
        total += shade_light(lights[light_indices[entry.x + i]], world_pos, normal);
    }
    return total;
}

fn apply_decals(frag_coord: vec2<f32>, world_pos: vec3<f32>, base: vec3<f32>) -> vec3<f32> {
    var color = base;
    if (!clusters_enabled()) {
        return color;
    }
    let entry = decal_grid.entries[cluster_of(frag_coord, world_pos)];
    for (var i = 0u; i < entry.y; i++) {
        let decal = decals[decal_indices[entry.x + i]];
        let local = (decal.inverse_transform * vec4<f32>(world_pos, 1.0)).xyz;
        let extent = vec3<f32>(0.5, 0.5, 0.5 * decal.properties.y);
        if (any(abs(local) > extent)) {
            continue;
        }
        let depth = abs(local.z) / extent.z;
        let fade_span = max(decal.properties.w - decal.properties.z, 1e-4);
        let fade = 1.0 - clamp((depth - decal.properties.z) / fade_span, 0.0, 1.0);
        let alpha = decal.color.a * fade;
        let mode = u32(decal.properties.x);
        if (mode == 1u) {
            color += decal.color.rgb * alpha;
        } else if (mode == 2u) {
            color *= mix(vec3<f32>(1.0), decal.color.rgb, alpha);
        } else {
            color = mix(color, decal.color.rgb, alpha);
        }
    }
    return color;
}

fn apply_fog(color: vec3<f32>, world_pos: vec3<f32>) -> vec3<f32> {
    let dist = distance(world_pos, shading.camera_pos.xyz);
    let amount = clamp(1.0 - exp(-shading.fog_color_density.w * dist), 0.0, 1.0);
    return mix(color, shading.fog_color_density.rgb, amount);
}
"#;

/// Uniform block at group 1, binding 0 of the shading passes. 144 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadingUniform {
    /// x, y, z, packed light count.
    pub dims: [u32; 4],
    /// cluster near, cluster far, viewport width, viewport height.
    pub depth_viewport: [f32; 4],
    pub camera_pos: [f32; 4],
    pub camera_forward: [f32; 4],
    pub environment: EnvironmentUniform,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ShadingUniform>(), 144);

/// Proof that the cluster AABBs for this frame have been recorded.
pub struct ClusterBuildResult {
    dims: ClusterDims,
    inv_view_proj: Mat4,
    camera_near: f32,
    camera_far: f32,
}

impl ClusterBuildResult {
    pub fn dims(&self) -> ClusterDims {
        self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }
}

/// Proof that light binning has been recorded.
#[derive(Debug, Clone, Copy)]
pub struct LightAssignment {
    pub item_count: u32,
    pub dispatched: bool,
}

/// Proof that decal binning has been recorded.
#[derive(Debug, Clone, Copy)]
pub struct DecalAssignment {
    pub item_count: u32,
    pub dispatched: bool,
}

/// The group-1 bind group consumed by shading stages.
pub struct ClusterBindings {
    pub bind_group: wgpu::BindGroup,
    pub dims: ClusterDims,
}

/// Pipelines and layouts for the cluster kernels.
pub struct ClusterPasses {
    build_layout: wgpu::BindGroupLayout,
    build_pipeline: wgpu::ComputePipeline,
    assign_layout: wgpu::BindGroupLayout,
    light_pipeline: wgpu::ComputePipeline,
    decal_pipeline: wgpu::ComputePipeline,
    shading_layout: wgpu::BindGroupLayout,
    shading_buffer: wgpu::Buffer,
}

fn storage_entry(binding: u32, read_only: bool, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    source: String,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        immediate_size: 0,
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

impl ClusterPasses {
    pub fn new(device: &wgpu::Device) -> Self {
        let compute = wgpu::ShaderStages::COMPUTE;
        let build_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster-build-layout"),
            entries: &[uniform_entry(0, compute), storage_entry(1, false, compute)],
        });
        let assign_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster-assign-layout"),
            entries: &[
                uniform_entry(0, compute),
                storage_entry(1, true, compute),
                storage_entry(2, true, compute),
                storage_entry(3, false, compute),
                storage_entry(4, false, compute),
            ],
        });

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let shading_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster-shading-layout"),
            entries: &[
                uniform_entry(0, fragment | wgpu::ShaderStages::VERTEX),
                storage_entry(1, true, fragment),
                storage_entry(2, true, fragment),
                storage_entry(3, true, fragment),
                storage_entry(4, true, fragment),
                storage_entry(5, true, fragment),
                storage_entry(6, true, fragment),
            ],
        });

        let build_pipeline = compute_pipeline(
            device,
            "cluster-build",
            &build_layout,
            format!("{CLUSTER_COMMON_WGSL}{CLUSTER_BUILD_WGSL}"),
        );
        let light_pipeline = compute_pipeline(
            device,
            "cluster-assign-lights",
            &assign_layout,
            format!("{CLUSTER_COMMON_WGSL}{LIGHT_ITEM_WGSL}{CLUSTER_ASSIGN_WGSL}"),
        );
        let decal_pipeline = compute_pipeline(
            device,
            "cluster-assign-decals",
            &assign_layout,
            format!("{CLUSTER_COMMON_WGSL}{DECAL_ITEM_WGSL}{CLUSTER_ASSIGN_WGSL}"),
        );

        let shading_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-shading-uniform"),
            size: std::mem::size_of::<ShadingUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            build_layout,
            build_pipeline,
            assign_layout,
            light_pipeline,
            decal_pipeline,
            shading_layout,
            shading_buffer,
        }
    }

    /// Layout of the group-1 bind group in [`ClusterBindings`].
    pub fn shading_layout(&self) -> &wgpu::BindGroupLayout {
        &self.shading_layout
    }

    /// Record the AABB build for `camera`.
    pub fn build(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        volume: &mut ClusterVolume,
        camera: &Camera,
    ) -> ClusterBuildResult {
        let config = *volume.config();
        let result = ClusterBuildResult {
            dims: config.dims,
            inv_view_proj: camera.view_projection_matrix().inverse(),
            camera_near: camera.near,
            camera_far: camera.far,
        };
        if result.is_empty() {
            log::debug!("Cluster build skipped: grid {} is empty", config.dims);
            return result;
        }

        let buffers = volume.ensure_buffers(device);
        let params = ClusterParams::new(
            &config,
            result.inv_view_proj,
            result.camera_near,
            result.camera_far,
            0,
            0,
        );
        queue.write_buffer(&buffers.build_params, 0, bytemuck::bytes_of(&params));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cluster-build-bind-group"),
            layout: &self.build_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.build_params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.aabbs.as_entire_binding(),
                },
            ],
        });

        let (x, y, z) = config.dims.workgroups();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("cluster-build"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.build_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
        result
    }

    pub fn assign_lights(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        volume: &ClusterVolume,
        build: &ClusterBuildResult,
        lights: &StorageArray<LightGpu>,
    ) -> LightAssignment {
        let dispatched = self.assign(
            device,
            queue,
            encoder,
            volume,
            build,
            AssignKind::Lights,
            lights.buffer(),
            lights.len() as u32,
        );
        LightAssignment {
            item_count: lights.len() as u32,
            dispatched,
        }
    }

    pub fn assign_decals(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        volume: &ClusterVolume,
        build: &ClusterBuildResult,
        decals: &StorageArray<DecalGpu>,
    ) -> DecalAssignment {
        let dispatched = self.assign(
            device,
            queue,
            encoder,
            volume,
            build,
            AssignKind::Decals,
            decals.buffer(),
            decals.len() as u32,
        );
        DecalAssignment {
            item_count: decals.len() as u32,
            dispatched,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assign(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        volume: &ClusterVolume,
        build: &ClusterBuildResult,
        kind: AssignKind,
        items: &wgpu::Buffer,
        item_count: u32,
    ) -> bool {
        if build.is_empty() {
            log::debug!("{} assignment skipped: no clusters", kind.name());
            return false;
        }
        let Some(buffers) = volume.buffers() else {
            log::warn!("{} assignment skipped: cluster buffers missing", kind.name());
            return false;
        };
        let config = volume.config();
        let (params_buffer, grid, indices, cap, pipeline) = match kind {
            AssignKind::Lights => (
                &buffers.light_params,
                &buffers.light_grid,
                &buffers.light_indices,
                config.max_lights_per_cluster,
                &self.light_pipeline,
            ),
            AssignKind::Decals => (
                &buffers.decal_params,
                &buffers.decal_grid,
                &buffers.decal_indices,
                config.max_decals_per_cluster,
                &self.decal_pipeline,
            ),
        };

        if item_count == 0 {
            // Zero counter and zero (offset, count) for every cluster.
            encoder.clear_buffer(grid, 0, None);
            return false;
        }

        let params = ClusterParams::new(
            config,
            build.inv_view_proj,
            build.camera_near,
            build.camera_far,
            item_count,
            cap,
        );
        queue.write_buffer(params_buffer, 0, bytemuck::bytes_of(&params));
        encoder.clear_buffer(grid, 0, Some(GRID_HEADER_BYTES));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kind.name()),
            layout: &self.assign_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.aabbs.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: items.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: indices.as_entire_binding(),
                },
            ],
        });

        let (x, y, z) = build.dims.workgroups();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kind.name()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
        true
    }

    /// Upload the shading uniform and bind everything the shading stages read.
    #[allow(clippy::too_many_arguments)]
    pub fn bindings(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        volume: &mut ClusterVolume,
        uniform: &ShadingUniform,
        lights: &StorageArray<LightGpu>,
        decals: &StorageArray<DecalGpu>,
        _lights_done: &LightAssignment,
        _decals_done: &DecalAssignment,
    ) -> ClusterBindings {
        queue.write_buffer(&self.shading_buffer, 0, bytemuck::bytes_of(uniform));
        let dims = volume.dims();
        let buffers = volume.ensure_buffers(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cluster-shading-bind-group"),
            layout: &self.shading_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.shading_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.light_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.light_indices.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: decals.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: buffers.decal_grid.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: buffers.decal_indices.as_entire_binding(),
                },
            ],
        });
        ClusterBindings { bind_group, dims }
    }
}

#[derive(Clone, Copy)]
enum AssignKind {
    Lights,
    Decals,
}

impl AssignKind {
    fn name(self) -> &'static str {
        match self {
            AssignKind::Lights => "cluster-assign-lights",
            AssignKind::Decals => "cluster-assign-decals",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{
        ClusterConfig, assign_reference, compute_aabbs, light_touches_aabb,
    };
    use crate::gpu::test_device;
    use glam::Vec3;
    use tessera_lighting::Light;

    #[test]
    fn test_shading_uniform_size() {
        assert_eq!(std::mem::size_of::<ShadingUniform>(), 144);
    }

    #[test]
    fn test_shaders_share_item_interface() {
        for item in [LIGHT_ITEM_WGSL, DECAL_ITEM_WGSL] {
            assert!(item.contains("struct Item"));
            assert!(item.contains("fn touches("));
        }
        assert!(CLUSTER_ASSIGN_WGSL.contains("atomicAdd(&grid.counter"));
    }

    #[test]
    fn test_zero_clusters_skip_assignment() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let passes = ClusterPasses::new(&device);
        let mut volume = ClusterVolume::new(ClusterConfig {
            dims: ClusterDims::new(0, 4, 4),
            ..ClusterConfig::default()
        });
        let lights = StorageArray::<LightGpu>::new(&device, "lights", 4);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let build = passes.build(&device, &queue, &mut encoder, &mut volume, &Camera::default());
        assert!(build.is_empty());
        let la = passes.assign_lights(&device, &queue, &mut encoder, &volume, &build, &lights);
        assert!(!la.dispatched);
        queue.submit(std::iter::once(encoder.finish()));
    }

    #[test]
    fn test_gpu_assignment_matches_reference() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let passes = ClusterPasses::new(&device);
        let config = ClusterConfig {
            dims: ClusterDims::new(4, 2, 3),
            max_lights_per_cluster: 4,
            near_clip: 0.1,
            far_clip: 30.0,
            ..ClusterConfig::default()
        };
        let mut volume = ClusterVolume::new(config);
        let camera = Camera {
            far: 30.0,
            ..Camera::default()
        };

        let packed: Vec<LightGpu> = [
            Light::point(Vec3::new(0.0, 0.0, -5.0), 3.0),
            Light::point(Vec3::new(4.0, 1.0, -20.0), 6.0),
            Light::directional(Vec3::NEG_Y),
        ]
        .iter()
        .map(Light::to_gpu)
        .collect();
        let mut lights = StorageArray::<LightGpu>::new(&device, "lights", 1);
        lights.write(&device, &queue, &packed);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        let build = passes.build(&device, &queue, &mut encoder, &mut volume, &camera);
        let la = passes.assign_lights(&device, &queue, &mut encoder, &volume, &build, &lights);
        assert!(la.dispatched);
        let Some(buffers) = volume.buffers() else {
            panic!("build allocates buffers");
        };
        buffers.copy_grids_for_readback(&mut encoder);
        queue.submit(std::iter::once(encoder.finish()));
        let (light_grid, _) = buffers.read_grids(&device).unwrap();

        let aabbs = compute_aabbs(
            &config,
            camera.view_projection_matrix().inverse(),
            camera.near,
            camera.far,
        );
        let reference = assign_reference(&aabbs, &packed, 4, light_touches_aabb);
        let expected: Vec<u32> = reference.entries.iter().map(|e| e.1).collect();
        assert_eq!(light_grid.counts, expected);
        assert_eq!(light_grid.total_indices, reference.indices.len() as u32);
    }
}
