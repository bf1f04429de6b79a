//! Frustum-aligned cluster volume.
//!
//! The view frustum is split into `dim_x × dim_y` screen tiles and `dim_z`
//! linear depth slices between the cluster near and far planes. Each cluster
//! gets a world-space AABB every frame; lights and decals are then binned
//! into per-cluster index lists by the compute passes in
//! [`cluster_pass`](crate::cluster_pass).
//!
//! Everything here except [`ClusterBuffers`] is plain CPU data. The
//! `compute_aabbs`/`assign_reference` functions mirror the WGSL exactly and
//! are what the tests and the cluster wireframe use.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use tessera_lighting::{DecalGpu, LightGpu, LightKind};
use tessera_math::Aabb;

use crate::error::RenderError;

/// Threads per work-group in X and Y. Z is one work-group per slice.
pub const WORKGROUP_SIZE: u32 = 8;

/// Bytes before the `(offset, count)` entries in a light or decal grid.
/// The first `u32` is the global index counter.
pub const GRID_HEADER_BYTES: u64 = 16;

/// Upper bound on either per-cluster cap.
pub const MAX_ITEMS_PER_CLUSTER: u32 = 256;

/// Cluster grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterDims {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl ClusterDims {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn total(&self) -> u32 {
        self.x * self.y * self.z
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// `x + y·dim_x + z·dim_x·dim_y`.
    pub fn index(&self, x: u32, y: u32, z: u32) -> u32 {
        x + y * self.x + z * self.x * self.y
    }

    /// Inverse of [`ClusterDims::index`]. `None` when out of range.
    pub fn decode(&self, index: u32) -> Option<(u32, u32, u32)> {
        if index >= self.total() {
            return None;
        }
        let slice = self.x * self.y;
        let z = index / slice;
        let rem = index % slice;
        Some((rem % self.x, rem / self.x, z))
    }

    /// Work-groups for an 8×8×1 kernel covering every cluster.
    pub fn workgroups(&self) -> (u32, u32, u32) {
        (
            self.x.div_ceil(WORKGROUP_SIZE),
            self.y.div_ceil(WORKGROUP_SIZE),
            self.z,
        )
    }
}

impl std::fmt::Display for ClusterDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Persistent cluster configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterConfig {
    pub dims: ClusterDims,
    pub max_lights_per_cluster: u32,
    pub max_decals_per_cluster: u32,
    pub near_clip: f32,
    pub far_clip: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            dims: ClusterDims::new(16, 8, 24),
            max_lights_per_cluster: 64,
            max_decals_per_cluster: 32,
            near_clip: 0.1,
            far_clip: 100.0,
        }
    }
}

impl ClusterConfig {
    /// Caps clamped to `1..=MAX_ITEMS_PER_CLUSTER` and a non-empty depth range.
    pub fn sanitized(mut self) -> Self {
        self.max_lights_per_cluster = self.max_lights_per_cluster.clamp(1, MAX_ITEMS_PER_CLUSTER);
        self.max_decals_per_cluster = self.max_decals_per_cluster.clamp(1, MAX_ITEMS_PER_CLUSTER);
        self.near_clip = self.near_clip.max(1e-4);
        if self.far_clip <= self.near_clip {
            self.far_clip = self.near_clip + 1.0;
        }
        self
    }
}

/// Uniform block shared by the build and assignment kernels. 112 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ClusterParams {
    pub inv_view_proj: [[f32; 4]; 4],
    /// x, y, z, total.
    pub dims: [u32; 4],
    /// cluster near, cluster far, camera near, camera far.
    pub depth: [f32; 4],
    /// item count, per-cluster cap.
    pub counts: [u32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<ClusterParams>(), 112);

impl ClusterParams {
    pub fn new(
        config: &ClusterConfig,
        inv_view_proj: Mat4,
        camera_near: f32,
        camera_far: f32,
        item_count: u32,
        cap: u32,
    ) -> Self {
        let d = config.dims;
        Self {
            inv_view_proj: inv_view_proj.to_cols_array_2d(),
            dims: [d.x, d.y, d.z, d.total()],
            depth: [config.near_clip, config.far_clip, camera_near, camera_far],
            counts: [item_count, cap, 0, 0],
        }
    }
}

/// World-space AABB of every cluster, in index order.
///
/// Tile corners are unprojected onto the camera near (NDC z = 0) and far
/// (z = 1) planes; the slice's linear view depth then interpolates along each
/// corner ray.
pub fn compute_aabbs(
    config: &ClusterConfig,
    inv_view_proj: Mat4,
    camera_near: f32,
    camera_far: f32,
) -> Vec<Aabb> {
    let dims = config.dims;
    let mut out = Vec::with_capacity(dims.total() as usize);
    let unproject = |x: f32, y: f32, z: f32| -> Vec3 {
        let p = inv_view_proj * Vec4::new(x, y, z, 1.0);
        p.truncate() / p.w
    };
    let cam_span = camera_far - camera_near;
    let span = config.far_clip - config.near_clip;

    for index in 0..dims.total() {
        let Some((cx, cy, cz)) = dims.decode(index) else {
            continue;
        };
        let tile_x = 2.0 / dims.x as f32;
        let tile_y = 2.0 / dims.y as f32;
        let lo_x = -1.0 + cx as f32 * tile_x;
        let lo_y = -1.0 + cy as f32 * tile_y;
        let d0 = config.near_clip + span * cz as f32 / dims.z as f32;
        let d1 = config.near_clip + span * (cz + 1) as f32 / dims.z as f32;
        let t0 = (d0 - camera_near) / cam_span;
        let t1 = (d1 - camera_near) / cam_span;

        let mut points = [Vec3::ZERO; 8];
        for i in 0..4 {
            let x = if i & 1 != 0 { lo_x + tile_x } else { lo_x };
            let y = if i & 2 != 0 { lo_y + tile_y } else { lo_y };
            let near = unproject(x, y, 0.0);
            let far = unproject(x, y, 1.0);
            points[i * 2] = near.lerp(far, t0);
            points[i * 2 + 1] = near.lerp(far, t1);
        }
        if let Some(aabb) = Aabb::from_points(points) {
            out.push(aabb);
        }
    }
    out
}

/// Slice containing a point at linear view depth `depth`, clamped.
pub fn depth_slice(config: &ClusterConfig, depth: f32) -> u32 {
    let t = (depth - config.near_clip) / (config.far_clip - config.near_clip);
    let z = (t * config.dims.z as f32).floor() as i64;
    z.clamp(0, config.dims.z.saturating_sub(1) as i64) as u32
}

/// Directional lights reach every cluster; the rest are range spheres.
pub fn light_touches_aabb(light: &LightGpu, aabb: &Aabb) -> bool {
    if light.position_kind[3] as u32 == LightKind::Directional as u32 {
        return true;
    }
    let [x, y, z, _] = light.position_kind;
    aabb.intersects_sphere(Vec3::new(x, y, z), light.direction_range[3])
}

/// Overlap of the cluster AABB, taken into decal space, with the decal's
/// projection box.
pub fn decal_touches_aabb(decal: &DecalGpu, aabb: &Aabb) -> bool {
    let inv = Mat4::from_cols_array(&decal.inverse_transform);
    let Some(local) = Aabb::from_points(aabb.corners().map(|c| inv.transform_point3(c))) else {
        return false;
    };
    let extent = Vec3::new(0.5, 0.5, 0.5 * decal.properties[1]);
    local.intersects(&Aabb::new(-extent, extent))
}

/// Result of binning items into clusters: `(offset, count)` per cluster and
/// the flat index list they point into.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterAssignment {
    pub entries: Vec<(u32, u32)>,
    pub indices: Vec<u32>,
}

impl ClusterAssignment {
    pub fn indices_for(&self, cluster: usize) -> &[u32] {
        match self.entries.get(cluster) {
            Some(&(offset, count)) => {
                &self.indices[offset as usize..(offset + count) as usize]
            }
            None => &[],
        }
    }
}

/// Sequential version of the assignment kernel. Each cluster keeps at most
/// `cap` items, in item order.
pub fn assign_reference<T>(
    aabbs: &[Aabb],
    items: &[T],
    cap: u32,
    touches: impl Fn(&T, &Aabb) -> bool,
) -> ClusterAssignment {
    let mut out = ClusterAssignment::default();
    for aabb in aabbs {
        let offset = out.indices.len() as u32;
        let mut count = 0;
        for (i, item) in items.iter().enumerate() {
            if count >= cap {
                break;
            }
            if touches(item, aabb) {
                out.indices.push(i as u32);
                count += 1;
            }
        }
        out.entries.push((offset, count));
    }
    out
}

/// GPU buffers of one cluster configuration.
pub struct ClusterBuffers {
    pub build_params: wgpu::Buffer,
    pub light_params: wgpu::Buffer,
    pub decal_params: wgpu::Buffer,
    /// `2 × total` `vec4<f32>`: min, max.
    pub aabbs: wgpu::Buffer,
    pub light_grid: wgpu::Buffer,
    pub light_indices: wgpu::Buffer,
    pub decal_grid: wgpu::Buffer,
    pub decal_indices: wgpu::Buffer,
    light_readback: wgpu::Buffer,
    decal_readback: wgpu::Buffer,
    grid_size: u64,
}

impl ClusterBuffers {
    pub fn new(device: &wgpu::Device, config: &ClusterConfig) -> Self {
        // Zero clusters still allocate one entry so bind groups stay valid.
        let total = config.dims.total().max(1) as u64;
        let grid_size = GRID_HEADER_BYTES + total * 8;

        let uniform = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: std::mem::size_of::<ClusterParams>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let storage = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let readback = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: grid_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            build_params: uniform("cluster-build-params"),
            light_params: uniform("cluster-light-params"),
            decal_params: uniform("cluster-decal-params"),
            aabbs: storage("cluster-aabbs", total * 32),
            light_grid: storage("cluster-light-grid", grid_size),
            light_indices: storage(
                "cluster-light-indices",
                total * config.max_lights_per_cluster as u64 * 4,
            ),
            decal_grid: storage("cluster-decal-grid", grid_size),
            decal_indices: storage(
                "cluster-decal-indices",
                total * config.max_decals_per_cluster as u64 * 4,
            ),
            light_readback: readback("cluster-light-grid-readback"),
            decal_readback: readback("cluster-decal-grid-readback"),
            grid_size,
        }
    }

    /// Queue copies of both grids into the mappable read-back buffers.
    pub fn copy_grids_for_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.light_grid, 0, &self.light_readback, 0, self.grid_size);
        encoder.copy_buffer_to_buffer(&self.decal_grid, 0, &self.decal_readback, 0, self.grid_size);
    }

    /// Block until the copied grids are readable and decode them.
    pub fn read_grids(&self, device: &wgpu::Device) -> Result<(GridReadback, GridReadback), RenderError> {
        let lights = read_grid(device, &self.light_readback)?;
        let decals = read_grid(device, &self.decal_readback)?;
        Ok((lights, decals))
    }
}

/// Decoded contents of a light or decal grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridReadback {
    pub total_indices: u32,
    pub counts: Vec<u32>,
}

impl GridReadback {
    /// Decode the raw grid layout: header then `(offset, count)` pairs.
    pub fn from_words(words: &[u32]) -> Self {
        let header = (GRID_HEADER_BYTES / 4) as usize;
        let total_indices = words.first().copied().unwrap_or(0);
        let counts = words
            .get(header..)
            .unwrap_or(&[])
            .chunks_exact(2)
            .map(|entry| entry[1])
            .collect();
        Self {
            total_indices,
            counts,
        }
    }
}

fn read_grid(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<GridReadback, RenderError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });
    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(RenderError::Readback(e.to_string())),
        Err(e) => return Err(RenderError::Readback(e.to_string())),
    }
    let data = slice.get_mapped_range();
    let readback = GridReadback::from_words(bytemuck::cast_slice(&data));
    drop(data);
    buffer.unmap();
    Ok(readback)
}

/// Cluster configuration plus the per-cluster counts from the last frame.
///
/// CPU state is always present; GPU buffers are created on demand and dropped
/// whenever the configuration changes.
pub struct ClusterVolume {
    config: ClusterConfig,
    light_counts: Vec<u32>,
    decal_counts: Vec<u32>,
    total_light_indices: u32,
    total_decal_indices: u32,
    buffers: Option<ClusterBuffers>,
}

impl ClusterVolume {
    pub fn new(config: ClusterConfig) -> Self {
        let config = config.sanitized();
        let total = config.dims.total() as usize;
        Self {
            config,
            light_counts: vec![0; total],
            decal_counts: vec![0; total],
            total_light_indices: 0,
            total_decal_indices: 0,
            buffers: None,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn dims(&self) -> ClusterDims {
        self.config.dims
    }

    pub fn total_clusters(&self) -> u32 {
        self.config.dims.total()
    }

    /// Change the grid dimensions. Counts reset and buffers are reallocated
    /// on next use.
    pub fn configure(&mut self, dims: ClusterDims) {
        self.reconfigure(ClusterConfig {
            dims,
            ..self.config
        });
    }

    pub fn reconfigure(&mut self, config: ClusterConfig) {
        let config = config.sanitized();
        if config == self.config && self.light_counts.len() == config.dims.total() as usize {
            return;
        }
        log::info!("Cluster grid configured: {} ({} clusters)", config.dims, config.dims.total());
        *self = Self::new(config);
    }

    /// Lights per cluster from the last read-back, one entry per cluster.
    pub fn light_assignment_count(&self) -> &[u32] {
        &self.light_counts
    }

    pub fn decal_assignment_count(&self) -> &[u32] {
        &self.decal_counts
    }

    pub fn total_light_indices(&self) -> u32 {
        self.total_light_indices
    }

    pub fn total_decal_indices(&self) -> u32 {
        self.total_decal_indices
    }

    pub fn buffers(&self) -> Option<&ClusterBuffers> {
        self.buffers.as_ref()
    }

    pub fn ensure_buffers(&mut self, device: &wgpu::Device) -> &ClusterBuffers {
        let config = self.config;
        self.buffers
            .get_or_insert_with(|| ClusterBuffers::new(device, &config))
    }

    /// Store read-back results. Short reads leave the tail at zero.
    pub fn apply_readback(&mut self, lights: &GridReadback, decals: &GridReadback) {
        fill_counts(&mut self.light_counts, &lights.counts);
        fill_counts(&mut self.decal_counts, &decals.counts);
        self.total_light_indices = lights.total_indices;
        self.total_decal_indices = decals.total_indices;
    }

    /// Current AABBs on the CPU, for debug drawing.
    pub fn cpu_aabbs(&self, view_proj: Mat4, camera_near: f32, camera_far: f32) -> Vec<Aabb> {
        compute_aabbs(&self.config, view_proj.inverse(), camera_near, camera_far)
    }
}

fn fill_counts(dst: &mut [u32], src: &[u32]) {
    for (i, slot) in dst.iter_mut().enumerate() {
        *slot = src.get(i).copied().unwrap_or(0);
    }
}
