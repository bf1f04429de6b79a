//! Per-chunk instance buffers for a [`CubeGrid`].
//!
//! Each active chunk gets a [`ChunkRenderState`] holding one
//! [`VoxelInstance`] per active cube and a GPU buffer mirroring them. States
//! are rebuilt only when their chunk changes, which the render object learns
//! from the grid's event channel. Drawing is one instanced call per visible
//! chunk against a shared cube mesh.

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;
use tessera_grid::{CHUNK_SIZE, Chunk, ChunkCoord, Cube, CubeGrid, GridEvent, GridSubscription};
use tessera_math::{BoundingSphere, Frustum};

use crate::buffer::{BufferAllocator, MeshBuffer, VoxelInstance};

const INSTANCE_STRIDE: u64 = std::mem::size_of::<VoxelInstance>() as u64;

/// Culling options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoxelRenderSettings {
    pub frustum_culling: bool,
    /// Chunks whose bounding sphere lies entirely beyond this distance from
    /// the camera are skipped. `None` disables distance culling.
    pub render_distance: Option<f32>,
}

impl Default for VoxelRenderSettings {
    fn default() -> Self {
        Self {
            frustum_culling: true,
            render_distance: Some(500.0),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VoxelRenderStats {
    pub visible_chunks: usize,
    pub visible_cubes: usize,
    pub total_cubes: usize,
    pub total_chunks: usize,
    pub rebuilds_last_prepare: usize,
}

/// Conservative sphere around a chunk. Cubes are centred on their grid
/// positions, so the chunk's world box starts half a cell before its origin.
pub fn chunk_bounds(coord: ChunkCoord, spacing: f32) -> BoundingSphere {
    let cs = CHUNK_SIZE as f32 * spacing;
    let center = coord.as_ivec3().as_vec3() * cs + Vec3::splat((cs - spacing) * 0.5);
    BoundingSphere::new(center, cs * 3f32.sqrt() * 0.5)
}

/// Instance data for one cube.
pub fn cube_instance(cube: &Cube, spacing: f32) -> VoxelInstance {
    let model = Mat4::from_translation(cube.position) * Mat4::from_scale(Vec3::splat(spacing));
    VoxelInstance {
        model: model.to_cols_array_2d(),
        color: cube.color.to_array(),
    }
}

/// Render cache for one chunk.
pub struct ChunkRenderState {
    coord: ChunkCoord,
    instances: Vec<VoxelInstance>,
    buffer: Option<wgpu::Buffer>,
    capacity: usize,
    dirty: bool,
    upload_pending: bool,
    bounds: BoundingSphere,
}

impl ChunkRenderState {
    fn new(coord: ChunkCoord, spacing: f32) -> Self {
        Self {
            coord,
            instances: Vec::new(),
            buffer: None,
            capacity: 0,
            dirty: true,
            upload_pending: false,
            bounds: chunk_bounds(coord, spacing),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn instances(&self) -> &[VoxelInstance] {
        &self.instances
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len() as u32
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    /// Whether the GPU buffer holds the current instances. False between a
    /// rebuild and the next upload.
    pub fn is_drawable(&self) -> bool {
        self.buffer.is_some() && !self.upload_pending
    }

    fn rebuild(&mut self, chunk: &Chunk<Cube>, spacing: f32) {
        self.instances.clear();
        self.instances
            .extend(chunk.iter_active().map(|(_, cube)| cube_instance(cube, spacing)));
        self.bounds = chunk_bounds(self.coord, spacing);
        self.dirty = false;
        self.upload_pending = true;
    }

    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.upload_pending || self.instances.is_empty() {
            return;
        }
        if self.buffer.is_none() || self.instances.len() > self.capacity {
            self.capacity = self.instances.len().next_power_of_two();
            self.buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("voxel-chunk-instances"),
                size: self.capacity as u64 * INSTANCE_STRIDE,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if let Some(buffer) = &self.buffer {
            queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.instances));
        }
        self.upload_pending = false;
    }
}

/// Keeps chunk render states in step with a [`CubeGrid`] and draws them.
pub struct VoxelRenderObject {
    states: FxHashMap<ChunkCoord, ChunkRenderState>,
    subscription: Option<GridSubscription>,
    settings: VoxelRenderSettings,
    stats: VoxelRenderStats,
    mesh: Option<MeshBuffer>,
}

impl Default for VoxelRenderObject {
    fn default() -> Self {
        Self::new(VoxelRenderSettings::default())
    }
}

impl VoxelRenderObject {
    pub fn new(settings: VoxelRenderSettings) -> Self {
        Self {
            states: FxHashMap::default(),
            subscription: None,
            settings,
            stats: VoxelRenderStats::default(),
            mesh: None,
        }
    }

    /// Subscribe to `grid`'s chunk events. Every existing state is
    /// invalidated since earlier edits were not observed.
    pub fn attach(&mut self, grid: &mut CubeGrid) {
        self.subscription = Some(grid.subscribe());
        self.mark_all_chunks_dirty();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn settings(&self) -> &VoxelRenderSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: VoxelRenderSettings) {
        self.settings = settings;
    }

    pub fn stats(&self) -> &VoxelRenderStats {
        &self.stats
    }

    pub fn total_chunks(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, coord: ChunkCoord) -> Option<&ChunkRenderState> {
        self.states.get(&coord)
    }

    pub fn mark_chunk_dirty(&mut self, coord: ChunkCoord) {
        if let Some(state) = self.states.get_mut(&coord) {
            state.dirty = true;
        }
    }

    pub fn mark_all_chunks_dirty(&mut self) {
        for state in self.states.values_mut() {
            state.dirty = true;
        }
    }

    fn apply_events(&mut self) {
        let Some(subscription) = &self.subscription else {
            return;
        };
        for event in subscription.drain() {
            match event {
                GridEvent::ChunkChanged(coord) => {
                    if let Some(state) = self.states.get_mut(&coord) {
                        state.dirty = true;
                    }
                }
                GridEvent::ChunkRemoved(coord) => {
                    self.states.remove(&coord);
                }
                GridEvent::Cleared => self.states.clear(),
            }
        }
    }

    /// Bring the CPU side of every state up to date with `grid`. Returns the
    /// number of chunks rebuilt.
    pub fn sync(&mut self, grid: &CubeGrid) -> usize {
        self.apply_events();
        let spacing = grid.spacing();

        for (coord, chunk) in grid.chunks() {
            if chunk.is_active() {
                self.states
                    .entry(*coord)
                    .or_insert_with(|| ChunkRenderState::new(*coord, spacing));
            }
        }

        let mut rebuilds = 0;
        for state in self.states.values_mut() {
            if !state.dirty {
                continue;
            }
            if let Some(chunk) = grid.chunk(state.coord) {
                state.rebuild(chunk, spacing);
                rebuilds += 1;
            }
        }

        // Drop states whose chunk vanished or emptied.
        let before = self.states.len();
        self.states
            .retain(|coord, _| grid.chunk(*coord).is_some_and(|chunk| chunk.is_active()));
        let evicted = before - self.states.len();
        if rebuilds > 0 || evicted > 0 {
            log::trace!("Voxel sync: {rebuilds} rebuilt, {evicted} evicted");
        }

        self.stats.rebuilds_last_prepare = rebuilds;
        self.stats.total_chunks = self.states.len();
        self.stats.total_cubes = self.states.values().map(|s| s.instances.len()).sum();
        rebuilds
    }

    /// Push pending instance data to the GPU.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.mesh.is_none() {
            self.mesh = Some(BufferAllocator::new(device).create_cube_mesh());
        }
        for state in self.states.values_mut() {
            state.upload(device, queue);
        }
    }

    /// Called once per frame before [`VoxelRenderObject::render`].
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, grid: &CubeGrid) {
        self.sync(grid);
        self.upload(device, queue);
    }

    /// Distance cull against the render distance, then the frustum.
    pub fn is_chunk_visible(&self, state: &ChunkRenderState, frustum: &Frustum, camera_pos: Vec3) -> bool {
        let BoundingSphere { center, radius } = state.bounds;
        if let Some(max_distance) = self.settings.render_distance
            && center.distance(camera_pos) - radius > max_distance
        {
            return false;
        }
        !self.settings.frustum_culling || !frustum.is_sphere_outside(center, radius)
    }

    /// States that would be drawn this frame.
    pub fn visible_states(&self, frustum: &Frustum, camera_pos: Vec3) -> Vec<&ChunkRenderState> {
        self.states
            .values()
            .filter(|s| s.instance_count() > 0 && self.is_chunk_visible(s, frustum, camera_pos))
            .collect()
    }

    /// One instanced draw per visible chunk. The caller has set the pipeline
    /// and its bind groups.
    pub fn render(&mut self, pass: &mut wgpu::RenderPass<'_>, frustum: &Frustum, camera_pos: Vec3) {
        let Some(mesh) = &self.mesh else {
            log::warn!("Voxel render skipped: prepare() has not run");
            return;
        };
        mesh.bind(pass);

        let mut visible_chunks = 0;
        let mut visible_cubes = 0;
        for state in self.visible_states(frustum, camera_pos) {
            if !state.is_drawable() {
                continue;
            }
            let Some(buffer) = &state.buffer else {
                continue;
            };
            let count = state.instance_count();
            pass.set_vertex_buffer(1, buffer.slice(..count as u64 * INSTANCE_STRIDE));
            mesh.draw_instanced(pass, count);
            visible_chunks += 1;
            visible_cubes += count as usize;
        }
        self.stats.visible_chunks = visible_chunks;
        self.stats.visible_cubes = visible_cubes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::gpu::test_device;
    use glam::IVec3;

    fn frustum_looking_at_origin() -> (Frustum, Vec3) {
        let camera = Camera::looking_at(Vec3::new(0.0, 20.0, 40.0), Vec3::ZERO, 1.0);
        (
            Frustum::from_view_projection(&camera.view_projection_matrix()),
            camera.position,
        )
    }

    #[test]
    fn test_chunk_bounds() {
        let b = chunk_bounds(ChunkCoord::new(1, 0, -1), 1.0);
        assert_eq!(b.center, Vec3::new(23.5, 7.5, -8.5));
        assert!((b.radius - 16.0 * 3f32.sqrt() / 2.0).abs() < 1e-5);

        // The sphere encloses every cube of the chunk.
        for corner in [IVec3::ZERO, IVec3::splat(15)] {
            let cell = ChunkCoord::new(1, 0, -1).origin_cell() + corner;
            let p = cell.as_vec3();
            assert!(p.distance(b.center) + 3f32.sqrt() * 0.5 <= b.radius + 1e-4);
        }
    }

    #[test]
    fn test_instance_layout() {
        let cube = Cube::solid(Vec3::new(2.0, 4.0, 6.0), Vec3::new(0.1, 0.2, 0.3));
        let inst = cube_instance(&cube, 2.0);
        assert_eq!(inst.model[3], [2.0, 4.0, 6.0, 1.0]);
        assert_eq!(inst.model[0][0], 2.0);
        assert_eq!(inst.color, [0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_sync_creates_states_for_active_chunks() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        assert_eq!(object.sync(&grid), grid.active_chunk_count());
        assert_eq!(object.total_chunks(), grid.active_chunk_count());
        assert_eq!(object.stats().total_cubes, 16);
    }

    #[test]
    fn test_second_sync_rebuilds_nothing() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.sync(&grid);
        assert_eq!(object.sync(&grid), 0);
        assert_eq!(object.stats().rebuilds_last_prepare, 0);
    }

    #[test]
    fn test_grid_edit_invalidates_only_its_chunk() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.sync(&grid);

        grid.place_cube(1, 1, 1, Vec3::X);
        assert_eq!(object.sync(&grid), 1);
        let state = object.state(ChunkCoord::new(0, 0, 0)).unwrap();
        assert_eq!(state.instance_count(), 5);
    }

    #[test]
    fn test_new_chunk_appears_and_empty_chunk_is_evicted() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.sync(&grid);
        let before = object.total_chunks();

        grid.place_cube(100, 0, 100, Vec3::Y);
        object.sync(&grid);
        let far = ChunkCoord::new(6, 0, 6);
        assert!(object.state(far).is_some());
        assert_eq!(object.total_chunks(), before + 1);

        grid.remove_cube(100, 0, 100);
        object.sync(&grid);
        assert!(object.state(far).is_none());
        assert_eq!(object.total_chunks(), before);
    }

    #[test]
    fn test_clear_drops_every_state() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.sync(&grid);
        grid.clear();
        object.sync(&grid);
        assert_eq!(object.total_chunks(), 0);
        assert_eq!(object.stats().total_cubes, 0);
    }

    #[test]
    fn test_unattached_object_needs_manual_invalidation() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.sync(&grid);

        grid.place_cube(0, 3, 0, Vec3::ONE);
        assert_eq!(object.sync(&grid), 0);
        object.mark_chunk_dirty(ChunkCoord::new(0, 0, 0));
        assert_eq!(object.sync(&grid), 1);
        object.mark_all_chunks_dirty();
        assert_eq!(object.sync(&grid), object.total_chunks());
    }

    #[test]
    fn test_culling() {
        let mut grid = CubeGrid::new(4, 1.0);
        grid.place_cube(0, 0, 2000, Vec3::ONE);
        grid.place_cube(0, 0, -160, Vec3::ONE);
        let mut object = VoxelRenderObject::default();
        object.sync(&grid);
        let (frustum, eye) = frustum_looking_at_origin();

        let visible: Vec<ChunkCoord> = object
            .visible_states(&frustum, eye)
            .iter()
            .map(|s| s.coord())
            .collect();
        assert!(visible.contains(&ChunkCoord::new(0, 0, 0)));
        // Past the render distance.
        assert!(!visible.contains(&ChunkCoord::new(0, 0, 125)));
        // Within the render distance but past the far plane.
        assert!(!visible.contains(&ChunkCoord::new(0, 0, -10)));

        object.set_settings(VoxelRenderSettings {
            frustum_culling: false,
            render_distance: None,
        });
        assert_eq!(object.visible_states(&frustum, eye).len(), object.total_chunks());
    }

    #[test]
    fn test_synced_state_is_not_drawable_before_upload() {
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.sync(&grid);
        let state = object.state(ChunkCoord::new(0, 0, 0)).unwrap();
        assert!(state.instance_count() > 0);
        assert!(!state.is_drawable());

        grid.place_cube(1, 1, 1, Vec3::X);
        object.mark_chunk_dirty(ChunkCoord::new(0, 0, 0));
        object.sync(&grid);
        assert!(!object.state(ChunkCoord::new(0, 0, 0)).unwrap().is_drawable());
    }

    #[test]
    fn test_rebuild_after_upload_waits_for_next_upload() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.prepare(&device, &queue, &grid);
        let coord = ChunkCoord::new(0, 0, 0);
        assert!(object.state(coord).unwrap().is_drawable());

        // More instances than the buffer was sized for.
        for y in 1..16 {
            grid.place_cube(0, y, 0, Vec3::Z);
        }
        object.sync(&grid);
        let state = object.state(coord).unwrap();
        assert!(state.instances.len() > state.capacity);
        assert!(!state.is_drawable());

        object.upload(&device, &queue);
        let state = object.state(coord).unwrap();
        assert!(state.is_drawable());
        assert!(state.capacity >= state.instances.len());
    }

    #[test]
    fn test_prepare_uploads_instances() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut grid = CubeGrid::new(4, 1.0);
        let mut object = VoxelRenderObject::default();
        object.attach(&mut grid);
        object.prepare(&device, &queue, &grid);
        for coord in [ChunkCoord::new(0, 0, 0), ChunkCoord::new(-1, 0, -1)] {
            let state = object.state(coord).unwrap();
            assert!(state.buffer.is_some());
            assert!(!state.upload_pending);
            assert!(state.capacity >= state.instances.len());
        }
    }
}
