//! Coloured voxel cubes and the grid specialisation that stores them.

use glam::{IVec3, Mat4, Vec3, Vec4Swizzles};

use crate::chunk::{CHUNK_SIZE, Chunk, ChunkCoord, GridCell};
use crate::events::GridSubscription;
use crate::grid::Grid;

/// Grey used for the initial floor.
pub const FLOOR_COLOR: Vec3 = Vec3::splat(0.9);

/// A single voxel cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cube {
    /// World-space position of the cube center.
    pub position: Vec3,
    pub color: Vec3,
    pub active: bool,
}

impl Default for Cube {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            active: false,
        }
    }
}

impl Cube {
    /// An inactive cube. Set `active` or use [`Cube::solid`] to place it.
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            active: false,
        }
    }

    pub fn solid(position: Vec3, color: Vec3) -> Self {
        Self {
            position,
            color,
            active: true,
        }
    }
}

impl GridCell for Cube {
    fn is_active(&self) -> bool {
        self.active
    }
}

/// Sparse grid of [`Cube`]s.
#[derive(Debug)]
pub struct CubeGrid {
    grid: Grid<Cube>,
}

impl CubeGrid {
    /// Creates a grid holding a `size × size` floor of active cubes at
    /// `y = 0`, covering `x, z ∈ [-size/2, size/2)`.
    pub fn new(size: i32, spacing: f32) -> Self {
        let mut cube_grid = Self::empty(spacing);
        cube_grid.create_initial_floor(size);
        cube_grid
    }

    /// Creates a grid with only the empty origin chunk.
    pub fn empty(spacing: f32) -> Self {
        Self {
            grid: Grid::new(spacing),
        }
    }

    fn create_initial_floor(&mut self, size: i32) {
        let half = size / 2;
        for x in -half..size - half {
            for z in -half..size - half {
                self.place_cube(x, 0, z, FLOOR_COLOR);
            }
        }
        self.grid
            .set_bounds(IVec3::new(-half, 0, -half), IVec3::new(half, 0, half));
        tracing::debug!(
            "created {}x{} floor ({} cubes in {} chunks)",
            size,
            size,
            self.total_active_cube_count(),
            self.active_chunk_count()
        );
    }

    // ---- Cube access ----

    pub fn set_cube(&mut self, x: i32, y: i32, z: i32, cube: Cube) {
        self.grid.set_cell(x, y, z, cube);
    }

    /// Writes an active cube positioned at the cell's world position.
    pub fn place_cube(&mut self, x: i32, y: i32, z: i32, color: Vec3) {
        let position = self.grid.grid_to_world(x, y, z);
        self.grid.set_cell(x, y, z, Cube::solid(position, color));
    }

    /// Clears a cell, evicting its chunk if it was the last active cube.
    pub fn remove_cube(&mut self, x: i32, y: i32, z: i32) {
        self.grid.set_cell(x, y, z, Cube::default());
    }

    /// Cube at a grid coordinate; inactive default when absent.
    pub fn cube(&self, x: i32, y: i32, z: i32) -> Cube {
        self.grid.cell(x, y, z)
    }

    pub fn is_cube_active(&self, x: i32, y: i32, z: i32) -> bool {
        self.grid.is_cell_active(x, y, z)
    }

    // ---- Grid passthrough ----

    pub fn min_bounds(&self) -> IVec3 {
        self.grid.min_bounds()
    }

    pub fn max_bounds(&self) -> IVec3 {
        self.grid.max_bounds()
    }

    pub fn spacing(&self) -> f32 {
        self.grid.spacing()
    }

    pub fn update_loaded_chunks(&mut self, center: IVec3, view_distance: i32) {
        self.grid.update_loaded_chunks(center, view_distance);
    }

    pub fn active_chunk_count(&self) -> usize {
        self.grid.active_chunk_count()
    }

    pub fn total_active_cube_count(&self) -> usize {
        self.grid.total_active_cell_count()
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk<Cube>> {
        self.grid.chunk(coord)
    }

    pub fn chunks(&self) -> impl Iterator<Item = (&ChunkCoord, &Chunk<Cube>)> {
        self.grid.chunks()
    }

    pub fn subscribe(&mut self) -> GridSubscription {
        self.grid.subscribe()
    }

    pub fn clear(&mut self) {
        self.grid.clear();
    }

    pub fn grid(&self) -> &Grid<Cube> {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid<Cube> {
        &mut self.grid
    }

    // ---- Queries ----

    /// Active cubes whose stored position lies within `radius` of `center`.
    ///
    /// Chunks whose cell range cannot touch the sphere are skipped before
    /// any cell is visited.
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<Cube> {
        let spacing = self.grid.spacing();
        let radius_sq = radius * radius;
        let mut out = Vec::new();

        for (coord, chunk) in self.grid.chunks() {
            if !chunk.is_active() {
                continue;
            }
            let chunk_min = coord.origin_cell().as_vec3() * spacing;
            let chunk_max = (coord.origin_cell() + IVec3::splat(CHUNK_SIZE - 1)).as_vec3() * spacing;
            let closest = center.clamp(chunk_min, chunk_max);
            if closest.distance_squared(center) > radius_sq {
                continue;
            }

            out.extend(
                chunk
                    .iter_active()
                    .filter(|(_, cube)| cube.position.distance_squared(center) <= radius_sq)
                    .map(|(_, cube)| *cube),
            );
        }
        out
    }

    /// Active cubes inside the world-space box.
    pub fn query_box(&self, min: Vec3, max: Vec3) -> Vec<Cube> {
        self.grid
            .query_box(min, max)
            .into_iter()
            .map(|(_, cube)| cube)
            .collect()
    }

    /// Active cubes whose position lands inside clip space for the given
    /// view-projection (wgpu depth convention, `0 <= z <= w`).
    pub fn visible_cubes_in_frustum(&self, view_proj: &Mat4) -> Vec<Cube> {
        let mut out = Vec::new();
        self.grid.for_each_active_cell(|_, cube| {
            let clip = *view_proj * cube.position.extend(1.0);
            let w = clip.w;
            if w <= 0.0 {
                return;
            }
            let xy = clip.xy().abs();
            if xy.x <= w && xy.y <= w && clip.z >= 0.0 && clip.z <= w {
                out.push(*cube);
            }
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cube_is_inactive_white() {
        let cube = Cube::default();
        assert!(!cube.active);
        assert_eq!(cube.color, Vec3::ONE);
        assert!(!Cube::new(Vec3::ONE, Vec3::X).active);
    }

    #[test]
    fn test_initial_floor() {
        let grid = CubeGrid::new(4, 1.0);
        assert_eq!(grid.total_active_cube_count(), 16);
        // Floor division puts x,z = -2..-1 into chunk -1, so the 4x4 floor
        // touches the four chunks around the origin.
        assert_eq!(grid.active_chunk_count(), 4);
        assert!(grid.is_cube_active(-2, 0, -2));
        assert!(grid.is_cube_active(1, 0, 1));
        assert!(!grid.is_cube_active(2, 0, 0));
        assert!(!grid.is_cube_active(0, 1, 0));
        assert_eq!(grid.cube(-1, 0, 1).color, FLOOR_COLOR);
        assert_eq!(grid.min_bounds(), IVec3::new(-2, 0, -2));
        assert_eq!(grid.max_bounds(), IVec3::new(2, 0, 2));
    }

    #[test]
    fn test_floor_positions_follow_spacing() {
        let grid = CubeGrid::new(2, 2.0);
        assert_eq!(grid.cube(-1, 0, 0).position, Vec3::new(-2.0, 0.0, 0.0));
    }

    #[test]
    fn test_cube_round_trip() {
        let mut grid = CubeGrid::empty(1.0);
        let cube = Cube::solid(Vec3::new(3.0, 4.0, 5.0), Vec3::new(0.1, 0.2, 0.3));
        grid.set_cube(3, 4, 5, cube);
        assert_eq!(grid.cube(3, 4, 5), cube);
        assert!(grid.is_cube_active(3, 4, 5));

        let inactive = Cube::new(Vec3::ZERO, Vec3::X);
        grid.set_cube(3, 4, 6, inactive);
        assert!(!grid.is_cube_active(3, 4, 6));
    }

    #[test]
    fn test_removing_last_cube_evicts_chunk() {
        let mut grid = CubeGrid::empty(1.0);
        grid.place_cube(40, 0, 0, Vec3::ONE);
        let coord = ChunkCoord::new(2, 0, 0);
        assert!(grid.chunk(coord).is_some());
        grid.remove_cube(40, 0, 0);
        assert!(grid.chunk(coord).is_none());
    }

    #[test]
    fn test_query_sphere_skips_far_chunks() {
        let mut grid = CubeGrid::new(4, 1.0);
        grid.place_cube(100, 0, 0, Vec3::X);
        let hits = grid.query_sphere(Vec3::ZERO, 1.0);
        // (0,0,0), (±1,0,0), (0,0,±1)
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|c| c.position.length() <= 1.0));
        assert_eq!(grid.query_sphere(Vec3::new(100.0, 0.0, 0.0), 0.5).len(), 1);
    }

    #[test]
    fn test_query_box() {
        let grid = CubeGrid::new(4, 1.0);
        let hits = grid.query_box(Vec3::new(-2.0, -1.0, -2.0), Vec3::new(-1.0, 1.0, 1.0));
        assert_eq!(hits.len(), 8);
    }

    #[test]
    fn test_visible_cubes_in_frustum() {
        let mut grid = CubeGrid::empty(1.0);
        grid.place_cube(0, 0, -10, Vec3::ONE);
        grid.place_cube(0, 0, 10, Vec3::ONE);
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let visible = grid.visible_cubes_in_frustum(&(proj * view));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].position, Vec3::new(0.0, 0.0, -10.0));
    }
}
