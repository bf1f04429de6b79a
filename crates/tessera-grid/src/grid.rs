//! Generic sparse grid built from lazily allocated chunks.
//!
//! The [`Grid`] is the single owner of its chunks. A chunk exists while it
//! holds at least one active cell; writing the last inactive value into a
//! chunk evicts it. Chunks created by [`Grid::update_loaded_chunks`] or by
//! the constructor may exist empty until the next write or eviction pass.

use glam::{IVec3, Vec3};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunk::{CHUNK_SIZE, Chunk, ChunkCoord, GridCell, local_of};
use crate::events::{GridEvent, GridEventBus, GridSubscription};

/// Largest chunk radius [`Grid::update_loaded_chunks`] walks.
pub const MAX_VIEW_DISTANCE: i32 = 64;

/// Largest per-axis cell reach of a radius query.
const MAX_CELL_REACH: i32 = i32::MAX / 4;

/// Sparse 3D grid of `T` cells keyed by integer grid coordinate.
#[derive(Debug)]
pub struct Grid<T> {
    spacing: f32,
    chunks: FxHashMap<ChunkCoord, Chunk<T>>,
    min_bounds: IVec3,
    max_bounds: IVec3,
    events: GridEventBus,
}

impl<T: GridCell> Grid<T> {
    /// Creates a grid with the given world-space cell spacing and an empty
    /// chunk at the origin.
    pub fn new(spacing: f32) -> Self {
        let mut grid = Self {
            spacing,
            chunks: FxHashMap::default(),
            min_bounds: IVec3::ZERO,
            max_bounds: IVec3::ZERO,
            events: GridEventBus::new(),
        };
        grid.get_or_create_chunk(ChunkCoord::ORIGIN);
        grid
    }

    pub fn spacing(&self) -> f32 {
        self.spacing
    }

    /// Drops every chunk and resets the bounds to the origin.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.min_bounds = IVec3::ZERO;
        self.max_bounds = IVec3::ZERO;
        self.events.publish(GridEvent::Cleared);
    }

    // ---- Cell access ----

    /// Writes a cell, creating its chunk on demand.
    ///
    /// Active values grow the bounds. If the chunk ends up with no active
    /// cell it is unloaded.
    pub fn set_cell(&mut self, x: i32, y: i32, z: i32, value: T) {
        let cell = IVec3::new(x, y, z);
        let coord = ChunkCoord::from_cell(cell);
        let active = value.is_active();

        // Clearing a cell of a chunk that does not exist changes nothing.
        if !active && !self.chunks.contains_key(&coord) {
            return;
        }

        let local = local_of(cell);
        let chunk = self.get_or_create_chunk(coord);
        chunk.set(local.x, local.y, local.z, value);
        let chunk_still_active = chunk.is_active();

        if active {
            self.expand_bounds(cell);
        }
        self.events.publish(GridEvent::ChunkChanged(coord));

        if !chunk_still_active {
            self.unload_chunk(coord);
        }
    }

    /// Cell value, or the default (inactive) value if its chunk does not exist.
    pub fn cell(&self, x: i32, y: i32, z: i32) -> T {
        self.get_cell(x, y, z).cloned().unwrap_or_default()
    }

    /// Borrow a cell if its chunk exists.
    pub fn get_cell(&self, x: i32, y: i32, z: i32) -> Option<&T> {
        let cell = IVec3::new(x, y, z);
        let local = local_of(cell);
        self.chunks
            .get(&ChunkCoord::from_cell(cell))
            .and_then(|chunk| chunk.get(local.x, local.y, local.z))
    }

    pub fn is_cell_active(&self, x: i32, y: i32, z: i32) -> bool {
        self.get_cell(x, y, z).is_some_and(GridCell::is_active)
    }

    // ---- Chunk management ----

    pub fn get_or_create_chunk(&mut self, coord: ChunkCoord) -> &mut Chunk<T> {
        self.chunks
            .entry(coord)
            .or_insert_with(|| Chunk::new(coord))
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk<T>> {
        self.chunks.get(&coord)
    }

    pub fn contains_chunk(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Iterates all loaded chunks, in map order.
    pub fn chunks(&self) -> impl Iterator<Item = (&ChunkCoord, &Chunk<T>)> {
        self.chunks.iter()
    }

    /// Removes a chunk and notifies subscribers. Returns the removed chunk.
    pub fn unload_chunk(&mut self, coord: ChunkCoord) -> Option<Chunk<T>> {
        let removed = self.chunks.remove(&coord);
        if removed.is_some() {
            self.events.publish(GridEvent::ChunkRemoved(coord));
        }
        removed
    }

    /// Number of loaded chunks, empty ones included.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of chunks holding at least one active cell.
    pub fn active_chunk_count(&self) -> usize {
        self.chunks.values().filter(|c| c.is_active()).count()
    }

    pub fn total_active_cell_count(&self) -> usize {
        self.chunks
            .values()
            .map(|c| c.active_cell_count() as usize)
            .sum()
    }

    /// Keeps the chunk neighbourhood around `center` (a grid coordinate)
    /// loaded.
    ///
    /// Walks the cube of chunk offsets within `view_distance` and keeps those
    /// with `dx² + dy² + dz² <= view_distance²`, `view_distance` capped at
    /// [`MAX_VIEW_DISTANCE`]. The center chunk is always
    /// created. Empty chunks outside the radius are unloaded; chunks that
    /// still hold active cells are kept wherever they are, since the grid is
    /// their only owner.
    pub fn update_loaded_chunks(&mut self, center: IVec3, view_distance: i32) {
        let center_chunk = ChunkCoord::from_cell(center);
        let radius = view_distance.clamp(0, MAX_VIEW_DISTANCE);
        let radius_sq = radius * radius;

        let mut in_range = FxHashSet::default();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                for dz in -radius..=radius {
                    if dx * dx + dy * dy + dz * dz <= radius_sq {
                        in_range.insert(center_chunk.offset(dx, dy, dz));
                    }
                }
            }
        }
        self.get_or_create_chunk(center_chunk);

        let stale: Vec<ChunkCoord> = self
            .chunks
            .iter()
            .filter(|(coord, chunk)| !chunk.is_active() && !in_range.contains(coord))
            .map(|(coord, _)| *coord)
            .collect();
        for coord in &stale {
            self.unload_chunk(*coord);
        }

        tracing::debug!(
            "update_loaded_chunks around {:?}: {} loaded, {} empty chunks unloaded",
            center_chunk,
            self.chunks.len(),
            stale.len()
        );
    }

    /// Chunks whose cells could lie within `radius` of a world position.
    ///
    /// When the chunk range is larger than the set of loaded chunks, only the
    /// loaded chunks inside it are returned.
    pub fn affected_chunks(&self, world_pos: Vec3, radius: f32) -> Vec<ChunkCoord> {
        let reach = self.cell_reach(radius);
        let center = self.world_to_grid(world_pos);
        let lo = ChunkCoord::from_cell(center.saturating_sub(reach));
        let hi = ChunkCoord::from_cell(center.saturating_add(reach));

        let span = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1) as u64;
        let volume = span(lo.x, hi.x)
            .saturating_mul(span(lo.y, hi.y))
            .saturating_mul(span(lo.z, hi.z));
        if volume > self.chunks.len() as u64 {
            return self
                .chunks
                .keys()
                .filter(|c| {
                    (lo.x..=hi.x).contains(&c.x)
                        && (lo.y..=hi.y).contains(&c.y)
                        && (lo.z..=hi.z).contains(&c.z)
                })
                .copied()
                .collect();
        }

        let mut out = Vec::new();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    out.push(ChunkCoord::new(x, y, z));
                }
            }
        }
        out
    }

    // ---- Bounds ----

    /// Grows the bounds to include `pos`. Bounds never shrink on their own.
    pub fn expand_bounds(&mut self, pos: IVec3) {
        self.min_bounds = self.min_bounds.min(pos);
        self.max_bounds = self.max_bounds.max(pos);
    }

    pub fn min_bounds(&self) -> IVec3 {
        self.min_bounds
    }

    pub fn max_bounds(&self) -> IVec3 {
        self.max_bounds
    }

    pub(crate) fn set_bounds(&mut self, min: IVec3, max: IVec3) {
        self.min_bounds = min;
        self.max_bounds = max;
    }

    // ---- Coordinates ----

    pub fn grid_to_world(&self, x: i32, y: i32, z: i32) -> Vec3 {
        IVec3::new(x, y, z).as_vec3() * self.spacing
    }

    pub fn world_to_grid(&self, world: Vec3) -> IVec3 {
        (world / self.spacing).floor().as_ivec3()
    }

    /// Cells covered by `radius` along each axis, capped so that adding it to
    /// a grid coordinate cannot leave the `i32` range by more than saturation.
    fn cell_reach(&self, radius: f32) -> IVec3 {
        let cells = (radius / self.spacing).ceil();
        IVec3::splat(cells.clamp(0.0, MAX_CELL_REACH as f32) as i32)
    }

    /// World-space size of one chunk edge.
    pub fn chunk_world_size(&self) -> f32 {
        CHUNK_SIZE as f32 * self.spacing
    }

    // ---- Traversal and queries ----

    /// Visits every cell of every loaded chunk. No ordering across chunks.
    pub fn for_each_cell(&self, mut f: impl FnMut(IVec3, &T)) {
        for (coord, chunk) in &self.chunks {
            let origin = coord.origin_cell();
            for (local, cell) in chunk.iter() {
                f(origin + local, cell);
            }
        }
    }

    /// Visits every active cell. No ordering across chunks.
    pub fn for_each_active_cell(&self, mut f: impl FnMut(IVec3, &T)) {
        for (coord, chunk) in &self.chunks {
            if !chunk.is_active() {
                continue;
            }
            let origin = coord.origin_cell();
            for (local, cell) in chunk.iter_active() {
                f(origin + local, cell);
            }
        }
    }

    /// Active cells whose world position lies within `radius` of `center`.
    ///
    /// Scans the cell cube around the center, clipped to the grid bounds.
    pub fn query_sphere(&self, center: Vec3, radius: f32) -> Vec<(IVec3, T)> {
        if !(radius >= 0.0) {
            return Vec::new();
        }
        let reach = self.cell_reach(radius);
        let grid_center = self.world_to_grid(center);
        let lo = grid_center.saturating_sub(reach).max(self.min_bounds);
        let hi = grid_center.saturating_add(reach).min(self.max_bounds);
        let radius_sq = radius * radius;

        let mut out = Vec::new();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    if self.grid_to_world(x, y, z).distance_squared(center) > radius_sq {
                        continue;
                    }
                    if let Some(cell) = self.get_cell(x, y, z).filter(|c| c.is_active()) {
                        out.push((IVec3::new(x, y, z), cell.clone()));
                    }
                }
            }
        }
        out
    }

    /// Active cells whose grid coordinate falls inside the world-space box.
    pub fn query_box(&self, min: Vec3, max: Vec3) -> Vec<(IVec3, T)> {
        let lo = self.world_to_grid(min).max(self.min_bounds);
        let hi = self.world_to_grid(max).min(self.max_bounds);

        let mut out = Vec::new();
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    if let Some(cell) = self.get_cell(x, y, z).filter(|c| c.is_active()) {
                        out.push((IVec3::new(x, y, z), cell.clone()));
                    }
                }
            }
        }
        out
    }

    // ---- Events ----

    /// Subscribe to chunk-change notifications.
    pub fn subscribe(&mut self) -> GridSubscription {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_grid_has_empty_origin_chunk() {
        let grid = Grid::<bool>::new(1.0);
        assert_eq!(grid.chunk_count(), 1);
        assert!(grid.contains_chunk(ChunkCoord::ORIGIN));
        assert_eq!(grid.active_chunk_count(), 0);
    }

    #[test]
    fn test_set_and_get_round_trip() {
        let mut grid = Grid::<u8>::new(1.0);
        for (x, y, z) in [(0, 0, 0), (-1, 5, 17), (40, -33, 2)] {
            grid.set_cell(x, y, z, 3);
            assert_eq!(grid.cell(x, y, z), 3);
            assert!(grid.is_cell_active(x, y, z));
        }
        assert_eq!(grid.total_active_cell_count(), 3);
    }

    #[test]
    fn test_missing_chunk_reads_default() {
        let grid = Grid::<u8>::new(1.0);
        assert_eq!(grid.cell(1000, -1000, 5), 0);
        assert!(!grid.is_cell_active(1000, -1000, 5));
        assert!(grid.get_cell(1000, -1000, 5).is_none());
    }

    #[test]
    fn test_last_inactive_write_evicts_chunk() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.set_cell(20, 0, 0, true);
        grid.set_cell(21, 0, 0, true);
        let coord = ChunkCoord::new(1, 0, 0);
        assert!(grid.contains_chunk(coord));

        grid.set_cell(20, 0, 0, false);
        assert!(grid.contains_chunk(coord));
        grid.set_cell(21, 0, 0, false);
        assert!(!grid.contains_chunk(coord));
    }

    #[test]
    fn test_clearing_missing_chunk_is_noop() {
        let mut grid = Grid::<bool>::new(1.0);
        let sub = grid.subscribe();
        grid.set_cell(500, 0, 0, false);
        assert_eq!(grid.chunk_count(), 1);
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_bounds_only_grow() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.set_cell(5, 1, -2, true);
        assert_eq!(grid.min_bounds(), IVec3::new(0, 0, -2));
        assert_eq!(grid.max_bounds(), IVec3::new(5, 1, 0));

        grid.set_cell(-10, 9, 3, true);
        grid.set_cell(5, 1, -2, false);
        assert_eq!(grid.min_bounds(), IVec3::new(-10, 0, -2));
        assert_eq!(grid.max_bounds(), IVec3::new(5, 9, 3));
    }

    #[test]
    fn test_inactive_write_does_not_grow_bounds() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.set_cell(1, 1, 1, true);
        grid.set_cell(2, 2, 2, false);
        assert_eq!(grid.max_bounds(), IVec3::ONE);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut grid = Grid::<bool>::new(1.0);
        let sub = grid.subscribe();
        grid.set_cell(30, 30, 30, true);
        grid.clear();
        assert_eq!(grid.chunk_count(), 0);
        assert_eq!(grid.max_bounds(), IVec3::ZERO);
        assert_eq!(sub.drain().last(), Some(&GridEvent::Cleared));
    }

    #[test]
    fn test_update_loaded_chunks_creates_center_and_drops_far_empty_chunks() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.get_or_create_chunk(ChunkCoord::new(10, 0, 0));
        grid.set_cell(16 * 12, 0, 0, true);

        grid.update_loaded_chunks(IVec3::new(-40, 0, 0), 1);

        assert!(grid.contains_chunk(ChunkCoord::new(-3, 0, 0)));
        assert!(!grid.contains_chunk(ChunkCoord::new(10, 0, 0)), "far empty chunk kept");
        assert!(!grid.contains_chunk(ChunkCoord::ORIGIN), "far empty origin kept");
        assert!(grid.contains_chunk(ChunkCoord::new(12, 0, 0)), "chunk with data dropped");
    }

    #[test]
    fn test_update_loaded_chunks_keeps_empty_chunks_in_radius() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.get_or_create_chunk(ChunkCoord::new(1, 1, 0));
        grid.get_or_create_chunk(ChunkCoord::new(2, 2, 2));
        grid.update_loaded_chunks(IVec3::ZERO, 2);
        assert!(grid.contains_chunk(ChunkCoord::new(1, 1, 0)));
        // (2,2,2) is inside the cube but outside the sphere of radius 2.
        assert!(!grid.contains_chunk(ChunkCoord::new(2, 2, 2)));
    }

    #[test]
    fn test_events_follow_mutations() {
        let mut grid = Grid::<bool>::new(1.0);
        let sub = grid.subscribe();
        grid.set_cell(-1, 0, 0, true);
        grid.set_cell(-1, 0, 0, false);
        let coord = ChunkCoord::new(-1, 0, 0);
        assert_eq!(
            sub.drain(),
            vec![
                GridEvent::ChunkChanged(coord),
                GridEvent::ChunkChanged(coord),
                GridEvent::ChunkRemoved(coord),
            ]
        );
    }

    #[test]
    fn test_coordinate_conversion_uses_spacing() {
        let grid = Grid::<bool>::new(0.5);
        assert_eq!(grid.grid_to_world(2, -4, 1), Vec3::new(1.0, -2.0, 0.5));
        assert_eq!(grid.world_to_grid(Vec3::new(1.2, -0.1, 0.0)), IVec3::new(2, -1, 0));
        assert_eq!(grid.chunk_world_size(), 8.0);
    }

    #[test]
    fn test_for_each_active_cell_visits_world_coordinates() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.set_cell(-17, 3, 40, true);
        grid.set_cell(2, 2, 2, true);
        let mut seen = Vec::new();
        grid.for_each_active_cell(|pos, _| seen.push(pos));
        seen.sort_by_key(|p| (p.x, p.y, p.z));
        assert_eq!(seen, vec![IVec3::new(-17, 3, 40), IVec3::new(2, 2, 2)]);

        let mut total = 0;
        grid.for_each_cell(|_, _| total += 1);
        assert_eq!(total, grid.chunk_count() * crate::chunk::CHUNK_VOLUME);
    }

    #[test]
    fn test_queries() {
        let mut grid = Grid::<u8>::new(1.0);
        grid.set_cell(0, 0, 0, 1);
        grid.set_cell(3, 0, 0, 2);
        grid.set_cell(10, 0, 0, 3);

        let near: Vec<_> = grid.query_sphere(Vec3::ZERO, 3.5).into_iter().map(|(_, v)| v).collect();
        assert_eq!(near.len(), 2);
        assert!(near.contains(&1) && near.contains(&2));

        let boxed = grid.query_box(Vec3::new(2.0, -1.0, -1.0), Vec3::new(11.0, 1.0, 1.0));
        assert_eq!(boxed.len(), 2);
        assert!(boxed.iter().any(|(p, v)| *p == IVec3::new(10, 0, 0) && *v == 3));
    }

    #[test]
    fn test_huge_radius_queries_do_not_overflow() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.set_cell(-5, 0, 0, true);
        grid.set_cell(3, 2, 1, true);

        let hits = grid.query_sphere(Vec3::new(-5.0, 0.0, 0.0), 1.0e12);
        assert_eq!(hits.len(), 2);
        assert!(grid.query_sphere(Vec3::ZERO, f32::INFINITY).len() == 2);
        assert!(grid.query_sphere(Vec3::ZERO, -1.0).is_empty());

        let chunks = grid.affected_chunks(Vec3::new(-5.0, 0.0, 0.0), 1.0e12);
        assert_eq!(chunks.len(), grid.chunk_count());
        assert!(chunks.contains(&ChunkCoord::new(-1, 0, 0)));
    }

    #[test]
    fn test_update_loaded_chunks_caps_view_distance() {
        let mut grid = Grid::<bool>::new(1.0);
        grid.get_or_create_chunk(ChunkCoord::new(MAX_VIEW_DISTANCE + 1, 0, 0));
        grid.update_loaded_chunks(IVec3::ZERO, i32::MAX);
        assert!(grid.contains_chunk(ChunkCoord::ORIGIN));
        assert!(!grid.contains_chunk(ChunkCoord::new(MAX_VIEW_DISTANCE + 1, 0, 0)));
    }

    #[test]
    fn test_affected_chunks_cover_radius() {
        let grid = Grid::<bool>::new(1.0);
        let chunks = grid.affected_chunks(Vec3::new(15.5, 0.0, 0.0), 1.0);
        assert!(chunks.contains(&ChunkCoord::new(0, 0, 0)));
        assert!(chunks.contains(&ChunkCoord::new(1, 0, 0)));
        assert!(chunks.contains(&ChunkCoord::new(0, -1, 0)));
    }
}
