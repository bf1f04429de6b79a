//! Fixed-size dense chunk storage and chunk coordinates.
//!
//! A [`Chunk`] holds `16³` cells in `z-major` order and keeps a running count
//! of active cells, so "does this chunk still hold anything" is O(1).
//! Local accessors are bounds-checked: reads outside `[0, 16)` return the
//! default cell, writes outside are ignored with a warning.

use glam::IVec3;

/// Edge length of a chunk, in cells.
pub const CHUNK_SIZE: i32 = 16;

/// Number of cells in a chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// A value that can be stored in a grid cell.
///
/// The default value must be inactive; it is what reads of missing chunks
/// return.
pub trait GridCell: Clone + Default {
    /// Whether this cell counts as occupied.
    fn is_active(&self) -> bool;
}

impl GridCell for bool {
    fn is_active(&self) -> bool {
        *self
    }
}

impl GridCell for u8 {
    fn is_active(&self) -> bool {
        *self != 0
    }
}

/// Identifies a chunk by its integer chunk-grid position.
///
/// Chunk `c` covers cells `c * 16 ..= c * 16 + 15` on every axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing the given cell, using floor division so that
    /// negative cells map to negative chunks (`-1 -> -1`, `-16 -> -1`,
    /// `-17 -> -2`).
    pub fn from_cell(cell: IVec3) -> Self {
        Self {
            x: cell.x.div_euclid(CHUNK_SIZE),
            y: cell.y.div_euclid(CHUNK_SIZE),
            z: cell.z.div_euclid(CHUNK_SIZE),
        }
    }

    /// Neighbouring chunk offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Grid coordinate of the chunk's `(0, 0, 0)` cell.
    pub fn origin_cell(self) -> IVec3 {
        self.as_ivec3() * CHUNK_SIZE
    }

    pub fn as_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for ChunkCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Local cell position inside a chunk. Components lie in `[0, 16)`.
pub fn local_of(cell: IVec3) -> IVec3 {
    IVec3::new(
        cell.x.rem_euclid(CHUNK_SIZE),
        cell.y.rem_euclid(CHUNK_SIZE),
        cell.z.rem_euclid(CHUNK_SIZE),
    )
}

/// Dense `16³` block of cells.
#[derive(Clone, Debug)]
pub struct Chunk<T> {
    coord: ChunkCoord,
    cells: Vec<T>,
    active_cells: u32,
}

impl<T: GridCell> Chunk<T> {
    /// Creates a chunk filled with default (inactive) cells.
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            cells: vec![T::default(); CHUNK_VOLUME],
            active_cells: 0,
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Linear index `z * 256 + y * 16 + x`, or `None` when out of range.
    pub fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        if Self::in_bounds(x, y, z) {
            Some((z * CHUNK_SIZE * CHUNK_SIZE + y * CHUNK_SIZE + x) as usize)
        } else {
            None
        }
    }

    /// Inverse of [`Chunk::index`].
    pub fn position_of(index: usize) -> IVec3 {
        let i = index as i32;
        IVec3::new(
            i % CHUNK_SIZE,
            (i / CHUNK_SIZE) % CHUNK_SIZE,
            i / (CHUNK_SIZE * CHUNK_SIZE),
        )
    }

    /// Cell at a local position, or `None` when out of range.
    pub fn get(&self, x: i32, y: i32, z: i32) -> Option<&T> {
        Self::index(x, y, z).map(|i| &self.cells[i])
    }

    /// Cell at a local position; out-of-range reads return the default cell.
    pub fn cell(&self, x: i32, y: i32, z: i32) -> T {
        match self.get(x, y, z) {
            Some(cell) => cell.clone(),
            None => {
                tracing::warn!("Chunk::cell out of bounds: ({}, {}, {})", x, y, z);
                T::default()
            }
        }
    }

    /// Writes a cell at a local position.
    ///
    /// Returns `false` (with a warning log) when the position is out of range.
    pub fn set(&mut self, x: i32, y: i32, z: i32, value: T) -> bool {
        let Some(i) = Self::index(x, y, z) else {
            tracing::warn!("Chunk::set out of bounds: ({}, {}, {})", x, y, z);
            return false;
        };

        let was_active = self.cells[i].is_active();
        let now_active = value.is_active();
        match (was_active, now_active) {
            (false, true) => self.active_cells += 1,
            (true, false) => self.active_cells -= 1,
            _ => {}
        }
        self.cells[i] = value;
        true
    }

    pub fn is_cell_active(&self, x: i32, y: i32, z: i32) -> bool {
        self.get(x, y, z).is_some_and(GridCell::is_active)
    }

    /// True iff at least one cell is active.
    pub fn is_active(&self) -> bool {
        self.active_cells > 0
    }

    pub fn active_cell_count(&self) -> u32 {
        self.active_cells
    }

    /// All cells with their local positions, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (IVec3, &T)> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, cell)| (Self::position_of(i), cell))
    }

    /// Active cells with their local positions, in index order.
    pub fn iter_active(&self) -> impl Iterator<Item = (IVec3, &T)> {
        self.iter().filter(|(_, cell)| cell.is_active())
    }

    fn in_bounds(x: i32, y: i32, z: i32) -> bool {
        (0..CHUNK_SIZE).contains(&x) && (0..CHUNK_SIZE).contains(&y) && (0..CHUNK_SIZE).contains(&z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_floor_division() {
        assert_eq!(ChunkCoord::from_cell(IVec3::new(0, 15, 16)), ChunkCoord::new(0, 0, 1));
        assert_eq!(ChunkCoord::from_cell(IVec3::new(-1, -16, -17)), ChunkCoord::new(-1, -1, -2));
    }

    #[test]
    fn test_local_of_wraps_negative_cells() {
        assert_eq!(local_of(IVec3::new(-1, 16, 5)), IVec3::new(15, 0, 5));
        let cell = IVec3::new(-37, 8, 100);
        let chunk = ChunkCoord::from_cell(cell);
        assert_eq!(chunk.origin_cell() + local_of(cell), cell);
    }

    #[test]
    fn test_index_layout_is_z_major() {
        assert_eq!(Chunk::<bool>::index(0, 0, 0), Some(0));
        assert_eq!(Chunk::<bool>::index(1, 0, 0), Some(1));
        assert_eq!(Chunk::<bool>::index(0, 1, 0), Some(16));
        assert_eq!(Chunk::<bool>::index(0, 0, 1), Some(256));
        assert_eq!(Chunk::<bool>::index(15, 15, 15), Some(CHUNK_VOLUME - 1));
        assert_eq!(Chunk::<bool>::index(16, 0, 0), None);
        assert_eq!(Chunk::<bool>::index(0, -1, 0), None);
    }

    #[test]
    fn test_index_position_inverse() {
        for i in [0, 1, 17, 255, 256, 1000, CHUNK_VOLUME - 1] {
            let p = Chunk::<bool>::position_of(i);
            assert_eq!(Chunk::<bool>::index(p.x, p.y, p.z), Some(i));
        }
    }

    #[test]
    fn test_active_count_tracks_toggles() {
        let mut chunk = Chunk::<bool>::new(ChunkCoord::ORIGIN);
        assert!(!chunk.is_active());
        chunk.set(1, 2, 3, true);
        chunk.set(1, 2, 3, true);
        assert_eq!(chunk.active_cell_count(), 1);
        chunk.set(4, 4, 4, true);
        chunk.set(1, 2, 3, false);
        assert_eq!(chunk.active_cell_count(), 1);
        chunk.set(4, 4, 4, false);
        assert!(!chunk.is_active());
    }

    #[test]
    fn test_out_of_range_access_is_guarded() {
        let mut chunk = Chunk::<u8>::new(ChunkCoord::ORIGIN);
        assert!(!chunk.set(16, 0, 0, 7));
        assert_eq!(chunk.cell(-1, 0, 0), 0);
        assert!(!chunk.is_cell_active(0, 99, 0));
        assert_eq!(chunk.active_cell_count(), 0);
    }

    #[test]
    fn test_iter_active_reports_local_positions() {
        let mut chunk = Chunk::<u8>::new(ChunkCoord::new(2, 0, 0));
        chunk.set(3, 4, 5, 9);
        let active: Vec<_> = chunk.iter_active().map(|(p, v)| (p, *v)).collect();
        assert_eq!(active, vec![(IVec3::new(3, 4, 5), 9)]);
        assert_eq!(chunk.iter().count(), CHUNK_VOLUME);
    }
}
