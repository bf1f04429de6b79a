//! Sparse chunked voxel storage: generic [`Grid`], the colored-cube
//! specialization [`CubeGrid`], and the chunk-change notification channel
//! consumed by renderers.

pub mod chunk;
pub mod cube;
pub mod events;
pub mod grid;
pub mod kind;

pub use chunk::{CHUNK_SIZE, CHUNK_VOLUME, Chunk, ChunkCoord, GridCell};
pub use cube::{Cube, CubeGrid};
pub use events::{GridEvent, GridEventBus, GridSubscription};
pub use grid::{Grid, MAX_VIEW_DISTANCE};
pub use kind::{GridAccess, GridKind};
