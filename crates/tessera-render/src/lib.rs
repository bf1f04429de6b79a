//! wgpu clustered shading for voxel scenes: cluster build and light/decal
//! binning compute passes, per-chunk instanced voxel drawing, render stages,
//! post-processing and the pixel-art pass.

pub mod buffer;
pub mod camera;
pub mod cluster;
pub mod cluster_pass;
pub mod debug;
pub mod error;
pub mod gpu;
pub mod material;
pub mod pipeline;
pub mod pixel_art;
pub mod post;
pub mod stage;
pub mod target;
pub mod texture;
pub mod voxel_object;

pub use buffer::{
    BufferAllocator, IndexData, MeshBuffer, StorageArray, VertexPositionColor, VertexPositionNormalUv,
    VoxelInstance,
};
pub use camera::{Camera, CameraUniform, Projection};
pub use cluster::{ClusterConfig, ClusterDims, ClusterVolume, GridReadback};
pub use cluster_pass::{ClusterBindings, ClusterBuildResult, ClusterPasses, DecalAssignment, LightAssignment};
pub use debug::LineBatch;
pub use error::RenderError;
pub use gpu::{GpuContext, GpuContextError, init_headless_blocking};
pub use material::{Material, MaterialUniform};
pub use pipeline::{ClusteredLightingPipeline, FramePhase, FrameStats, PipelineSettings};
pub use pixel_art::{PaletteGeneration, PixelArtPass, PixelArtSettings, generate_palette};
pub use post::{BlitPass, PostContext, PostProcessor};
pub use stage::{DebugLineStage, FrameContext, RenderStage, StageInit, VoxelStage};
pub use target::RenderTarget;
pub use texture::{PixelTexture, load_texture_rgba8};
pub use voxel_object::{VoxelRenderObject, VoxelRenderSettings, VoxelRenderStats};
