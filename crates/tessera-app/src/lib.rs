//! Headless driver for the clustered voxel renderer.
//!
//! Loads configuration, brings up a GPU device without a window, builds the
//! demo scene and renders a fixed number of frames.

pub mod scene;
pub mod settings;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tessera_config::{CliArgs, Config, ConfigError, default_config_dir};
use tessera_render::{
    ClusteredLightingPipeline, DebugLineStage, FrameStats, GpuContextError, RenderError,
    VoxelRenderStats, VoxelStage, init_headless_blocking,
};

/// Simulated time between frames, in seconds.
const FRAME_DT: f32 = 1.0 / 60.0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] GpuContextError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Statistics of one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame: FrameStats,
    pub voxels: VoxelRenderStats,
}

/// `--config` if given, otherwise the platform default.
pub fn config_dir(args: &CliArgs) -> PathBuf {
    args.config.clone().unwrap_or_else(default_config_dir)
}

/// Load or create `config.ron` in `dir` and layer the CLI overrides on top.
/// Overrides are not written back.
pub fn load_config(dir: &Path, args: &CliArgs) -> Result<Config, AppError> {
    let mut config = Config::load_or_create(dir)?;
    config.apply_cli_overrides(args);
    Ok(config)
}

/// Render `frames` frames of the demo scene and return their statistics.
pub fn run(config: &Config, frames: u32) -> Result<Vec<FrameReport>, AppError> {
    let gpu = init_headless_blocking()?;
    tracing::info!("Rendering {frames} frame(s) on {}", gpu.adapter_name());

    let mut pipeline =
        ClusteredLightingPipeline::new(&gpu.device, &gpu.queue, settings::pipeline_settings(config))?;

    let grid = Rc::new(RefCell::new(scene::build_grid(&config.grid)));
    let voxel_stage = VoxelStage::new(Rc::clone(&grid), settings::voxel_settings(config));
    let voxel_stats = voxel_stage.stats_handle();
    pipeline.add_render_stage(Box::new(voxel_stage))?;
    pipeline.add_render_stage(Box::new(DebugLineStage::new(pipeline.line_batch())))?;

    scene::populate_lights(&mut pipeline, &config.grid);

    let aspect_ratio = config.window.width.max(1) as f32 / config.window.height.max(1) as f32;
    let mut reports = Vec::with_capacity(frames as usize);
    for frame in 0..frames {
        let camera = scene::orbit_camera(&config.grid, frame, aspect_ratio);
        {
            let mut grid = grid.borrow_mut();
            let center = scene::camera_cell(&grid, &camera);
            grid.update_loaded_chunks(center, config.grid.view_distance);
        }

        pipeline.update(FRAME_DT);
        let stats = pipeline.render(&camera);
        let voxels = voxel_stats.get();
        tracing::info!(
            frame = stats.frame,
            clusters = stats.clusters,
            lights = stats.lights,
            decals = stats.decals,
            light_indices = stats.total_light_indices,
            visible_chunks = voxels.visible_chunks,
            visible_cubes = voxels.visible_cubes,
            "frame rendered"
        );
        reports.push(FrameReport { frame: stats, voxels });
    }
    Ok(reports)
}
