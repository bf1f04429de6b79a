//! Frame orchestration for clustered shading.
//!
//! A frame walks [`FramePhase`] from `Idle` through cluster build, light and
//! decal assignment, the registered render stages, and the post-processing
//! chain, recording everything into one command encoder.

use std::cell::RefCell;
use std::rc::Rc;

use tessera_lighting::{
    Arena, AtmosphereSettings, Decal, DecalGpu, Environment, Handle, Light, LightGpu, WeatherParameters,
};
use tessera_math::Frustum;

use crate::buffer::StorageArray;
use crate::camera::Camera;
use crate::cluster::{ClusterConfig, ClusterDims, ClusterVolume};
use crate::cluster_pass::{ClusterBuildResult, ClusterPasses, ShadingUniform};
use crate::debug::{CLUSTER_LINE_COLOR, LineBatch};
use crate::error::RenderError;
use crate::material::Material;
use crate::pixel_art::{PixelArtPass, PixelArtSettings};
use crate::post::{BlitPass, PostContext, PostProcessor, TargetSlot, plan_post_chain};
use crate::stage::{FrameContext, RenderStage, StageInit};
use crate::target::{RenderTarget, pixel_target_size};

/// Where a frame currently is. Each phase consumes the previous one's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    ClusterBuild,
    LightAssign,
    DecalAssign,
    StageExecution,
    PostProcess,
}

impl FramePhase {
    pub fn next(self) -> Self {
        match self {
            FramePhase::Idle => FramePhase::ClusterBuild,
            FramePhase::ClusterBuild => FramePhase::LightAssign,
            FramePhase::LightAssign => FramePhase::DecalAssign,
            FramePhase::DecalAssign => FramePhase::StageExecution,
            FramePhase::StageExecution => FramePhase::PostProcess,
            FramePhase::PostProcess => FramePhase::Idle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PostFallback {
    PixelArt,
    Blit,
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub width: u32,
    pub height: u32,
    pub color_format: wgpu::TextureFormat,
    pub clear_color: wgpu::Color,
    pub cluster: ClusterConfig,
    pub pixel_art: PixelArtSettings,
    pub post_processing: bool,
    /// Push every cluster AABB into the line batch each frame.
    pub wireframe: bool,
    /// Read the cluster grids back after each frame. Stalls on the GPU.
    pub read_back_statistics: bool,
    pub environment: Environment,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            clear_color: wgpu::Color {
                r: 0.05,
                g: 0.05,
                b: 0.08,
                a: 1.0,
            },
            cluster: ClusterConfig::default(),
            pixel_art: PixelArtSettings::default(),
            post_processing: true,
            wireframe: false,
            read_back_statistics: true,
            environment: Environment::default(),
        }
    }
}

/// What one call to [`ClusteredLightingPipeline::render`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub clusters: u32,
    pub lights: usize,
    pub decals: usize,
    pub stages_run: usize,
    pub post_processors_run: usize,
    /// From the previous read-back; zero when read-back is off.
    pub total_light_indices: u32,
    pub total_decal_indices: u32,
}

/// Advance flicker by `dt` and pack every light.
pub fn pack_lights(lights: &mut Arena<Light>, dt: f32) -> Vec<LightGpu> {
    lights
        .values_mut()
        .map(|light| {
            light.update(dt);
            light.to_gpu()
        })
        .collect()
}

pub fn pack_decals(decals: &Arena<Decal>) -> Vec<DecalGpu> {
    decals.values().map(Decal::to_gpu).collect()
}

fn slot_target(targets: [&RenderTarget; 3], slot: TargetSlot) -> &RenderTarget {
    match slot {
        TargetSlot::Main => targets[0],
        TargetSlot::Intermediate => targets[1],
        TargetSlot::Final => targets[2],
    }
}

/// Owns the cluster volume, lights, decals, targets, stages and
/// post-processors, and drives them once per [`render`](Self::render).
pub struct ClusteredLightingPipeline {
    device: wgpu::Device,
    queue: wgpu::Queue,
    settings: PipelineSettings,
    phase: FramePhase,
    frame: u64,

    passes: ClusterPasses,
    volume: ClusterVolume,

    lights: Arena<Light>,
    decals: Arena<Decal>,
    packed_lights: Vec<LightGpu>,
    packed_decals: Vec<DecalGpu>,
    light_buffer: StorageArray<LightGpu>,
    decal_buffer: StorageArray<DecalGpu>,
    /// Flicker time not yet applied to the lights.
    pending_dt: f32,
    delta_time: f32,
    environment: Environment,

    main_target: RenderTarget,
    intermediate_target: RenderTarget,
    final_target: RenderTarget,

    stages: Vec<Box<dyn RenderStage>>,
    post_processors: Vec<Box<dyn PostProcessor>>,
    pixel_art: PixelArtPass,
    blit: BlitPass,
    line_batch: Rc<RefCell<LineBatch>>,
}

impl ClusteredLightingPipeline {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, settings: PipelineSettings) -> Result<Self, RenderError> {
        let (w, h) = (settings.width, settings.height);
        let format = settings.color_format;
        let main_target = RenderTarget::new(device, "main-target", w, h, format, true)?;
        let intermediate_target = RenderTarget::new(device, "intermediate-target", w, h, format, false)?;
        let (fw, fh) = pixel_target_size(w, h, settings.pixel_art.pixel_size);
        let final_target = RenderTarget::new(device, "final-target", fw, fh, format, false)?;

        let passes = ClusterPasses::new(device);
        let mut pixel_art = PixelArtPass::new(settings.pixel_art);
        let mut blit = BlitPass::new();
        {
            let init = StageInit {
                device,
                queue,
                color_format: format,
                depth_format: RenderTarget::DEPTH_FORMAT,
                shading_layout: passes.shading_layout(),
            };
            pixel_art.initialize(&init)?;
            blit.initialize(&init)?;
        }

        log::info!(
            "Clustered pipeline initialized: {w}x{h}, final {fw}x{fh}, clusters {}",
            settings.cluster.dims
        );

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            phase: FramePhase::Idle,
            frame: 0,
            volume: ClusterVolume::new(settings.cluster),
            passes,
            lights: Arena::new(),
            decals: Arena::new(),
            packed_lights: Vec::new(),
            packed_decals: Vec::new(),
            light_buffer: StorageArray::new(device, "cluster-lights", 64),
            decal_buffer: StorageArray::new(device, "cluster-decals", 32),
            pending_dt: 0.0,
            delta_time: 0.0,
            environment: settings.environment,
            main_target,
            intermediate_target,
            final_target,
            stages: Vec::new(),
            post_processors: Vec::new(),
            pixel_art,
            blit,
            line_batch: Rc::new(RefCell::new(LineBatch::new())),
            settings,
        })
    }

    fn stage_init(&self) -> StageInit<'_> {
        StageInit {
            device: &self.device,
            queue: &self.queue,
            color_format: self.settings.color_format,
            depth_format: RenderTarget::DEPTH_FORMAT,
            shading_layout: self.passes.shading_layout(),
        }
    }

    // ---- Frame ----

    /// Store the frame delta. Light flicker advances by it at the next repack.
    pub fn update(&mut self, dt: f32) {
        self.delta_time = dt.max(0.0);
        self.pending_dt += self.delta_time;
    }

    fn advance(&mut self, expected: FramePhase) {
        self.phase = self.phase.next();
        debug_assert_eq!(self.phase, expected);
        log::trace!("Frame {} phase {:?}", self.frame, self.phase);
    }

    pub fn render(&mut self, camera: &Camera) -> FrameStats {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clustered-frame"),
            });

        self.advance(FramePhase::ClusterBuild);
        let build = self
            .passes
            .build(&self.device, &self.queue, &mut encoder, &mut self.volume, camera);
        self.update_light_buffer();
        self.update_decal_buffer();

        self.advance(FramePhase::LightAssign);
        let lights_done = self.passes.assign_lights(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.volume,
            &build,
            &self.light_buffer,
        );

        self.advance(FramePhase::DecalAssign);
        let decals_done = self.passes.assign_decals(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.volume,
            &build,
            &self.decal_buffer,
        );
        let uniform = self.shading_uniform(camera, &build);
        let bindings = self.passes.bindings(
            &self.device,
            &self.queue,
            &mut self.volume,
            &uniform,
            &self.light_buffer,
            &self.decal_buffer,
            &lights_done,
            &decals_done,
        );

        let view_proj = camera.view_projection_matrix();
        if self.settings.wireframe && !build.is_empty() {
            let mut batch = self.line_batch.borrow_mut();
            for aabb in self.volume.cpu_aabbs(view_proj, camera.near, camera.far) {
                batch.add_aabb(&aabb, CLUSTER_LINE_COLOR);
            }
        }

        self.advance(FramePhase::StageExecution);
        self.main_target.clear(&mut encoder, self.settings.clear_color);
        let frustum = Frustum::from_view_projection(&view_proj);
        let mut stages_run = 0;
        for stage in self.stages.iter_mut().filter(|s| s.is_active()) {
            let mut ctx = FrameContext {
                device: &self.device,
                queue: &self.queue,
                encoder: &mut encoder,
                target: &self.main_target,
                camera,
                view_proj,
                frustum: &frustum,
                cluster: &bindings,
                delta_time: self.delta_time,
            };
            stage.execute(&mut ctx);
            stages_run += 1;
        }
        // Lines no stage drew this frame are dropped.
        self.line_batch.borrow_mut().clear();

        self.advance(FramePhase::PostProcess);
        let post_processors_run = self.run_post_chain(&mut encoder);

        let read_back = self.settings.read_back_statistics && !build.is_empty();
        if read_back && let Some(buffers) = self.volume.buffers() {
            buffers.copy_grids_for_readback(&mut encoder);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if read_back {
            self.read_back_statistics();
        }

        self.advance(FramePhase::Idle);
        self.frame += 1;
        let stats = FrameStats {
            frame: self.frame,
            clusters: self.volume.total_clusters(),
            lights: self.packed_lights.len(),
            decals: self.packed_decals.len(),
            stages_run,
            post_processors_run,
            total_light_indices: self.volume.total_light_indices(),
            total_decal_indices: self.volume.total_decal_indices(),
        };
        log::debug!("{stats:?}");
        stats
    }

    fn shading_uniform(&self, camera: &Camera, build: &ClusterBuildResult) -> ShadingUniform {
        let config = self.volume.config();
        let dims = if build.is_empty() {
            ClusterDims::new(0, 0, 0)
        } else {
            build.dims()
        };
        ShadingUniform {
            dims: [dims.x, dims.y, dims.z, self.packed_lights.len() as u32],
            depth_viewport: [
                config.near_clip,
                config.far_clip,
                self.main_target.width() as f32,
                self.main_target.height() as f32,
            ],
            camera_pos: camera.position.extend(1.0).to_array(),
            camera_forward: camera.forward().extend(0.0).to_array(),
            environment: self.environment.to_uniform(),
        }
    }

    /// Pass used when no post processor runs. Pixel art applies whenever the
    /// pixel size is above 1, even with post-processing disabled.
    fn post_fallback(&self) -> PostFallback {
        if self.pixel_art.settings().pixel_size > 1 {
            PostFallback::PixelArt
        } else {
            PostFallback::Blit
        }
    }

    /// Returns how many passes ran, including a fallback pixel-art or blit.
    fn run_post_chain(&mut self, encoder: &mut wgpu::CommandEncoder) -> usize {
        let fallback = self.post_fallback();
        let Self {
            device,
            queue,
            settings,
            post_processors,
            main_target,
            intermediate_target,
            final_target,
            pixel_art,
            blit,
            delta_time,
            ..
        } = self;

        let mut active: Vec<&mut Box<dyn PostProcessor>> = if settings.post_processing {
            post_processors.iter_mut().filter(|p| p.is_active()).collect()
        } else {
            Vec::new()
        };

        if active.is_empty() {
            match fallback {
                PostFallback::PixelArt => pixel_art.run(device, queue, encoder, main_target, final_target),
                PostFallback::Blit => {
                    blit.blit(device, encoder, &main_target.color_view, &final_target.color_view)
                }
            }
            return 1;
        }

        let targets = [&*main_target, &*intermediate_target, &*final_target];
        let mut ctx = PostContext {
            device,
            queue,
            encoder,
            delta_time: *delta_time,
        };
        let steps = plan_post_chain(active.len());
        for (processor, (input, output)) in active.iter_mut().zip(steps) {
            processor.apply(slot_target(targets, input), slot_target(targets, output), &mut ctx);
        }
        active.len()
    }

    fn read_back_statistics(&mut self) {
        let Some(buffers) = self.volume.buffers() else {
            return;
        };
        match buffers.read_grids(&self.device) {
            Ok((lights, decals)) => self.volume.apply_readback(&lights, &decals),
            Err(err) => log::warn!("Cluster statistics unavailable: {err}"),
        }
    }

    // ---- Lights and decals ----

    pub fn add_light(&mut self, light: Light) -> Handle<Light> {
        self.lights.insert(light)
    }

    pub fn remove_light(&mut self, handle: Handle<Light>) -> Option<Light> {
        self.lights.remove(handle)
    }

    pub fn light(&self, handle: Handle<Light>) -> Option<&Light> {
        self.lights.get(handle)
    }

    pub fn light_mut(&mut self, handle: Handle<Light>) -> Option<&mut Light> {
        self.lights.get_mut(handle)
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    pub fn add_decal(&mut self, decal: Decal) -> Handle<Decal> {
        self.decals.insert(decal)
    }

    pub fn remove_decal(&mut self, handle: Handle<Decal>) -> Option<Decal> {
        self.decals.remove(handle)
    }

    pub fn decal(&self, handle: Handle<Decal>) -> Option<&Decal> {
        self.decals.get(handle)
    }

    pub fn decal_mut(&mut self, handle: Handle<Decal>) -> Option<&mut Decal> {
        self.decals.get_mut(handle)
    }

    pub fn clear_decals(&mut self) {
        self.decals.clear();
    }

    /// Apply pending flicker time, repack every light and upload.
    pub fn update_light_buffer(&mut self) {
        let dt = std::mem::take(&mut self.pending_dt);
        self.packed_lights = pack_lights(&mut self.lights, dt);
        self.light_buffer
            .write(&self.device, &self.queue, &self.packed_lights);
    }

    pub fn update_decal_buffer(&mut self) {
        self.packed_decals = pack_decals(&self.decals);
        self.decal_buffer
            .write(&self.device, &self.queue, &self.packed_decals);
    }

    /// Lights as of the last repack, in upload order.
    pub fn packed_lights(&self) -> &[LightGpu] {
        &self.packed_lights
    }

    pub fn packed_decals(&self) -> &[DecalGpu] {
        &self.packed_decals
    }

    // ---- Environment ----

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn set_time_of_day(&mut self, hours: f32) {
        self.environment.set_time_of_day(hours);
        self.update_light_buffer();
    }

    pub fn set_weather_conditions(&mut self, weather: WeatherParameters) {
        self.environment.weather = weather;
        self.update_light_buffer();
    }

    pub fn set_atmosphere_settings(&mut self, atmosphere: AtmosphereSettings) {
        self.environment.atmosphere = atmosphere;
        self.update_light_buffer();
    }

    // ---- Clustering ----

    pub fn configure_clustering(&mut self, x: u32, y: u32, z: u32) {
        self.volume.configure(ClusterDims::new(x, y, z));
        self.settings.cluster = *self.volume.config();
    }

    /// Replace limits and clip range as well as the dimensions.
    pub fn set_cluster_config(&mut self, config: ClusterConfig) {
        self.volume.reconfigure(config);
        self.settings.cluster = *self.volume.config();
    }

    pub fn set_wireframe(&mut self, enabled: bool) {
        self.settings.wireframe = enabled;
    }

    pub fn set_read_back_statistics(&mut self, enabled: bool) {
        self.settings.read_back_statistics = enabled;
    }

    pub fn cluster_volume(&self) -> &ClusterVolume {
        &self.volume
    }

    pub fn active_cluster_count(&self) -> u32 {
        self.volume.total_clusters()
    }

    /// Lights packed by the last repack.
    pub fn visible_light_count(&self) -> usize {
        self.packed_lights.len()
    }

    pub fn total_light_indices(&self) -> u32 {
        self.volume.total_light_indices()
    }

    pub fn total_decal_indices(&self) -> u32 {
        self.volume.total_decal_indices()
    }

    // ---- Stages ----

    pub fn add_render_stage(&mut self, mut stage: Box<dyn RenderStage>) -> Result<(), RenderError> {
        stage.initialize(&self.stage_init())?;
        log::info!("Render stage '{}' registered", stage.name());
        self.stages.push(stage);
        Ok(())
    }

    pub fn add_post_processor(&mut self, mut processor: Box<dyn PostProcessor>) -> Result<(), RenderError> {
        processor.initialize(&self.stage_init())?;
        log::info!("Post-processor '{}' registered", processor.name());
        self.post_processors.push(processor);
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn set_post_processing_enabled(&mut self, enabled: bool) {
        self.settings.post_processing = enabled;
    }

    /// Shared batch drawn by a [`DebugLineStage`](crate::stage::DebugLineStage).
    pub fn line_batch(&self) -> Rc<RefCell<LineBatch>> {
        Rc::clone(&self.line_batch)
    }

    // ---- Pixel art ----

    /// Set the pixel size (at least 1) and shrink the final target to match.
    pub fn configure_for_pixel_art(&mut self, pixel_size: u32, snap_to_grid: bool) -> Result<(), RenderError> {
        self.pixel_art.set_pixel_size(pixel_size);
        self.pixel_art.set_snap_to_grid(snap_to_grid);
        self.settings.pixel_art = *self.pixel_art.settings();
        let (w, h) = pixel_target_size(
            self.main_target.width(),
            self.main_target.height(),
            self.pixel_art.settings().pixel_size,
        );
        self.final_target.resize(&self.device, w, h)?;
        log::info!(
            "Pixel art configured: pixel size {}, final target {w}x{h}",
            self.pixel_art.settings().pixel_size
        );
        Ok(())
    }

    pub fn pixel_art(&self) -> &PixelArtPass {
        &self.pixel_art
    }

    pub fn set_palette(&mut self, colors: &[glam::Vec3]) {
        self.pixel_art.set_palette(colors);
    }

    pub fn enable_palette(&mut self, enabled: bool) {
        self.pixel_art.enable_palette(enabled);
    }

    pub fn set_palette_size(&mut self, size: u32) {
        self.pixel_art.set_palette_size(size);
    }

    pub fn enable_dithering(&mut self, strength: f32) {
        self.pixel_art.enable_dithering(strength);
    }

    pub fn disable_dithering(&mut self) {
        self.pixel_art.disable_dithering();
    }

    // ---- Targets ----

    /// Recreate all three targets. The final target keeps its pixel scale.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.main_target.resize(&self.device, width, height)?;
        self.intermediate_target.resize(&self.device, width, height)?;
        let (fw, fh) = pixel_target_size(width, height, self.pixel_art.settings().pixel_size);
        self.final_target.resize(&self.device, fw, fh)?;
        self.settings.width = width;
        self.settings.height = height;
        log::info!("Pipeline resized to {width}x{height} (final {fw}x{fh})");
        Ok(())
    }

    pub fn main_target(&self) -> &RenderTarget {
        &self.main_target
    }

    pub fn final_target(&self) -> &RenderTarget {
        &self.final_target
    }

    pub fn output_view(&self) -> &wgpu::TextureView {
        &self.final_target.color_view
    }

    // ---- Materials ----

    pub fn create_material(&self, label: &str) -> Material {
        let mut material = Material::new(&self.device, label);
        self.bind_material_to_cluster_system(&mut material);
        material
    }

    pub fn bind_material_to_cluster_system(&self, material: &mut Material) {
        material.bind_cluster_system(&self.queue, self.volume.config(), &self.environment);
    }

    // ---- Queries ----

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_device;
    use crate::stage::{DebugLineStage, VoxelStage};
    use crate::voxel_object::VoxelRenderSettings;
    use glam::Vec3;
    use tessera_grid::CubeGrid;
    use tessera_lighting::LightKind;

    fn small_settings() -> PipelineSettings {
        PipelineSettings {
            width: 64,
            height: 32,
            cluster: ClusterConfig {
                dims: ClusterDims::new(4, 2, 3),
                ..ClusterConfig::default()
            },
            ..PipelineSettings::default()
        }
    }

    #[test]
    fn test_phase_cycle() {
        let mut phase = FramePhase::Idle;
        let mut seen = Vec::new();
        for _ in 0..6 {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                FramePhase::ClusterBuild,
                FramePhase::LightAssign,
                FramePhase::DecalAssign,
                FramePhase::StageExecution,
                FramePhase::PostProcess,
                FramePhase::Idle,
            ]
        );
    }

    #[test]
    fn test_point_light_packs_position_and_kind() {
        let mut lights = Arena::new();
        lights.insert(Light::point(Vec3::new(0.0, 5.0, 0.0), 10.0));
        let packed = pack_lights(&mut lights, 0.0);
        assert_eq!(packed.len(), 1);
        assert_eq!(
            packed[0].as_floats()[..4],
            [0.0, 5.0, 0.0, LightKind::Point.ordinal()]
        );
    }

    #[test]
    fn test_pack_lights_advances_flicker() {
        let mut lights = Arena::new();
        let mut light = Light::point(Vec3::ZERO, 5.0);
        light.set_flicker(1.0, 3.0);
        let handle = lights.insert(light);
        let before = lights.get(handle).map(Light::flicker_modifier);
        pack_lights(&mut lights, 0.4);
        let after = lights.get(handle).map(Light::flicker_modifier);
        assert_ne!(before, after);
    }

    #[test]
    fn test_pack_decals_in_arena_order() {
        let mut decals = Arena::new();
        decals.insert(Decal::at(Vec3::X));
        decals.insert(Decal::at(Vec3::Y));
        assert_eq!(pack_decals(&decals).len(), 2);
    }

    #[test]
    fn test_configure_clustering() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.configure_clustering(4, 2, 3);
        assert_eq!(pipeline.active_cluster_count(), 24);
        assert_eq!(pipeline.cluster_volume().light_assignment_count().len(), 24);
    }

    #[test]
    fn test_update_light_buffer_matches_packing() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.add_light(Light::point(Vec3::new(0.0, 5.0, 0.0), 10.0));
        pipeline.update_light_buffer();
        assert_eq!(pipeline.visible_light_count(), 1);
        assert_eq!(
            pipeline.packed_lights()[0].as_floats()[..4],
            [0.0, 5.0, 0.0, LightKind::Point.ordinal()]
        );
    }

    #[test]
    fn test_pixel_art_shrinks_final_target() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.configure_for_pixel_art(4, true).unwrap();
        assert_eq!(pipeline.final_target().size(), (16, 8));
        pipeline.configure_for_pixel_art(0, false).unwrap();
        assert_eq!(pipeline.final_target().size(), (64, 32));
        pipeline.resize(128, 64).unwrap();
        assert_eq!(pipeline.main_target().size(), (128, 64));
    }

    #[test]
    fn test_full_frame() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        let grid = Rc::new(RefCell::new(CubeGrid::new(8, 1.0)));
        pipeline
            .add_render_stage(Box::new(VoxelStage::new(grid, VoxelRenderSettings::default())))
            .unwrap();
        pipeline
            .add_render_stage(Box::new(DebugLineStage::new(pipeline.line_batch())))
            .unwrap();
        pipeline.set_wireframe(true);

        pipeline.add_light(Light::directional(Vec3::new(-1.0, -1.0, 0.0)));
        pipeline.add_light(Light::point(Vec3::new(0.0, 2.0, 0.0), 8.0));
        pipeline.add_decal(Decal::at(Vec3::ZERO));

        let camera = Camera::looking_at(Vec3::new(0.0, 6.0, 12.0), Vec3::ZERO, 2.0);
        pipeline.update(1.0 / 60.0);
        let stats = pipeline.render(&camera);

        assert_eq!(pipeline.phase(), FramePhase::Idle);
        assert_eq!(stats.frame, 1);
        assert_eq!(stats.clusters, 24);
        assert_eq!(stats.lights, 2);
        assert_eq!(stats.decals, 1);
        assert_eq!(stats.stages_run, 2);
        assert_eq!(stats.post_processors_run, 1);
        // The directional light touches every cluster.
        assert!(pipeline.total_light_indices() >= 24);
        assert!(pipeline.line_batch().borrow().is_empty());

        let material = pipeline.create_material("ground");
        assert_eq!(material.uniform().cluster_dims[..3], [4, 2, 3]);
    }

    #[test]
    fn test_wireframe_lines_do_not_accumulate_without_line_stage() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.set_wireframe(true);
        let camera = Camera::looking_at(Vec3::new(0.0, 6.0, 12.0), Vec3::ZERO, 2.0);
        for _ in 0..3 {
            pipeline.render(&camera);
        }
        assert_eq!(pipeline.line_batch().borrow().len(), 0);
    }

    #[test]
    fn test_pixel_art_fallback_ignores_post_processing_toggle() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.configure_for_pixel_art(4, true).unwrap();
        pipeline.set_post_processing_enabled(false);
        assert_eq!(pipeline.post_fallback(), PostFallback::PixelArt);
        assert_eq!(pipeline.render(&Camera::default()).post_processors_run, 1);

        pipeline.configure_for_pixel_art(1, false).unwrap();
        assert_eq!(pipeline.post_fallback(), PostFallback::Blit);
    }

    #[test]
    fn test_post_chain_runs_registered_processors() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut pipeline = ClusteredLightingPipeline::new(&device, &queue, small_settings()).unwrap();
        pipeline.add_post_processor(Box::new(BlitPass::new())).unwrap();
        pipeline.add_post_processor(Box::new(PixelArtPass::default())).unwrap();
        let stats = pipeline.render(&Camera::default());
        assert_eq!(stats.post_processors_run, 2);

        pipeline.set_post_processing_enabled(false);
        assert_eq!(pipeline.render(&Camera::default()).post_processors_run, 1);
    }
}
