//! Translation from the on-disk [`Config`] to renderer settings.

use glam::Vec3;
use tessera_config::Config;
use tessera_lighting::{AtmosphereSettings, Environment, WeatherParameters};
use tessera_render::{ClusterConfig, ClusterDims, PipelineSettings, PixelArtSettings, VoxelRenderSettings};

pub fn environment_from_config(config: &Config) -> Environment {
    let env = &config.environment;
    let mut environment = Environment {
        time_of_day: 0.0,
        weather: WeatherParameters {
            rain_intensity: env.rain_intensity,
            snow_intensity: env.snow_intensity,
            fog_density: env.fog_density,
            fog_color: Vec3::from_array(env.fog_color),
            wind_speed: env.wind_speed,
            wind_direction: Vec3::from_array(env.wind_direction),
        },
        atmosphere: AtmosphereSettings {
            rayleigh_scattering: env.rayleigh_scattering,
            mie_scattering: env.mie_scattering,
            exposure: env.exposure,
            sky_tint: Vec3::from_array(env.sky_tint),
            enabled: env.atmosphere_enabled,
        },
    };
    environment.set_time_of_day(env.time_of_day);
    environment
}

pub fn pipeline_settings(config: &Config) -> PipelineSettings {
    let render = &config.render;
    let clustering = &config.clustering;
    PipelineSettings {
        width: config.window.width,
        height: config.window.height,
        cluster: ClusterConfig {
            dims: ClusterDims::new(clustering.dim_x, clustering.dim_y, clustering.dim_z),
            max_lights_per_cluster: clustering.max_lights_per_cluster,
            max_decals_per_cluster: clustering.max_decals_per_cluster,
            near_clip: clustering.near_clip,
            far_clip: clustering.far_clip,
        }
        .sanitized(),
        pixel_art: PixelArtSettings {
            pixel_size: render.pixel_size.max(1),
            snap_to_grid: render.snap_to_grid,
            palette_enabled: render.palette_enabled,
            palette_size: render.palette_size,
            dithering_enabled: render.dithering_enabled,
            dither_strength: render.dither_strength,
        },
        post_processing: render.post_processing,
        wireframe: config.debug.wireframe,
        read_back_statistics: render.read_back_statistics,
        environment: environment_from_config(config),
        ..PipelineSettings::default()
    }
}

/// A non-positive render distance disables the distance cut.
pub fn voxel_settings(config: &Config) -> VoxelRenderSettings {
    let distance = config.render.render_distance;
    VoxelRenderSettings {
        frustum_culling: config.render.frustum_culling,
        render_distance: (distance > 0.0).then_some(distance),
    }
}
