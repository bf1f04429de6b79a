//! Configuration sections with their defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// `<platform config dir>/tessera`, or `./tessera` when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub clustering: ClusteringConfig,
    pub grid: GridConfig,
    pub environment: EnvironmentConfig,
    pub debug: DebugConfig,
}

/// Output surface size. The headless binary renders offscreen at this size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Tessera".to_string(),
        }
    }
}

/// Pixel-art post-processing and voxel drawing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Screen pixels per art pixel. 1 disables downsampling.
    pub pixel_size: u32,
    pub snap_to_grid: bool,
    pub post_processing: bool,
    pub palette_enabled: bool,
    pub palette_size: u32,
    pub dithering_enabled: bool,
    pub dither_strength: f32,
    pub frustum_culling: bool,
    /// World units; chunks further from the camera are skipped.
    pub render_distance: f32,
    /// Copy cluster grids back to the CPU each frame for statistics.
    pub read_back_statistics: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixel_size: 2,
            snap_to_grid: true,
            post_processing: true,
            palette_enabled: false,
            palette_size: 16,
            dithering_enabled: false,
            dither_strength: 0.5,
            frustum_culling: true,
            render_distance: 500.0,
            read_back_statistics: true,
        }
    }
}

/// Cluster grid dimensions and per-cluster caps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    pub dim_x: u32,
    pub dim_y: u32,
    pub dim_z: u32,
    pub max_lights_per_cluster: u32,
    pub max_decals_per_cluster: u32,
    pub near_clip: f32,
    pub far_clip: f32,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            dim_x: 16,
            dim_y: 8,
            dim_z: 24,
            max_lights_per_cluster: 64,
            max_decals_per_cluster: 32,
            near_clip: 0.1,
            far_clip: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GridConfig {
    /// Edge length of the initial floor, in cubes.
    pub initial_size: u32,
    pub spacing: f32,
    /// Chunks kept loaded around the camera, per axis.
    pub view_distance: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            initial_size: 16,
            spacing: 1.0,
            view_distance: 2,
        }
    }
}

/// Time of day, weather and atmosphere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Hours, wrapped into `[0, 24)` when applied.
    pub time_of_day: f32,
    pub fog_density: f32,
    pub fog_color: [f32; 3],
    pub wind_speed: f32,
    pub wind_direction: [f32; 3],
    pub rain_intensity: f32,
    pub snow_intensity: f32,
    pub atmosphere_enabled: bool,
    pub rayleigh_scattering: f32,
    pub mie_scattering: f32,
    pub exposure: f32,
    pub sky_tint: [f32; 3],
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            time_of_day: 12.0,
            fog_density: 0.0,
            fog_color: [0.7, 0.75, 0.8],
            wind_speed: 0.0,
            wind_direction: [1.0, 0.0, 0.0],
            rain_intensity: 0.0,
            snow_intensity: 0.0,
            atmosphere_enabled: true,
            rayleigh_scattering: 1.0,
            mie_scattering: 1.0,
            exposure: 1.0,
            sky_tint: [1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Draw cluster AABB wireframes.
    pub wireframe: bool,
    /// Filter directive, e.g. "debug" or "info,tessera_render=trace".
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            wireframe: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first if
    /// the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Write)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::Write)
    }

    /// Re-read the file. `Some` only when its contents differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        ron::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let ron_str =
            ron::ser::to_string_pretty(&Config::default(), ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("width: 1280"));
        assert!(ron_str.contains("dim_z: 24"));
        assert!(ron_str.contains("pixel_size: 2"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(window: (width: 640), debug: ())").unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.clustering, ClusteringConfig::default());
        assert_eq!(config.environment, EnvironmentConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(shadow_cascades: 4)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.render.pixel_size = 4;
        config.clustering.dim_x = 8;
        config.environment.fog_color = [0.1, 0.2, 0.3];

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("tessera");
        let config = Config::load_or_create(&nested).unwrap();
        assert_eq!(config, Config::default());
        assert!(nested.join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.debug.wireframe = true;
        modified.save(dir.path()).unwrap();

        let reloaded = config.reload(dir.path()).unwrap();
        assert!(reloaded.unwrap().debug.wireframe);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::default().reload(dir.path());
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_invalid_ron_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.ron"), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let config: Config = ron::from_str("// tessera\n(\n  // nothing set\n)").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_default_config_dir_ends_in_tessera() {
        assert!(default_config_dir().ends_with("tessera"));
    }
}
