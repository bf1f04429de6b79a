//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Tessera command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Clustered voxel renderer")]
pub struct CliArgs {
    /// Output width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Screen pixels per art pixel.
    #[arg(long)]
    pub pixel_size: Option<u32>,

    /// Number of frames to render before exiting.
    #[arg(long, default_value_t = 3)]
    pub frames: u32,

    /// Cluster grid dimensions, e.g. `16x8x24`.
    #[arg(long, value_parser = parse_cluster_dims)]
    pub clusters: Option<(u32, u32, u32)>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Draw cluster wireframes.
    #[arg(long)]
    pub wireframe: bool,
}

/// Parse `XxYxZ` with every component at least 1.
pub fn parse_cluster_dims(s: &str) -> Result<(u32, u32, u32), String> {
    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected XxYxZ, got '{s}'"));
    };
    let parse = |p: &str| -> Result<u32, String> {
        match p.trim().parse::<u32>() {
            Ok(0) => Err(format!("cluster dimension must be at least 1 in '{s}'")),
            Ok(v) => Ok(v),
            Err(e) => Err(format!("invalid cluster dimension '{p}': {e}")),
        }
    };
    Ok((parse(x)?, parse(y)?, parse(z)?))
}

impl Config {
    /// Apply CLI overrides to a loaded config. `frames` has no config
    /// counterpart and is read directly by the binary.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(p) = args.pixel_size {
            self.render.pixel_size = p;
        }
        if let Some((x, y, z)) = args.clusters {
            self.clustering.dim_x = x;
            self.clustering.dim_y = y;
            self.clustering.dim_z = z;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.wireframe {
            self.debug.wireframe = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            pixel_size: Some(4),
            clusters: Some((4, 2, 3)),
            wireframe: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.render.pixel_size, 4);
        assert_eq!(
            (config.clustering.dim_x, config.clustering.dim_y, config.clustering.dim_z),
            (4, 2, 3)
        );
        assert!(config.debug.wireframe);
        // Non-overridden fields retain defaults
        assert_eq!(config.window.height, 720);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let defaults = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, defaults);
    }

    #[test]
    fn test_parse_cluster_dims() {
        assert_eq!(parse_cluster_dims("16x8x24"), Ok((16, 8, 24)));
        assert_eq!(parse_cluster_dims("4X2X3"), Ok((4, 2, 3)));
        assert!(parse_cluster_dims("16x8").is_err());
        assert!(parse_cluster_dims("16x0x24").is_err());
        assert!(parse_cluster_dims("axbxc").is_err());
    }

    #[test]
    fn test_parse_from_args() {
        let args = CliArgs::parse_from([
            "tessera",
            "--clusters",
            "8x4x12",
            "--frames",
            "10",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.clusters, Some((8, 4, 12)));
        assert_eq!(args.frames, 10);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.wireframe);
    }

    #[test]
    fn test_frames_default() {
        let args = CliArgs::parse_from(["tessera"]);
        assert_eq!(args.frames, 3);
        assert!(args.clusters.is_none());
    }
}
