//! Runtime settings for the Tessera renderer.
//!
//! Settings persist to disk as `config.ron`, tolerate missing and unknown
//! fields, and can be overridden from the command line.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, parse_cluster_dims};
pub use config::{
    ClusteringConfig, Config, DebugConfig, EnvironmentConfig, GridConfig, RenderConfig,
    WindowConfig, default_config_dir,
};
pub use error::ConfigError;
