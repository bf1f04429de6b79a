//! Logging setup for the Tessera binaries.
//!
//! Console output with uptime timestamps and module paths, plus a JSON file log
//! in debug builds. Crates that emit through the `log` facade are picked up by
//! the subscriber's log bridge.

use std::path::{Path, PathBuf};

use tessera_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";
const LOG_FILE: &str = "tessera.log";

/// Filter directive to use when `RUST_LOG` is unset: the config's `log_level`
/// when non-empty, otherwise the default.
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.is_empty() => {
            format!("{},wgpu=warn,naga=warn", config.debug.log_level)
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// `info` everywhere, `warn` for the noisy GPU crates.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Where the JSON log lands inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE)
}

/// Install the global subscriber. `RUST_LOG` wins over the config's level.
///
/// The JSON file layer is only attached when `debug_build` is set and
/// `log_dir` can be created; failure to create it is silent and the console
/// layer still installs.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_file_path(log_dir))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let filter_str = default_env_filter().to_string();
        assert!(filter_str.contains("wgpu=warn"));
        assert!(filter_str.contains("naga=warn"));
        assert!(filter_str.contains("info"));
    }

    #[test]
    fn test_filter_directive_from_config() {
        let mut config = Config::default();
        config.debug.log_level = "debug,tessera_render=trace".to_string();
        let directive = filter_directive(Some(&config));
        assert!(directive.starts_with("debug,tessera_render=trace"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn test_filter_directive_fallbacks() {
        assert_eq!(filter_directive(None), DEFAULT_FILTER);
        let mut config = Config::default();
        config.debug.log_level.clear();
        assert_eq!(filter_directive(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_subsystem_filters_parse() {
        for directive in [
            "info",
            "debug,tessera_grid=trace",
            "warn,tessera_render=debug,tessera_lighting=trace",
            "error",
        ] {
            assert!(EnvFilter::try_new(directive).is_ok(), "failed to parse {directive}");
        }
    }

    #[test]
    fn test_log_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_file_path(dir.path());
        assert_eq!(path.file_name().unwrap(), "tessera.log");
        assert!(path.starts_with(dir.path()));
    }
}
