//! The `tessera` binary: renders a few headless frames of the demo scene.

use clap::Parser;
use tessera_config::CliArgs;

fn main() {
    let args = CliArgs::parse();
    let config_dir = tessera_app::config_dir(&args);

    let config = match tessera_app::load_config(&config_dir, &args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            std::process::exit(1);
        }
    };

    let log_dir = config_dir.join("logs");
    tessera_log::init_logging(Some(log_dir.as_path()), cfg!(debug_assertions), Some(&config));
    tracing::info!("Using config directory {}", config_dir.display());

    match tessera_app::run(&config, args.frames) {
        Ok(reports) => tracing::info!("Rendered {} frame(s)", reports.len()),
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("tessera: {e}");
            std::process::exit(1);
        }
    }
}
