// Cadence study planner
// Main entry point for the cadence binary

use clap::Parser;
use cadence_engine::cli::{Cli, Command, ConfigAction};
use cadence_engine::config::Config;
use cadence_engine::handlers::{
    handle_chat, handle_config_show, handle_doctor, handle_run, OutputFormat,
};
use cadence_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Cadence v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Chat => {
            tracing::info!("Starting interactive conversation");
            handle_chat(&config, format).await
        }

        Command::Run { request } => {
            tracing::info!("Running request: {}", request);
            handle_run(request, &config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
        },
    }
}
