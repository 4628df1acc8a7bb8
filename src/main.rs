use anyhow::Result;
use wecare_assistant::{Assistant, config, server};
use tracing::info;

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (before logging setup)
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Environment variable overrides config
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.server.logs.level.clone());

    if let Err(e) = validate_log_level(&log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))?,
        )
        .json()
        .init();

    info!("Starting WeCare assistant with log level: {}", log_level);

    let assistant = Assistant::from_config(&config)?;
    let backend = assistant.backend();
    info!("Inference backend: {} ({})", backend.mode, backend.target);

    if config.local.eager_load && backend.mode == "local" {
        info!("Loading local model before accepting requests");
        assistant.warm_up().await?;
    }

    server::run(&config.server, assistant).await?;

    Ok(())
}
