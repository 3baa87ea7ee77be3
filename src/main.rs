use std::sync::Arc;

use tracing::{error, info};

use newsrelay::{Config, ConsoleSink, Database, HttpFeedSource, Relay, RelayService};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NEWSRELAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = newsrelay::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        newsrelay::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> newsrelay::Result<()> {
    config.validate()?;
    info!("newsrelay starting");

    let db = Arc::new(Database::open(&config.database.path).await?);
    let source = Arc::new(HttpFeedSource::new(&config.fetcher)?);
    let sink = Arc::new(ConsoleSink::new());

    let relay = Relay::new(db.clone(), source, sink, config.relay.clone())
        .with_retention_days(config.scheduler.retention_days);
    let service = RelayService::start(relay, &config.scheduler);

    wait_for_signals().await;

    // Stop the timer (waiting out the running tick), then release storage
    service.shutdown().await;
    db.close().await;

    info!("newsrelay stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signals() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(not(unix))]
async fn wait_for_signals() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received SIGINT, shutting down..."),
        Err(e) => error!("Failed to listen for SIGINT: {}", e),
    }
}
