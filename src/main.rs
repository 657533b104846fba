// ABOUTME: Main entry point for the shelly console bot
// ABOUTME: Initializes logging, settings, shared store, and runs the engine over stdin/stdout

use anyhow::{Context as _, Result};
use clap::Parser;
use shelly::console::ConsoleSpace;
use shelly::settings;
use shelly_core::{Context, Engine, EngineConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shelly", version, about = "Talk to a shelly bot from the terminal")]
struct Cli {
    /// Settings file (defaults to SHELLY_CONFIG_PATH, then ./shelly.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Share the store through this SQLite file instead of memory
    #[arg(long)]
    store: Option<PathBuf>,

    /// Number of workers for queued commands
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics: Option<SocketAddr>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // Replies go to stdout, so logs stay on stderr
    let (plain, structured) = if json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    tracing::info!("Starting shelly");

    if let Some(address) = cli.metrics {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(address)
            .install()
            .context("Failed to initialize Prometheus metrics")?;
        tracing::info!(address = %address, "Metrics exporter listening");
    }

    let settings = settings::load(cli.config.as_deref())?;

    let context = match &cli.store {
        Some(path) => Context::open(path)
            .with_context(|| format!("Failed to open store {}", path.display()))?,
        None => Context::new()?,
    };

    let config = EngineConfig {
        workers: cli.workers,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::with_config(
        context,
        Arc::new(ConsoleSpace::stdio()),
        config,
    ));
    engine.configure(&settings)?;
    if engine.get("bot.version").is_none() {
        engine.set("bot.version", env!("CARGO_PKG_VERSION"))?;
    }

    tracing::info!(name = %engine.name(), version = %engine.version(), "Bot ready - type a command");

    let engine_for_signal = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping");
            engine_for_signal.context().set("general.switch", "off").ok();
        }
    });

    engine.run().await?;
    Ok(())
}
