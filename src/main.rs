//! keyspace-forward Binary Entry Point
//!
//! Captures changes from a Redis keyspace and writes them to standard
//! output as JSON lines. Core functionality lives in the library crate.

use std::path::Path;

use clap::Parser;
use keyspace_forward::{
    config::AppConfig,
    pipeline::{self, ShutdownHandle},
    sink::{StdoutSink, forward},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// keyspace-forward - Redis change capture
#[derive(Parser, Debug)]
#[command(name = "keyspace-forward", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional; defaults apply when absent)
    #[arg(short, long, env = "KSF_CONFIG")]
    config: Option<String>,

    /// Redis address, host:port or redis:// URL (overrides config file)
    #[arg(long, env = "PP_REDIS_URL")]
    redis_addr: Option<String>,

    /// Key pattern to watch (overrides config file)
    #[arg(long)]
    pattern: Option<String>,

    /// Logical database index (overrides config file)
    #[arg(long)]
    keyspace_id: Option<u32>,

    /// Worker count (overrides config file)
    #[arg(long)]
    workers: Option<usize>,

    /// Per-read timeout, e.g. 500ms or 5s (overrides config file)
    #[arg(long, value_parser = keyspace_forward::config::parse_duration)]
    read_timeout: Option<std::time::Duration>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries events.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keyspace_forward=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(Path::new(path))?
        }
        None => AppConfig::default(),
    };

    // CLI > ENV > config file > defaults
    if let Some(addr) = cli.redis_addr {
        config.redis.addr = addr;
    }
    if let Some(pattern) = cli.pattern {
        config.redis.pattern = pattern;
    }
    if let Some(id) = cli.keyspace_id {
        config.redis.keyspace_id = id;
    }
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    if let Some(timeout) = cli.read_timeout {
        config.pipeline.read_timeout = timeout;
    }
    config.validate()?;

    tracing::info!(
        addr = %config.redis.addr,
        pattern = %config.redis.pattern,
        keyspace_id = config.redis.keyspace_id,
        workers = config.pipeline.workers,
        "Starting keyspace-forward"
    );

    let handles = pipeline::start(&config.redis, &config.pipeline).await?;
    tokio::spawn(shutdown_signal(handles.shutdown.clone()));
    tracing::info!("Press Ctrl+C to shutdown");

    let sink = StdoutSink::stdout();
    let stats = forward(handles.events, handles.errors, &sink).await;

    // The source may also end on its own (server went away).
    handles.shutdown.wait().await;

    tracing::info!(
        forwarded = stats.forwarded,
        errors = stats.errors,
        "Shutdown complete"
    );
    Ok(())
}

/// Shut the pipeline down on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down pipeline...");
    shutdown.shutdown().await;
}
