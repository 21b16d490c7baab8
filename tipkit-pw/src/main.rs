//! tipkit-pw - Processing Worker
//!
//! Stateless request/response service performing language detection,
//! translation to the canonical language, and embedding generation. Models
//! load once at startup; the first request after process start may observe
//! higher latency. Run several instances to serve concurrent coordinator
//! batches in parallel; they share the port via `SO_REUSEPORT`.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tipkit_pw::config::WorkerConfig;
use tipkit_pw::models::ModelRuntime;
use tipkit_pw::{build_router, AppState};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// TipKit Processing Worker - translation and embedding service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to bind to (overrides WORKER_HOST)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind to (overrides WORKER_PORT)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("tipkit_pw={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TipKit Processing Worker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = WorkerConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Models are a startup requirement; failing here beats degrading at
    // request time
    let runtime = ModelRuntime::load(&config)?;
    let state = AppState::new(Arc::new(runtime));

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tipkit_pw::net::reuseport_listener(addr)?;
    info!("Listening on http://{addr} (SO_REUSEPORT)");
    info!("Health check: http://{addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
