//! tipkit-np - Nightly Processor
//!
//! Operator entry point: executes one processing run to completion, then
//! per-location promotion. Intended to be scheduled (cron or a systemd
//! timer); exit code 0 on success, non-zero when the pipeline aborts.

use clap::Parser;
use std::sync::Arc;
use tipkit_np::coordinator::{Coordinator, RunConfig, RunError};
use tipkit_np::wol::WakeProtocol;
use tipkit_np::worker_client::WorkerClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// TipKit Nightly Processor - batch translation, embedding, and promotion
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Do not send Wake-on-LAN packets; a sleeping worker aborts the run
    #[arg(long)]
    no_wake: bool,

    /// Skip the promotion pass after processing
    #[arg(long)]
    no_promotion: bool,

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
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tipkit_np={log_level},tipkit_common={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("TipKit Nightly Processor starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = tipkit_common::config::Settings::from_env()?;

    let pool = tipkit_common::db::init_database_pool(&settings.database_url).await?;
    info!("Database connection established");

    let store = Arc::new(tipkit_common::db::PgTipStore::new(pool));
    let client = WorkerClient::new(
        &settings.worker_base_url,
        settings.request_timeout,
        settings.max_attempts_per_batch,
    )?;
    info!(worker = %client.base_url(), "Worker client initialized");

    let wake = WakeProtocol::from_settings(&settings, !args.no_wake)?;
    let config = RunConfig::from_settings(&settings, !args.no_promotion);
    let coordinator = Coordinator::new(store, client, wake, config);

    // Shutdown signal: stop dispatching, drain with a grace period,
    // compensate whatever is still claimed
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_cancel.cancel();
        }
    });

    match coordinator.run(cancel).await {
        Ok(stats) => {
            info!(
                claimed = stats.claimed,
                processed = stats.processed,
                failed = stats.failed,
                released = stats.released,
                promotions = stats.promotions,
                cancelled = stats.cancelled,
                "Nightly run finished"
            );
            Ok(())
        }
        Err(err @ RunError::WorkerUnavailable(_)) => {
            error!(error = %err, "Pipeline aborted");
            std::process::exit(1);
        }
        Err(err) => {
            error!(error = %err, "Run failed");
            std::process::exit(1);
        }
    }
}
