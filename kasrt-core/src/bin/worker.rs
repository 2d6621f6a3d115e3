use std::sync::Arc;

use dotenv::dotenv;
use kasrt_core::config::Config;
use kasrt_core::state::AppState;
use kasrt_core::worker::OcrScheduler;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Background OCR worker.
///
/// Polls for PENDING monthly-fee payments and runs them through the OCR
/// batch, as an alternative to triggering `/api/cron/run-ocr` from an
/// external scheduler.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting kasrt OCR worker...");

    let config = Config::from_env()?;
    let poll_interval = config.worker_poll_interval_seconds;
    let batch_size = config.ocr_batch_size;

    let state = AppState::from_config(config).await?;
    let scheduler = Arc::new(OcrScheduler::new(
        Arc::clone(&state.reconciler),
        poll_interval,
        batch_size,
    ));

    let scheduler_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.start().await })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            scheduler.stop().await;
        }
        _ = scheduler_handle => {
            info!("Scheduler task completed");
        }
    }

    info!("kasrt OCR worker stopped");
    Ok(())
}
