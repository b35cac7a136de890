//! Generation queue worker.
//!
//! Long-running daemon that submits any prompts given on the command
//! line, then polls the studio API for job completion and republishes
//! finished videos into the gallery until stopped with Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vlab_client::StudioApi;
use vlab_events::{EventBus, ObserverRegistry, QueueEvent};
use vlab_queue::{
    Analyzer, Poller, PollerConfig, QueueSettings, QueueStore, UploadConfig, UploadLedger,
    UploadOrchestrator,
};

mod adapters;
mod config;

use adapters::StudioAdapter;
use config::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vlab=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    let poller_config = PollerConfig::from_env();
    tracing::info!(
        api_url = %config.api_url,
        interval_secs = poller_config.interval.as_secs(),
        analyze = config.analyze,
        "Loaded worker configuration",
    );

    // --- API client and port adapters ---
    let api = Arc::new(StudioApi::new(config.api_url.clone(), config.api_key.clone()));
    let adapter = Arc::new(StudioAdapter::new(api));

    // --- Queue wiring ---
    let store = Arc::new(QueueStore::new(adapter.clone()));
    let ledger = Arc::new(UploadLedger::new());
    let bus = Arc::new(EventBus::default());

    let observers = Arc::new(ObserverRegistry::new());
    observers.register(
        "gallery-log",
        Arc::new(|| tracing::info!("Gallery content changed")),
    );

    let uploads = Arc::new(UploadOrchestrator::new(
        adapter.clone(),
        Some(adapter.clone() as Arc<dyn Analyzer>),
        ledger,
        UploadConfig {
            analysis_settle: config.analysis_settle,
        },
    ));

    // --- Event log ---
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(QueueEvent::UploadSummary {
                    job_id,
                    uploaded,
                    failed,
                    total,
                }) => {
                    tracing::info!(job_id = %job_id, uploaded, failed, total, "Upload summary");
                }
                Ok(QueueEvent::ItemFailed { item_id, reason }) => {
                    tracing::warn!(item_id = %item_id, reason = %reason, "Queue item failed");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Poller ---
    let cancel = CancellationToken::new();
    let poller = Arc::new(Poller::new(
        Arc::clone(&store),
        adapter.clone(),
        uploads,
        observers,
        Arc::clone(&bus),
        poller_config,
    ));
    let poller_handle = tokio::spawn(Arc::clone(&poller).run(cancel.clone()));

    // --- Initial prompts ---
    for prompt in std::env::args().skip(1) {
        let settings = QueueSettings {
            analyze: config.analyze,
            folder: config.folder.clone(),
            ..QueueSettings::default()
        };
        match store.enqueue(&prompt, settings).await {
            Ok(job_id) => tracing::info!(job_id = %job_id, "Enqueued generation job"),
            Err(e) => tracing::error!(prompt = %prompt, error = %e, "Failed to enqueue prompt"),
        }
    }

    tracing::info!("Worker running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    // --- Shutdown ---
    tracing::info!("Shutting down");
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), poller_handle).await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}
