//! Periodic polling of non-terminal queue items.
//!
//! [`Poller::run`] is a long-running async task intended to be spawned
//! via `tokio::spawn` and shut down with a [`CancellationToken`]. Each
//! interval tick performs one [`sweep`](Poller::sweep): snapshot the
//! store, fetch remote status per item, advance each item's state
//! machine, hand freshly-succeeded jobs to the upload orchestrator, and
//! commit all mutations atomically at the end.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use vlab_core::progress;
use vlab_core::types::JobStatus;
use vlab_events::{EventBus, ObserverRegistry, QueueEvent};

use crate::ports::JobService;
use crate::store::{QueueItem, QueueItemStatus, QueueStore};
use crate::upload::{UploadOrchestrator, UploadSummary};

/// How often the poller sweeps the queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Settling delay before observers are notified after upload activity.
pub const DEFAULT_NOTIFY_SETTLE: Duration = Duration::from_millis(500);

/// Poller timing configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub notify_settle: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            notify_settle: DEFAULT_NOTIFY_SETTLE,
        }
    }
}

impl PollerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var             | Default |
    /// |---------------------|---------|
    /// | `POLL_INTERVAL_SECS`| `5`     |
    /// | `NOTIFY_SETTLE_MS`  | `500`   |
    pub fn from_env() -> Self {
        let interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);

        let notify_settle = std::env::var("NOTIFY_SETTLE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_NOTIFY_SETTLE);

        Self {
            interval,
            notify_settle,
        }
    }
}

/// What one sweep did, for logging and tests.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Items whose remote status was fetched.
    pub polled: usize,
    /// Items that transitioned to completed this sweep.
    pub completed: usize,
    /// Items that transitioned to failed this sweep.
    pub failed: usize,
    /// Upload handoffs performed this sweep.
    pub uploads: Vec<UploadSummary>,
}

/// The recurring queue sweeper.
pub struct Poller {
    store: Arc<QueueStore>,
    jobs: Arc<dyn JobService>,
    uploads: Arc<UploadOrchestrator>,
    observers: Arc<ObserverRegistry>,
    bus: Arc<EventBus>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        store: Arc<QueueStore>,
        jobs: Arc<dyn JobService>,
        uploads: Arc<UploadOrchestrator>,
        observers: Arc<ObserverRegistry>,
        bus: Arc<EventBus>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            uploads,
            observers,
            bus,
            config,
        }
    }

    /// Run the polling loop until `cancel` is triggered.
    ///
    /// The first sweep fires immediately (`tokio::time::interval` ticks
    /// at once); cancellation stops future ticks, and the in-flight sweep
    /// discards its results once it observes the cancelled token.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "Queue poller started",
        );

        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Queue poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.sweep(&cancel).await;
                    if report.polled > 0 {
                        tracing::debug!(
                            polled = report.polled,
                            completed = report.completed,
                            failed = report.failed,
                            "Sweep finished",
                        );
                    }
                }
            }
        }
    }

    /// Perform one sweep over the queue.
    ///
    /// Per-item updates are computed on a working copy and committed
    /// together at the end, so partial-sweep state is never observable.
    /// If `cancel` fires mid-sweep the computed updates are discarded.
    pub async fn sweep(&self, cancel: &CancellationToken) -> SweepReport {
        let snapshot = self.store.snapshot().await;
        let mut report = SweepReport::default();
        let mut updates: Vec<QueueItem> = Vec::new();

        for item in snapshot {
            // Inert (no job), settled, or already-handed-off items are
            // not polled.
            if item.job.is_none()
                || item.status.is_terminal()
                || item.upload_started
                || item.upload_complete
            {
                continue;
            }

            report.polled += 1;
            if let Some(update) = self.poll_item(item, &mut report).await {
                updates.push(update);
            }
        }

        // Torn down mid-sweep: the consumer is gone, discard everything.
        if cancel.is_cancelled() {
            tracing::debug!("Sweep cancelled; discarding results");
            return report;
        }

        self.store.commit(updates).await;

        if !report.uploads.is_empty() {
            self.schedule_notify(cancel.clone());
        }

        report
    }

    // ---- per-item handling ----

    /// Fetch one item's remote status and advance its state machine.
    ///
    /// Returns the updated item to commit, or `None` when nothing should
    /// change (transient fetch error, or a handoff raced us).
    async fn poll_item(&self, mut item: QueueItem, report: &mut SweepReport) -> Option<QueueItem> {
        // Skip rules above guarantee a job is attached.
        let job_id = item.job.as_ref()?.id.clone();

        let job = match self.jobs.get_job(&job_id).await {
            Ok(job) => job,
            Err(e) if e.is_transient() => {
                tracing::debug!(
                    job_id = %job_id,
                    error = %e,
                    "Transient poll error; retrying next sweep",
                );
                return None;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Definitive poll error");
                item.status = QueueItemStatus::Failed;
                report.failed += 1;
                self.bus.publish(QueueEvent::ItemFailed {
                    item_id: item.id.clone(),
                    reason: e.to_string(),
                });
                return Some(item);
            }
        };

        item.job = Some(job.clone());

        match job.status {
            JobStatus::Succeeded => {
                item.status = QueueItemStatus::Completed;
                item.progress = Some(100);
                report.completed += 1;

                // Handoff guard: check-and-set against the live store so
                // an overlapping sweep cannot hand off the same item.
                if self.store.mark_upload_started(&item.id).await {
                    item.upload_started = true;
                    let summary = self.uploads.publish_job_outputs(&item, &job).await;
                    item.upload_complete = true;
                    self.bus.publish(QueueEvent::UploadSummary {
                        job_id: summary.job_id.clone(),
                        uploaded: summary.uploaded,
                        failed: summary.failed,
                        total: summary.total,
                    });
                    report.uploads.push(summary);
                    Some(item)
                } else {
                    // The concurrent handoff owns this item's final state.
                    None
                }
            }
            JobStatus::Failed | JobStatus::Cancelled => {
                let reason = job
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| format!("job {:?}", job.status).to_lowercase());
                tracing::warn!(job_id = %job.id, reason = %reason, "Generation job failed");
                item.status = QueueItemStatus::Failed;
                report.failed += 1;
                self.bus.publish(QueueEvent::ItemFailed {
                    item_id: item.id.clone(),
                    reason,
                });
                Some(item)
            }
            JobStatus::Queued
            | JobStatus::Preprocessing
            | JobStatus::Running
            | JobStatus::Processing
            | JobStatus::Unknown => {
                item.status = QueueItemStatus::Processing;
                if let Some(created_at) = job.created_at {
                    let estimate = progress::estimate(created_at, Utc::now().timestamp());
                    if progress::should_refresh(item.progress, estimate) {
                        item.progress = Some(estimate);
                    }
                }
                Some(item)
            }
        }
    }

    /// Notify observers that new content is available, after a settling
    /// delay, unless the consumer has been torn down in the meantime.
    fn schedule_notify(&self, cancel: CancellationToken) {
        let observers = Arc::clone(&self.observers);
        let settle = self.config.notify_settle;
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            if cancel.is_cancelled() {
                tracing::debug!("Skipping observer notification after shutdown");
                return;
            }
            observers.notify_all();
        });
    }
}
