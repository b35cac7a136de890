//! Tracked queue items and the public queue contract.
//!
//! [`QueueStore`] owns the ordered collection of [`QueueItem`]s. Items
//! are created by [`enqueue`](QueueStore::enqueue), mutated afterwards
//! only by the poller (via [`snapshot`](QueueStore::snapshot) /
//! [`commit`](QueueStore::commit) copy-on-write sweeps), and removed only
//! by an explicit [`remove`](QueueStore::remove).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use validator::Validate;
use vlab_core::types::{GenerationRequest, VideoJob};

use crate::ports::{JobService, ServiceError, UnifiedCreation};

// ---------------------------------------------------------------------------
// Item state
// ---------------------------------------------------------------------------

/// Local lifecycle state of a queue item.
///
/// Deliberately distinct from the remote job's own status vocabulary;
/// the poller maps between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueItemStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One user-initiated generation request tracked by the queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Initially a local placeholder (`local-{uuid}`); swapped to the
    /// backend-assigned job id once creation succeeds. Lookups use the
    /// current value.
    pub id: String,
    pub prompt: String,
    pub status: QueueItemStatus,
    /// Estimated progress in `0..=100` while processing.
    pub progress: Option<u8>,
    pub created_at: DateTime<Utc>,
    /// Last-fetched snapshot of the remote job; `None` until creation
    /// succeeds (such an item is inert: never polled, never uploaded).
    pub job: Option<VideoJob>,
    /// Upload handoff has begun; the poller will not hand off again.
    pub upload_started: bool,
    /// All upload work has settled; the item is never polled again.
    pub upload_complete: bool,
    /// Run post-upload content analysis for this item's artifacts.
    pub analyze: bool,
    /// Destination gallery folder for this item's artifacts.
    pub folder: Option<String>,
}

// ---------------------------------------------------------------------------
// Enqueue settings and creation strategy
// ---------------------------------------------------------------------------

/// How a new job is submitted to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStrategy {
    /// `create_job` now, poll and upload later. The default.
    TwoStep,
    /// Single create+analyze call; the backend uploads (and analyzes)
    /// before responding, so the item completes without polling. Falls
    /// back to [`TwoStep`](Self::TwoStep) if the unified call fails.
    Unified,
}

/// Per-enqueue options.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub strategy: CreationStrategy,
    /// Run content analysis after each artifact is republished.
    pub analyze: bool,
    /// Destination gallery folder for the item's artifacts.
    pub folder: Option<String>,
    pub n_variants: u32,
    pub n_seconds: u32,
    pub height: u32,
    pub width: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            strategy: CreationStrategy::TwoStep,
            analyze: false,
            folder: None,
            n_variants: 1,
            n_seconds: 10,
            height: 720,
            width: 1280,
        }
    }
}

/// Outcome of the creation strategy.
#[derive(Debug)]
pub enum CreationOutcome {
    /// A job exists remotely; the poller takes over from here.
    Created(VideoJob),
    /// The unified path already generated, uploaded, and analyzed; no
    /// polling needed.
    CompletedInline(UnifiedCreation),
}

/// Submit a job according to `strategy`.
///
/// The unified path degrades to two-step on failure rather than failing
/// the enqueue outright; only a failure of the fallback itself is
/// returned to the caller.
async fn create_with_strategy(
    jobs: &dyn JobService,
    request: &GenerationRequest,
    strategy: CreationStrategy,
) -> Result<CreationOutcome, ServiceError> {
    match strategy {
        CreationStrategy::TwoStep => Ok(CreationOutcome::Created(jobs.create_job(request).await?)),
        CreationStrategy::Unified => match jobs.create_job_with_analysis(request).await {
            Ok(unified) => Ok(CreationOutcome::CompletedInline(unified)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Unified create+analyze failed, falling back to two-step creation",
                );
                Ok(CreationOutcome::Created(jobs.create_job(request).await?))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the public queue contract.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue item not found: {0}")]
    NotFound(String),

    /// An attempted transition out of `completed`/`failed`.
    #[error("item {id} is already {status:?} and cannot change state")]
    TerminalState { id: String, status: QueueItemStatus },

    #[error("invalid generation request: {0}")]
    Invalid(String),

    /// Remote job creation failed; the local item remains pending with no
    /// job attached and must be removed explicitly.
    #[error("job creation failed: {0}")]
    Creation(#[from] ServiceError),
}

// ---------------------------------------------------------------------------
// QueueStore
// ---------------------------------------------------------------------------

/// The ordered collection of tracked queue items.
///
/// Shared via `Arc`; interior mutability through a single `RwLock` so a
/// sweep's commit is one atomic write.
pub struct QueueStore {
    items: RwLock<Vec<QueueItem>>,
    jobs: Arc<dyn JobService>,
}

impl QueueStore {
    pub fn new(jobs: Arc<dyn JobService>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            jobs,
        }
    }

    /// Create a pending item and submit the job to the backend.
    ///
    /// The item is inserted synchronously before any network call, so it
    /// is visible to `list` immediately. On creation success the item's
    /// id is swapped to the backend job id (identity for later lookups)
    /// and the job snapshot is attached; the unified path additionally
    /// marks the item completed with uploads done. On total failure the
    /// error is returned and the item is left pending with no job --
    /// inert until `remove`d.
    pub async fn enqueue(
        &self,
        prompt: &str,
        settings: QueueSettings,
    ) -> Result<String, QueueError> {
        let request = GenerationRequest {
            prompt: prompt.to_string(),
            n_variants: settings.n_variants,
            n_seconds: settings.n_seconds,
            height: settings.height,
            width: settings.width,
        };
        request
            .validate()
            .map_err(|e| QueueError::Invalid(e.to_string()))?;

        let placeholder_id = format!("local-{}", uuid::Uuid::new_v4());
        let item = QueueItem {
            id: placeholder_id.clone(),
            prompt: prompt.to_string(),
            status: QueueItemStatus::Pending,
            progress: None,
            created_at: Utc::now(),
            job: None,
            upload_started: false,
            upload_complete: false,
            analyze: settings.analyze,
            folder: settings.folder.clone(),
        };
        self.items.write().await.push(item);

        let outcome = match create_with_strategy(&*self.jobs, &request, settings.strategy).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    item_id = %placeholder_id,
                    error = %e,
                    "Job creation failed; item left pending without a job",
                );
                return Err(e.into());
            }
        };

        let (job, completed_inline) = match outcome {
            CreationOutcome::Created(job) => (job, false),
            CreationOutcome::CompletedInline(unified) => (unified.job, true),
        };
        let backend_id = job.id.clone();

        let mut items = self.items.write().await;
        if let Some(slot) = items.iter_mut().find(|i| i.id == placeholder_id) {
            slot.id = backend_id.clone();
            slot.job = Some(job);
            if completed_inline {
                slot.status = QueueItemStatus::Completed;
                slot.progress = Some(100);
                slot.upload_started = true;
                slot.upload_complete = true;
            }
        } else {
            // Removed while the creation call was in flight; nothing to
            // update, but the backend job exists and is returned.
            tracing::debug!(item_id = %placeholder_id, "Item removed during job creation");
        }

        tracing::info!(
            job_id = %backend_id,
            inline = completed_inline,
            "Generation job enqueued",
        );
        Ok(backend_id)
    }

    /// Remove an item. Returns whether it existed.
    ///
    /// Already-issued uploads are unaffected; claimed generation ids stay
    /// claimed.
    pub async fn remove(&self, id: &str) -> bool {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|i| i.id != id);
        items.len() != before
    }

    /// Current snapshot of one item.
    pub async fn get(&self, id: &str) -> Option<QueueItem> {
        self.items.read().await.iter().find(|i| i.id == id).cloned()
    }

    /// Current snapshot of all items, in enqueue order.
    pub async fn list(&self) -> Vec<QueueItem> {
        self.items.read().await.clone()
    }

    /// Direct status override (e.g. optimistic UI updates).
    ///
    /// Terminal states are irreversible: any attempt to move an item out
    /// of `Completed`/`Failed` is rejected. Re-asserting the same
    /// terminal state is a no-op.
    pub async fn update_status(
        &self,
        id: &str,
        status: QueueItemStatus,
        progress: Option<u8>,
    ) -> Result<(), QueueError> {
        let mut items = self.items.write().await;
        let item = items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if item.status.is_terminal() && status != item.status {
            return Err(QueueError::TerminalState {
                id: item.id.clone(),
                status: item.status,
            });
        }

        item.status = status;
        if let Some(progress) = progress {
            item.progress = Some(progress.min(100));
        }
        Ok(())
    }

    // ---- sweep support ----

    /// Working copy of the collection for one sweep.
    pub(crate) async fn snapshot(&self) -> Vec<QueueItem> {
        self.items.read().await.clone()
    }

    /// Atomically apply a sweep's per-item updates.
    ///
    /// Each update replaces the live item with the same id; ids no longer
    /// present (removed mid-sweep) are skipped, and items enqueued during
    /// the sweep are untouched. Upload flags and terminal statuses only
    /// ever move forward -- a stale working copy cannot clear a flag set
    /// by a concurrent handoff, nor pull an item out of a terminal state
    /// reached while the sweep was in flight.
    pub(crate) async fn commit(&self, updates: Vec<QueueItem>) {
        let mut items = self.items.write().await;
        for mut update in updates {
            if let Some(slot) = items.iter_mut().find(|i| i.id == update.id) {
                update.upload_started |= slot.upload_started;
                update.upload_complete |= slot.upload_complete;
                if slot.status.is_terminal() && !update.status.is_terminal() {
                    update.status = slot.status;
                    update.progress = slot.progress;
                }
                *slot = update;
            }
        }
    }

    /// Handoff guard: atomically mark an item's upload as started.
    ///
    /// Returns `false` when the item is gone, already handed off, or
    /// already upload-complete -- the caller must then skip the handoff.
    pub(crate) async fn mark_upload_started(&self, id: &str) -> bool {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) if !item.upload_started && !item.upload_complete => {
                item.upload_started = true;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
