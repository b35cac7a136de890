//! Republishing a completed job's generations into the asset store.
//!
//! Invoked once per job that transitions to completed. Claims each
//! generation in the [`UploadLedger`] *before* dispatching any async work
//! for it -- the ordering that makes uploads at-most-once across
//! overlapping sweeps -- then runs the per-generation download+republish
//! operations concurrently and independently.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use vlab_core::naming;
use vlab_core::types::{AssetMetadata, Generation, VideoJob};

use crate::ledger::UploadLedger;
use crate::ports::{Analyzer, AssetPublisher};
use crate::store::QueueItem;

/// Default wait before analyzing a freshly republished asset, giving the
/// asset store's eventual consistency time to make it readable.
pub const DEFAULT_ANALYSIS_SETTLE: Duration = Duration::from_secs(10);

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Settling delay before the analysis call.
    pub analysis_settle: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            analysis_settle: DEFAULT_ANALYSIS_SETTLE,
        }
    }
}

/// Aggregate outcome of one job's upload handoff.
#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub job_id: String,
    /// Claimed generations that republished successfully.
    pub uploaded: usize,
    /// Claimed generations whose upload failed (never retried).
    pub failed: usize,
    /// Generations skipped because another handoff already claimed them.
    pub skipped: usize,
    /// Total generations the job produced.
    pub total: usize,
}

/// Claims, republishes, and optionally analyzes a job's artifacts.
pub struct UploadOrchestrator {
    publisher: Arc<dyn AssetPublisher>,
    analyzer: Option<Arc<dyn Analyzer>>,
    ledger: Arc<UploadLedger>,
    config: UploadConfig,
}

impl UploadOrchestrator {
    pub fn new(
        publisher: Arc<dyn AssetPublisher>,
        analyzer: Option<Arc<dyn Analyzer>>,
        ledger: Arc<UploadLedger>,
        config: UploadConfig,
    ) -> Self {
        Self {
            publisher,
            analyzer,
            ledger,
            config,
        }
    }

    /// Republish every not-yet-claimed generation of a completed job.
    ///
    /// Claims happen synchronously up front; the per-generation futures
    /// then run concurrently via [`join_all`], each isolated -- one
    /// failure neither cancels nor affects its siblings. Failed uploads
    /// are counted, logged, and permanently not retried (their claims
    /// stand). A job with zero generations yields an informational
    /// summary with `total = 0`.
    pub async fn publish_job_outputs(&self, item: &QueueItem, job: &VideoJob) -> UploadSummary {
        // Claim-before-work: no await between filtering and claiming.
        let mut claimed: Vec<(u32, &Generation)> = Vec::new();
        let mut skipped = 0;
        for (index, generation) in job.generations.iter().enumerate() {
            if self.ledger.claim(&generation.id) {
                claimed.push((index as u32, generation));
            } else {
                skipped += 1;
            }
        }

        if job.generations.is_empty() {
            tracing::info!(job_id = %job.id, "Job succeeded with no generations; nothing to upload");
            return UploadSummary {
                job_id: job.id.clone(),
                uploaded: 0,
                failed: 0,
                skipped: 0,
                total: 0,
            };
        }

        let results = join_all(
            claimed
                .iter()
                .map(|(index, generation)| self.publish_one(item, job, *index, generation)),
        )
        .await;

        let uploaded = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - uploaded;

        tracing::info!(
            job_id = %job.id,
            uploaded,
            failed,
            skipped,
            total = job.generations.len(),
            "Upload handoff settled",
        );

        UploadSummary {
            job_id: job.id.clone(),
            uploaded,
            failed,
            skipped,
            total: job.generations.len(),
        }
    }

    /// Republish one generation; returns whether the upload succeeded.
    ///
    /// Analysis runs after the configured settling delay and is always
    /// non-fatal: the asset stays uploaded and the upload still counts as
    /// a success if analysis fails.
    async fn publish_one(
        &self,
        item: &QueueItem,
        job: &VideoJob,
        variant_index: u32,
        generation: &Generation,
    ) -> bool {
        let destination = naming::asset_filename(&generation.prompt, &generation.id);
        let metadata = AssetMetadata {
            job_id: job.id.clone(),
            generation_id: generation.id.clone(),
            prompt: generation.prompt.clone(),
            variant_index,
            variant_count: job.n_variants,
            width: job.width,
            height: job.height,
            duration_secs: job.n_seconds,
            folder: item.folder.clone(),
        };

        if let Err(e) = self
            .publisher
            .publish(&generation.id, &destination, &metadata)
            .await
        {
            tracing::error!(
                job_id = %job.id,
                generation_id = %generation.id,
                destination = %destination,
                error = %e,
                "Failed to republish generation",
            );
            return false;
        }

        tracing::info!(
            job_id = %job.id,
            generation_id = %generation.id,
            destination = %destination,
            "Generation republished",
        );

        if item.analyze {
            if let Some(analyzer) = &self.analyzer {
                tokio::time::sleep(self.config.analysis_settle).await;
                match analyzer.analyze(&destination).await {
                    Ok(result) => {
                        tracing::debug!(
                            destination = %destination,
                            tags = result.tags.len(),
                            "Analysis completed",
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            destination = %destination,
                            error = %e,
                            "Analysis failed; asset remains uploaded",
                        );
                    }
                }
            }
        }

        true
    }
}
