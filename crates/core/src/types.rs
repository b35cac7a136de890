//! Remote job vocabulary and request/response DTOs.
//!
//! The remote video generation service reports its own status strings;
//! [`JobStatus`] captures that vocabulary verbatim (with an [`Unknown`]
//! fallback for forward compatibility). Queue-local item state lives in
//! the queue crate -- the two vocabularies are deliberately distinct and
//! mapped by the poller.
//!
//! [`Unknown`]: JobStatus::Unknown

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Status of a remote generation job, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Preprocessing,
    Running,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    /// Any status string this client does not recognize.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the remote job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// One produced output artifact of a generation job.
///
/// The `id` is unique for the lifetime of the remote service and is the
/// deduplication key for republishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub id: String,
    /// Id of the job that produced this generation.
    pub job_id: String,
    /// Prompt the generation was produced from.
    pub prompt: String,
}

/// Read-only snapshot of a remote generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: String,
    pub status: JobStatus,
    pub prompt: String,
    pub n_variants: u32,
    pub n_seconds: u32,
    pub height: u32,
    pub width: u32,
    /// Unix timestamp (seconds) of job creation on the remote side.
    pub created_at: Option<i64>,
    /// Unix timestamp (seconds) of job completion, if finished.
    pub finished_at: Option<i64>,
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub generations: Vec<Generation>,
}

/// Parameters for submitting a new generation job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    #[validate(range(min = 1, max = 4))]
    pub n_variants: u32,
    pub n_seconds: u32,
    pub height: u32,
    pub width: u32,
}

impl GenerationRequest {
    /// Request with service defaults (1 variant, 10 seconds, 1280x720).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            n_variants: 1,
            n_seconds: 10,
            height: 720,
            width: 1280,
        }
    }
}

/// Structured content-analysis result for a republished asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub products: String,
    pub tags: Vec<String>,
    pub feedback: String,
}

/// Metadata attached to an asset when it is republished into the gallery.
///
/// Assembled per generation by the upload orchestrator. Analysis results
/// are not carried here: the analyze endpoint persists them as asset
/// metadata on the remote side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Id of the source generation job.
    pub job_id: String,
    /// Id of the generation this asset was produced from.
    pub generation_id: String,
    pub prompt: String,
    /// Zero-based index of this variant within the job.
    pub variant_index: u32,
    /// Total number of variants the job produced.
    pub variant_count: u32,
    /// Original pixel dimensions of the generated video.
    pub width: u32,
    pub height: u32,
    /// Original duration in seconds.
    pub duration_secs: u32,
    /// Destination folder in the gallery, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}
