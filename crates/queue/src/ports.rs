//! Contracts for the remote collaborators the queue depends on.
//!
//! The queue never talks HTTP directly; it is handed implementations of
//! these traits (the worker binary adapts the real REST client onto them,
//! tests use scripted in-memory fakes).

use async_trait::async_trait;
use vlab_core::types::{AnalysisResult, AssetMetadata, GenerationRequest, VideoJob};

/// Errors surfaced by collaborator operations.
///
/// The variants mirror the failure modes the poller distinguishes:
/// infrastructure trouble worth retrying on the next sweep versus
/// definitive API answers that terminate an item.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// The call did not complete in time.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (DNS, refused, reset, unreachable).
    #[error("network error: {0}")]
    Network(String),

    /// The remote service answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Whether the failure is worth retrying on a later sweep.
    ///
    /// Timeouts and network failures are transient, as are throttling and
    /// server-side statuses (408, 429, 5xx) and retry-exhaustion
    /// messages. Definitive API answers (4xx such as "job not found")
    /// are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Api { status, message } => {
                matches!(status, 408 | 429) || *status >= 500 || message.contains("max retries")
            }
            Self::Other(_) => false,
        }
    }
}

/// Result of the unified create+analyze submission path.
///
/// On this path the backend republishes and analyzes the outputs itself;
/// a successful response needs no polling or uploading on our side.
#[derive(Debug, Clone)]
pub struct UnifiedCreation {
    pub job: VideoJob,
    pub analysis_results: Option<Vec<AnalysisResult>>,
}

/// Remote job submission and status retrieval.
///
/// Neither creation call is retried internally; retry policy belongs to
/// the caller of `enqueue`.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a generation job. Returns the server-side snapshot with its
    /// assigned id.
    async fn create_job(&self, request: &GenerationRequest) -> Result<VideoJob, ServiceError>;

    /// Submit a job on the unified generate+analyze path.
    async fn create_job_with_analysis(
        &self,
        request: &GenerationRequest,
    ) -> Result<UnifiedCreation, ServiceError>;

    /// Fetch the current snapshot of a job by id.
    async fn get_job(&self, job_id: &str) -> Result<VideoJob, ServiceError>;
}

/// Download-then-republish of one generation into the durable asset store.
#[async_trait]
pub trait AssetPublisher: Send + Sync {
    /// Fetch the generation's source artifact and write it into the asset
    /// store under `destination_name`, attaching `metadata`.
    async fn publish(
        &self,
        generation_id: &str,
        destination_name: &str,
        metadata: &AssetMetadata,
    ) -> Result<(), ServiceError>;
}

/// Content analysis of a republished asset.
///
/// Implementations are expected to also persist the result as asset
/// metadata on the remote side.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, destination_name: &str) -> Result<AnalysisResult, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_network_failures_are_transient() {
        assert!(ServiceError::Timeout("10s".into()).is_transient());
        assert!(ServiceError::Network("connection reset".into()).is_transient());
    }

    #[test]
    fn not_found_is_definitive() {
        let err = ServiceError::Api {
            status: 404,
            message: "job not found".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn server_side_statuses_are_transient() {
        for status in [408, 429, 500, 503] {
            let err = ServiceError::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "status {status}");
        }
    }

    #[test]
    fn retry_exhaustion_message_is_transient() {
        let err = ServiceError::Api {
            status: 400,
            message: "max retries exceeded".into(),
        };
        assert!(err.is_transient());
    }
}
