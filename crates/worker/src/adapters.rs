//! REST client adapters for the queue's collaborator traits.
//!
//! One [`StudioAdapter`] wraps the shared [`StudioApi`] client and
//! implements all three port traits: job submission and status polling,
//! download-then-republish asset publishing, and content analysis.

use std::sync::Arc;

use async_trait::async_trait;
use vlab_client::{ApiError, StudioApi};
use vlab_core::types::{AnalysisResult, AssetMetadata, GenerationRequest, VideoJob};
use vlab_queue::{Analyzer, AssetPublisher, JobService, ServiceError, UnifiedCreation};

/// Map a transport-level error onto the queue's failure vocabulary.
///
/// The transient/definitive split must survive the mapping: timeouts and
/// connection failures stay retryable, API statuses carry through as-is.
fn map_err(err: ApiError) -> ServiceError {
    match err {
        ApiError::Request(e) if e.is_timeout() => ServiceError::Timeout(e.to_string()),
        ApiError::Request(e) => ServiceError::Network(e.to_string()),
        ApiError::Api { status, body } => ServiceError::Api {
            status,
            message: body,
        },
    }
}

pub struct StudioAdapter {
    api: Arc<StudioApi>,
}

impl StudioAdapter {
    pub fn new(api: Arc<StudioApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl JobService for StudioAdapter {
    async fn create_job(&self, request: &GenerationRequest) -> Result<VideoJob, ServiceError> {
        self.api.create_job(request).await.map_err(map_err)
    }

    async fn create_job_with_analysis(
        &self,
        request: &GenerationRequest,
    ) -> Result<UnifiedCreation, ServiceError> {
        let response = self
            .api
            .create_job_with_analysis(request)
            .await
            .map_err(map_err)?;
        Ok(UnifiedCreation {
            job: response.job,
            analysis_results: response.analysis_results,
        })
    }

    async fn get_job(&self, job_id: &str) -> Result<VideoJob, ServiceError> {
        self.api.get_job(job_id).await.map_err(map_err)
    }
}

#[async_trait]
impl AssetPublisher for StudioAdapter {
    /// Download the generation's video and re-upload it into the gallery.
    async fn publish(
        &self,
        generation_id: &str,
        destination_name: &str,
        metadata: &AssetMetadata,
    ) -> Result<(), ServiceError> {
        let content = self
            .api
            .download_generation(generation_id)
            .await
            .map_err(map_err)?;
        tracing::debug!(
            generation_id = %generation_id,
            bytes = content.len(),
            "Downloaded generation content",
        );

        self.api
            .upload_asset(destination_name, content, metadata, metadata.folder.as_deref())
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl Analyzer for StudioAdapter {
    async fn analyze(&self, destination_name: &str) -> Result<AnalysisResult, ServiceError> {
        self.api.analyze(destination_name).await.map_err(map_err)
    }
}
