//! REST API client for the generation backend HTTP endpoints.
//!
//! Wraps job submission (plain and unified create+analyze), status
//! retrieval, generation content download, gallery multipart upload, and
//! the analysis endpoint using [`reqwest`].

use serde::Deserialize;
use vlab_core::types::{AnalysisResult, AssetMetadata, GenerationRequest, VideoJob};

/// HTTP client for a single generation backend.
pub struct StudioApi {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

/// Response returned by the unified create+analyze endpoint.
///
/// When the unified path succeeds the backend has already republished and
/// analyzed every generation; `analysis_results` is `None` when analysis
/// was not requested.
#[derive(Debug, Deserialize)]
pub struct JobWithAnalysis {
    pub job: VideoJob,
    pub analysis_results: Option<Vec<AnalysisResult>>,
}

/// Envelope for the job-list endpoint.
#[derive(Debug, Deserialize)]
struct JobListResponse {
    data: Vec<VideoJob>,
}

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ApiError {
    /// Whether the failure is worth retrying on a later poll sweep.
    ///
    /// Timeouts and connection-level failures are transient, as are
    /// gateway/availability statuses (408, 429, 5xx) and bodies that wrap
    /// upstream retry exhaustion. Everything else -- notably 4xx like
    /// "job not found" -- is definitive.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, body } => {
                matches!(status, 408 | 429) || *status >= 500 || body.contains("max retries")
            }
        }
    }
}

impl StudioApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000/api/v1`.
    /// * `api_key` - Optional `api-key` header value.
    pub fn new(api_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, api_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            api_url,
            api_key,
        }
    }

    /// Submit a generation job.
    ///
    /// Sends `POST /videos/jobs`. Returns the server-side job snapshot
    /// including its assigned id.
    pub async fn create_job(&self, request: &GenerationRequest) -> Result<VideoJob, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/videos/jobs")
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Submit a generation job on the unified create+analyze path.
    ///
    /// Sends `POST /videos/jobs/with-analysis`. The backend generates,
    /// republishes, and (if requested) analyzes in a single call, so a
    /// successful response needs no further polling.
    pub async fn create_job_with_analysis(
        &self,
        request: &GenerationRequest,
    ) -> Result<JobWithAnalysis, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/videos/jobs/with-analysis")
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current snapshot of a job.
    ///
    /// Sends `GET /videos/jobs/{job_id}`.
    pub async fn get_job(&self, job_id: &str) -> Result<VideoJob, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/videos/jobs/{job_id}"))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// List recent jobs, newest first.
    ///
    /// Sends `GET /videos/jobs?limit={limit}`.
    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<VideoJob>, ApiError> {
        let response = self
            .request(reqwest::Method::GET, "/videos/jobs")
            .query(&[("limit", limit)])
            .send()
            .await?;

        let list: JobListResponse = Self::parse_response(response).await?;
        Ok(list.data)
    }

    /// Delete a job on the remote side.
    ///
    /// Sends `DELETE /videos/jobs/{job_id}`. Removing a job does not touch
    /// assets that were already republished.
    pub async fn delete_job(&self, job_id: &str) -> Result<(), ApiError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/videos/jobs/{job_id}"))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Download the video content of a generation.
    ///
    /// Sends `GET /videos/generations/{generation_id}/content` and buffers
    /// the full body.
    pub async fn download_generation(&self, generation_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/videos/generations/{generation_id}/content"),
            )
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Upload an asset into the gallery.
    ///
    /// Sends `POST /gallery/upload` as multipart form data: the file
    /// bytes, the media type, JSON-encoded metadata, and the optional
    /// destination folder.
    pub async fn upload_asset(
        &self,
        file_name: &str,
        content: Vec<u8>,
        metadata: &AssetMetadata,
        folder: Option<&str>,
    ) -> Result<(), ApiError> {
        let metadata_json =
            serde_json::to_string(metadata).map_err(|e| ApiError::Api {
                status: 0,
                body: format!("metadata serialization failed: {e}"),
            })?;

        let file_part = reqwest::multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("video/mp4")?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("media_type", "video")
            .text("metadata", metadata_json);
        if let Some(folder) = folder {
            form = form.text("folder_path", folder.to_string());
        }

        let response = self
            .request(reqwest::Method::POST, "/gallery/upload")
            .multipart(form)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Run content analysis on a republished asset.
    ///
    /// Sends `POST /videos/analyze` with the asset's gallery path. The
    /// backend also persists the result as asset metadata.
    pub async fn analyze(&self, video_path: &str) -> Result<AnalysisResult, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/videos/analyze")
            .json(&serde_json::json!({ "video_path": video_path }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Build a request with the base URL and the `api-key` header applied.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.api_url));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or an [`ApiError::Api`] containing
    /// the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
