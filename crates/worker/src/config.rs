use std::time::Duration;

/// Worker configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the generation studio API (default:
    /// `http://localhost:8000/api/v1`).
    pub api_url: String,
    /// Optional `api-key` header value sent with every request.
    pub api_key: Option<String>,
    /// Settling delay before post-upload analysis (default: `10` seconds).
    pub analysis_settle: Duration,
    /// Run content analysis after each republished artifact.
    pub analyze: bool,
    /// Destination gallery folder for republished artifacts.
    pub folder: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                        |
    /// |-------------------------|--------------------------------|
    /// | `API_URL`               | `http://localhost:8000/api/v1` |
    /// | `API_KEY`               | (unset)                        |
    /// | `ANALYSIS_SETTLE_SECS`  | `10`                           |
    /// | `ANALYZE`               | `false`                        |
    /// | `GALLERY_FOLDER`        | (unset)                        |
    pub fn from_env() -> Self {
        let api_url = std::env::var("API_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api/v1".into());

        let api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());

        let analysis_settle_secs: u64 = std::env::var("ANALYSIS_SETTLE_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("ANALYSIS_SETTLE_SECS must be a valid u64");

        let analyze = std::env::var("ANALYZE")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let folder = std::env::var("GALLERY_FOLDER").ok().filter(|f| !f.is_empty());

        Self {
            api_url,
            api_key,
            analysis_settle: Duration::from_secs(analysis_settle_secs),
            analyze,
            folder,
        }
    }
}
