//! HTTP client for the emotion-detection backend
//!
//! Thin typed wrapper over the backend's small JSON API: detection status,
//! random asset selection, video-loop state, snapshot fetch, and the two
//! notification endpoints. All calls share one `reqwest::Client` with a
//! configured timeout.

use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::coordinator::state::{DetectionSnapshot, EmotionLabel};

/// Default detection server address
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default timeout for API requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Wire form of `/detection_status`
#[derive(Debug, Deserialize)]
struct DetectionStatusResponse {
    #[serde(default)]
    detected: bool,
    #[serde(default)]
    emotion: String,
    #[serde(default)]
    forced_video: Option<String>,
    #[serde(default)]
    restart_requested: bool,
    #[serde(default)]
    looping: bool,
}

/// Wire form of `/get_random_audio` and `/get_random_video`
#[derive(Debug, Deserialize)]
struct AssetResponse {
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
}

/// Wire form of `/get_video_loop_state`
#[derive(Debug, Deserialize)]
struct LoopStateResponse {
    #[serde(default)]
    looping: bool,
}

/// Error types for backend operations
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// HTTP client for the detection backend
///
/// Cheap to clone; the inner `reqwest::Client` is already reference-counted.
#[derive(Debug, Clone)]
pub struct DetectionClient {
    base_url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for DetectionClient {
    fn default() -> Self {
        Self::with_config(DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS)
            .unwrap_or_else(|_| unreachable!("default base URL is valid"))
    }
}

impl DetectionClient {
    /// Create a client for the given base URL with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Self::with_config(base_url, DEFAULT_TIMEOUT_SECS)
    }

    /// Create a client with full configuration.
    pub fn with_config(base_url: &str, timeout_secs: u64) -> Result<Self, BackendError> {
        let base_url =
            Url::parse(base_url).map_err(|e| BackendError::InvalidUrl(e.to_string()))?;
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    /// The configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve a possibly-relative asset URL against the backend base URL.
    pub fn resolve_asset(&self, asset: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(asset)
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(e.to_string()))
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.as_secs())
        } else {
            BackendError::ConnectionFailed(e.to_string())
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: Url,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(BackendError::ServerError { status, message });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    /// Fetch the current detection status as a normalized snapshot.
    ///
    /// The `looping` field of the payload seeds `loop_active`; the poller may
    /// overwrite it from the dedicated loop-state endpoint.
    pub async fn detection_status(&self) -> Result<DetectionSnapshot, BackendError> {
        let url = self.endpoint("/detection_status")?;
        let status: DetectionStatusResponse = self.get_json(url).await?;

        Ok(DetectionSnapshot {
            detected: status.detected,
            emotion: EmotionLabel::parse(&status.emotion),
            forced_video: status.forced_video.filter(|s| !s.is_empty()),
            restart_requested: status.restart_requested,
            loop_active: status.looping,
        })
    }

    /// Fetch the dedicated video-loop flag.
    pub async fn video_loop_state(&self) -> Result<bool, BackendError> {
        let url = self.endpoint("/get_video_loop_state")?;
        let state: LoopStateResponse = self.get_json(url).await?;
        Ok(state.looping)
    }

    /// Select a random voice line for the given emotion bucket.
    ///
    /// `None` means the backend has no recording for that bucket.
    pub async fn random_audio(
        &self,
        bucket: EmotionLabel,
    ) -> Result<Option<String>, BackendError> {
        let mut url = self.endpoint("/get_random_audio")?;
        url.query_pairs_mut()
            .append_pair("emotion", bucket.as_str());
        let asset: AssetResponse = self.get_json(url).await?;
        Ok(asset.audio_url.filter(|s| !s.is_empty()))
    }

    /// Select a random interlude video.
    pub async fn random_video(&self) -> Result<Option<String>, BackendError> {
        let url = self.endpoint("/get_random_video")?;
        let asset: AssetResponse = self.get_json(url).await?;
        Ok(asset.video_url.filter(|s| !s.is_empty()))
    }

    /// Fetch the frozen detection snapshot image.
    ///
    /// A millisecond cache-buster is appended so intermediaries never serve a
    /// previous interaction's frame.
    pub async fn snapshot(&self) -> Result<Vec<u8>, BackendError> {
        let mut url = self.endpoint("/snapshot")?;
        url.set_query(Some(&chrono::Utc::now().timestamp_millis().to_string()));

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(BackendError::ServerError {
                status,
                message: "snapshot fetch failed".to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Download an asset's raw bytes, resolving relative paths against the base URL.
    pub async fn fetch_asset(&self, asset: &str) -> Result<Vec<u8>, BackendError> {
        let url = self.resolve_asset(asset)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(BackendError::ServerError {
                status,
                message: format!("asset fetch failed: {}", asset),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Notify the backend that a special event is starting. Fire-and-forget;
    /// the response body is ignored.
    pub async fn trigger_special_event(&self) -> Result<(), BackendError> {
        let url = self.endpoint("/trigger_special_event")?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(BackendError::ServerError {
                status,
                message: "special event trigger rejected".to_string(),
            });
        }
        Ok(())
    }

    /// Tell the backend to reset server-side detection state.
    pub async fn restart(&self) -> Result<(), BackendError> {
        let url = self.endpoint("/restart")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(BackendError::ServerError {
                status,
                message: "restart rejected".to_string(),
            });
        }
        Ok(())
    }
}
