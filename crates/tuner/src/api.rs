//! REST client for the poem backend.
//!
//! [`TunerBackend`] is the seam the engine talks to; [`TunerApi`] is the
//! [`reqwest`] implementation used in production. Every request carries the
//! optional bearer token and a bounded timeout.

use std::time::Duration;

use async_trait::async_trait;
use poetscrew_core::candidate::Candidate;
use poetscrew_core::job::Job;
use poetscrew_core::retry::Retryable;
use poetscrew_core::status::JobStatus;
use poetscrew_core::types::{DbId, Timestamp};
use serde::Deserialize;

use crate::submit::UploadRequest;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response of `POST /poem-source`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCreated {
    /// Server-assigned poem source id (the job id).
    pub id: DbId,
    pub media_path: String,
    pub status: JobStatus,
}

/// Response of `GET /poem-source/{id}/ready`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub ready: bool,
    pub status: JobStatus,
    pub poem_source_id: DbId,
}

/// One entry of `GET /poems/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoemRecord {
    pub id: DbId,
    pub poem: String,
    #[serde(default)]
    pub critic_choice: bool,
}

impl From<PoemRecord> for Candidate {
    fn from(record: PoemRecord) -> Self {
        Candidate {
            id: record.id,
            text: record.poem,
            is_preferred: record.critic_choice,
        }
    }
}

/// The poems endpoint answers either with a bare array or wrapped in a
/// `{"data": [...]}` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PoemsPayload {
    List(Vec<PoemRecord>),
    Envelope {
        #[serde(default)]
        data: Option<Vec<PoemRecord>>,
    },
}

impl PoemsPayload {
    pub fn into_records(self) -> Vec<PoemRecord> {
        match self {
            PoemsPayload::List(records) => records,
            PoemsPayload::Envelope { data } => data.unwrap_or_default(),
        }
    }
}

/// One entry of `GET /poem-sources`.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRecord {
    pub id: DbId,
    pub media_path: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
}

impl From<SourceRecord> for Job {
    fn from(record: SourceRecord) -> Self {
        Job {
            source_id: record.id,
            media_path: record.media_path,
            status: record.status,
            created_at: Some(record.created_at),
        }
    }
}

/// Error body shape used by the backend (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from the backend REST layer.
#[derive(Debug, thiserror::Error)]
pub enum TunerApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// `detail` from the error body when present, else the raw body.
        body: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Retryable for TunerApiError {
    fn is_retryable(&self) -> bool {
        match self {
            TunerApiError::Request(e) => !e.is_builder(),
            TunerApiError::ApiError { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TunerApiError::Decode(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Operations the engine needs from the backend.
#[async_trait]
pub trait TunerBackend: Send + Sync {
    /// `POST /poem-source` (multipart upload).
    async fn create_source(&self, upload: &UploadRequest) -> Result<SourceCreated, TunerApiError>;

    /// `GET /poem-source/{id}/ready`.
    async fn source_status(&self, source_id: DbId) -> Result<StatusResponse, TunerApiError>;

    /// `GET /poems/{id}`.
    async fn poems(&self, source_id: DbId) -> Result<Vec<PoemRecord>, TunerApiError>;

    /// `GET /poem-sources`.
    async fn list_sources(&self) -> Result<Vec<SourceRecord>, TunerApiError>;
}

// ---------------------------------------------------------------------------
// TunerApi
// ---------------------------------------------------------------------------

/// HTTP client for the poem backend.
pub struct TunerApi {
    client: reqwest::Client,
    api_url: String,
    access_token: Option<String>,
}

impl TunerApi {
    /// Create a client with a per-request `timeout`.
    ///
    /// * `api_url` - Base URL including the version prefix, e.g.
    ///   `http://host:8000/api/v1`.
    pub fn new(
        api_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TunerApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, access_token))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            access_token,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Absolute URL for an endpoint path starting with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    // ---- private helpers ----

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Ensure the response has a success status code, turning failures
    /// into [`TunerApiError::ApiError`].
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TunerApiError> {
        let status = response.status();
        if !status.is_success() {
            let raw = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TunerApiError::ApiError {
                status: status.as_u16(),
                body: error_detail(&raw),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TunerApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, TunerApiError> {
        let response = self
            .authorize(self.client.get(self.endpoint(path)))
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl TunerBackend for TunerApi {
    async fn create_source(&self, upload: &UploadRequest) -> Result<SourceCreated, TunerApiError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)?;
        let mut form = reqwest::multipart::Form::new().part("file", part);
        if let Some(enhance) = &upload.enhance {
            form = form.text("enhance", enhance.clone());
        }

        let response = self
            .authorize(self.client.post(self.endpoint(&poem_source_path())))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn source_status(&self, source_id: DbId) -> Result<StatusResponse, TunerApiError> {
        self.get_json(&source_status_path(source_id)).await
    }

    async fn poems(&self, source_id: DbId) -> Result<Vec<PoemRecord>, TunerApiError> {
        let payload: PoemsPayload = self.get_json(&poems_path(source_id)).await?;
        Ok(payload.into_records())
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>, TunerApiError> {
        self.get_json(&poem_sources_path()).await
    }
}

// ---------------------------------------------------------------------------
// Endpoint paths
// ---------------------------------------------------------------------------

pub fn poem_source_path() -> String {
    "/poem-source".to_string()
}

pub fn source_status_path(source_id: DbId) -> String {
    format!("/poem-source/{source_id}/ready")
}

pub fn poems_path(source_id: DbId) -> String {
    format!("/poems/{source_id}")
}

pub fn poem_sources_path() -> String {
    "/poem-sources".to_string()
}

/// Pull `detail` out of a JSON error body, falling back to the raw text.
fn error_detail(raw: &str) -> String {
    match serde_json::from_str::<ErrorBody>(raw) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) => detail,
        Ok(ErrorBody {
            detail: Some(other),
        }) => other.to_string(),
        _ => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
