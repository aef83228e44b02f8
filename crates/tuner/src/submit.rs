//! Job submission.
//!
//! Uploads the source image (plus an optional enhance hint) in a single
//! multipart request. Success yields the new job id; any failure ends the
//! submission immediately, before a job exists and before any polling.

use std::path::Path;

use poetscrew_core::error::CoreError;
use poetscrew_core::types::DbId;
use poetscrew_core::upload::{detect_mime_type, normalize_enhance, validate_upload};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::api::TunerBackend;
use crate::events::TunerEvent;

// ---------------------------------------------------------------------------
// UploadRequest
// ---------------------------------------------------------------------------

/// An image ready to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Optional generation hint; blank hints are dropped.
    pub enhance: Option<String>,
}

/// Errors while preparing an upload from disk.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

impl UploadRequest {
    pub fn new(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        enhance: Option<&str>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime_type: mime_type.into(),
            enhance: normalize_enhance(enhance),
        }
    }

    /// Read an image from disk, sniffing its MIME type from the content,
    /// and validate it.
    pub async fn from_path(path: &Path, enhance: Option<&str>) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mime_type = detect_mime_type(&bytes).ok_or_else(|| {
            CoreError::Validation(format!("{} is not a recognised image", path.display()))
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let request = Self::new(file_name, bytes, mime_type, enhance);
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_upload(&self.mime_type, self.bytes.len(), self.enhance.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted { source_id: DbId },
    Rejected { reason: String },
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }

    /// The created job id, only present on success.
    pub fn job_id(&self) -> Option<DbId> {
        match self {
            SubmitOutcome::Accepted { source_id } => Some(*source_id),
            SubmitOutcome::Rejected { .. } => None,
        }
    }
}

/// Observable state of the submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SubmissionPhase {
    Idle,
    Uploading,
    Accepted { source_id: DbId },
    Failed,
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Upload `upload` and report the outcome.
///
/// Emits exactly one of [`TunerEvent::SubmissionAccepted`] or
/// [`TunerEvent::SubmissionFailed`]. Uploads are never retried: a failed
/// upload means no job exists, and only a resubmission recovers.
pub async fn submit_source<B>(
    backend: &B,
    upload: &UploadRequest,
    events: &broadcast::Sender<TunerEvent>,
) -> SubmitOutcome
where
    B: TunerBackend + ?Sized,
{
    if let Err(e) = upload.validate() {
        return reject(events, e.to_string());
    }

    match backend.create_source(upload).await {
        Ok(created) => {
            tracing::info!(
                source_id = created.id,
                media_path = %created.media_path,
                status = %created.status,
                "Poem source created",
            );
            let _ = events.send(TunerEvent::SubmissionAccepted {
                source_id: created.id,
            });
            SubmitOutcome::Accepted {
                source_id: created.id,
            }
        }
        Err(e) => reject(events, e.to_string()),
    }
}

fn reject(events: &broadcast::Sender<TunerEvent>, reason: String) -> SubmitOutcome {
    tracing::warn!(reason = %reason, "Submission failed");
    let _ = events.send(TunerEvent::SubmissionFailed {
        reason: reason.clone(),
    });
    SubmitOutcome::Rejected { reason }
}
