//! Events emitted by the tuner engine.
//!
//! Each event is sent at most once per state transition; the presentation
//! layer can turn the user notices into toasts without de-duplicating.

use poetscrew_core::status::ClientPhase;
use poetscrew_core::types::DbId;
use serde::Serialize;

/// A tuner-level event for one job (or one submission attempt).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TunerEvent {
    /// The upload was accepted and a job was created.
    SubmissionAccepted { source_id: DbId },

    /// The upload failed; no job exists and no polling will happen.
    SubmissionFailed { reason: String },

    /// The job reached a terminal phase.
    PhaseChanged { source_id: DbId, phase: ClientPhase },

    /// The backend reported that the job itself failed.
    JobFailed { source_id: DbId },

    /// The status endpoint could not be reached within the retry budget.
    StatusRetryExhausted { source_id: DbId, attempts: u32 },

    /// Candidates were fetched.
    ResultsReady { source_id: DbId, count: usize },

    /// The result endpoint could not be reached within the retry budget.
    ResultFetchExhausted { source_id: DbId, attempts: u32 },
}

impl TunerEvent {
    /// The job this event belongs to, if any.
    pub fn source_id(&self) -> Option<DbId> {
        match self {
            TunerEvent::SubmissionFailed { .. } => None,
            TunerEvent::SubmissionAccepted { source_id }
            | TunerEvent::PhaseChanged { source_id, .. }
            | TunerEvent::JobFailed { source_id }
            | TunerEvent::StatusRetryExhausted { source_id, .. }
            | TunerEvent::ResultsReady { source_id, .. }
            | TunerEvent::ResultFetchExhausted { source_id, .. } => Some(*source_id),
        }
    }

    /// Whether this event should be shown to the user as a notification.
    pub fn is_user_notice(&self) -> bool {
        matches!(
            self,
            TunerEvent::SubmissionAccepted { .. }
                | TunerEvent::SubmissionFailed { .. }
                | TunerEvent::JobFailed { .. }
                | TunerEvent::StatusRetryExhausted { .. }
                | TunerEvent::ResultFetchExhausted { .. }
        )
    }

    /// Whether the notice reports a failure (as opposed to success).
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TunerEvent::SubmissionFailed { .. }
                | TunerEvent::JobFailed { .. }
                | TunerEvent::StatusRetryExhausted { .. }
                | TunerEvent::ResultFetchExhausted { .. }
        )
    }
}
