//! Job lifecycle states.
//!
//! [`JobStatus`] is what the backend reports for a poem source. The
//! client tracks a richer [`ClientPhase`] because it must also represent
//! transport-level retry exhaustion, which the server knows nothing about.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Server-reported status of a poem source job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The job is still generating candidates.
    Processing,
    /// Candidates are ready to be fetched.
    Success,
    /// The job itself failed on the backend.
    Error,
}

impl JobStatus {
    /// Whether the backend will never move this job again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Processing)
    }

    /// Wire name, e.g. `"processing"`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClientPhase
// ---------------------------------------------------------------------------

/// Client-observed phase of a tracked job.
///
/// Phases are monotonic: `Processing` moves to exactly one terminal phase
/// and never leaves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientPhase {
    #[default]
    Processing,
    Success,
    /// The server reported that the job failed.
    Error,
    /// The client could not learn the job state within its retry budget.
    RetryExhausted,
}

impl ClientPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ClientPhase::Processing)
    }

    /// `true` for both server-reported failure and retry exhaustion.
    pub fn is_error(self) -> bool {
        matches!(self, ClientPhase::Error | ClientPhase::RetryExhausted)
    }

    pub fn is_retry_exhausted(self) -> bool {
        matches!(self, ClientPhase::RetryExhausted)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Only `Processing -> {Success, Error, RetryExhausted}` is allowed.
    pub fn can_transition_to(self, next: ClientPhase) -> bool {
        self == ClientPhase::Processing && next.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClientPhase::Processing => "processing",
            ClientPhase::Success => "success",
            ClientPhase::Error => "error",
            ClientPhase::RetryExhausted => "retry_exhausted",
        }
    }
}

impl From<JobStatus> for ClientPhase {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Processing => ClientPhase::Processing,
            JobStatus::Success => ClientPhase::Success,
            JobStatus::Error => ClientPhase::Error,
        }
    }
}

impl fmt::Display for ClientPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
