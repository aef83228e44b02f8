use serde::{Deserialize, Serialize};

use crate::status::JobStatus;
use crate::types::{DbId, Timestamp};

/// A poem source job as the backend reports it.
///
/// The client never mutates a job; only `status` changes, and only on the
/// server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub source_id: DbId,
    /// Location of the uploaded image.
    pub media_path: String,
    pub status: JobStatus,
    /// Not returned by the create endpoint, only by the history listing.
    pub created_at: Option<Timestamp>,
}
