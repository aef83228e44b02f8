//! Generated poem candidates and the active-candidate selector.
//!
//! The backend returns several poems per source. Its critic may flag one
//! (or, in practice, none or several) as preferred; the first flagged
//! candidate in list order wins, otherwise the first candidate is used.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// One generated poem. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique within the candidate set of one job.
    pub id: DbId,
    pub text: String,
    /// Set by the backend critic.
    pub is_preferred: bool,
}

/// Pick the default candidate id: the first preferred one, else the first.
///
/// Returns `None` for an empty list.
pub fn default_candidate_id(candidates: &[Candidate]) -> Option<DbId> {
    candidates
        .iter()
        .find(|c| c.is_preferred)
        .or_else(|| candidates.first())
        .map(|c| c.id)
}

// ---------------------------------------------------------------------------
// CandidateSelector
// ---------------------------------------------------------------------------

/// Candidate list plus the single mutable `active_id`.
///
/// The list is append-never: once a non-empty list has been loaded,
/// further loads are ignored. The default selection runs exactly once, on
/// the empty -> non-empty transition.
#[derive(Debug, Clone, Default)]
pub struct CandidateSelector {
    candidates: Vec<Candidate>,
    active_id: Option<DbId>,
}

impl CandidateSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the fetched candidate set.
    ///
    /// Returns `true` if the list was accepted (the selector was empty).
    pub fn load(&mut self, candidates: Vec<Candidate>) -> bool {
        if !self.candidates.is_empty() {
            return false;
        }
        self.candidates = candidates;
        if self.active_id.is_none() {
            self.active_id = default_candidate_id(&self.candidates);
        }
        true
    }

    /// Make `id` the active candidate.
    ///
    /// Fails with [`CoreError::NotFound`] and leaves the selection untouched
    /// if `id` is not in the current list.
    pub fn select(&mut self, id: DbId) -> Result<(), CoreError> {
        if !self.candidates.iter().any(|c| c.id == id) {
            return Err(CoreError::NotFound {
                entity: "candidate",
                id,
            });
        }
        self.active_id = Some(id);
        Ok(())
    }

    pub fn active_id(&self) -> Option<DbId> {
        self.active_id
    }

    /// The active candidate, or `None` when nothing is loaded.
    pub fn active(&self) -> Option<&Candidate> {
        let id = self.active_id?;
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
