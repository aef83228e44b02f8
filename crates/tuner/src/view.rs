//! Per-job view state.
//!
//! A [`JobView`] owns everything the engine knows about one poem source:
//! its [`ClientPhase`], the result [`FetchState`], the candidate selector,
//! and a visibility flag. The presentation layer reads it; the poller and
//! fetcher write it through crate-private methods.
//!
//! Every write first checks the view's [`CancellationToken`]. Once a job
//! has been abandoned, late responses and timers land as silent no-ops.

use poetscrew_core::candidate::{Candidate, CandidateSelector};
use poetscrew_core::error::CoreError;
use poetscrew_core::status::ClientPhase;
use poetscrew_core::types::DbId;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// FetchState / Settled
// ---------------------------------------------------------------------------

/// Lifecycle of the one-shot result fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    /// Not started (the job has not reached `success` yet).
    Idle,
    Loading,
    /// Candidates are cached for the lifetime of the view.
    Loaded,
    /// The retry budget was exhausted.
    Failed,
}

impl FetchState {
    fn can_transition_to(self, next: FetchState) -> bool {
        matches!(
            (self, next),
            (FetchState::Idle, FetchState::Loading)
                | (FetchState::Loading, FetchState::Loaded)
                | (FetchState::Loading, FetchState::Failed)
        )
    }
}

/// Final outcome of a tracked job, as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settled {
    /// Candidates are loaded and one is active (unless the set was empty).
    Completed,
    /// The backend reported a job failure.
    JobFailed,
    /// The status endpoint could not be reached.
    StatusUnavailable,
    /// The job succeeded but its candidates could not be fetched.
    ResultsUnavailable,
    /// The view was torn down before the job settled.
    Abandoned,
}

// ---------------------------------------------------------------------------
// JobView
// ---------------------------------------------------------------------------

/// Shared state for one tracked job.
#[derive(Debug)]
pub struct JobView {
    source_id: DbId,
    phase: watch::Sender<ClientPhase>,
    fetch: watch::Sender<FetchState>,
    selector: RwLock<CandidateSelector>,
    visible: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl JobView {
    /// Create a view in the `processing` phase, visible, owning `cancel`.
    pub fn new(source_id: DbId, cancel: CancellationToken) -> Self {
        let (phase, _) = watch::channel(ClientPhase::Processing);
        let (fetch, _) = watch::channel(FetchState::Idle);
        let (visible, _) = watch::channel(true);
        Self {
            source_id,
            phase,
            fetch,
            selector: RwLock::new(CandidateSelector::new()),
            visible,
            cancel,
        }
    }

    pub fn source_id(&self) -> DbId {
        self.source_id
    }

    // ---- status poller outputs ----

    pub fn phase(&self) -> ClientPhase {
        *self.phase.borrow()
    }

    pub fn is_error(&self) -> bool {
        self.phase().is_error()
    }

    pub fn is_retry_exhausted(&self) -> bool {
        self.phase().is_retry_exhausted()
    }

    /// Watch phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<ClientPhase> {
        self.phase.subscribe()
    }

    // ---- result fetcher outputs ----

    pub fn fetch_state(&self) -> FetchState {
        *self.fetch.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.fetch_state() == FetchState::Loading
    }

    /// Result fetch failure. Independent of [`is_error`](Self::is_error):
    /// a job can succeed while its results stay unavailable.
    pub fn is_fetch_error(&self) -> bool {
        self.fetch_state() == FetchState::Failed
    }

    /// Fetched candidates; empty until the fetch completes.
    pub async fn candidates(&self) -> Vec<Candidate> {
        self.selector.read().await.candidates().to_vec()
    }

    // ---- candidate selector ----

    pub async fn active_candidate(&self) -> Option<Candidate> {
        self.selector.read().await.active().cloned()
    }

    pub async fn active_candidate_id(&self) -> Option<DbId> {
        self.selector.read().await.active_id()
    }

    /// Make `id` the active candidate.
    ///
    /// Fails with [`CoreError::NotFound`] if `id` is not a fetched candidate.
    pub async fn select_candidate(&self, id: DbId) -> Result<(), CoreError> {
        self.selector.write().await.select(id)
    }

    // ---- visibility ----

    /// Pause (`false`) or resume (`true`) status polling for this job.
    pub fn set_visible(&self, visible: bool) {
        self.visible.send_if_modified(|current| {
            let changed = *current != visible;
            *current = visible;
            changed
        });
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    // ---- lifecycle ----

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until the job settles or the view is torn down.
    pub async fn wait_settled(&self) -> Settled {
        let mut phase_rx = self.phase.subscribe();
        let mut fetch_rx = self.fetch.subscribe();

        loop {
            if let Some(settled) = self.settled_now() {
                return settled;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return Settled::Abandoned,
                changed = phase_rx.changed() => {
                    if changed.is_err() {
                        return Settled::Abandoned;
                    }
                }
                changed = fetch_rx.changed() => {
                    if changed.is_err() {
                        return Settled::Abandoned;
                    }
                }
            }
        }
    }

    /// Current outcome, or `None` while the job is still in flight.
    pub fn settled_now(&self) -> Option<Settled> {
        match self.phase() {
            ClientPhase::Processing => None,
            ClientPhase::Error => Some(Settled::JobFailed),
            ClientPhase::RetryExhausted => Some(Settled::StatusUnavailable),
            ClientPhase::Success => match self.fetch_state() {
                FetchState::Loaded => Some(Settled::Completed),
                FetchState::Failed => Some(Settled::ResultsUnavailable),
                FetchState::Idle | FetchState::Loading => None,
            },
        }
    }

    // ---- crate-private writers ----

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Move to `next` if the transition is legal and the view is live.
    ///
    /// Returns `true` only for the one transition that actually happened,
    /// so callers can fire notifications on the edge.
    pub(crate) fn advance_phase(&self, next: ClientPhase) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.phase.send_if_modified(|phase| {
            if phase.can_transition_to(next) {
                *phase = next;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn set_fetch_state(&self, next: FetchState) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.fetch.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Hand the fetched list to the selector. Ignored after teardown or
    /// when a list is already held.
    pub(crate) async fn load_candidates(&self, candidates: Vec<Candidate>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.selector.write().await.load(candidates)
    }

    /// Wait until the view is visible. Returns `false` if it was torn
    /// down first.
    pub(crate) async fn wait_until_visible(&self) -> bool {
        let mut visible_rx = self.visible.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            visible = async { visible_rx.wait_for(|v| *v).await.is_ok() } => visible,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
