//! Result fetcher.
//!
//! Fetches the candidate poems for a job once the poller has seen
//! `success`. The fetch is one-shot: candidates never change after a job
//! succeeds, so a loaded set is cached for the lifetime of the view.

use poetscrew_core::candidate::Candidate;
use poetscrew_core::retry::RetryPolicy;
use poetscrew_core::status::ClientPhase;
use tokio::sync::broadcast;

use crate::api::TunerBackend;
use crate::events::TunerEvent;
use crate::retry::{run_with_retry, RetryOutcome};
use crate::view::{FetchState, JobView};

/// What a call to [`fetch_results`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The job has not reached `success`; no request was made.
    Gated,
    /// Candidates were already loaded; no request was made.
    Cached,
    /// Another fetch is in flight, or an earlier one already failed.
    Skipped,
    /// Candidates were fetched and handed to the selector.
    Loaded { count: usize },
    /// The retry budget ran out.
    Failed,
    /// The view was torn down mid-fetch.
    Cancelled,
}

/// Fetch the candidates for the job behind `view`.
pub async fn fetch_results<B>(
    backend: &B,
    view: &JobView,
    policy: &RetryPolicy,
    events: &broadcast::Sender<TunerEvent>,
) -> FetchOutcome
where
    B: TunerBackend + ?Sized,
{
    let source_id = view.source_id();

    if view.phase() != ClientPhase::Success {
        tracing::debug!(source_id, phase = %view.phase(), "Result fetch gated on job success");
        return FetchOutcome::Gated;
    }
    match view.fetch_state() {
        FetchState::Loaded => return FetchOutcome::Cached,
        FetchState::Loading | FetchState::Failed => return FetchOutcome::Skipped,
        FetchState::Idle => {}
    }
    if !view.set_fetch_state(FetchState::Loading) {
        return if view.is_cancelled() {
            FetchOutcome::Cancelled
        } else {
            FetchOutcome::Skipped
        };
    }

    let outcome = run_with_retry(policy, view.cancel_token(), "result fetch", || {
        backend.poems(source_id)
    })
    .await;

    match outcome {
        RetryOutcome::Cancelled => FetchOutcome::Cancelled,

        RetryOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            if view.set_fetch_state(FetchState::Failed) {
                tracing::error!(
                    source_id,
                    attempts,
                    error = %last_error,
                    "Result fetch exhausted its retry budget",
                );
                let _ = events.send(TunerEvent::ResultFetchExhausted {
                    source_id,
                    attempts,
                });
                FetchOutcome::Failed
            } else {
                FetchOutcome::Cancelled
            }
        }

        RetryOutcome::Completed(records) => {
            let candidates: Vec<Candidate> = records.into_iter().map(Candidate::from).collect();
            let count = candidates.len();

            if !view.load_candidates(candidates).await {
                return FetchOutcome::Cancelled;
            }
            if !view.set_fetch_state(FetchState::Loaded) {
                return FetchOutcome::Cancelled;
            }

            tracing::info!(source_id, count, "Candidates loaded");
            let _ = events.send(TunerEvent::ResultsReady { source_id, count });
            FetchOutcome::Loaded { count }
        }
    }
}
