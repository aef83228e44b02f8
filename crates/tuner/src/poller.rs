//! Status poller.
//!
//! Queries `GET /poem-source/{id}/ready` on a fixed interval until the job
//! reaches a terminal phase. Each query gets its own retry budget; a
//! failed query that recovers within the budget is invisible to callers.
//! Only exhaustion moves the job to [`ClientPhase::RetryExhausted`].

use std::time::Duration;

use poetscrew_core::retry::RetryPolicy;
use poetscrew_core::status::{ClientPhase, JobStatus};
use tokio::sync::broadcast;

use crate::api::TunerBackend;
use crate::events::TunerEvent;
use crate::retry::{run_with_retry, RetryOutcome};
use crate::view::JobView;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Tunables for the status poller.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between a `processing` answer and the next query.
    pub interval: Duration,
    /// Budget for each individual status query.
    pub retry: RetryPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::status_poll(),
        }
    }
}

/// Poll the job behind `view` until it settles or the view is torn down.
///
/// Returns the phase the view ended in. Terminal transitions emit exactly
/// one event each; polling stops as soon as any terminal phase is reached.
pub async fn poll_until_settled<B>(
    backend: &B,
    view: &JobView,
    config: &PollConfig,
    events: &broadcast::Sender<TunerEvent>,
) -> ClientPhase
where
    B: TunerBackend + ?Sized,
{
    let source_id = view.source_id();
    let cancel = view.cancel_token();
    let mut polls = 0u32;

    loop {
        if view.is_cancelled() || view.phase().is_terminal() {
            return view.phase();
        }

        if !view.is_visible() {
            tracing::debug!(source_id, "Polling paused while view is hidden");
        }
        if !view.wait_until_visible().await {
            return view.phase();
        }

        polls += 1;
        let outcome = run_with_retry(&config.retry, cancel, "status poll", || {
            backend.source_status(source_id)
        })
        .await;

        match outcome {
            RetryOutcome::Cancelled => return view.phase(),

            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                if view.advance_phase(ClientPhase::RetryExhausted) {
                    tracing::error!(
                        source_id,
                        attempts,
                        error = %last_error,
                        "Status polling exhausted its retry budget",
                    );
                    let _ = events.send(TunerEvent::PhaseChanged {
                        source_id,
                        phase: ClientPhase::RetryExhausted,
                    });
                    let _ = events.send(TunerEvent::StatusRetryExhausted {
                        source_id,
                        attempts,
                    });
                }
                return view.phase();
            }

            RetryOutcome::Completed(response) => {
                if response.poem_source_id != source_id {
                    tracing::warn!(
                        source_id,
                        reported_id = response.poem_source_id,
                        "Status response names a different source",
                    );
                }

                match response.status {
                    JobStatus::Processing => {
                        tracing::debug!(source_id, polls, "Job still processing");
                    }
                    JobStatus::Success => {
                        if view.advance_phase(ClientPhase::Success) {
                            tracing::info!(source_id, polls, "Job finished");
                            let _ = events.send(TunerEvent::PhaseChanged {
                                source_id,
                                phase: ClientPhase::Success,
                            });
                        }
                        return view.phase();
                    }
                    JobStatus::Error => {
                        if view.advance_phase(ClientPhase::Error) {
                            tracing::warn!(source_id, polls, "Backend reported job failure");
                            let _ = events.send(TunerEvent::PhaseChanged {
                                source_id,
                                phase: ClientPhase::Error,
                            });
                            let _ = events.send(TunerEvent::JobFailed { source_id });
                        }
                        return view.phase();
                    }
                }
            }
        }

        // Wait before the next query, respecting teardown.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return view.phase(),
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}
