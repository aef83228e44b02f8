//! Job tracker: the keyed table of live jobs.
//!
//! [`JobTracker`] is the entry point of the engine. It submits uploads,
//! and for every job id it tracks it owns one [`JobView`] plus a lifecycle
//! task (poll, then fetch) running under a child cancellation token.
//! Jobs are independent: there is no state shared between entries.
//!
//! Events are broadcast via a [`tokio::sync::broadcast`] channel. Call
//! [`JobTracker::subscribe`] to receive them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use poetscrew_core::job::Job;
use poetscrew_core::retry::RetryPolicy;
use poetscrew_core::status::ClientPhase;
use poetscrew_core::types::DbId;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{TunerApi, TunerApiError, TunerBackend};
use crate::config::TunerConfig;
use crate::events::TunerEvent;
use crate::fetcher::fetch_results;
use crate::poller::{poll_until_settled, PollConfig};
use crate::submit::{submit_source, SubmissionPhase, SubmitOutcome, UploadRequest};
use crate::view::JobView;

/// Broadcast channel capacity for tuner events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`JobTracker::shutdown`] waits for each lifecycle task.
const SHUTDOWN_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing and retry settings for tracked jobs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll: PollConfig,
    pub result_retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            result_retry: RetryPolicy::result_fetch(),
        }
    }
}

impl From<&TunerConfig> for TrackerConfig {
    fn from(config: &TunerConfig) -> Self {
        Self {
            poll: config.poll.clone(),
            result_retry: config.result_retry.clone(),
        }
    }
}

/// Internal bookkeeping for one tracked job.
struct TrackedJob {
    view: Arc<JobView>,
    task_handle: tokio::task::JoinHandle<()>,
}

/// Tracks any number of jobs against one backend.
///
/// Created once via [`JobTracker::new`]; the returned `Arc` can be cloned
/// freely.
///
/// Entries stay in the table after their job settles, so callers can look
/// the view up again. Long-lived callers drop them with
/// [`abandon`](Self::abandon) or [`evict_settled`](Self::evict_settled).
pub struct JobTracker {
    backend: Arc<dyn TunerBackend>,
    config: TrackerConfig,
    jobs: RwLock<HashMap<DbId, TrackedJob>>,
    submission: watch::Sender<SubmissionPhase>,
    event_tx: broadcast::Sender<TunerEvent>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobTracker {
    pub fn new(backend: Arc<dyn TunerBackend>, config: TrackerConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (submission, _) = watch::channel(SubmissionPhase::Idle);
        Arc::new(Self {
            backend,
            config,
            jobs: RwLock::new(HashMap::new()),
            submission,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a tracker talking to the HTTP backend described by `config`.
    pub fn from_config(config: &TunerConfig) -> Result<Arc<Self>, TunerApiError> {
        let api = TunerApi::new(
            config.api_url.clone(),
            config.access_token.clone(),
            config.request_timeout,
        )?;
        Ok(Self::new(Arc::new(api), TrackerConfig::from(config)))
    }

    /// Subscribe to tuner events.
    pub fn subscribe(&self) -> broadcast::Receiver<TunerEvent> {
        self.event_tx.subscribe()
    }

    // ---- submission ----

    /// Current state of the submission flow.
    pub fn submission_phase(&self) -> SubmissionPhase {
        *self.submission.borrow()
    }

    pub fn subscribe_submission(&self) -> watch::Receiver<SubmissionPhase> {
        self.submission.subscribe()
    }

    /// Upload an image and, on success, start tracking the new job.
    ///
    /// On failure no job is tracked and the submission phase becomes
    /// [`SubmissionPhase::Failed`]; a later resubmission starts over and
    /// never reuses an earlier id.
    pub async fn submit(&self, upload: &UploadRequest) -> SubmitOutcome {
        self.submission.send_replace(SubmissionPhase::Uploading);

        let outcome = submit_source(self.backend.as_ref(), upload, &self.event_tx).await;

        match &outcome {
            SubmitOutcome::Accepted { source_id } => {
                self.track(*source_id).await;
                self.submission.send_replace(SubmissionPhase::Accepted {
                    source_id: *source_id,
                });
            }
            SubmitOutcome::Rejected { .. } => {
                self.submission.send_replace(SubmissionPhase::Failed);
            }
        }

        outcome
    }

    // ---- job table ----

    /// Start tracking `source_id` from scratch.
    ///
    /// An existing entry for the same id is torn down and replaced, so its
    /// late responses cannot touch the new view.
    pub async fn track(&self, source_id: DbId) -> Arc<JobView> {
        let view = Arc::new(JobView::new(source_id, self.cancel.child_token()));

        let backend = Arc::clone(&self.backend);
        let task_view = Arc::clone(&view);
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();

        let task_handle = tokio::spawn(async move {
            tracing::info!(source_id, "Starting job lifecycle task");
            run_job(backend.as_ref(), &task_view, &config, &event_tx).await;
            tracing::info!(source_id, phase = %task_view.phase(), "Job lifecycle task exited");
        });

        let previous = self.jobs.write().await.insert(
            source_id,
            TrackedJob {
                view: Arc::clone(&view),
                task_handle,
            },
        );
        if let Some(previous) = previous {
            tracing::info!(source_id, "Restarting tracked job");
            previous.view.cancel();
        }

        view
    }

    /// The view for a tracked job.
    pub async fn view(&self, source_id: DbId) -> Option<Arc<JobView>> {
        self.jobs
            .read()
            .await
            .get(&source_id)
            .map(|job| Arc::clone(&job.view))
    }

    /// Ids of all tracked jobs, in ascending order.
    pub async fn tracked_ids(&self) -> Vec<DbId> {
        let mut ids: Vec<DbId> = self.jobs.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Stop tracking a job. Pending timers and in-flight requests for it
    /// are invalidated. Returns `false` if the id was not tracked.
    pub async fn abandon(&self, source_id: DbId) -> bool {
        let removed = self.jobs.write().await.remove(&source_id);
        match removed {
            Some(job) => {
                tracing::info!(source_id, "Abandoning tracked job");
                job.view.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop every entry whose job has settled. Returns the evicted ids in
    /// ascending order.
    ///
    /// Evicted views are not cancelled; holders of an `Arc<JobView>` keep
    /// reading the final state.
    pub async fn evict_settled(&self) -> Vec<DbId> {
        let mut jobs = self.jobs.write().await;
        let mut evicted: Vec<DbId> = jobs
            .iter()
            .filter(|(_, job)| job.view.settled_now().is_some())
            .map(|(source_id, _)| *source_id)
            .collect();
        evicted.sort_unstable();

        for source_id in &evicted {
            jobs.remove(source_id);
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "Evicted settled jobs");
        }
        evicted
    }

    /// List the user's poem sources.
    pub async fn list_sources(&self) -> Result<Vec<Job>, TunerApiError> {
        let records = self.backend.list_sources().await?;
        Ok(records.into_iter().map(Job::from).collect())
    }

    /// Cancel every job and wait briefly for their tasks to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job tracker");
        self.cancel.cancel();

        // Join outside the table lock.
        let jobs: Vec<(DbId, TrackedJob)> = self.jobs.write().await.drain().collect();
        for (source_id, job) in jobs {
            job.view.cancel();
            if tokio::time::timeout(SHUTDOWN_TASK_TIMEOUT, job.task_handle)
                .await
                .is_err()
            {
                tracing::warn!(source_id, "Job task did not exit in time");
            }
        }

        tracing::info!("Job tracker shut down");
    }
}

/// Lifecycle of one job: poll until terminal, then fetch on success.
///
/// The fetch is strictly ordered after the poller's `success` transition.
pub async fn run_job<B>(
    backend: &B,
    view: &JobView,
    config: &TrackerConfig,
    events: &broadcast::Sender<TunerEvent>,
) where
    B: TunerBackend + ?Sized,
{
    let phase = poll_until_settled(backend, view, &config.poll, events).await;
    if phase == ClientPhase::Success {
        fetch_results(backend, view, &config.result_retry, events).await;
    }
}
