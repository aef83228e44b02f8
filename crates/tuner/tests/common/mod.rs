//! Shared test helpers: a scripted in-memory backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use poetscrew_core::retry::{Backoff, RetryPolicy};
use poetscrew_core::status::JobStatus;
use poetscrew_core::types::DbId;
use poetscrew_tuner::api::{PoemRecord, SourceCreated, SourceRecord, StatusResponse};
use poetscrew_tuner::poller::PollConfig;
use poetscrew_tuner::{TrackerConfig, TunerApiError, TunerBackend, TunerEvent, UploadRequest};
use tokio::sync::broadcast;

/// A scripted reply: a value, or an HTTP failure with the given status.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Fail(u16),
}

impl<T> Reply<T> {
    fn into_result(self) -> Result<T, TunerApiError> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(status) => Err(TunerApiError::ApiError {
                status,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// One backend call, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create,
    Status(DbId),
    Poems(DbId),
    List,
}

/// Backend whose answers are scripted per endpoint.
///
/// Each endpoint pops from its queue; once the queue is empty the
/// endpoint keeps returning its fallback reply.
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    create: Mutex<VecDeque<Reply<DbId>>>,
    status: Mutex<VecDeque<Reply<JobStatus>>>,
    status_fallback: Reply<JobStatus>,
    poems: Mutex<VecDeque<Reply<Vec<PoemRecord>>>>,
    poems_fallback: Reply<Vec<PoemRecord>>,
    sources: Vec<SourceRecord>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            create: Mutex::new(VecDeque::new()),
            status: Mutex::new(VecDeque::new()),
            status_fallback: Reply::Ok(JobStatus::Processing),
            poems: Mutex::new(VecDeque::new()),
            poems_fallback: Reply::Fail(503),
            sources: Vec::new(),
        }
    }

    pub fn with_create(self, replies: Vec<Reply<DbId>>) -> Self {
        *self.create.lock().unwrap() = replies.into();
        self
    }

    pub fn with_status(self, replies: Vec<Reply<JobStatus>>) -> Self {
        *self.status.lock().unwrap() = replies.into();
        self
    }

    pub fn with_status_fallback(mut self, reply: Reply<JobStatus>) -> Self {
        self.status_fallback = reply;
        self
    }

    pub fn with_poems(self, replies: Vec<Reply<Vec<PoemRecord>>>) -> Self {
        *self.poems.lock().unwrap() = replies.into();
        self
    }

    pub fn with_poems_fallback(mut self, reply: Reply<Vec<PoemRecord>>) -> Self {
        self.poems_fallback = reply;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceRecord>) -> Self {
        self.sources = sources;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(_)))
            .count()
    }

    pub fn poems_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Poems(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl TunerBackend for FakeBackend {
    async fn create_source(&self, _upload: &UploadRequest) -> Result<SourceCreated, TunerApiError> {
        self.record(Call::Create);
        let reply = self
            .create
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail(500));
        reply.into_result().map(|id| SourceCreated {
            id,
            media_path: format!("/media/{id}.png"),
            status: JobStatus::Processing,
        })
    }

    async fn source_status(&self, source_id: DbId) -> Result<StatusResponse, TunerApiError> {
        self.record(Call::Status(source_id));
        let reply = self
            .status
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.status_fallback.clone());
        reply.into_result().map(|status| StatusResponse {
            ready: status.is_terminal(),
            status,
            poem_source_id: source_id,
        })
    }

    async fn poems(&self, source_id: DbId) -> Result<Vec<PoemRecord>, TunerApiError> {
        self.record(Call::Poems(source_id));
        let reply = self
            .poems
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.poems_fallback.clone());
        reply.into_result()
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>, TunerApiError> {
        self.record(Call::List);
        Ok(self.sources.clone())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn poem(id: DbId, critic_choice: bool) -> PoemRecord {
    PoemRecord {
        id,
        poem: format!("poem number {id}"),
        critic_choice,
    }
}

pub fn png_upload(enhance: Option<&str>) -> UploadRequest {
    UploadRequest::new("cat.png", b"\x89PNG\r\n\x1a\n".to_vec(), "image/png", enhance)
}

/// Production poll interval and budgets with a short fixed backoff.
pub fn poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5000),
        retry: RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(100))),
    }
}

pub fn result_policy() -> RetryPolicy {
    RetryPolicy::new(4, Backoff::Fixed(Duration::from_millis(100)))
}

pub fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        poll: poll_config(),
        result_retry: result_policy(),
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut broadcast::Receiver<TunerEvent>) -> Vec<TunerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count events matching `pred`.
pub fn count<F>(events: &[TunerEvent], pred: F) -> usize
where
    F: Fn(&TunerEvent) -> bool,
{
    events.iter().filter(|e| pred(e)).count()
}
