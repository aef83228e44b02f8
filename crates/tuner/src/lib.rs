//! Asynchronous job-tracking engine for the Poets Crew tuner.
//!
//! Submits an image to the poem backend, polls the resulting job until it
//! settles, fetches the generated candidates once the job succeeds, and
//! keeps track of which candidate is active.
//!
//! - [`tracker::JobTracker`]: entry point; keyed table of live jobs.
//! - [`poller`] / [`fetcher`] / [`submit`]: the three network stages.
//! - [`view::JobView`]: per-job state read by the presentation layer.
//! - [`api`]: the HTTP backend and the [`api::TunerBackend`] seam.

pub mod api;
pub mod config;
pub mod events;
pub mod fetcher;
pub mod poller;
pub mod retry;
pub mod submit;
pub mod tracker;
pub mod view;

pub use api::{TunerApi, TunerApiError, TunerBackend};
pub use config::{ConfigError, TunerConfig};
pub use events::TunerEvent;
pub use submit::{SubmissionPhase, SubmitOutcome, UploadRequest};
pub use tracker::{JobTracker, TrackerConfig};
pub use view::{FetchState, JobView, Settled};
