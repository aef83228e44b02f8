//! Domain types and pure logic for the Poets Crew tuner.
//!
//! Nothing in this crate performs I/O. The asynchronous engine in
//! `poetscrew-tuner` builds on these types:
//!
//! - [`status`]: server-reported [`JobStatus`](status::JobStatus) and the
//!   richer client-side [`ClientPhase`](status::ClientPhase).
//! - [`candidate`]: generated poems and the default-selection rule.
//! - [`retry`]: explicit retry policy shared by the poller and fetcher.
//! - [`upload`]: upload limits and validation.

pub mod candidate;
pub mod error;
pub mod job;
pub mod retry;
pub mod status;
pub mod types;
pub mod upload;
