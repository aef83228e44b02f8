//! `poetscrew` -- command-line client for the Poets Crew tuner.
//!
//! Uploads an image, follows the resulting job until it settles, and
//! prints the generated poems. Notices (accepted, failed, unreachable)
//! are written to stderr as they happen.
//!
//! # Environment variables
//!
//! | Variable                     | Required | Default | Description                      |
//! |------------------------------|----------|---------|----------------------------------|
//! | `POETS_API_URL`              | yes      | --      | Backend base URL, e.g. `https://host/api/v1` |
//! | `POETS_ACCESS_TOKEN`         | no       | --      | Bearer token                     |
//! | `POETS_REQUEST_TIMEOUT_SECS` | no       | `10`    | Per-request timeout              |
//! | `POETS_POLL_INTERVAL_MS`     | no       | `5000`  | Delay between status polls       |
//! | `POETS_STATUS_MAX_ATTEMPTS`  | no       | `3`     | Attempts per status check        |
//! | `POETS_RESULT_MAX_ATTEMPTS`  | no       | `4`     | Attempts for the result fetch    |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use poetscrew_core::types::DbId;
use poetscrew_tuner::{JobTracker, JobView, Settled, TunerConfig, TunerEvent, UploadRequest};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the last notices to be printed on exit.
const NOTICE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "poetscrew")]
#[command(about = "Turn an image into poems", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an image and wait for its poems
    Submit {
        /// Image file (gif, jpeg, png or webp, at most 1 MB)
        image: PathBuf,

        /// Optional hint for the generator (at most 100 characters)
        #[arg(long, short = 'e')]
        enhance: Option<String>,
    },

    /// Follow an existing job until it settles
    Follow {
        /// Poem source id
        source_id: DbId,

        /// Make this candidate active instead of the default
        #[arg(long, short = 's')]
        select: Option<DbId>,
    },

    /// List previously submitted images
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "poetscrew=info,poetscrew_tuner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = TunerConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(api_url = %config.api_url, "Loaded configuration");

    let tracker = JobTracker::from_config(&config).context("Failed to build HTTP client")?;
    let notices = tokio::spawn(print_notices(tracker.subscribe()));

    let result = match cli.command {
        Commands::Submit { image, enhance } => submit(&tracker, image, enhance).await,
        Commands::Follow { source_id, select } => follow(&tracker, source_id, select).await,
        Commands::List => list(&tracker).await,
    };

    tracker.shutdown().await;
    drop(tracker);
    // Flush notices still buffered once every sender is gone.
    if tokio::time::timeout(NOTICE_FLUSH_TIMEOUT, notices).await.is_err() {
        tracing::debug!("Notice printer did not finish in time");
    }
    result
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn submit(
    tracker: &Arc<JobTracker>,
    image: PathBuf,
    enhance: Option<String>,
) -> anyhow::Result<()> {
    let upload = UploadRequest::from_path(&image, enhance.as_deref()).await?;

    let outcome = tracker.submit(&upload).await;
    let Some(source_id) = outcome.job_id() else {
        bail!("Submission failed");
    };

    let view = tracker
        .view(source_id)
        .await
        .context("Submitted job is not tracked")?;
    settle(&view, None).await
}

async fn follow(
    tracker: &Arc<JobTracker>,
    source_id: DbId,
    select: Option<DbId>,
) -> anyhow::Result<()> {
    let view = tracker.track(source_id).await;
    settle(&view, select).await
}

async fn list(tracker: &Arc<JobTracker>) -> anyhow::Result<()> {
    let jobs = tracker
        .list_sources()
        .await
        .context("Failed to list poem sources")?;

    if jobs.is_empty() {
        println!("No poem sources yet.");
        return Ok(());
    }
    for job in jobs {
        let created = job
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:>6}  {:<10}  {:<16}  {}",
            job.source_id,
            job.status.as_str(),
            created,
            job.media_path
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wait for `view` to settle (or Ctrl-C), then print its candidates.
async fn settle(view: &JobView, select: Option<DbId>) -> anyhow::Result<()> {
    tracing::info!(source_id = view.source_id(), "Waiting for job to settle");

    let settled = tokio::select! {
        settled = view.wait_settled() => settled,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            return Ok(());
        }
    };

    match settled {
        Settled::Completed => {}
        Settled::JobFailed => bail!("Job {} failed on the server", view.source_id()),
        Settled::StatusUnavailable => bail!("Job {} status is unavailable", view.source_id()),
        Settled::ResultsUnavailable => {
            bail!("Poems for job {} could not be fetched", view.source_id())
        }
        Settled::Abandoned => bail!("Job {} was abandoned", view.source_id()),
    }

    if let Some(id) = select {
        view.select_candidate(id).await?;
    }

    let Some(active) = view.active_candidate().await else {
        println!("Job {} produced no poems.", view.source_id());
        return Ok(());
    };

    println!("{}", active.text);
    let alternatives: Vec<_> = view
        .candidates()
        .await
        .into_iter()
        .filter(|c| c.id != active.id)
        .collect();
    if !alternatives.is_empty() {
        println!();
        println!("Alternatives:");
        for candidate in alternatives {
            let marker = if candidate.is_preferred { "*" } else { " " };
            println!("{marker} [{}] {}", candidate.id, first_line(&candidate.text));
        }
    }
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Print each user notice from the event stream to stderr.
async fn print_notices(mut rx: broadcast::Receiver<TunerEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) if event.is_user_notice() => eprintln!("{}", notice_text(&event)),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notice stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn notice_text(event: &TunerEvent) -> String {
    match event {
        TunerEvent::SubmissionAccepted { source_id } => {
            format!("Image uploaded, job {source_id} is processing")
        }
        TunerEvent::SubmissionFailed { reason } => format!("Upload failed: {reason}"),
        TunerEvent::JobFailed { source_id } => format!("Job {source_id} failed"),
        TunerEvent::StatusRetryExhausted {
            source_id,
            attempts,
        } => format!(
            "Could not read status for job {source_id} after {}",
            plural(*attempts as usize, "attempt")
        ),
        TunerEvent::ResultFetchExhausted {
            source_id,
            attempts,
        } => format!(
            "Could not load poems for job {source_id} after {}",
            plural(*attempts as usize, "attempt")
        ),
        TunerEvent::PhaseChanged { source_id, phase } => {
            format!("Job {source_id} is now {phase}")
        }
        TunerEvent::ResultsReady { source_id, count } => {
            format!("Job {source_id} produced {}", plural(*count, "poem"))
        }
    }
}

/// `"1 attempt"`, `"3 attempts"`.
fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_failure_reads_as_single_attempt() {
        let text = notice_text(&TunerEvent::StatusRetryExhausted {
            source_id: 7,
            attempts: 1,
        });
        assert_eq!(text, "Could not read status for job 7 after 1 attempt");
    }

    #[test]
    fn exhausted_status_budget_counts_attempts() {
        let text = notice_text(&TunerEvent::StatusRetryExhausted {
            source_id: 7,
            attempts: 3,
        });
        assert_eq!(text, "Could not read status for job 7 after 3 attempts");
    }

    #[test]
    fn result_fetch_notice_counts_attempts() {
        let text = notice_text(&TunerEvent::ResultFetchExhausted {
            source_id: 2,
            attempts: 4,
        });
        assert_eq!(text, "Could not load poems for job 2 after 4 attempts");
    }

    #[test]
    fn results_ready_handles_single_poem() {
        let text = notice_text(&TunerEvent::ResultsReady {
            source_id: 2,
            count: 1,
        });
        assert_eq!(text, "Job 2 produced 1 poem");
    }
}
