//! # vidgen-dl
//!
//! Job orchestration core for remote text-to-video generation.
//!
//! ## Design Philosophy
//!
//! vidgen-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events instead of inspecting state
//! - **Fault-isolated** - One failing job never affects the rest of its batch
//! - **Sensible defaults** - Poll cadence, chunk size and endpoint work out of the box
//!
//! A batch of [`JobRequest`]s is submitted concurrently; every accepted job gets its
//! own tracker task that polls the service on a fixed interval, normalizes the raw
//! status, and downloads the finished video in bounded chunks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vidgen_dl::{BatchOrchestrator, Config, Event, JobRequest, Seconds};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("sk-...");
//!     let orchestrator = BatchOrchestrator::new(config)?;
//!
//!     let request = JobRequest::new("A lighthouse at dawn").with_seconds(Seconds::Four);
//!     let mut session = orchestrator.submit_batch(request.replicas(2)).await?;
//!
//!     while let Some(event) = session.next_event().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     for index in 0..session.members().len() {
//!         if let Ok(artifact) = session.take_artifact(index) {
//!             std::fs::write(artifact.file_name(), &artifact.data)?;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote job client
pub mod client;
/// Configuration types
pub mod config;
/// Chunked artifact download
pub mod download;
/// Error types
pub mod error;
/// Batch submission and session management
pub mod orchestrator;
/// Raw status normalization
pub mod status;
/// Per-job polling state machine
pub mod tracker;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use client::{ArtifactStream, HttpVideoClient, VideoApi};
pub use config::{ApiConfig, Config, DownloadConfig, FileCollisionAction, PollingConfig};
pub use error::{DownloadError, Error, FailureKind, Result, SubmitError};
pub use orchestrator::{BatchMember, BatchOrchestrator, BatchSession, MemberOutcome};
pub use types::{
    ArtifactBytes, CanonicalStatus, Event, JobHandle, JobId, JobRequest, JobState,
    JobStatusSnapshot, PollFailure, Resolution, Seconds, VideoModel,
};

/// Drive a session until it completes or a termination signal arrives.
///
/// On a signal every tracker is stopped and unfinished members are settled as
/// [`MemberOutcome::Abandoned`]. Either way the session is complete on return.
///
/// Listens for SIGTERM and SIGINT on Unix and for Ctrl+C elsewhere. If no signal
/// can be listened for, the session simply runs to completion.
///
/// # Example
///
/// ```no_run
/// use vidgen_dl::{BatchOrchestrator, Config, JobRequest, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = BatchOrchestrator::new(Config::new("sk-..."))?;
///     let mut session = orchestrator.submit_one(JobRequest::new("Rain on a tin roof")).await?;
///
///     run_until_signal(&mut session).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(session: &mut BatchSession) {
    tokio::select! {
        _ = session.wait_for_completion() => return,
        _ = wait_for_signal() => {}
    }
    session.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut int)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        tracing::warn!("cannot register SIGTERM/SIGINT handlers, listening for Ctrl+C");
        return wait_for_ctrl_c().await;
    };

    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "stopping batch");
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

/// Resolves on Ctrl+C; never resolves if it cannot be listened for
async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "stopping batch"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C, batch runs to completion");
            std::future::pending::<()>().await;
        }
    }
}
