//! Lifecycle of a single submitted job.
//!
//! A [`JobTracker`] polls its job on a fixed interval, folds every poll result into
//! its [`JobState`], and once the job is terminal either retrieves the artifact
//! (success) or stops (failure, cancellation). Every observable change is sent to
//! the owning session as a [`TrackerUpdate`]; the tracker never touches shared
//! state.
//!
//! ## State machine
//!
//! ```text
//! Created --submit--> Queued --> Rendering --> Succeeded | Failed | Cancelled
//! ```
//!
//! `Unknown` poll results and transport hiccups leave the last known state in place
//! and the tracker polls again after the normal interval. A poll the service
//! refuses outright (bad credential, unknown job, unreadable body) ends tracking
//! with [`JobOutcome::PollFailed`].
//!
//! Updates travel over a bounded channel. A tracker whose session is not being
//! driven waits for room before it polls again; download progress is dropped
//! rather than waited on.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::VideoApi;
use crate::config::{DownloadConfig, PollingConfig};
use crate::download::download_artifact;
use crate::error::{DownloadError, FailureKind};
use crate::status::normalize;
use crate::types::{
    ArtifactBytes, CanonicalStatus, JobHandle, JobState, JobStatusSnapshot, PollFailure,
};
use crate::utils::save_artifact;

/// Message from a tracker to its session
#[derive(Debug)]
pub enum TrackerUpdate {
    /// A poll produced a new state
    Polled {
        /// Member index
        index: usize,
        /// State after the poll
        state: JobState,
    },
    /// A poll failed at the transport level; state is unchanged
    PollHiccup {
        /// Member index
        index: usize,
        /// Error message
        error: String,
    },
    /// Artifact download progress
    Downloading {
        /// Member index
        index: usize,
        /// Fraction received (0.0 to 1.0)
        fraction: f64,
    },
    /// The tracker stopped
    Finished {
        /// Member index
        index: usize,
        /// How it ended
        outcome: JobOutcome,
    },
}

/// How a tracked job ended
#[derive(Debug)]
pub enum JobOutcome {
    /// Rendered and downloaded
    Completed {
        /// The artifact, owned by the caller from here on
        artifact: ArtifactBytes,
        /// Where it was written, when an output directory is configured
        path: Option<PathBuf>,
    },
    /// Rendered, but the artifact could not be retrieved
    DownloadFailed(DownloadError),
    /// The remote job failed
    Failed {
        /// Raw terminal status
        raw_status: String,
        /// Remote error detail
        error: Option<String>,
    },
    /// The remote job was cancelled
    Cancelled {
        /// Remote error detail
        error: Option<String>,
    },
    /// The service refused a status poll; the job's fate is unknown
    PollFailed {
        /// How the poll failed
        failure: PollFailure,
        /// Error detail from the failed poll
        error: String,
    },
    /// Tracking stopped because the owning session ended
    Abandoned,
}

impl JobOutcome {
    /// Failure classification, `None` for completed or abandoned jobs
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            JobOutcome::Completed { .. } | JobOutcome::Abandoned => None,
            JobOutcome::DownloadFailed(_) => Some(FailureKind::DownloadFailed),
            JobOutcome::Failed { .. } => Some(FailureKind::RemoteJobFailed),
            JobOutcome::Cancelled { .. } => Some(FailureKind::RemoteJobCancelled),
            JobOutcome::PollFailed { failure, .. } => Some(FailureKind::from(*failure)),
        }
    }
}

/// What the tracker does after folding in a poll result
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollDecision {
    /// Poll again after the interval
    Continue,
    /// Rendering finished; retrieve the artifact
    Download,
    /// Terminal without an artifact
    Stop,
}

/// Tracks one submitted job until it reaches a terminal state
pub struct JobTracker {
    index: usize,
    handle: JobHandle,
    state: JobState,
    api: Arc<dyn VideoApi>,
    polling: PollingConfig,
    download: DownloadConfig,
    updates: mpsc::Sender<TrackerUpdate>,
    cancel: CancellationToken,
    poll_failure: Option<PollFailure>,
}

impl JobTracker {
    /// Create a tracker for a freshly submitted job
    ///
    /// The job starts in [`CanonicalStatus::Queued`].
    pub fn new(
        index: usize,
        handle: JobHandle,
        api: Arc<dyn VideoApi>,
        polling: PollingConfig,
        download: DownloadConfig,
        updates: mpsc::Sender<TrackerUpdate>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            handle,
            state: JobState::queued(),
            api,
            polling,
            download,
            updates,
            cancel,
            poll_failure: None,
        }
    }

    /// The tracked job
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Current state
    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Poll until the job is terminal, then retrieve the artifact if it succeeded
    ///
    /// Polls are strictly sequential and spaced by the configured interval; there
    /// is no backoff and no poll limit. Returns [`JobOutcome::Abandoned`] as soon as
    /// the cancellation token fires, even mid-wait or mid-request.
    pub async fn run(mut self) -> JobOutcome {
        info!(job_id = %self.handle.id, index = self.index, "tracking job");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abandon(),
                _ = tokio::time::sleep(self.polling.interval) => {}
            }

            let snapshot = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abandon(),
                snapshot = self.api.poll(&self.handle) => snapshot,
            };

            let (decision, update) = self.apply(snapshot);
            if let Some(update) = update {
                if !self.emit(update).await {
                    return self.abandon();
                }
            }
            match decision {
                PollDecision::Continue => continue,
                PollDecision::Download => return self.retrieve_artifact().await,
                PollDecision::Stop => return self.terminal_outcome(),
            }
        }
    }

    /// Fold one poll result into the state
    ///
    /// Returns what to do next and the update to report, if any. A terminal state
    /// is final: later snapshots are ignored.
    pub fn apply(
        &mut self,
        snapshot: JobStatusSnapshot,
    ) -> (PollDecision, Option<TrackerUpdate>) {
        if self.state.terminal {
            return (self.decision_for_terminal(), None);
        }
        self.state.polls += 1;

        if let Some(failure) = snapshot.failure {
            let error = snapshot.error.unwrap_or_else(|| "poll failed".to_string());
            if failure.is_retryable() {
                warn!(
                    job_id = %self.handle.id,
                    error = %error,
                    "poll failed, retrying next cycle"
                );
                let update = TrackerUpdate::PollHiccup {
                    index: self.index,
                    error,
                };
                return (PollDecision::Continue, Some(update));
            }

            error!(
                job_id = %self.handle.id,
                ?failure,
                error = %error,
                "status poll refused, tracking stopped"
            );
            self.poll_failure = Some(failure);
            self.state.error = Some(error);
            self.state.terminal = true;
            return (PollDecision::Stop, None);
        }

        let status = normalize(&snapshot.status);
        debug!(
            job_id = %self.handle.id,
            raw_status = %snapshot.status,
            progress = snapshot.progress,
            ?status,
            "polled job"
        );

        self.state.raw_status = snapshot.status;
        match status {
            CanonicalStatus::Queued => {
                self.state.status = status;
                self.state.progress = self.polling.queued_progress;
            }
            CanonicalStatus::Rendering => {
                self.state.status = status;
                self.state.progress =
                    clamp_progress(snapshot.progress).max(self.polling.rendering_progress_floor);
            }
            CanonicalStatus::Succeeded => {
                self.state.status = status;
                self.state.progress = 100;
                self.state.terminal = true;
            }
            CanonicalStatus::Failed | CanonicalStatus::Cancelled => {
                self.state.status = status;
                self.state.error = snapshot.error;
                self.state.terminal = true;
            }
            // Keep the last known status, poll again.
            CanonicalStatus::Unknown => {}
        }

        let update = TrackerUpdate::Polled {
            index: self.index,
            state: self.state.clone(),
        };
        let decision = if self.state.terminal {
            self.decision_for_terminal()
        } else {
            PollDecision::Continue
        };
        (decision, Some(update))
    }

    fn decision_for_terminal(&self) -> PollDecision {
        if self.state.status == CanonicalStatus::Succeeded {
            PollDecision::Download
        } else {
            PollDecision::Stop
        }
    }

    fn terminal_outcome(&self) -> JobOutcome {
        if let Some(failure) = self.poll_failure {
            return JobOutcome::PollFailed {
                failure,
                error: self.state.error.clone().unwrap_or_default(),
            };
        }
        let error = self.state.error.clone();
        if self.state.status == CanonicalStatus::Cancelled {
            warn!(job_id = %self.handle.id, error = ?error, "job cancelled remotely");
            JobOutcome::Cancelled { error }
        } else {
            warn!(
                job_id = %self.handle.id,
                raw_status = %self.state.raw_status,
                error = ?error,
                "job failed"
            );
            JobOutcome::Failed {
                raw_status: self.state.raw_status.clone(),
                error,
            }
        }
    }

    async fn retrieve_artifact(&self) -> JobOutcome {
        info!(job_id = %self.handle.id, "job succeeded, downloading artifact");

        let index = self.index;
        let updates = self.updates.clone();
        let mut on_progress = move |fraction: f64| {
            updates
                .try_send(TrackerUpdate::Downloading { index, fraction })
                .ok();
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abandon(),
            result = download_artifact(
                self.api.as_ref(),
                &self.handle,
                self.download.chunk_size,
                Some(&mut on_progress),
            ) => result,
        };

        let artifact = match result {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(job_id = %self.handle.id, error = %e, "artifact download failed");
                return JobOutcome::DownloadFailed(e);
            }
        };

        let Some(dir) = &self.download.output_dir else {
            return JobOutcome::Completed {
                artifact,
                path: None,
            };
        };

        match save_artifact(&artifact, dir, self.download.file_collision).await {
            Ok(path) => JobOutcome::Completed {
                artifact,
                path: Some(path),
            },
            Err(e) => {
                error!(job_id = %self.handle.id, error = %e, "failed to save artifact");
                JobOutcome::DownloadFailed(DownloadError::SaveFailed {
                    id: self.handle.id.clone(),
                    path: dir.join(artifact.file_name()),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn abandon(&self) -> JobOutcome {
        debug!(job_id = %self.handle.id, "tracking abandoned");
        JobOutcome::Abandoned
    }

    /// Send an update, waiting for room in the channel
    ///
    /// Returns `false` if the tracker was cancelled while waiting.
    async fn emit(&self, update: TrackerUpdate) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            // A closed channel means the session is gone; cancellation stops the loop.
            sent = self.updates.send(update) => {
                sent.ok();
                true
            }
        }
    }
}

fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.clamp(0.0, 100.0) as u8
}
