//! Live batch state: fan-in of tracker updates and event publication

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BatchMember, MemberOutcome};
use crate::client::VideoApi;
use crate::config::Config;
use crate::error::{Error, Result, SubmitError};
use crate::tracker::{JobOutcome, JobTracker, TrackerUpdate};
use crate::types::{
    ArtifactBytes, CanonicalStatus, Event, JobHandle, JobId, JobRequest, JobState,
};

/// A submitted batch being tracked
///
/// The session owns the member table. It is driven by its owner: every call to
/// [`next_event`](BatchSession::next_event) (or
/// [`wait_for_completion`](BatchSession::wait_for_completion)) folds pending tracker
/// updates into the table and publishes the resulting events to every
/// [`subscribe`](BatchSession::subscribe)r.
///
/// Trackers report over a channel holding `event_buffer` updates. A session that
/// is not driven fills it, and its trackers then stop polling until it is.
///
/// Dropping the session stops every tracker; no poll is issued afterwards.
pub struct BatchSession {
    members: Vec<BatchMember>,
    artifacts: Vec<Option<ArtifactBytes>>,
    updates: mpsc::Receiver<TrackerUpdate>,
    event_tx: broadcast::Sender<Event>,
    pending: VecDeque<Event>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    complete_announced: bool,
}

impl BatchSession {
    pub(super) fn start(
        submissions: Vec<(JobRequest, std::result::Result<JobHandle, SubmitError>)>,
        api: Arc<dyn VideoApi>,
        config: &Config,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (updates_tx, updates) = mpsc::channel(config.event_buffer);
        let (event_tx, _rx) = broadcast::channel(config.event_buffer);

        let mut members = Vec::with_capacity(submissions.len());
        let mut pending = VecDeque::new();
        let mut tasks = JoinSet::new();

        for (index, (request, result)) in submissions.into_iter().enumerate() {
            match result {
                Ok(handle) => {
                    info!(index, job_id = %handle.id, "job submitted");
                    pending.push_back(Event::Submitted {
                        index,
                        id: handle.id.clone(),
                    });

                    let tracker = JobTracker::new(
                        index,
                        handle.clone(),
                        Arc::clone(&api),
                        config.polling.clone(),
                        config.download.clone(),
                        updates_tx.clone(),
                        cancel.child_token(),
                    );
                    let finished_tx = updates_tx.clone();
                    tasks.spawn(async move {
                        let outcome = tracker.run().await;
                        finished_tx
                            .send(TrackerUpdate::Finished { index, outcome })
                            .await
                            .ok();
                    });

                    members.push(BatchMember {
                        index,
                        request,
                        handle: Some(handle),
                        state: Some(JobState::queued()),
                        download_fraction: None,
                        outcome: None,
                    });
                }
                Err(e) => {
                    warn!(index, error = %e, "job submission failed");
                    pending.push_back(Event::SubmitFailed {
                        index,
                        error: e.to_string(),
                    });
                    members.push(BatchMember {
                        index,
                        request,
                        handle: None,
                        state: None,
                        download_fraction: None,
                        outcome: Some(MemberOutcome::SubmitFailed(e)),
                    });
                }
            }
        }

        let artifacts = vec![None; members.len()];
        Self {
            members,
            artifacts,
            updates,
            event_tx,
            pending,
            cancel,
            tasks,
            complete_announced: false,
        }
    }

    /// Members in submission order
    pub fn members(&self) -> &[BatchMember] {
        &self.members
    }

    /// Member at `index`
    pub fn member(&self, index: usize) -> Option<&BatchMember> {
        self.members.get(index)
    }

    /// Current `(handle, state)` of every submitted member
    pub fn snapshots(&self) -> Vec<(JobHandle, JobState)> {
        self.members
            .iter()
            .filter_map(|m| Some((m.handle.clone()?, m.state.clone()?)))
            .collect()
    }

    /// Outcome of every member, `None` while it is still running
    pub fn outcomes(&self) -> Vec<Option<MemberOutcome>> {
        self.members.iter().map(|m| m.outcome.clone()).collect()
    }

    /// Whether every member is settled
    pub fn is_complete(&self) -> bool {
        self.members.iter().all(BatchMember::is_settled)
    }

    /// Subscribe to the events this session publishes
    ///
    /// Events are published as the owner drives the session. A receiver that falls
    /// more than `event_buffer` events behind loses the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe as a [`Stream`], skipping over lagged events
    pub fn event_stream(&self) -> impl Stream<Item = Event> + Send + Unpin + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(|event| event.ok())
    }

    /// Wait for the next event
    ///
    /// Returns `None` once [`Event::BatchComplete`] has been returned. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                debug!(?event, "batch event");
                self.event_tx.send(event.clone()).ok();
                return Some(event);
            }

            if self.is_complete() {
                if self.complete_announced {
                    return None;
                }
                self.complete_announced = true;
                let succeeded = self
                    .members
                    .iter()
                    .filter(|m| m.outcome.as_ref().is_some_and(MemberOutcome::is_success))
                    .count();
                let failed = self.members.len() - succeeded;
                info!(succeeded, failed, "batch complete");
                self.pending
                    .push_back(Event::BatchComplete { succeeded, failed });
                continue;
            }

            match self.updates.recv().await {
                Some(update) => self.absorb(update),
                None => self.abandon_unsettled(),
            }
        }
    }

    /// Drive the session until every member is settled
    pub async fn wait_for_completion(&mut self) -> &[BatchMember] {
        while self.next_event().await.is_some() {}
        &self.members
    }

    /// Take ownership of a member's downloaded artifact
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the index is out of range, the member has no
    /// artifact, or it was already taken.
    pub fn take_artifact(&mut self, index: usize) -> Result<ArtifactBytes> {
        self.artifacts
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| Error::NotFound(format!("no artifact for batch member {}", index)))
    }

    /// Stop every tracker and settle unfinished members as abandoned
    ///
    /// Updates that arrived before the trackers stopped are still folded in, and
    /// their events remain available from [`next_event`](BatchSession::next_event).
    pub async fn shutdown(&mut self) {
        info!("shutting down batch session");
        self.cancel.cancel();

        // Keep draining so trackers waiting on a full channel can finish.
        loop {
            tokio::select! {
                Some(update) = self.updates.recv() => self.absorb(update),
                joined = self.tasks.join_next() => match joined {
                    Some(Err(e)) => warn!(error = %e, "tracker task ended abnormally"),
                    Some(Ok(())) => {}
                    None => break,
                },
            }
        }

        while let Ok(update) = self.updates.try_recv() {
            self.absorb(update);
        }
        self.abandon_unsettled();
    }

    fn absorb(&mut self, update: TrackerUpdate) {
        match update {
            TrackerUpdate::Polled { index, state } => {
                let Some(id) = self.job_id(index) else { return };
                self.pending.push_back(Event::Progress {
                    index,
                    id: id.clone(),
                    status: state.status,
                    raw_status: state.raw_status.clone(),
                    progress: state.progress,
                });
                if state.terminal {
                    self.pending.push_back(match state.status {
                        CanonicalStatus::Succeeded => Event::JobSucceeded { index, id },
                        CanonicalStatus::Cancelled => Event::JobCancelled {
                            index,
                            id,
                            error: state.error.clone(),
                        },
                        _ => Event::JobFailed {
                            index,
                            id,
                            raw_status: state.raw_status.clone(),
                            error: state.error.clone(),
                        },
                    });
                }
                if let Some(member) = self.members.get_mut(index) {
                    member.state = Some(state);
                }
            }
            TrackerUpdate::PollHiccup { index, error } => {
                let Some(id) = self.job_id(index) else { return };
                self.pending
                    .push_back(Event::PollHiccup { index, id, error });
            }
            TrackerUpdate::Downloading { index, fraction } => {
                let Some(id) = self.job_id(index) else { return };
                if let Some(member) = self.members.get_mut(index) {
                    member.download_fraction = Some(fraction);
                }
                self.pending
                    .push_back(Event::Downloading { index, id, fraction });
            }
            TrackerUpdate::Finished { index, outcome } => self.settle(index, outcome),
        }
    }

    fn settle(&mut self, index: usize, outcome: JobOutcome) {
        let Some(id) = self.job_id(index) else { return };
        let member_outcome = match outcome {
            JobOutcome::Completed { artifact, path } => {
                let size_bytes = artifact.received;
                self.pending.push_back(Event::ArtifactReady {
                    index,
                    id,
                    size_bytes,
                    path: path.clone(),
                });
                if let Some(slot) = self.artifacts.get_mut(index) {
                    *slot = Some(artifact);
                }
                MemberOutcome::Downloaded { size_bytes, path }
            }
            JobOutcome::DownloadFailed(error) => {
                self.pending.push_back(Event::DownloadFailed {
                    index,
                    id,
                    error: error.to_string(),
                });
                MemberOutcome::DownloadFailed(error)
            }
            JobOutcome::Failed { raw_status, error } => {
                MemberOutcome::Failed { raw_status, error }
            }
            JobOutcome::Cancelled { error } => MemberOutcome::Cancelled { error },
            JobOutcome::PollFailed { failure, error } => {
                self.pending.push_back(Event::PollFailed {
                    index,
                    id,
                    failure,
                    error: error.clone(),
                });
                if let Some(state) = self.members.get_mut(index).and_then(|m| m.state.as_mut()) {
                    state.terminal = true;
                    state.error = Some(error.clone());
                }
                MemberOutcome::PollFailed { failure, error }
            }
            JobOutcome::Abandoned => MemberOutcome::Abandoned,
        };

        if let Some(member) = self.members.get_mut(index) {
            member.outcome.get_or_insert(member_outcome);
        }
    }

    fn abandon_unsettled(&mut self) {
        for member in self.members.iter_mut().filter(|m| m.outcome.is_none()) {
            debug!(index = member.index, "member abandoned");
            member.outcome = Some(MemberOutcome::Abandoned);
        }
    }

    fn job_id(&self, index: usize) -> Option<JobId> {
        self.members
            .get(index)
            .and_then(|m| m.handle.as_ref())
            .map(|h| h.id.clone())
    }
}

impl Drop for BatchSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for BatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSession")
            .field("members", &self.members)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}
