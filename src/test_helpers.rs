//! Shared test helpers: a scripted in-memory [`VideoApi`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;

use crate::client::{ArtifactStream, VideoApi};
use crate::error::{DownloadError, SubmitError};
use crate::types::{JobHandle, JobId, JobRequest, JobStatusSnapshot};

/// How a scripted artifact is delivered
#[derive(Clone, Debug)]
pub(crate) struct ArtifactScript {
    data: Vec<u8>,
    piece: usize,
    declared: Option<u64>,
    fail_after: Option<usize>,
}

impl ArtifactScript {
    /// Body delivered in `piece`-sized pieces with its real length declared
    pub(crate) fn sized(data: Vec<u8>, piece: usize) -> Self {
        let declared = Some(data.len() as u64);
        Self {
            data,
            piece,
            declared,
            fail_after: None,
        }
    }

    /// Body delivered without a declared length
    pub(crate) fn without_length(data: Vec<u8>, piece: usize) -> Self {
        Self {
            data,
            piece,
            declared: None,
            fail_after: None,
        }
    }

    /// Override the declared length
    pub(crate) fn declaring(mut self, size: u64) -> Self {
        self.declared = Some(size);
        self
    }

    /// Break the stream after `pieces` pieces
    pub(crate) fn failing_after(mut self, pieces: usize) -> Self {
        self.fail_after = Some(pieces);
        self
    }
}

/// In-memory [`VideoApi`] answering from per-prompt and per-job scripts
///
/// - submissions are keyed by prompt; unscripted prompts get `video_<n>`
/// - polls are keyed by job id; an exhausted script answers "completed"
/// - artifacts are keyed by job id; unscripted jobs get a small body
#[derive(Default)]
pub(crate) struct ScriptedApi {
    submissions: Mutex<HashMap<String, Result<String, SubmitError>>>,
    polls: Mutex<HashMap<JobId, VecDeque<JobStatusSnapshot>>>,
    artifacts: Mutex<HashMap<JobId, ArtifactScript>>,
    poll_log: Mutex<Vec<(JobId, Instant)>>,
    submit_count: AtomicUsize,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_submission(
        self,
        prompt: &str,
        result: Result<&str, SubmitError>,
    ) -> Self {
        self.submissions
            .lock()
            .unwrap()
            .insert(prompt.to_string(), result.map(str::to_string));
        self
    }

    pub(crate) fn with_polls(self, id: &str, snapshots: Vec<JobStatusSnapshot>) -> Self {
        self.polls
            .lock()
            .unwrap()
            .insert(JobId::new(id), snapshots.into());
        self
    }

    pub(crate) fn with_artifact(self, id: &str, script: ArtifactScript) -> Self {
        self.artifacts
            .lock()
            .unwrap()
            .insert(JobId::new(id), script);
        self
    }

    pub(crate) fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub(crate) fn total_polls(&self) -> usize {
        self.poll_log.lock().unwrap().len()
    }

    pub(crate) fn poll_count(&self, id: &str) -> usize {
        self.poll_instants(id).len()
    }

    pub(crate) fn poll_instants(&self, id: &str) -> Vec<Instant> {
        self.poll_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(job, _)| job.as_str() == id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl VideoApi for ScriptedApi {
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, SubmitError> {
        let n = self.submit_count.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.submissions.lock().unwrap().get(&request.prompt).cloned();
        match scripted {
            Some(Ok(id)) => Ok(JobHandle::new(id)),
            Some(Err(e)) => Err(e),
            None => Ok(JobHandle::new(format!("video_{}", n))),
        }
    }

    async fn poll(&self, handle: &JobHandle) -> JobStatusSnapshot {
        self.poll_log
            .lock()
            .unwrap()
            .push((handle.id.clone(), Instant::now()));
        self.polls
            .lock()
            .unwrap()
            .get_mut(&handle.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| JobStatusSnapshot::remote("completed", 100.0))
    }

    async fn fetch_artifact(&self, handle: &JobHandle) -> Result<ArtifactStream, DownloadError> {
        let script = self
            .artifacts
            .lock()
            .unwrap()
            .get(&handle.id)
            .cloned()
            .unwrap_or_else(|| ArtifactScript::sized(b"video".to_vec(), 5));

        let mut pieces: Vec<std::io::Result<Bytes>> = script
            .data
            .chunks(script.piece.max(1))
            .map(|piece| Ok(Bytes::copy_from_slice(piece)))
            .collect();
        if let Some(limit) = script.fail_after {
            pieces.truncate(limit);
            pieces.push(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }

        Ok(ArtifactStream {
            total_size: script.declared,
            chunks: futures::stream::iter(pieces).boxed(),
        })
    }
}
