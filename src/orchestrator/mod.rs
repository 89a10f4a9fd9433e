//! Batch orchestration
//!
//! [`BatchOrchestrator`] fans a batch of requests out to the service and hands the
//! accepted jobs to one [`JobTracker`](crate::tracker::JobTracker) task each. The
//! resulting [`BatchSession`] fans their updates back in, keeps the member table in
//! submission order and publishes [`Event`](crate::types::Event)s.
//!
//! Submodules:
//! - `session` - member table, event translation, completion and teardown

mod session;


pub use session::BatchSession;

use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::client::{HttpVideoClient, VideoApi};
use crate::config::Config;
use crate::error::{DownloadError, Error, FailureKind, Result, SubmitError};
use crate::types::{JobHandle, JobRequest, JobState, PollFailure};

/// Submits batches of job requests and starts tracking them
///
/// Cheap to clone; every session it creates shares the same client.
#[derive(Clone)]
pub struct BatchOrchestrator {
    api: Arc<dyn VideoApi>,
    config: Arc<Config>,
}

impl BatchOrchestrator {
    /// Create an orchestrator talking to the service over HTTP
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = HttpVideoClient::new(&config.api)?;
        Ok(Self {
            api: Arc::new(client),
            config: Arc::new(config),
        })
    }

    /// Create an orchestrator on top of any [`VideoApi`] implementation
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn with_api(config: Config, api: Arc<dyn VideoApi>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api,
            config: Arc::new(config),
        })
    }

    /// The active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Submit a single request; a batch of one
    ///
    /// # Errors
    ///
    /// See [`BatchOrchestrator::submit_batch`].
    pub async fn submit_one(&self, request: JobRequest) -> Result<BatchSession> {
        self.submit_batch(vec![request]).await
    }

    /// Submit every request and start tracking the accepted ones
    ///
    /// Submissions run concurrently; members keep the order of `requests`. A
    /// request the service rejects becomes a failed member and its siblings
    /// continue.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if the batch is empty or any request is invalid;
    ///   nothing is sent in that case
    /// - [`Error::Unauthorized`] if the service rejects the credential on any
    ///   submission; jobs created by the other submissions are not tracked
    pub async fn submit_batch(&self, requests: Vec<JobRequest>) -> Result<BatchSession> {
        if requests.is_empty() {
            return Err(Error::InvalidRequest("batch contains no requests".to_string()));
        }
        for (index, request) in requests.iter().enumerate() {
            request.validate().map_err(|e| match e {
                Error::InvalidRequest(reason) => {
                    Error::InvalidRequest(format!("request {}: {}", index, reason))
                }
                other => other,
            })?;
        }

        info!(count = requests.len(), "submitting batch");

        let results = join_all(requests.iter().map(|request| self.api.submit(request))).await;

        if results
            .iter()
            .any(|r| matches!(r, Err(e) if e.is_fatal_for_batch()))
        {
            error!("service rejected the API key, batch aborted");
            return Err(Error::Unauthorized);
        }

        Ok(BatchSession::start(
            requests.into_iter().zip(results).collect(),
            Arc::clone(&self.api),
            &self.config,
        ))
    }
}

/// One entry of a batch, in submission order
#[derive(Clone, Debug, Serialize)]
pub struct BatchMember {
    /// Position in the submitted batch
    pub index: usize,
    /// The submitted request
    pub request: JobRequest,
    /// Remote job, absent when the submission failed
    pub handle: Option<JobHandle>,
    /// Latest tracker state, absent when the submission failed
    pub state: Option<JobState>,
    /// Artifact download progress, once retrieval started with a known size
    pub download_fraction: Option<f64>,
    /// Set once the member is settled
    #[serde(skip)]
    pub outcome: Option<MemberOutcome>,
}

impl BatchMember {
    /// Whether nothing further will happen to this member
    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Final result of a batch member
#[derive(Clone, Debug, PartialEq)]
pub enum MemberOutcome {
    /// The job was never created
    SubmitFailed(SubmitError),
    /// Rendered and downloaded
    Downloaded {
        /// Artifact size in bytes
        size_bytes: u64,
        /// Where the artifact was written, when an output directory is configured
        path: Option<PathBuf>,
    },
    /// Rendered, but retrieval failed
    DownloadFailed(DownloadError),
    /// Remote job failed
    Failed {
        /// Raw terminal status
        raw_status: String,
        /// Remote error detail
        error: Option<String>,
    },
    /// Remote job cancelled
    Cancelled {
        /// Remote error detail
        error: Option<String>,
    },
    /// The service refused a status poll and tracking stopped
    PollFailed {
        /// How the poll failed
        failure: PollFailure,
        /// Error detail from the failed poll
        error: String,
    },
    /// Tracking stopped by shutdown before the job finished
    Abandoned,
}

impl MemberOutcome {
    /// Whether the artifact was retrieved
    pub fn is_success(&self) -> bool {
        matches!(self, MemberOutcome::Downloaded { .. })
    }

    /// Failure classification, `None` for downloaded or abandoned members
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            MemberOutcome::SubmitFailed(e) => Some(FailureKind::from(e)),
            MemberOutcome::DownloadFailed(_) => Some(FailureKind::DownloadFailed),
            MemberOutcome::Failed { .. } => Some(FailureKind::RemoteJobFailed),
            MemberOutcome::Cancelled { .. } => Some(FailureKind::RemoteJobCancelled),
            MemberOutcome::PollFailed { failure, .. } => Some(FailureKind::from(*failure)),
            MemberOutcome::Downloaded { .. } | MemberOutcome::Abandoned => None,
        }
    }
}
