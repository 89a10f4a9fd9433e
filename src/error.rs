//! Error types for vidgen-dl
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] - top-level error returned by public entry points
//! - [`SubmitError`] - failures while creating a remote job
//! - [`DownloadError`] - failures while retrieving a finished artifact
//! - [`FailureKind`] - the per-job classification reported to consumers
//!
//! Poll failures have no error type of their own: the tracker classifies them with
//! [`PollFailure`], retrying transport hiccups and stopping on anything else.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{JobId, PollFailure};

/// Result type alias for vidgen-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vidgen-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.api_key")
        key: Option<String>,
    },

    /// A job request was rejected before submission
    #[error("invalid job request: {0}")]
    InvalidRequest(String),

    /// The service rejected the API credential (HTTP 401)
    ///
    /// Fatal for a whole batch: no job of the batch is tracked.
    #[error("invalid API key, please check your credentials")]
    Unauthorized,

    /// Job submission failed
    #[error("submit error: {0}")]
    Submit(#[from] SubmitError),

    /// Artifact retrieval failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// The HTTP client could not be set up
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file already exists where an artifact should be written
    #[error("file collision at {path}: {reason}")]
    FileCollision {
        /// The path where the collision occurred
        path: PathBuf,
        /// The reason for the collision (e.g., "file already exists")
        reason: String,
    },

    /// Batch member not found
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors returned by the create-job call
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// HTTP 401 from the service
    #[error("invalid API key, please check your credentials")]
    Unauthorized,

    /// Any other non-success HTTP status
    #[error("remote returned HTTP {status}: {body}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// DNS, TCP, TLS or timeout failure before a response was received
    #[error("connection error: {0}")]
    Transport(String),

    /// A success response that carried no usable job id
    #[error("no job id returned, response: {0}")]
    MalformedResponse(String),
}

impl SubmitError {
    /// Whether this failure must abort the whole batch instead of one member
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, SubmitError::Unauthorized)
    }
}

/// Errors returned while retrieving an artifact
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DownloadError {
    /// The content request or the byte stream failed; received bytes were discarded
    #[error("download failed for job {id}: {reason}")]
    Failed {
        /// The job whose artifact could not be retrieved
        id: JobId,
        /// The underlying cause
        reason: String,
    },

    /// The artifact was downloaded but could not be written to disk
    #[error("failed to save artifact of job {id} to {path}: {reason}")]
    SaveFailed {
        /// The job whose artifact could not be saved
        id: JobId,
        /// Target path
        path: PathBuf,
        /// The underlying cause
        reason: String,
    },
}

impl DownloadError {
    /// The job this error belongs to
    pub fn job_id(&self) -> &JobId {
        match self {
            DownloadError::Failed { id, .. } | DownloadError::SaveFailed { id, .. } => id,
        }
    }
}

/// Classification of every failure a consumer can observe
///
/// Each terminal condition is reported per job; nothing is aggregated into a
/// batch-level message except [`FailureKind::Unauthorized`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad credential, fatal for the whole batch
    Unauthorized,
    /// The job could not be created; siblings continue
    SubmitFailed,
    /// A single poll failed at the transport level; retried next cycle
    TransportHiccup,
    /// The remote job ended in failure
    RemoteJobFailed,
    /// The remote job was cancelled
    RemoteJobCancelled,
    /// The service refused or garbled a status response; tracking stopped
    PollRejected,
    /// The job rendered but its artifact could not be retrieved
    DownloadFailed,
}

impl FailureKind {
    /// Whether this kind ends the job it belongs to
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FailureKind::TransportHiccup)
    }
}

impl From<&SubmitError> for FailureKind {
    fn from(error: &SubmitError) -> Self {
        match error {
            SubmitError::Unauthorized => FailureKind::Unauthorized,
            _ => FailureKind::SubmitFailed,
        }
    }
}

impl From<PollFailure> for FailureKind {
    fn from(failure: PollFailure) -> Self {
        match failure {
            PollFailure::Transport => FailureKind::TransportHiccup,
            PollFailure::Unauthorized => FailureKind::Unauthorized,
            PollFailure::Rejected | PollFailure::MalformedResponse => FailureKind::PollRejected,
        }
    }
}
