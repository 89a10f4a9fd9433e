//! Core types for vidgen-dl

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, FailureKind, Result};

/// MIME type of the rendered artifact
pub const ARTIFACT_MIME_TYPE: &str = "video/mp4";

/// Opaque job identifier issued by the remote service
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Video model offered by the service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoModel {
    /// Standard model
    #[default]
    #[serde(rename = "sora-2")]
    Base,
    /// Higher quality model (higher cost)
    #[serde(rename = "sora-2-pro")]
    Pro,
}

impl VideoModel {
    /// Wire name of the model
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoModel::Base => "sora-2",
            VideoModel::Pro => "sora-2-pro",
        }
    }
}

impl std::fmt::Display for VideoModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VideoModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sora-2" => Ok(VideoModel::Base),
            "sora-2-pro" => Ok(VideoModel::Pro),
            other => Err(Error::InvalidRequest(format!("unsupported model '{}'", other))),
        }
    }
}

/// Clip duration
///
/// Serialized as its textual representation ("4", "8", "12"), which is what the
/// create-job endpoint expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seconds {
    /// 4 seconds
    #[serde(rename = "4")]
    Four,
    /// 8 seconds
    #[default]
    #[serde(rename = "8")]
    Eight,
    /// 12 seconds
    #[serde(rename = "12")]
    Twelve,
}

impl Seconds {
    /// All supported durations, shortest first
    pub const ALL: [Seconds; 3] = [Seconds::Four, Seconds::Eight, Seconds::Twelve];

    /// Duration in whole seconds
    pub fn as_secs(&self) -> u32 {
        match self {
            Seconds::Four => 4,
            Seconds::Eight => 8,
            Seconds::Twelve => 12,
        }
    }

    /// Wire representation
    pub fn as_wire(&self) -> &'static str {
        match self {
            Seconds::Four => "4",
            Seconds::Eight => "8",
            Seconds::Twelve => "12",
        }
    }
}

impl TryFrom<u32> for Seconds {
    type Error = Error;

    fn try_from(secs: u32) -> Result<Self> {
        Seconds::ALL
            .into_iter()
            .find(|s| s.as_secs() == secs)
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "unsupported duration {}s (allowed: 4, 8, 12)",
                    secs
                ))
            })
    }
}

/// Output resolution (width x height)
///
/// Only the sizes the service accepts are representable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    /// 1920x1080 landscape
    Landscape1080,
    /// 1080x1920 portrait
    Portrait1080,
    /// 1280x720 landscape
    Landscape720,
    /// 720x1280 portrait
    #[default]
    Portrait720,
    /// 480x854 portrait
    Portrait480,
    /// 854x480 landscape
    Landscape480,
}

impl Resolution {
    /// All supported resolutions
    pub const ALL: [Resolution; 6] = [
        Resolution::Landscape1080,
        Resolution::Portrait1080,
        Resolution::Landscape720,
        Resolution::Portrait720,
        Resolution::Portrait480,
        Resolution::Landscape480,
    ];

    /// (width, height) in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Landscape1080 => (1920, 1080),
            Resolution::Portrait1080 => (1080, 1920),
            Resolution::Landscape720 => (1280, 720),
            Resolution::Portrait720 => (720, 1280),
            Resolution::Portrait480 => (480, 854),
            Resolution::Landscape480 => (854, 480),
        }
    }

    /// Look up a resolution by its pixel dimensions
    pub fn from_dimensions(width: u32, height: u32) -> Result<Self> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.dimensions() == (width, height))
            .ok_or_else(|| {
                Error::InvalidRequest(format!("unsupported resolution {}x{}", width, height))
            })
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}x{}", w, h)
    }
}

impl std::str::FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidRequest(format!("malformed resolution '{}'", s));
        let (w, h) = s.split_once('x').ok_or_else(invalid)?;
        let width = w.trim().parse().map_err(|_| invalid())?;
        let height = h.trim().parse().map_err(|_| invalid())?;
        Resolution::from_dimensions(width, height)
    }
}

impl TryFrom<String> for Resolution {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> Self {
        r.to_string()
    }
}

/// A request for one video
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Scene description
    pub prompt: String,
    /// Model to render with
    #[serde(default)]
    pub model: VideoModel,
    /// Clip duration
    #[serde(default)]
    pub seconds: Seconds,
    /// Output resolution
    #[serde(default)]
    pub resolution: Resolution,
}

impl JobRequest {
    /// Create a request with default model, duration and resolution
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: VideoModel::default(),
            seconds: Seconds::default(),
            resolution: Resolution::default(),
        }
    }

    /// Set the model
    #[must_use]
    pub fn with_model(mut self, model: VideoModel) -> Self {
        self.model = model;
        self
    }

    /// Set the duration
    #[must_use]
    pub fn with_seconds(mut self, seconds: Seconds) -> Self {
        self.seconds = seconds;
        self
    }

    /// Set the resolution
    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Reject requests the service would refuse
    ///
    /// Duration and resolution are already constrained by their types, so only the
    /// prompt needs checking here.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::InvalidRequest("prompt must not be empty".into()));
        }
        Ok(())
    }

    /// `count` identical copies of this request, for a replica batch
    pub fn replicas(&self, count: usize) -> Vec<JobRequest> {
        vec![self.clone(); count]
    }
}

/// Handle to a job the service accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Identifier issued by the service
    pub id: JobId,
    /// When the job was accepted
    pub created_at: DateTime<Utc>,
}

impl JobHandle {
    /// Create a handle stamped with the current time
    pub fn new(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
        }
    }
}

/// The fixed set of states the rest of the crate reasons about
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    /// Accepted, waiting for capacity
    #[default]
    Queued,
    /// Rendering in progress
    Rendering,
    /// Rendered successfully
    Succeeded,
    /// Rendering failed or was rejected
    Failed,
    /// Cancelled remotely
    Cancelled,
    /// Unrecognized status string or a failed poll
    Unknown,
}

impl CanonicalStatus {
    /// Whether the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalStatus::Succeeded | CanonicalStatus::Failed | CanonicalStatus::Cancelled
        )
    }
}

/// Mutable state of one job, owned by its tracker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// Last known canonical status (never `Unknown` once a known status was seen)
    pub status: CanonicalStatus,
    /// Raw status string of the last poll
    pub raw_status: String,
    /// Displayed progress (0-100)
    pub progress: u8,
    /// Remote error detail of a failed or cancelled job
    pub error: Option<String>,
    /// Set once a terminal status is reached
    pub terminal: bool,
    /// Number of polls issued so far
    pub polls: u32,
}

impl JobState {
    /// State right after a successful submission
    pub fn queued() -> Self {
        Self {
            status: CanonicalStatus::Queued,
            raw_status: "queued".to_string(),
            progress: 0,
            error: None,
            terminal: false,
            polls: 0,
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::queued()
    }
}

/// Why a poll produced no usable status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollFailure {
    /// No response, a timeout, HTTP 408/429 or a 5xx; retried next cycle
    Transport,
    /// HTTP 401/403: the credential is no longer accepted
    Unauthorized,
    /// Any other 4xx, e.g. the job no longer exists
    Rejected,
    /// A success response whose body is not a JSON object
    MalformedResponse,
}

impl PollFailure {
    /// Whether the tracker should poll again after the interval
    pub fn is_retryable(&self) -> bool {
        matches!(self, PollFailure::Transport)
    }
}

/// Raw poll result, as reported by the service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    /// Raw status string ("unknown" when absent)
    pub status: String,
    /// Raw progress value (0 when absent)
    pub progress: f64,
    /// Error text reported by the service or the transport
    pub error: Option<String>,
    /// Set when the poll itself failed and `status` is the synthetic "error"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PollFailure>,
}

impl JobStatusSnapshot {
    /// Snapshot for a response body the service returned
    pub fn remote(status: impl Into<String>, progress: f64) -> Self {
        Self {
            status: status.into(),
            progress,
            error: None,
            failure: None,
        }
    }

    /// Snapshot standing in for a failed poll
    pub fn failed(failure: PollFailure, error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            progress: 0.0,
            error: Some(error.into()),
            failure: Some(failure),
        }
    }

    /// Snapshot for a poll that never got a usable response
    pub fn transport_failure(error: impl Into<String>) -> Self {
        Self::failed(PollFailure::Transport, error)
    }

    /// Whether this is a transient failure to be retried
    pub fn is_hiccup(&self) -> bool {
        self.failure.is_some_and(|f| f.is_retryable())
    }

    /// Attach an error detail
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A downloaded artifact; ownership passes to the caller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactBytes {
    /// Job that produced the artifact
    pub job_id: JobId,
    /// Raw media bytes
    pub data: Bytes,
    /// Total size declared by the transport, if any
    pub total_size: Option<u64>,
    /// Bytes received
    pub received: u64,
}

impl ArtifactBytes {
    /// File name to offer the artifact under
    ///
    /// Characters outside `[A-Za-z0-9._-]` in the job id are replaced with `_`, so
    /// the name is always a single path component.
    pub fn file_name(&self) -> String {
        let id: String = self
            .job_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("sora_{}.mp4", id)
    }

    /// MIME type of the artifact
    pub fn mime_type(&self) -> &'static str {
        ARTIFACT_MIME_TYPE
    }

    /// Number of bytes held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the artifact is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Event emitted by a batch session
///
/// `index` is the member's position in submission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted by the service
    Submitted {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
    },

    /// Job could not be created
    SubmitFailed {
        /// Member index
        index: usize,
        /// Error message
        error: String,
    },

    /// A poll changed the job's state
    Progress {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Canonical status
        status: CanonicalStatus,
        /// Raw status string from the service
        raw_status: String,
        /// Displayed progress (0-100)
        progress: u8,
    },

    /// A poll failed at the transport level and will be retried
    PollHiccup {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Rendering completed
    JobSucceeded {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
    },

    /// Rendering failed
    JobFailed {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Raw terminal status ("failed", "rejected" or "error")
        raw_status: String,
        /// Remote error detail
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Rendering was cancelled remotely
    JobCancelled {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Remote error detail
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Artifact download progress (only when the size is known)
    Downloading {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Fraction received (0.0 to 1.0)
        fraction: f64,
    },

    /// Artifact fully received
    ArtifactReady {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Size in bytes
        size_bytes: u64,
        /// Where the artifact was written, when an output directory is configured
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },

    /// The service refused a status request; tracking of this job stopped
    PollFailed {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// How the poll failed
        failure: PollFailure,
        /// Error message
        error: String,
    },

    /// Artifact retrieval failed; the job itself succeeded
    DownloadFailed {
        /// Member index
        index: usize,
        /// Job ID
        id: JobId,
        /// Error message
        error: String,
    },

    /// Every member reached a terminal state
    BatchComplete {
        /// Members whose artifact was retrieved
        succeeded: usize,
        /// Members that ended any other way
        failed: usize,
    },
}

impl Event {
    /// Member index, for events tied to a single job
    pub fn index(&self) -> Option<usize> {
        match self {
            Event::Submitted { index, .. }
            | Event::SubmitFailed { index, .. }
            | Event::Progress { index, .. }
            | Event::PollHiccup { index, .. }
            | Event::JobSucceeded { index, .. }
            | Event::JobFailed { index, .. }
            | Event::JobCancelled { index, .. }
            | Event::Downloading { index, .. }
            | Event::ArtifactReady { index, .. }
            | Event::PollFailed { index, .. }
            | Event::DownloadFailed { index, .. } => Some(*index),
            Event::BatchComplete { .. } => None,
        }
    }

    /// Failure classification, for events reporting one
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Event::SubmitFailed { .. } => Some(FailureKind::SubmitFailed),
            Event::PollHiccup { .. } => Some(FailureKind::TransportHiccup),
            Event::JobFailed { .. } => Some(FailureKind::RemoteJobFailed),
            Event::JobCancelled { .. } => Some(FailureKind::RemoteJobCancelled),
            Event::PollFailed { failure, .. } => Some(FailureKind::from(*failure)),
            Event::DownloadFailed { .. } => Some(FailureKind::DownloadFailed),
            _ => None,
        }
    }
}
