//! Remote job client
//!
//! Stateless request/response boundary to the video service. The [`VideoApi`]
//! trait is the seam the trackers are written against; [`HttpVideoClient`] is the
//! reqwest implementation for the real service.
//!
//! ## Operations
//!
//! - [`VideoApi::submit`] - create a job (`POST /videos`)
//! - [`VideoApi::poll`] - fetch the raw status (`GET /videos/{id}`), lenient
//! - [`VideoApi::fetch_artifact`] - open the content stream (`GET /videos/{id}/content`)
//!
//! No orchestration logic lives here: statuses are returned unmodified and
//! normalized by [`crate::status::normalize`].

mod http;

pub use http::HttpVideoClient;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::{DownloadError, SubmitError};
use crate::types::{JobHandle, JobRequest, JobStatusSnapshot};

/// Lazy, finite, non-restartable sequence of artifact byte chunks
pub type ChunkStream = BoxStream<'static, std::io::Result<Bytes>>;

/// An opened artifact download
pub struct ArtifactStream {
    /// Size declared by the transport (`Content-Length`), if any
    pub total_size: Option<u64>,
    /// Body chunks as the transport delivers them
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("total_size", &self.total_size)
            .finish_non_exhaustive()
    }
}

/// Remote operations on video jobs
///
/// Implementations hold only static credentials and are shared by every tracker
/// of a session, so they must be `Send + Sync`.
#[async_trait]
pub trait VideoApi: Send + Sync {
    /// Create a job for `request`
    ///
    /// # Errors
    ///
    /// - [`SubmitError::Unauthorized`] on HTTP 401
    /// - [`SubmitError::Remote`] on any other non-success status
    /// - [`SubmitError::Transport`] when no response was received
    /// - [`SubmitError::MalformedResponse`] when a success body has no job id
    async fn submit(&self, request: &JobRequest) -> Result<JobHandle, SubmitError>;

    /// Fetch the job's raw status
    ///
    /// Never fails: transport and HTTP errors come back as a snapshot with status
    /// `"error"` and [`JobStatusSnapshot::failure`] set. Only
    /// [`PollFailure::Transport`](crate::types::PollFailure::Transport) is retried by
    /// the tracker.
    async fn poll(&self, handle: &JobHandle) -> JobStatusSnapshot;

    /// Open the artifact byte stream
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Failed`] when the request fails or the service
    /// answers with a non-success status.
    async fn fetch_artifact(&self, handle: &JobHandle) -> Result<ArtifactStream, DownloadError>;
}
