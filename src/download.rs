//! Chunked artifact download with fractional progress.
//!
//! The transport delivers the body in whatever pieces it likes; [`download_artifact`]
//! regroups them into fixed-size chunks so progress is reported at a steady
//! granularity (one callback per chunk). Chunks are pulled one at a time, so a slow
//! consumer slows the transfer down instead of buffering ahead.

use bytes::BytesMut;
use futures::StreamExt;
use tracing::{debug, info};

use crate::client::VideoApi;
use crate::error::DownloadError;
use crate::types::{ArtifactBytes, JobHandle};

/// Upper bound on the buffer reserved up front from a declared size
const MAX_PREALLOCATION: u64 = 256 * 1024 * 1024;

/// Progress callback receiving the received fraction (0.0 to 1.0)
pub type ProgressCallback<'a> = &'a mut (dyn FnMut(f64) + Send);

/// Download the artifact of a finished job
///
/// When the transport declares a total size, `on_progress` is invoked after every
/// `chunk_size` bytes (and once more for a trailing partial chunk) with
/// `min(received / total, 1.0)`. Without a declared size it is never invoked and
/// callers should show an indeterminate indicator.
///
/// # Errors
///
/// Returns [`DownloadError::Failed`] if the stream cannot be opened or breaks
/// mid-transfer. Bytes received up to that point are dropped; there is no resume.
pub async fn download_artifact(
    api: &dyn VideoApi,
    handle: &JobHandle,
    chunk_size: usize,
    mut on_progress: Option<ProgressCallback<'_>>,
) -> Result<ArtifactBytes, DownloadError> {
    let chunk_size = chunk_size.max(1) as u64;
    let stream = api.fetch_artifact(handle).await?;
    let total_size = stream.total_size;
    let mut chunks = stream.chunks;

    debug!(job_id = %handle.id, total_size = ?total_size, "artifact stream opened");

    let capacity = total_size.unwrap_or(chunk_size).min(MAX_PREALLOCATION);
    let mut data = BytesMut::with_capacity(usize::try_from(capacity).unwrap_or(0));
    let mut received: u64 = 0;
    let mut reported: u64 = 0;

    let mut report = |bytes: u64| {
        if let (Some(total), Some(callback)) = (total_size, on_progress.as_mut()) {
            callback((bytes as f64 / total as f64).min(1.0));
        }
    };

    while let Some(piece) = chunks.next().await {
        let piece = piece.map_err(|e| DownloadError::Failed {
            id: handle.id.clone(),
            reason: e.to_string(),
        })?;
        data.extend_from_slice(&piece);
        received += piece.len() as u64;

        while received - reported >= chunk_size {
            reported += chunk_size;
            report(reported);
        }
    }

    if received > reported {
        report(received);
    }

    info!(job_id = %handle.id, bytes = received, "artifact downloaded");

    Ok(ArtifactBytes {
        job_id: handle.id.clone(),
        data: data.freeze(),
        total_size,
        received,
    })
}
