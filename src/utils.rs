//! File helpers for persisting downloaded artifacts

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::ArtifactBytes;
use std::path::{Path, PathBuf};

/// Numbered names tried before giving up on a free one
const MAX_RENAME_ATTEMPTS: usize = 9999;

/// Where an artifact named `file_name` should be written inside `dir`
///
/// With `Rename`, a taken name becomes `sora_{id} (1).mp4`, `sora_{id} (2).mp4`
/// and so on.
///
/// ```
/// use vidgen_dl::config::FileCollisionAction;
/// use vidgen_dl::utils::artifact_path;
///
/// let dir = std::env::temp_dir().join("vidgen-dl-doc");
/// let path = artifact_path(&dir, "sora_video_123.mp4", FileCollisionAction::Overwrite).unwrap();
/// assert_eq!(path, dir.join("sora_video_123.mp4"));
/// ```
///
/// # Errors
///
/// Returns [`Error::FileCollision`] when `Skip` meets an existing file or every
/// numbered name is taken.
pub fn artifact_path(
    dir: &Path,
    file_name: &str,
    action: FileCollisionAction,
) -> Result<PathBuf> {
    let preferred = dir.join(file_name);
    if action == FileCollisionAction::Overwrite || !preferred.exists() {
        return Ok(preferred);
    }

    let collision = |reason: String| Error::FileCollision {
        path: preferred.clone(),
        reason,
    };
    if action == FileCollisionAction::Skip {
        return Err(collision("artifact already saved".to_string()));
    }

    numbered_names(file_name)
        .take(MAX_RENAME_ATTEMPTS)
        .map(|name| dir.join(name))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| {
            collision(format!(
                "no free name after {} attempts",
                MAX_RENAME_ATTEMPTS
            ))
        })
}

fn numbered_names(file_name: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    (1..).map(move |n| match ext {
        Some(ext) => format!("{stem} ({n}).{ext}"),
        None => format!("{stem} ({n})"),
    })
}

/// Write an artifact into `dir` under its suggested file name
///
/// Creates `dir` if needed. Returns the path actually written, which differs from
/// `dir/sora_{id}.mp4` when `action` is `Rename` and that name was taken.
///
/// # Errors
///
/// Fails on collision (see [`artifact_path`]) or any filesystem error.
pub async fn save_artifact(
    artifact: &ArtifactBytes,
    dir: &Path,
    action: FileCollisionAction,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = artifact_path(dir, &artifact.file_name(), action)?;
    tokio::fs::write(&path, &artifact.data).await?;
    tracing::info!(
        job_id = %artifact.job_id,
        path = %path.display(),
        bytes = artifact.len(),
        "artifact saved"
    );
    Ok(path)
}
