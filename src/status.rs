//! Mapping of the service's status vocabulary onto [`CanonicalStatus`].
//!
//! The remote vocabulary differs between API versions ("succeeded" vs
//! "completed"), so every raw status string passes through [`normalize`] and
//! nothing else in the crate inspects raw strings.

use crate::types::CanonicalStatus;

/// Map a raw status string to its canonical status
///
/// Matching is case-sensitive. Unrecognized values map to
/// [`CanonicalStatus::Unknown`], which is non-terminal.
///
/// # Examples
///
/// ```
/// use vidgen_dl::status::normalize;
/// use vidgen_dl::CanonicalStatus;
///
/// assert_eq!(normalize("completed"), CanonicalStatus::Succeeded);
/// assert_eq!(normalize("in_progress"), CanonicalStatus::Rendering);
/// assert_eq!(normalize("Queued"), CanonicalStatus::Unknown);
/// ```
#[must_use]
pub fn normalize(raw: &str) -> CanonicalStatus {
    match raw {
        "queued" => CanonicalStatus::Queued,
        "processing" | "in_progress" => CanonicalStatus::Rendering,
        "succeeded" | "completed" => CanonicalStatus::Succeeded,
        "canceled" => CanonicalStatus::Cancelled,
        "failed" | "rejected" | "error" => CanonicalStatus::Failed,
        _ => CanonicalStatus::Unknown,
    }
}
