//! Exclusion filtering of repository listings.

use std::collections::HashSet;

use tracing::info;

use crate::models::RepoDescriptor;

/// Split a listing into the repositories to back up and the number skipped.
///
/// Matching is exact string equality on `full_path`; there is no glob or
/// prefix matching. Order of the kept repositories is preserved.
pub fn apply_exclusions(
    repos: Vec<RepoDescriptor>,
    exclude: &HashSet<String>,
) -> (Vec<RepoDescriptor>, u64) {
    if exclude.is_empty() {
        return (repos, 0);
    }
    let mut skipped = 0;
    let kept = repos
        .into_iter()
        .filter(|repo| {
            if exclude.contains(&repo.full_path) {
                info!(repo = %repo.full_path, "!! skipping excluded repository");
                skipped += 1;
                false
            } else {
                true
            }
        })
        .collect();
    (kept, skipped)
}
