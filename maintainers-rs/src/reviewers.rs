use std::collections::{hash_map::Entry, HashMap};

use tracing::debug;

use crate::{
    owners::DirectoryOwners,
    parser::Maintainer,
    patch::{parse_patch, Patch},
    paths, Result,
};

/// Touched file path to the maintainers of its directory. Owners are not
/// deduplicated, within an entry or across entries.
pub type ReviewerMap<'a> = HashMap<String, &'a [Maintainer]>;

/// Parse `patch` and assign every file it touches to the maintainers of the
/// file's directory in `owners`.
///
/// Both sides of a rename or copy are resolved independently. Files whose
/// directory is unknown map to an empty list.
pub fn resolve_reviewers<'a>(patch: &[u8], owners: &'a DirectoryOwners) -> Result<ReviewerMap<'a>> {
    let patch = parse_patch(patch)?;
    Ok(reviewers_for_patch(&patch, owners))
}

/// Like [`resolve_reviewers`], for an already parsed patch.
pub fn reviewers_for_patch<'a>(patch: &Patch, owners: &'a DirectoryOwners) -> ReviewerMap<'a> {
    let mut reviewers = ReviewerMap::new();
    for path in patch.files.iter().flat_map(|file| file.paths()) {
        // The first resolution of a path wins.
        if let Entry::Vacant(slot) = reviewers.entry(paths::clean_path(path)) {
            let maintainers = owners.get(paths::parent_dir(slot.key()));
            slot.insert(maintainers);
        }
    }
    debug!(files = reviewers.len(), "resolved reviewers");
    reviewers
}
