//! Ownership resolution for source trees that declare their maintainers in
//! per-directory `MAINTAINERS` files.
//!
//! - [`OwnershipSet::build`] walks a tree and collects the directories one
//!   acting user may act on.
//! - [`resolve_reviewers`] maps every file touched by a patch to the
//!   maintainers of its directory.
//! - [`filter_by_ownership`] narrows a list of pending changes down to the
//!   ones touching an owned directory.

mod error;
mod filter;
mod owners;
mod ownership;
pub mod parser;
pub mod patch;
pub mod paths;
mod reviewers;
mod tree;
mod walk;

use std::path::Path;

pub use error::{Error, Result};
pub use filter::filter_by_ownership;
pub use owners::DirectoryOwners;
pub use ownership::{Identity, OwnershipSet};
pub use parser::{parse_line, Maintainer, MalformedRecord, ParseError};
pub use patch::{parse_patch, Patch, PatchParseError};
pub use reviewers::{resolve_reviewers, reviewers_for_patch, ReviewerMap};
pub use tree::{DirEntry, EntryKind, FsTree, MemoryTree, Tree, MAX_DEPTH};

/// Build the ownership set of `identity` for the repository checked out at
/// `root`.
pub fn ownership_from_path(root: impl AsRef<Path>, identity: &Identity) -> Result<OwnershipSet> {
    OwnershipSet::build(&FsTree::new(root.as_ref()), identity)
}

/// Collect the maintainers of every directory of the repository checked out
/// at `root`.
pub fn owners_from_path(root: impl AsRef<Path>) -> Result<DirectoryOwners> {
    DirectoryOwners::build(&FsTree::new(root.as_ref()))
}
