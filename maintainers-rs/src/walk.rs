//! Pieces shared by the tree walks that build an [`crate::OwnershipSet`] and
//! a [`crate::DirectoryOwners`].

use std::path::PathBuf;

use tracing::debug;

use crate::{
    parser::{self, Maintainer},
    paths,
    tree::{DirEntry, Tree, MAX_DEPTH},
    Error, Result,
};

/// List a directory, failing the walk on I/O errors or excessive depth.
pub(crate) fn list_dir<T: Tree + ?Sized>(
    tree: &T,
    dir: &str,
    depth: usize,
) -> Result<Vec<DirEntry>> {
    if depth > MAX_DEPTH {
        return Err(Error::DepthExceeded {
            path: PathBuf::from(dir),
        });
    }
    tree.read_dir(dir).map_err(|source| Error::TreeRead {
        path: PathBuf::from(dir),
        source,
    })
}

/// Parse every declaration file among `entries`. Returns `None` when the
/// directory has no declaration file, and the concatenated records (in
/// file name order) otherwise. An empty file still counts as a declaration.
pub(crate) fn read_declarations<T: Tree + ?Sized>(
    tree: &T,
    dir: &str,
    entries: &[DirEntry],
) -> Result<Option<Vec<Maintainer>>> {
    let mut declared: Option<Vec<Maintainer>> = None;
    for entry in entries {
        if entry.is_dir() || !parser::is_declaration_file(&entry.name) {
            continue;
        }
        let path = paths::join(dir, &entry.name);
        let source = tree
            .read_to_string(&path)
            .map_err(|source| Error::TreeRead {
                path: PathBuf::from(&path),
                source,
            })?;
        let records = parser::parse(&source).map_err(|source| Error::FileFormat {
            path: PathBuf::from(&path),
            source,
        })?;
        debug!(path = %path, records = records.len(), "parsed declaration file");
        declared.get_or_insert_with(Vec::new).extend(records);
    }
    Ok(declared)
}

/// Subdirectories a walk descends into: hidden entries and anything that is
/// not a plain directory are skipped.
pub(crate) fn child_dirs(dir: &str, entries: &[DirEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| entry.is_dir() && !entry.is_hidden())
        .map(|entry| paths::join(dir, &entry.name))
        .collect()
}

/// Run `visit` on every child directory and collect the sub-results in
/// order. The first error aborts the walk.
#[cfg(not(feature = "rayon"))]
pub(crate) fn visit_children<R, F>(children: &[String], visit: F) -> Result<Vec<R>>
where
    F: Fn(&str) -> Result<R> + Sync,
    R: Send,
{
    children.iter().map(|child| visit(child.as_str())).collect()
}

/// Run `visit` on every child directory in parallel and collect the
/// sub-results in order. An error from any subtree aborts the walk.
#[cfg(feature = "rayon")]
pub(crate) fn visit_children<R, F>(children: &[String], visit: F) -> Result<Vec<R>>
where
    F: Fn(&str) -> Result<R> + Sync,
    R: Send,
{
    use rayon::prelude::*;

    children.par_iter().map(|child| visit(child.as_str())).collect()
}
