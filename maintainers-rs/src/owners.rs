use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    parser::Maintainer,
    tree::Tree,
    walk::{child_dirs, list_dir, read_declarations, visit_children},
    Result,
};

/// Maintainers for every directory of a tree, regardless of who is asking.
///
/// Built from a tree, each directory maps to the records of the nearest
/// MAINTAINERS file at or above it, so a lookup of a file's parent directory
/// finds its reviewers directly. Lists are shared between the directories
/// that inherit them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryOwners {
    dirs: HashMap<String, Arc<[Maintainer]>>,
}

impl DirectoryOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `tree` from its root, visiting the same directories as
    /// [`crate::OwnershipSet::build`]. Directories with no MAINTAINERS file
    /// in their ancestry get no entry.
    pub fn build<T: Tree + ?Sized>(tree: &T) -> Result<DirectoryOwners> {
        let dirs = collect_owners(tree, ".", None, 0)?;
        debug!(dirs = dirs.len(), "built directory owners map");
        Ok(Self {
            dirs: dirs.into_iter().collect(),
        })
    }

    /// The maintainers of `dir`, empty when the directory is unknown.
    pub fn get(&self, dir: &str) -> &[Maintainer] {
        self.dirs.get(dir).map(|owners| &owners[..]).unwrap_or(&[])
    }

    pub fn insert(&mut self, dir: impl Into<String>, owners: Vec<Maintainer>) {
        self.dirs.insert(dir.into(), owners.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Maintainer])> {
        self.dirs
            .iter()
            .map(|(dir, owners)| (dir.as_str(), &owners[..]))
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl From<HashMap<String, Vec<Maintainer>>> for DirectoryOwners {
    fn from(map: HashMap<String, Vec<Maintainer>>) -> Self {
        map.into_iter().collect()
    }
}

impl FromIterator<(String, Vec<Maintainer>)> for DirectoryOwners {
    fn from_iter<I: IntoIterator<Item = (String, Vec<Maintainer>)>>(iter: I) -> Self {
        Self {
            dirs: iter
                .into_iter()
                .map(|(dir, owners)| (dir, owners.into()))
                .collect(),
        }
    }
}

fn collect_owners<T: Tree + ?Sized>(
    tree: &T,
    dir: &str,
    inherited: Option<Arc<[Maintainer]>>,
    depth: usize,
) -> Result<Vec<(String, Arc<[Maintainer]>)>> {
    let entries = list_dir(tree, dir, depth)?;
    let effective = match read_declarations(tree, dir, &entries)? {
        Some(declared) => Some(Arc::from(declared)),
        None => inherited,
    };

    let mut owners = Vec::new();
    if let Some(effective) = &effective {
        owners.push((dir.to_owned(), Arc::clone(effective)));
    }
    let children = child_dirs(dir, &entries);
    let nested = visit_children(&children, |child| {
        collect_owners(tree, child, effective.clone(), depth + 1)
    })?;
    owners.extend(nested.into_iter().flatten());
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_line, tree::MemoryTree};

    fn usernames(owners: &[Maintainer]) -> Vec<&str> {
        owners.iter().map(|m| m.username.as_str()).collect()
    }

    #[test]
    fn test_build_inherits_nearest_declaration() {
        let mut tree = MemoryTree::new();
        tree.insert_file("MAINTAINERS", "Root Person <root@example.com> (@root)");
        tree.insert_file(
            "src/MAINTAINERS",
            "Alice <alice@example.com> (@alice)\nBob <bob@example.com> (@bob)",
        );
        tree.insert_dir("src/util");
        tree.insert_file("docs/MAINTAINERS", "");
        tree.insert_dir(".github/workflows");

        let owners = DirectoryOwners::build(&tree).unwrap();
        assert_eq!(usernames(owners.get(".")), vec!["root"]);
        assert_eq!(usernames(owners.get("src")), vec!["alice", "bob"]);
        assert_eq!(usernames(owners.get("src/util")), vec!["alice", "bob"]);
        assert!(owners.get("docs").is_empty());
        assert!(owners.get(".github").is_empty());
        assert_eq!(owners.len(), 4);
    }

    #[test]
    fn test_undeclared_tree_has_no_entries() {
        let mut tree = MemoryTree::new();
        tree.insert_dir("a/b/c");
        assert!(DirectoryOwners::build(&tree).unwrap().is_empty());
    }

    #[test]
    fn test_case_variant_files_are_concatenated() {
        let mut tree = MemoryTree::new();
        tree.insert_file("a/MAINTAINERS", "Alice <alice@example.com> (@alice)");
        tree.insert_file("a/maintainers", "Bob <bob@example.com> (@bob)");

        let owners = DirectoryOwners::build(&tree).unwrap();
        assert_eq!(usernames(owners.get("a")), vec!["alice", "bob"]);
    }

    #[test]
    fn test_from_map() {
        let alice = parse_line("Alice <alice@example.com> (@alice)").unwrap();
        let mut map = HashMap::new();
        map.insert("src".to_owned(), vec![alice.clone(), alice]);
        let owners = DirectoryOwners::from(map);
        assert_eq!(usernames(owners.get("src")), vec!["alice", "alice"]);
        assert!(owners.get("lib").is_empty());
    }
}
