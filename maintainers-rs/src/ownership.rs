use std::collections::{btree_set, BTreeSet};

use tracing::debug;

use crate::{
    parser::Maintainer,
    paths,
    tree::Tree,
    walk::{child_dirs, list_dir, read_declarations, visit_children},
    Result,
};

/// The acting user, identified by email, handle, or both. Empty strings are
/// treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub email: Option<String>,
    pub handle: Option<String>,
}

impl Identity {
    pub fn new(email: impl Into<String>, handle: impl Into<String>) -> Self {
        let non_empty = |s: String| if s.is_empty() { None } else { Some(s) };
        Self {
            email: non_empty(email.into()),
            handle: non_empty(handle.into()),
        }
    }

    pub fn with_email(email: impl Into<String>) -> Self {
        Self::new(email, "")
    }

    pub fn with_handle(handle: impl Into<String>) -> Self {
        Self::new("", handle)
    }

    fn is_listed_in(&self, declared: &BTreeSet<&str>) -> bool {
        [&self.email, &self.handle]
            .into_iter()
            .flatten()
            .any(|id| declared.contains(id.as_str()))
    }
}

/// The directories one acting user is entitled to act on. Paths are
/// repository-relative with `.` for the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipSet {
    dirs: BTreeSet<String>,
}

impl OwnershipSet {
    /// Walk `tree` from its root and collect every directory `identity` owns.
    ///
    /// A directory without a MAINTAINERS file is owned unless an ancestor
    /// handed it to someone else. A directory with a MAINTAINERS file is
    /// owned exactly when the identity is listed in it, whatever its
    /// ancestors said. Hidden directories are not visited.
    pub fn build<T: Tree + ?Sized>(tree: &T, identity: &Identity) -> Result<OwnershipSet> {
        let dirs = collect_owned(tree, identity, ".", false, 0)?;
        debug!(owned = dirs.len(), "built ownership set");
        Ok(dirs.into_iter().collect())
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.dirs.contains(dir)
    }

    /// Whether the directory holding `path` is owned. Only the immediate
    /// parent is consulted.
    pub fn owns_file(&self, path: &str) -> bool {
        let cleaned = paths::clean_path(path);
        self.contains(paths::parent_dir(&cleaned))
    }

    /// Owned directories in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

impl FromIterator<String> for OwnershipSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            dirs: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for OwnershipSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_owned).collect()
    }
}

impl IntoIterator for OwnershipSet {
    type Item = String;
    type IntoIter = btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.dirs.into_iter()
    }
}

#[derive(Debug, Clone, Copy)]
struct DirectoryState {
    has_declaration: bool,
    acting_user_is_owner: bool,
}

impl DirectoryState {
    fn new(declared: Option<&[Maintainer]>, identity: &Identity) -> Self {
        match declared {
            None => Self {
                has_declaration: false,
                acting_user_is_owner: false,
            },
            Some(records) => {
                let ids = records
                    .iter()
                    .flat_map(|m| [m.email.as_str(), m.username.as_str()])
                    .filter(|id| !id.is_empty())
                    .collect::<BTreeSet<_>>();
                Self {
                    has_declaration: true,
                    acting_user_is_owner: identity.is_listed_in(&ids),
                }
            }
        }
    }

    fn is_owned(self, belongs_to_others: bool) -> bool {
        self.acting_user_is_owner || (!self.has_declaration && !belongs_to_others)
    }
}

// Each call returns the owned directories of its own subtree; the caller
// merges them.
fn collect_owned<T: Tree + ?Sized>(
    tree: &T,
    identity: &Identity,
    dir: &str,
    belongs_to_others: bool,
    depth: usize,
) -> Result<Vec<String>> {
    let entries = list_dir(tree, dir, depth)?;
    let declared = read_declarations(tree, dir, &entries)?;
    let state = DirectoryState::new(declared.as_deref(), identity);
    let owned = state.is_owned(belongs_to_others);
    debug!(
        dir,
        has_declaration = state.has_declaration,
        owner = state.acting_user_is_owner,
        inherited_others = belongs_to_others,
        owned,
        "resolved directory ownership"
    );

    let mut owned_dirs = Vec::new();
    if owned {
        owned_dirs.push(dir.to_owned());
    }
    let children = child_dirs(dir, &entries);
    let nested = visit_children(&children, |child| {
        collect_owned(tree, identity, child, !owned, depth + 1)
    })?;
    owned_dirs.extend(nested.into_iter().flatten());
    Ok(owned_dirs)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::{
        tree::{DirEntry, MemoryTree},
        Error,
    };

    const ALICE: &str = "Alice Liddell <alice@example.com> (@alice)";
    const BOB: &str = "Bob Builder <bob@example.com> (@bob)";

    fn sample_tree() -> MemoryTree {
        let mut tree = MemoryTree::new();
        tree.insert_file("a/MAINTAINERS", ALICE);
        tree.insert_dir("a/x");
        tree.insert_file("b/MAINTAINERS", BOB);
        tree.insert_dir("c/d");
        tree
    }

    fn owned(tree: &impl Tree, identity: &Identity) -> Vec<String> {
        OwnershipSet::build(tree, identity)
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_sibling_declarations() {
        let tree = sample_tree();

        assert_eq!(
            owned(&tree, &Identity::with_email("alice@example.com")),
            vec![".", "a", "a/x", "c", "c/d"]
        );
        assert_eq!(
            owned(&tree, &Identity::with_handle("bob")),
            vec![".", "b", "c", "c/d"]
        );
        assert_eq!(
            owned(&tree, &Identity::new("carol@example.com", "carol")),
            vec![".", "c", "c/d"]
        );
    }

    #[test]
    fn test_nested_declaration_overrides_ancestor() {
        let mut tree = MemoryTree::new();
        tree.insert_file("a/MAINTAINERS", ALICE);
        tree.insert_file("a/sub/MAINTAINERS", BOB);
        tree.insert_dir("a/sub/deep");

        assert_eq!(
            owned(&tree, &Identity::with_handle("alice")),
            vec![".", "a"]
        );
        assert_eq!(
            owned(&tree, &Identity::with_handle("bob")),
            vec![".", "a/sub", "a/sub/deep"]
        );
    }

    #[test]
    fn test_undeclared_dir_below_foreign_dir_is_not_owned() {
        let mut tree = MemoryTree::new();
        tree.insert_file("MAINTAINERS", BOB);
        tree.insert_dir("lib/inner/deeper");
        tree.insert_file("lib/inner/deeper/MAINTAINERS", ALICE);
        tree.insert_dir("lib/inner/deeper/leaf");

        assert!(owned(&tree, &Identity::with_handle("carol")).is_empty());
        assert_eq!(
            owned(&tree, &Identity::with_handle("alice")),
            vec!["lib/inner/deeper", "lib/inner/deeper/leaf"]
        );
    }

    #[test]
    fn test_empty_declaration_file_claims_directory() {
        let mut tree = MemoryTree::new();
        tree.insert_file("vendor/MAINTAINERS", "");
        tree.insert_dir("vendor/lib");

        assert_eq!(owned(&tree, &Identity::with_handle("alice")), vec!["."]);
    }

    #[test]
    fn test_disabled_record_still_grants_ownership() {
        let mut tree = MemoryTree::new();
        tree.insert_file("a/MAINTAINERS", format!("#{}\n{}", ALICE, BOB));
        tree.insert_file("b/MAINTAINERS", format!("#{}", ALICE));

        assert_eq!(
            owned(&tree, &Identity::with_handle("alice")),
            vec![".", "a", "b"]
        );
        assert_eq!(
            owned(&tree, &Identity::with_handle("bob")),
            vec![".", "a"]
        );
    }

    #[test]
    fn test_identity_matching_is_exact() {
        let tree = sample_tree();

        let upper = Identity::with_email("ALICE@example.com");
        assert!(!owned(&tree, &upper).contains(&"a".to_owned()));
        let empty = Identity::default();
        assert_eq!(owned(&tree, &empty), vec![".", "c", "c/d"]);
    }

    #[test]
    fn test_case_insensitive_file_name_and_hidden_dirs() {
        let mut tree = MemoryTree::new();
        tree.insert_file("a/maintainers", BOB);
        tree.insert_dir(".git/objects");
        tree.insert_dir("a/.cache");

        assert_eq!(owned(&tree, &Identity::with_handle("carol")), vec!["."]);
        assert_eq!(
            owned(&tree, &Identity::with_handle("bob")),
            vec![".", "a"]
        );
    }

    #[test]
    fn test_malformed_declaration_fails_build() {
        let mut tree = sample_tree();
        tree.insert_file("b/x/MAINTAINERS", "Carol\n");

        let err = OwnershipSet::build(&tree, &Identity::with_handle("alice")).unwrap_err();
        match err {
            Error::FileFormat { path, source } => {
                assert_eq!(path.to_str(), Some("b/x/MAINTAINERS"));
                assert_eq!(source.line, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_directory_fails_build() {
        struct Broken(MemoryTree);

        impl Tree for Broken {
            fn read_dir(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
                if dir == "b" {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
                }
                self.0.read_dir(dir)
            }

            fn read_to_string(&self, path: &str) -> io::Result<String> {
                self.0.read_to_string(path)
            }
        }

        let err = OwnershipSet::build(&Broken(sample_tree()), &Identity::with_handle("alice"))
            .unwrap_err();
        assert!(
            matches!(err, Error::TreeRead { ref path, ref source }
                if path.to_str() == Some("b") && source.kind() == io::ErrorKind::PermissionDenied),
            "unexpected error: {:?}",
            err
        );
    }

    #[test]
    fn test_cyclic_tree_is_bounded() {
        // Every directory claims to contain itself.
        struct Cyclic;

        impl Tree for Cyclic {
            fn read_dir(&self, _dir: &str) -> io::Result<Vec<DirEntry>> {
                Ok(vec![DirEntry::new("loop", crate::tree::EntryKind::Dir)])
            }

            fn read_to_string(&self, path: &str) -> io::Result<String> {
                Err(io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
            }
        }

        let err = OwnershipSet::build(&Cyclic, &Identity::with_handle("alice")).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { .. }));
    }

    #[test]
    fn test_build_is_idempotent() {
        let tree = sample_tree();
        let identity = Identity::new("alice@example.com", "alice");
        assert_eq!(
            OwnershipSet::build(&tree, &identity).unwrap(),
            OwnershipSet::build(&tree, &identity).unwrap()
        );
    }

    #[test]
    fn test_owns_file() {
        let set = ["a", "."].into_iter().collect::<OwnershipSet>();
        assert!(set.owns_file("a/z.go"));
        assert!(set.owns_file("./a/./z.go"));
        assert!(set.owns_file("README.md"));
        assert!(!set.owns_file("a/b/z.go"));
        assert!(!set.owns_file("c/z.go"));
    }
}
