//! Read-only views of a repository tree. All paths handed to a [`Tree`] are
//! relative to its root, use `/` separators, and name the root itself `.`.

use std::{collections::BTreeMap, fs, io, path::PathBuf};

use tracing::warn;

/// Walks never descend more than this many directories below the root.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symbolic links, sockets and the like. Never descended into.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

pub trait Tree: Sync {
    /// List the immediate entries of a directory, sorted by name.
    fn read_dir(&self, dir: &str) -> io::Result<Vec<DirEntry>>;

    fn read_to_string(&self, path: &str) -> io::Result<String>;
}

impl<T: Tree + ?Sized> Tree for &T {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
        (**self).read_dir(dir)
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        (**self).read_to_string(path)
    }
}

/// A [`Tree`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsTree {
    root: PathBuf,
}

impl FsTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The on-disk location of a tree-relative path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        if path == "." {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }
}

impl Tree for FsTree {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(dir))? {
            let entry = entry?;
            // Tree paths are `str`; a lossy name could not be opened again.
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!(path = %entry.path().display(), "skipping entry with non UTF-8 name");
                continue;
            };
            // `file_type` does not follow symlinks, so linked directories
            // show up as `Other`.
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(DirEntry::new(name, kind));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path))
    }
}

#[derive(Clone, Copy, Debug)]
struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    children: BTreeMap<String, NodeId>,
    // `Some` for files
    contents: Option<String>,
}

impl Node {
    fn dir() -> Self {
        Self {
            children: BTreeMap::new(),
            contents: None,
        }
    }
}

/// An in-memory [`Tree`]. Parent directories are created implicitly.
///
/// ```
/// use maintainers_rs::{MemoryTree, Tree};
///
/// let mut tree = MemoryTree::new();
/// tree.insert_file("a/MAINTAINERS", "Alice <alice@example.com>");
/// tree.insert_dir("a/x");
/// assert_eq!(tree.read_dir("a").unwrap().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<Node>,
}

impl MemoryTree {
    const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::dir()],
        }
    }

    pub fn insert_dir(&mut self, path: &str) {
        self.insert(path);
    }

    pub fn insert_file(&mut self, path: &str, contents: impl Into<String>) {
        let node_id = self.insert(path);
        self.nodes[node_id.0].contents = Some(contents.into());
    }

    fn insert(&mut self, path: &str) -> NodeId {
        let mut current = Self::ROOT;
        for segment in segments(path) {
            let child = self.nodes[current.0].children.get(segment).copied();
            current = match child {
                Some(node_id) => node_id,
                None => {
                    let node_id = NodeId(self.nodes.len());
                    self.nodes.push(Node::dir());
                    self.nodes[current.0]
                        .children
                        .insert(segment.to_owned(), node_id);
                    node_id
                }
            };
        }
        current
    }

    fn lookup(&self, path: &str) -> io::Result<&Node> {
        let mut current = Self::ROOT;
        for segment in segments(path) {
            current = *self.nodes[current.0]
                .children
                .get(segment)
                .ok_or_else(|| not_found(path))?;
        }
        Ok(&self.nodes[current.0])
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree for MemoryTree {
    fn read_dir(&self, dir: &str) -> io::Result<Vec<DirEntry>> {
        let node = self.lookup(dir)?;
        if node.contents.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("not a directory: {}", dir),
            ));
        }
        Ok(node
            .children
            .iter()
            .map(|(name, &child)| {
                let kind = match self.nodes[child.0].contents {
                    Some(_) => EntryKind::File,
                    None => EntryKind::Dir,
                };
                DirEntry::new(name.as_str(), kind)
            })
            .collect())
    }

    fn read_to_string(&self, path: &str) -> io::Result<String> {
        self.lookup(path)?.contents.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, format!("is a directory: {}", path))
        })
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {}", path))
}
