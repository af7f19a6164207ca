//! The tree access facade the protocol layer talks to.
//!
//! Every operation takes one snapshot of the active generation and answers
//! entirely from it, so a concurrent [`VirtualFs::replace`] can never mix
//! nodes from two generations into one answer.

pub mod tree;

use parking_lot::RwLock;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::paths::Attributes;

pub use tree::{Insert, Node, NodeId, NodeKind, Tree, TreeBuilder, ROOT};

/// A node pinned to the generation it was looked up in.
#[derive(Clone)]
pub struct NodeRef {
    tree: Arc<Tree>,
    id: NodeId,
}

impl NodeRef {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn node(&self) -> &Node {
        // ids are only minted by lookups into this same tree
        self.tree.node(self.id).unwrap_or_else(|| self.tree.root())
    }

    pub fn is_dir(&self) -> bool {
        self.node().is_dir()
    }

    pub fn child(&self, name: &str) -> Option<NodeRef> {
        let id = self.tree.child(self.id, name)?;
        Some(NodeRef {
            tree: Arc::clone(&self.tree),
            id,
        })
    }

    pub fn child_names(&self) -> Option<Vec<String>> {
        Some(self.node().children()?.keys().cloned().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Times {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Times {
    /// Reported for paths that do not exist or carry no time.
    pub const NONE: Times = Times {
        atime: 0,
        mtime: 0,
        ctime: 0,
    };

    fn at(time: Option<i64>) -> Self {
        match time {
            Some(t) => Times {
                atime: 0,
                mtime: t,
                ctime: t,
            },
            None => Times::NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileKind,
    pub size: u64,
    pub times: Times,
    pub xattrs: Attributes,
}

pub struct VirtualFs {
    active: RwLock<Arc<Tree>>,
}

impl VirtualFs {
    pub fn new(tree: Tree) -> Self {
        Self {
            active: RwLock::new(Arc::new(tree)),
        }
    }

    /// The active generation.
    pub fn snapshot(&self) -> Arc<Tree> {
        Arc::clone(&self.active.read())
    }

    /// Publish `tree` as the active generation and hand back the old one.
    pub fn replace(&self, tree: Tree) -> Arc<Tree> {
        let next = Arc::new(tree);
        let previous = std::mem::replace(&mut *self.active.write(), next);
        tracing::debug!(
            previous = previous.scan_id(),
            current = self.scan_id(),
            "Published tree generation"
        );
        previous
    }

    pub fn scan_id(&self) -> u64 {
        self.active.read().scan_id()
    }

    pub fn lookup(&self, path: &str) -> Option<NodeRef> {
        let tree = self.snapshot();
        let id = tree.resolve(path)?;
        Some(NodeRef { tree, id })
    }

    /// Child names of the directory at `path`, in name order.
    pub fn list(&self, path: &str) -> Option<Vec<String>> {
        self.lookup(path)?.child_names()
    }

    pub fn attributes(&self, path: &str) -> Option<Stat> {
        let node_ref = self.lookup(path)?;
        Some(stat(node_ref.node()))
    }

    pub fn times(&self, path: &str) -> Times {
        self.lookup(path)
            .map(|n| Times::at(n.node().time))
            .unwrap_or(Times::NONE)
    }

    pub fn backing_path(&self, path: &str) -> Option<PathBuf> {
        self.lookup(path)?.node().backing().map(Path::to_path_buf)
    }

    /// Read up to `size` bytes at `offset` from the file backing `path`.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let node_ref = self
            .lookup(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))?;
        let backing = node_ref
            .node()
            .backing()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} is a directory", path)))?;
        read_at(backing, offset, size)
    }

    pub fn xattr_names(&self, path: &str) -> Option<Vec<String>> {
        Some(self.lookup(path)?.node().attributes.keys().cloned().collect())
    }

    pub fn xattr(&self, path: &str, name: &str) -> Option<String> {
        self.lookup(path)?.node().attributes.get(name).cloned()
    }
}

pub fn stat(node: &Node) -> Stat {
    let (kind, size) = match node.backing() {
        Some(backing) => (
            FileKind::File,
            fs::metadata(backing).map(|m| m.len()).unwrap_or(0),
        ),
        None => (FileKind::Directory, 0),
    };
    Stat {
        kind,
        size,
        times: Times::at(node.time),
        xattrs: node.attributes.clone(),
    }
}

pub fn read_at(backing: &Path, offset: u64, size: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(backing)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(size.min(1 << 20));
    file.take(size as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;

    fn generation(scan_id: u64, dir: &Path) -> Tree {
        let mut builder = TreeBuilder::new(scan_id);
        let mut event = Attributes::new();
        event.insert("user.shotwell.event_id".to_string(), scan_id.to_string());
        builder.directory("event", &event, 1_000);

        for i in 0..20 {
            let mut attrs = Attributes::new();
            attrs.insert("generation".to_string(), scan_id.to_string());
            let name = format!("event/{}-{}.jpg", scan_id, i);
            builder.insert_file(&name, dir.join(format!("{}.jpg", i)), attrs, 2_000 + i);
        }
        builder.finish()
    }

    #[test]
    fn test_lookup_list_and_attributes() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0.jpg"), b"0123456789").unwrap();
        let vfs = VirtualFs::new(generation(1, dir.path()));

        assert_eq!(vfs.list("/").unwrap(), vec!["event".to_string()]);
        assert_eq!(vfs.list("/event").unwrap().len(), 20);
        assert!(vfs.list("/event/1-0.jpg").is_none());
        assert!(vfs.lookup("/nope").is_none());

        let file = vfs.attributes("/event/1-0.jpg").unwrap();
        assert_eq!(file.kind, FileKind::File);
        assert_eq!(file.size, 10);
        assert_eq!(file.times, Times { atime: 0, mtime: 2_000, ctime: 2_000 });
        assert_eq!(file.xattrs["generation"], "1");

        // backing file missing: still listed, zero size
        assert_eq!(vfs.attributes("/event/1-1.jpg").unwrap().size, 0);

        let event = vfs.attributes("/event").unwrap();
        assert_eq!(event.kind, FileKind::Directory);
        assert_eq!(event.times.mtime, 1_000);
        assert_eq!(vfs.xattr("/event", "user.shotwell.event_id").as_deref(), Some("1"));
    }

    #[test]
    fn test_absent_paths_have_no_time() {
        let vfs = VirtualFs::new(Tree::empty(0));
        assert_eq!(vfs.times("/missing"), Times::NONE);
        assert_eq!(vfs.times("/"), Times::NONE);
        assert!(vfs.attributes("/missing").is_none());
        assert!(vfs.xattr_names("/missing").is_none());
    }

    #[test]
    fn test_read_ranges() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("0.jpg"), b"0123456789").unwrap();
        let vfs = VirtualFs::new(generation(1, dir.path()));

        assert_eq!(vfs.read("/event/1-0.jpg", 2, 3).unwrap(), b"234");
        assert_eq!(vfs.read("/event/1-0.jpg", 8, 100).unwrap(), b"89");
        assert!(vfs.read("/event/1-0.jpg", 20, 4).unwrap().is_empty());
        assert_eq!(vfs.read("/event/1-1.jpg", 0, 4).unwrap_err().kind(), io::ErrorKind::NotFound);
        assert_eq!(vfs.read("/missing", 0, 4).unwrap_err().kind(), io::ErrorKind::NotFound);
        assert!(vfs.read("/event", 0, 4).is_err());
        assert_eq!(vfs.backing_path("/event/1-3.jpg"), Some(dir.path().join("3.jpg")));
    }

    #[test]
    fn test_replace_returns_previous() {
        let vfs = VirtualFs::new(Tree::empty(1));
        let previous = vfs.replace(Tree::empty(2));
        assert_eq!(previous.scan_id(), 1);
        assert_eq!(vfs.scan_id(), 2);
    }

    #[test]
    fn test_concurrent_lookups_never_mix_generations() {
        let dir = tempdir().unwrap();
        let vfs = VirtualFs::new(generation(0, dir.path()));
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        let Some(event) = vfs.lookup("/event") else {
                            panic!("event directory vanished");
                        };
                        let generation = event.tree().scan_id().to_string();
                        assert_eq!(event.node().attributes["user.shotwell.event_id"], generation);
                        for name in event.child_names().unwrap() {
                            assert!(name.starts_with(&format!("{}-", generation)));
                            let child = event.child(&name).unwrap();
                            assert_eq!(child.node().attributes["generation"], generation);
                        }
                    }
                });
            }

            for scan_id in 1..200 {
                vfs.replace(generation(scan_id, dir.path()));
            }
            done.store(true, Ordering::Relaxed);
        });

        assert_eq!(vfs.scan_id(), 199);
    }
}
