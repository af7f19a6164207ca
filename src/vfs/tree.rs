//! One generation of the virtual directory tree.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. A tree is assembled
//! with [`TreeBuilder`] and never mutated after [`TreeBuilder::finish`].

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::paths::Attributes;

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory { children: BTreeMap<String, NodeId> },
    File { backing: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub attributes: Attributes,
    /// Exposure time in unix seconds; `None` for undecorated directories.
    pub time: Option<i64>,
}

impl Node {
    fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            attributes: Attributes::new(),
            time: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn children(&self) -> Option<&BTreeMap<String, NodeId>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    pub fn backing(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::File { backing } => Some(backing),
            NodeKind::Directory { .. } => None,
        }
    }
}

/// Split a `/`-separated path into its non-empty components.
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
    scan_id: u64,
}

impl Tree {
    /// A tree holding only the root directory.
    pub fn empty(scan_id: u64) -> Self {
        Self {
            nodes: vec![Node::directory("")],
            scan_id,
        }
    }

    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> &Node {
        &self.nodes[ROOT]
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)?.children()?.get(name).copied()
    }

    pub fn resolve(&self, path: &str) -> Option<NodeId> {
        components(path).try_fold(ROOT, |id, name| self.child(id, name))
    }

    pub fn file_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_dir()).count()
    }

    pub fn directory_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_dir()).count()
    }

    /// Every node below `from` as `(path, id)`, depth first in name order.
    pub fn walk(&self, from: NodeId) -> Vec<(String, NodeId)> {
        let mut out = Vec::new();
        let mut stack = vec![(String::new(), from)];
        while let Some((path, id)) = stack.pop() {
            if let Some(children) = self.node(id).and_then(Node::children) {
                for (name, &child) in children.iter().rev() {
                    stack.push((format!("{}/{}", path, name), child));
                }
            }
            if id != from {
                out.push((path, id));
            }
        }
        out
    }
}

/// What happened to a file insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// Another file already held the path; it now points at the new backing.
    Replaced { previous: PathBuf },
    /// A file sits where a directory is needed, or a directory where the file
    /// would go. Nothing was inserted.
    Conflict,
}

pub struct TreeBuilder {
    tree: Tree,
    decorated: HashSet<NodeId>,
}

impl TreeBuilder {
    pub fn new(scan_id: u64) -> Self {
        Self {
            tree: Tree::empty(scan_id),
            decorated: HashSet::new(),
        }
    }

    /// Walk to `path`, creating missing directories. Returns `None` if a file
    /// is in the way.
    fn ensure_dirs<'a>(&mut self, names: impl Iterator<Item = &'a str>) -> Option<NodeId> {
        let mut current = ROOT;
        for name in names {
            current = match self.tree.child(current, name) {
                Some(existing) if self.tree.nodes[existing].is_dir() => existing,
                Some(_) => return None,
                None => self.push_child(current, Node::directory(name)),
            };
        }
        Some(current)
    }

    fn push_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.tree.nodes.len();
        let name = node.name.clone();
        self.tree.nodes.push(node);
        if let NodeKind::Directory { children } = &mut self.tree.nodes[parent].kind {
            children.insert(name, id);
        }
        id
    }

    /// Ensure a directory exists at `path` and decorate it with `attributes`
    /// and `time` unless an earlier call already did.
    pub fn directory(&mut self, path: &str, attributes: &Attributes, time: i64) -> Option<NodeId> {
        let id = self.ensure_dirs(components(path))?;
        if id != ROOT && self.decorated.insert(id) {
            let node = &mut self.tree.nodes[id];
            node.attributes = attributes.clone();
            node.time = Some(time);
        }
        Some(id)
    }

    /// Insert a file at `path`, creating parent directories as needed. A file
    /// already at `path` is overwritten.
    pub fn insert_file(&mut self, path: &str, backing: PathBuf, attributes: Attributes, time: i64) -> Insert {
        let names: Vec<&str> = components(path).collect();
        let Some((leaf, parents)) = names.split_last() else {
            return Insert::Conflict;
        };
        let Some(parent) = self.ensure_dirs(parents.iter().copied()) else {
            return Insert::Conflict;
        };

        match self.tree.child(parent, leaf) {
            Some(existing) => {
                let node = &mut self.tree.nodes[existing];
                let NodeKind::File { backing: previous } = &mut node.kind else {
                    return Insert::Conflict;
                };
                let previous = std::mem::replace(previous, backing);
                node.attributes = attributes;
                node.time = Some(time);
                Insert::Replaced { previous }
            }
            None => {
                self.push_child(
                    parent,
                    Node {
                        name: leaf.to_string(),
                        kind: NodeKind::File { backing },
                        attributes,
                        time: Some(time),
                    },
                );
                Insert::Added
            }
        }
    }

    pub fn finish(self) -> Tree {
        self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(key: &str, value: &str) -> Attributes {
        let mut a = Attributes::new();
        a.insert(key.to_string(), value.to_string());
        a
    }

    #[test]
    fn test_insert_creates_intermediate_directories() {
        let mut builder = TreeBuilder::new(1);
        let outcome = builder.insert_file("2024/03/42.jpg", "/p/42.jpg".into(), Attributes::new(), 7);
        assert_eq!(outcome, Insert::Added);

        let tree = builder.finish();
        let id = tree.resolve("/2024/03/42.jpg").unwrap();
        assert_eq!(tree.node(id).unwrap().backing(), Some(Path::new("/p/42.jpg")));
        assert!(tree.node(tree.resolve("2024").unwrap()).unwrap().is_dir());
        assert_eq!(tree.file_count(), 1);
        assert_eq!(tree.directory_count(), 3);
    }

    #[test]
    fn test_directory_decorated_once() {
        let mut builder = TreeBuilder::new(1);
        let first = builder.directory("2024-03 Easter", &attrs("k", "first"), 100).unwrap();
        let again = builder.directory("2024-03 Easter", &attrs("k", "second"), 200).unwrap();
        assert_eq!(first, again);

        let tree = builder.finish();
        let node = tree.node(first).unwrap();
        assert_eq!(node.attributes["k"], "first");
        assert_eq!(node.time, Some(100));
        assert_eq!(tree.root().time, None);
    }

    #[test]
    fn test_collision_last_writer_wins() {
        let mut builder = TreeBuilder::new(1);
        builder.insert_file("e/a.jpg", "/one.jpg".into(), attrs("id", "1"), 1);
        let outcome = builder.insert_file("e/a.jpg", "/two.jpg".into(), attrs("id", "2"), 2);
        assert_eq!(
            outcome,
            Insert::Replaced {
                previous: "/one.jpg".into()
            }
        );

        let tree = builder.finish();
        let node = tree.node(tree.resolve("e/a.jpg").unwrap()).unwrap();
        assert_eq!(node.backing(), Some(Path::new("/two.jpg")));
        assert_eq!(node.attributes["id"], "2");
        assert_eq!(tree.file_count(), 1);
    }

    #[test]
    fn test_file_directory_conflicts() {
        let mut builder = TreeBuilder::new(1);
        builder.insert_file("e/a", "/a".into(), Attributes::new(), 0);
        assert_eq!(builder.insert_file("e/a/b.jpg", "/b".into(), Attributes::new(), 0), Insert::Conflict);
        assert_eq!(builder.insert_file("e", "/e".into(), Attributes::new(), 0), Insert::Conflict);
        assert_eq!(builder.insert_file("", "/r".into(), Attributes::new(), 0), Insert::Conflict);
        assert!(builder.directory("e/a", &Attributes::new(), 0).is_none());
    }

    #[test]
    fn test_walk_in_name_order() {
        let mut builder = TreeBuilder::new(3);
        builder.insert_file("b/2.jpg", "/2".into(), Attributes::new(), 0);
        builder.insert_file("a/1.jpg", "/1".into(), Attributes::new(), 0);
        builder.insert_file("b/1.jpg", "/3".into(), Attributes::new(), 0);
        let tree = builder.finish();

        let paths: Vec<String> = tree.walk(ROOT).into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/a", "/a/1.jpg", "/b", "/b/1.jpg", "/b/2.jpg"]);
        assert_eq!(tree.scan_id(), 3);
    }

    #[test]
    fn test_resolve_ignores_redundant_separators() {
        let mut builder = TreeBuilder::new(1);
        builder.insert_file("x/y.jpg", "/y".into(), Attributes::new(), 0);
        let tree = builder.finish();
        assert_eq!(tree.resolve("//x//y.jpg"), tree.resolve("x/y.jpg"));
        assert_eq!(tree.resolve("/"), Some(ROOT));
        assert_eq!(tree.resolve("/missing"), None);
    }
}
