//! Node arena backing the virtual file tree
//!
//! Entries live in a flat slot vector and refer to each other by index.
//! Freed slots are recycled; an id is only meaningful while its node lives.

use std::collections::HashMap;

use simbox_utils::{Result, SimboxError};

/// Stable index of a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Directory or file payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory {
        children: HashMap<String, NodeId>,
    },
    /// `content` is `None` for entries known only from a remote listing
    File {
        content: Option<String>,
        binary: bool,
    },
}

impl NodeKind {
    pub fn empty_dir() -> Self {
        Self::Directory {
            children: HashMap::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Split a slash-separated path into its non-empty segments
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect()
}

/// Canonical relative form of a path: no leading, trailing or doubled `/`
pub fn normalize(path: &str) -> String {
    segments(path).join("/")
}

#[derive(Debug)]
pub struct Arena {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl Arena {
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::empty_dir(),
            })],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        match &self.get(dir)?.kind {
            NodeKind::Directory { children } => children.get(name).copied(),
            NodeKind::File { .. } => None,
        }
    }

    /// Child names of a directory, sorted
    pub fn child_names(&self, dir: NodeId) -> Vec<String> {
        let mut names: Vec<String> = match self.get(dir).map(|n| &n.kind) {
            Some(NodeKind::Directory { children }) => children.keys().cloned().collect(),
            _ => Vec::new(),
        };
        names.sort();
        names
    }

    /// Resolve a path to a node, if every segment exists
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        segments(path)
            .into_iter()
            .try_fold(self.root(), |id, seg| self.child(id, seg))
    }

    /// Walk `path` from the root, creating missing directories
    ///
    /// Fails with `NotADirectory` naming the first segment that is a file.
    pub fn ensure_dirs(&mut self, path: &str) -> Result<NodeId> {
        let mut current = self.root();
        let mut walked = Vec::new();

        for seg in segments(path) {
            walked.push(seg);
            current = match self.child(current, seg) {
                Some(id) => match self.get(id).map(|n| n.kind.is_dir()) {
                    Some(true) => id,
                    _ => return Err(SimboxError::NotADirectory(walked.join("/"))),
                },
                None => self.attach(current, seg, NodeKind::empty_dir())?,
            };
        }

        Ok(current)
    }

    /// Place `kind` under `parent` as `name`, dropping any previous entry
    pub fn attach(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> Result<NodeId> {
        if let Some(old) = self.child(parent, name) {
            self.remove(old);
        }

        let node = Node {
            name: name.to_string(),
            parent: Some(parent),
            kind,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };

        match self.get_mut(parent).map(|n| &mut n.kind) {
            Some(NodeKind::Directory { children }) => {
                children.insert(name.to_string(), id);
                Ok(id)
            }
            _ => {
                self.nodes[id.0] = None;
                self.free.push(id.0);
                Err(SimboxError::NotADirectory(self.path_of(parent)))
            }
        }
    }

    /// Replace the payload of an existing node, freeing any old children
    pub fn replace_kind(&mut self, id: NodeId, kind: NodeKind) {
        let old_children: Vec<NodeId> = match self.get(id).map(|n| &n.kind) {
            Some(NodeKind::Directory { children }) => children.values().copied().collect(),
            _ => Vec::new(),
        };
        for child in old_children {
            self.free_subtree(child);
        }
        if let Some(node) = self.get_mut(id) {
            node.kind = kind;
        }
    }

    /// Detach a node from its parent and free its whole subtree
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root() {
            return;
        }
        let Some(node) = self.get(id) else {
            return;
        };
        let (name, parent) = (node.name.clone(), node.parent);

        if let Some(NodeKind::Directory { children }) =
            parent.and_then(|p| self.get_mut(p)).map(|n| &mut n.kind)
        {
            children.remove(&name);
        }
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(current.0).and_then(Option::take) {
                if let NodeKind::Directory { children } = node.kind {
                    stack.extend(children.into_values());
                }
                self.free.push(current.0);
            }
        }
    }

    /// Relative path of a node (empty for the root)
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|c| self.get(c)) {
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Every file node with its relative path
    pub fn files(&self) -> Vec<(String, &NodeKind)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| {
                let node = node.as_ref()?;
                match node.kind {
                    NodeKind::File { .. } => Some((self.path_of(NodeId(slot)), &node.kind)),
                    NodeKind::Directory { .. } => None,
                }
            })
            .collect()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
