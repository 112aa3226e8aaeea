//! The in-memory mount tree.
//!
//! Nodes live in an id-keyed arena owned by [`Tree`]; the service guards the
//! whole structure with its single tree lock, so nothing in here locks.
//! Child maps are keyed on the lowercased path segment (case-insensitive
//! lookup); the display form of each name stays on its node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use crate::accessor::ResourceAccessor;
use crate::error::{MountError, MountResult};
use crate::handle::HandleId;

/// Identifier of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u64);

/// Outcome of a path resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// Every segment resolved.
    Node(NodeId),
    /// The final segment is missing from an existing directory.
    MissingLeaf,
    /// An interior segment was missing or not a directory.
    MissingPath,
}

/// Child-map state of a lazy directory.
pub(crate) enum ChildState {
    /// Backing accessor not yet enumerated.
    Unexpanded,
    /// Enumerated once; immutable until the node is disposed, even if the
    /// underlying resource changes.
    Expanded(HashMap<String, NodeId>),
}

/// Tagged node variant; dispatched by pattern match, never by downcast.
pub(crate) enum NodeKind {
    /// Byte-addressable resource.
    File { accessor: Arc<dyn ResourceAccessor> },
    /// Synthetic directory with an explicitly managed child map: the tree
    /// root and every mount root. No backing accessor.
    Root { children: HashMap<String, NodeId> },
    /// Directory shadowing a directory-capable accessor; children fetched
    /// from the accessor on first touch.
    Directory {
        accessor: Arc<dyn ResourceAccessor>,
        children: ChildState,
    },
}

pub(crate) struct Node {
    /// Display form of the path segment.
    pub(crate) name: String,
    /// Captured at node creation; stands in for all timestamp fields.
    pub(crate) created: SystemTime,
    /// Live handles referencing this node, for cleanup ordering.
    pub(crate) handles: HashSet<HandleId>,
    pub(crate) kind: NodeKind,
}

impl Node {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            created: SystemTime::now(),
            handles: HashSet::new(),
            kind,
        }
    }

    /// True for the tree root, mount roots, and lazy directories.
    pub(crate) fn is_directory(&self) -> bool {
        !matches!(self.kind, NodeKind::File { .. })
    }

    /// The backing accessor, if the node has one.
    pub(crate) fn accessor(&self) -> Option<&Arc<dyn ResourceAccessor>> {
        match &self.kind {
            NodeKind::File { accessor } | NodeKind::Directory { accessor, .. } => Some(accessor),
            NodeKind::Root { .. } => None,
        }
    }
}

/// The node arena plus the single synthetic root.
pub(crate) struct Tree {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_node: u64,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let root_id = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            Node::new(
                "\\",
                NodeKind::Root {
                    children: HashMap::new(),
                },
            ),
        );
        Self {
            nodes,
            root: root_id,
            next_node: 0,
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Collation key for case-insensitive child lookup.
    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.next_node += 1;
        let id = NodeId(self.next_node);
        self.nodes.insert(id, node);
        id
    }

    fn root_children_mut(&mut self, id: NodeId) -> &mut HashMap<String, NodeId> {
        match &mut self
            .nodes
            .get_mut(&id)
            .expect("root node ids are never stale")
            .kind
        {
            NodeKind::Root { children } => children,
            _ => unreachable!("callers only pass Root node ids"),
        }
    }

    /// Create a new empty mount root. Duplicate names are a caller
    /// configuration error.
    pub(crate) fn insert_root(&mut self, name: &str) -> MountResult<NodeId> {
        let key = Self::key(name);
        let root = self.root;
        if self.root_children_mut(root).contains_key(&key) {
            return Err(MountError::duplicate_root(name));
        }
        let id = self.alloc(Node::new(
            name,
            NodeKind::Root {
                children: HashMap::new(),
            },
        ));
        self.root_children_mut(root).insert(key, id);
        Ok(id)
    }

    /// Look up a mount root by name.
    pub(crate) fn find_root(&self, name: &str) -> Option<NodeId> {
        let key = Self::key(name);
        let id = match &self.nodes.get(&self.root)?.kind {
            NodeKind::Root { children } => children.get(&key).copied(),
            _ => None,
        }?;
        matches!(self.nodes.get(&id)?.kind, NodeKind::Root { .. }).then_some(id)
    }

    /// Wrap an accessor and insert it as a child of the given mount root.
    pub(crate) fn add_resource(
        &mut self,
        root_id: NodeId,
        accessor: Arc<dyn ResourceAccessor>,
    ) -> MountResult<NodeId> {
        let name = accessor.resource_name();
        let key = Self::key(&name);
        if self.root_children_mut(root_id).contains_key(&key) {
            return Err(MountError::already_exists(name));
        }
        let kind = if accessor.is_directory() {
            NodeKind::Directory {
                accessor,
                children: ChildState::Unexpanded,
            }
        } else {
            NodeKind::File { accessor }
        };
        let id = self.alloc(Node::new(&name, kind));
        self.root_children_mut(root_id).insert(key, id);
        Ok(id)
    }

    /// Unlink a named child from a mount root (or the tree root) without
    /// disposing it. Returns the unlinked node id.
    pub(crate) fn unlink_child(&mut self, parent: NodeId, name: &str) -> Option<NodeId> {
        let key = Self::key(name);
        match &mut self.nodes.get_mut(&parent)?.kind {
            NodeKind::Root { children } => children.remove(&key),
            _ => None,
        }
    }

    /// Populate a lazy directory's children from its accessor.
    ///
    /// One-time: an already-expanded directory (and any non-lazy node) is a
    /// no-op. On enumeration failure the node stays unexpanded and the error
    /// surfaces to the failing call only.
    pub(crate) async fn expand(&mut self, id: NodeId) -> MountResult<()> {
        let accessor = match self.nodes.get(&id) {
            Some(Node {
                kind:
                    NodeKind::Directory {
                        accessor,
                        children: ChildState::Unexpanded,
                    },
                ..
            }) => accessor.clone(),
            _ => return Ok(()),
        };

        // The tree lock is held by our caller across these awaits; lazy
        // expansion is a structure mutation like any other.
        let directories = accessor.child_directories().await?;
        let files = accessor.files().await?;

        let mut children: HashMap<String, NodeId> = HashMap::new();
        for child in directories {
            let name = child.resource_name();
            let child_id = self.alloc(Node::new(
                &name,
                NodeKind::Directory {
                    accessor: child,
                    children: ChildState::Unexpanded,
                },
            ));
            if let Some(prev) = children.insert(Self::key(&name), child_id) {
                self.nodes.remove(&prev);
            }
        }
        for child in files {
            let name = child.resource_name();
            let child_id = self.alloc(Node::new(&name, NodeKind::File { accessor: child }));
            if let Some(prev) = children.insert(Self::key(&name), child_id) {
                self.nodes.remove(&prev);
            }
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            if let NodeKind::Directory {
                children: state, ..
            } = &mut node.kind
            {
                *state = ChildState::Expanded(children);
            }
        }
        Ok(())
    }

    /// Ids of a directory node's current children, expanding lazily.
    pub(crate) async fn child_ids(&mut self, id: NodeId) -> MountResult<Vec<NodeId>> {
        self.expand(id).await?;
        match self.nodes.get(&id) {
            Some(Node {
                kind: NodeKind::Root { children },
                ..
            }) => Ok(children.values().copied().collect()),
            Some(Node {
                kind:
                    NodeKind::Directory {
                        children: ChildState::Expanded(children),
                        ..
                    },
                ..
            }) => Ok(children.values().copied().collect()),
            Some(node) => Err(MountError::not_a_directory(node.name.clone())),
            None => Err(MountError::InvalidHandle),
        }
    }

    async fn lookup_child(&mut self, id: NodeId, segment: &str) -> MountResult<Option<NodeId>> {
        self.expand(id).await?;
        let key = Self::key(segment);
        let found = match self.nodes.get(&id).map(|node| &node.kind) {
            Some(NodeKind::Root { children }) => children.get(&key).copied(),
            Some(NodeKind::Directory {
                children: ChildState::Expanded(children),
                ..
            }) => children.get(&key).copied(),
            _ => None,
        };
        Ok(found)
    }

    /// Resolve a backslash-delimited path to a node.
    ///
    /// `\` resolves directly to the root; empty segments are skipped.
    /// Resolution stops at the first missing segment, distinguishing a
    /// missing leaf (the driver reports file-not-found) from a broken
    /// interior path (path-not-found).
    pub(crate) async fn resolve(&mut self, path: &str) -> MountResult<Resolved> {
        if path == "\\" {
            return Ok(Resolved::Node(self.root));
        }
        if !path.starts_with('\\') {
            return Ok(Resolved::MissingPath);
        }
        let segments: Vec<&str> = path.split('\\').filter(|s| !s.is_empty()).collect();
        let mut current = self.root;
        for (index, segment) in segments.iter().enumerate() {
            let found = self.lookup_child(current, segment).await?;
            match found {
                Some(next) => current = next,
                None => {
                    let parent_is_dir =
                        self.node(current).map(Node::is_directory).unwrap_or(false);
                    return Ok(if index + 1 == segments.len() && parent_is_dir {
                        Resolved::MissingLeaf
                    } else {
                        Resolved::MissingPath
                    });
                }
            }
        }
        Ok(Resolved::Node(current))
    }

    /// Remove a subtree from the arena, returning every handle id that was
    /// registered on a removed node. The caller must already have unlinked
    /// `id` from its parent.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<HandleId> {
        let mut handles = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            handles.extend(node.handles.iter().copied());
            match node.kind {
                NodeKind::File { .. } => {}
                NodeKind::Root { children } => stack.extend(children.into_values()),
                NodeKind::Directory { children, .. } => {
                    if let ChildState::Expanded(children) = children {
                        stack.extend(children.into_values());
                    }
                }
            }
        }
        handles
    }

    /// Remove every mount root (service shutdown / OS unmount), returning
    /// the handle ids of all removed nodes plus any registered on the root
    /// itself. The root node survives.
    pub(crate) fn clear(&mut self) -> Vec<HandleId> {
        let root = self.root;
        let children: Vec<NodeId> = self.root_children_mut(root).drain().map(|(_, id)| id).collect();
        let mut handles = Vec::new();
        for id in children {
            handles.extend(self.remove_subtree(id));
        }
        if let Some(node) = self.nodes.get_mut(&root) {
            handles.extend(node.handles.drain());
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessors::MemoryResource;

    fn file(name: &str, data: &[u8]) -> Arc<dyn ResourceAccessor> {
        Arc::new(MemoryResource::file(name, data.to_vec()))
    }

    #[tokio::test]
    async fn test_resolve_root_path() {
        let mut tree = Tree::new();
        let resolved = tree.resolve("\\").await.unwrap();
        assert_eq!(resolved, Resolved::Node(tree.root()));
    }

    #[tokio::test]
    async fn test_resolve_requires_leading_backslash() {
        let mut tree = Tree::new();
        tree.insert_root("Share1").unwrap();
        assert_eq!(
            tree.resolve("Share1").await.unwrap(),
            Resolved::MissingPath
        );
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let mut tree = Tree::new();
        let root = tree.insert_root("Share1").unwrap();
        tree.add_resource(root, file("movie.ts", b"abc")).unwrap();

        let first = tree.resolve("\\Share1\\movie.ts").await.unwrap();
        let second = tree.resolve("\\Share1\\movie.ts").await.unwrap();
        assert!(matches!(first, Resolved::Node(_)));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_resolve_case_insensitive() {
        let mut tree = Tree::new();
        let root = tree.insert_root("Share1").unwrap();
        tree.add_resource(root, file("Movie.TS", b"abc")).unwrap();

        let Resolved::Node(id) = tree.resolve("\\share1\\movie.ts").await.unwrap() else {
            panic!("expected a node");
        };
        let node = tree.node(id).unwrap();
        // Display name keeps its original casing.
        assert_eq!(node.name, "Movie.TS");
    }

    #[tokio::test]
    async fn test_resolve_skips_empty_segments() {
        let mut tree = Tree::new();
        let root = tree.insert_root("Share1").unwrap();
        tree.add_resource(root, file("movie.ts", b"abc")).unwrap();
        assert!(matches!(
            tree.resolve("\\Share1\\\\movie.ts").await.unwrap(),
            Resolved::Node(_)
        ));
    }

    #[tokio::test]
    async fn test_resolve_missing_leaf_vs_missing_path() {
        let mut tree = Tree::new();
        tree.insert_root("Share1").unwrap();

        // Missing final segment under an existing directory.
        assert_eq!(
            tree.resolve("\\Share1\\nope.ts").await.unwrap(),
            Resolved::MissingLeaf
        );
        // Missing interior segment.
        assert_eq!(
            tree.resolve("\\NoSuchShare\\x").await.unwrap(),
            Resolved::MissingPath
        );
    }

    #[tokio::test]
    async fn test_resolve_through_file_fails() {
        let mut tree = Tree::new();
        let root = tree.insert_root("Share1").unwrap();
        tree.add_resource(root, file("movie.ts", b"abc")).unwrap();
        assert_eq!(
            tree.resolve("\\Share1\\movie.ts\\x").await.unwrap(),
            Resolved::MissingPath
        );
    }

    #[tokio::test]
    async fn test_duplicate_root_rejected() {
        let mut tree = Tree::new();
        tree.insert_root("Share1").unwrap();
        assert!(matches!(
            tree.insert_root("share1"),
            Err(MountError::DuplicateRootName(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_subtree_collects_handles() {
        let mut tree = Tree::new();
        let root = tree.insert_root("Share1").unwrap();
        let node = tree.add_resource(root, file("movie.ts", b"abc")).unwrap();
        tree.node_mut(node).unwrap().handles.insert(HandleId::test_token(7));

        tree.unlink_child(tree.root(), "Share1");
        let handles = tree.remove_subtree(root);
        assert_eq!(handles, vec![HandleId::test_token(7)]);
        assert!(tree.node(node).is_none());
        assert!(tree.node(root).is_none());
    }
}
