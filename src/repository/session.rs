//! Repository sessions

use crate::error::StorageError;
use crate::path;
use crate::repository::{Node, SledNodeStore};
use std::collections::BTreeMap;
use std::ops::Bound;
use tracing::{debug, info};

/// Access to the node tree with save/discard semantics
pub trait Session {
    fn node(&self, path: &str) -> Option<&Node>;

    /// Paths of the direct children of a node, in path order
    fn children(&self, path: &str) -> Vec<String>;

    /// Create or replace a node; its parent must exist
    fn put_node(&mut self, path: &str, node: Node) -> Result<(), StorageError>;

    /// Remove a node together with its subtree
    fn remove_node(&mut self, path: &str) -> Result<(), StorageError>;

    fn has_pending_changes(&self) -> bool;

    /// Persist the working copy
    fn save(&mut self) -> Result<(), StorageError>;

    /// Re-sync with the saved state, keeping or discarding unsaved changes
    fn refresh(&mut self, keep_changes: bool) -> Result<(), StorageError>;
}

/// In-memory session, optionally written through to a sled store on save
pub struct MemorySession {
    saved: BTreeMap<String, Node>,
    working: BTreeMap<String, Node>,
    store: Option<SledNodeStore>,
}

impl MemorySession {
    /// Create an empty repository holding only the root folder
    pub fn new() -> Self {
        let mut saved = BTreeMap::new();
        saved.insert("/".to_string(), Node::folder());
        Self {
            working: saved.clone(),
            saved,
            store: None,
        }
    }

    /// Open a session over a persistent store, loading its saved tree
    pub fn open(store: SledNodeStore) -> Result<Self, StorageError> {
        let mut saved = store.load_all()?;
        saved.entry("/".to_string()).or_insert_with(Node::folder);
        info!(nodes = saved.len(), "Opened repository store");
        Ok(Self {
            working: saved.clone(),
            saved,
            store: Some(store),
        })
    }

    /// Nodes of the working copy below (and including) `root`
    pub fn subtree(&self, root: &str) -> Vec<(&str, &Node)> {
        self.working
            .iter()
            .filter(|(p, _)| path::is_ancestor_or_self(root, p))
            .map(|(p, n)| (p.as_str(), n))
            .collect()
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl Session for MemorySession {
    fn node(&self, path: &str) -> Option<&Node> {
        self.working.get(path)
    }

    fn children(&self, parent: &str) -> Vec<String> {
        let prefix = if parent == "/" {
            "/".to_string()
        } else {
            format!("{}/", parent)
        };
        self.working
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .map(|(p, _)| p)
            .take_while(|p| p.starts_with(&prefix))
            .filter(|p| p.as_str() != parent && path::parent(p) == Some(parent))
            .cloned()
            .collect()
    }

    fn put_node(&mut self, node_path: &str, node: Node) -> Result<(), StorageError> {
        if let Some(parent) = path::parent(node_path) {
            if !self.working.contains_key(parent) {
                return Err(StorageError::NodeNotFound(parent.to_string()));
            }
        }
        self.working.insert(node_path.to_string(), node);
        Ok(())
    }

    fn remove_node(&mut self, node_path: &str) -> Result<(), StorageError> {
        if node_path == "/" {
            return Err(StorageError::InvalidPath(
                "The root node cannot be removed".to_string(),
            ));
        }
        if self.working.remove(node_path).is_none() {
            return Err(StorageError::NodeNotFound(node_path.to_string()));
        }
        let prefix = format!("{}/", node_path);
        self.working.retain(|p, _| !p.starts_with(&prefix));
        Ok(())
    }

    fn has_pending_changes(&self) -> bool {
        self.working != self.saved
    }

    fn save(&mut self) -> Result<(), StorageError> {
        if let Some(store) = &self.store {
            store.replace_all(&self.working)?;
        }
        self.saved = self.working.clone();
        debug!(nodes = self.saved.len(), "Session saved");
        Ok(())
    }

    fn refresh(&mut self, keep_changes: bool) -> Result<(), StorageError> {
        if !keep_changes {
            self.working = self.saved.clone();
            debug!("Session refreshed, pending changes discarded");
        }
        Ok(())
    }
}
