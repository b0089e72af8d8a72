//! Filesystem view of the repository
//!
//! The view presents every aggregate as one or more files. A `ViewFile` is a
//! snapshot: it stays valid until the view is invalidated, even if the
//! repository changed underneath it in the meantime.

pub mod fs;
mod import;

pub use fs::VaultFs;

use crate::artifact::{ArtifactKey, ArtifactSet};
use crate::error::StorageError;
use crate::path;
use std::collections::BTreeSet;

/// A file or directory of the filesystem view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewFile {
    pub path: String,
    /// Repository path of the aggregate this file belongs to
    pub aggregate: Option<String>,
    /// The artifact of the aggregate this file carries
    pub artifact: Option<ArtifactKey>,
    /// All view files sharing the aggregate (including this one)
    pub related: Vec<String>,
    pub parent: Option<String>,
    pub is_directory: bool,
    /// Placeholder that has no aggregate of its own
    pub transient: bool,
}

impl ViewFile {
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }
}

/// Where an import writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget<'a> {
    /// Update an aggregate that already exists
    Existing(&'a str),
    /// Create a new aggregate `name` (possibly multi-segment) below `parent`
    Child { parent: &'a str, name: &'a str },
}

/// Bookkeeping returned by an import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportInfo {
    pub added: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    /// Versionable nodes to check in once the transaction is saved
    pub checkin: BTreeSet<String>,
}

impl ImportInfo {
    /// Fold another import's bookkeeping into this one
    pub fn merge(&mut self, other: ImportInfo) {
        for removed in &other.removed {
            self.added.remove(removed);
            self.modified.remove(removed);
            self.checkin.remove(removed);
        }
        self.added.extend(other.added);
        self.modified.extend(other.modified);
        self.removed.extend(other.removed);
        self.checkin.extend(other.checkin);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// The filesystem view plus the aggregate operations a transaction needs
pub trait VaultFileSystem {
    /// Look up a view file by its view path
    fn file(&self, view_path: &str) -> Option<ViewFile>;

    /// Rebuild the view from the current repository state
    fn invalidate(&mut self);

    fn node_exists(&self, repo_path: &str) -> bool;

    /// Current artifacts of an existing aggregate (the artifact builder)
    fn artifacts(&self, aggregate: &str) -> Result<ArtifactSet, StorageError>;

    fn is_attached(&self, aggregate: &str) -> bool;

    fn remove(&mut self, aggregate: &str, recursive: bool) -> Result<(), StorageError>;

    /// Write a staged artifact set (closing the builder)
    fn import(
        &mut self,
        target: ImportTarget<'_>,
        artifacts: ArtifactSet,
    ) -> Result<ImportInfo, StorageError>;

    /// Check in the versionable nodes recorded by imports
    fn checkin(&mut self, info: &ImportInfo) -> Result<(), StorageError>;

    fn save(&mut self) -> Result<(), StorageError>;

    fn refresh(&mut self, keep_changes: bool) -> Result<(), StorageError>;
}
