//! Artifacts and artifact sets
//!
//! An aggregate is serialized as a set of artifacts: its primary document,
//! plain file content, binaries of inline sub-nodes, and the directory that
//! holds it all. An `ArtifactSet` is the builder a transaction stages
//! mutations in before they are imported into the repository.

use crate::input::InputSource;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Role of an artifact within its aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// Primary serialization of a node (metadata document, type definitions)
    Primary,
    /// Plain file content
    File,
    /// Binary content of an inline sub-node
    Binary,
    /// The directory representing the node
    Directory,
}

/// How a primary artifact is serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializationType {
    Generic,
    XmlDocView,
    Cnd,
}

/// Identity of an artifact inside its aggregate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    /// Repository path relative to the aggregate; empty for the aggregate itself
    pub relative_path: String,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn new(relative_path: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind,
        }
    }
}

/// One artifact of an aggregate
#[derive(Debug, Clone)]
pub struct Artifact {
    pub relative_path: String,
    /// Extension of the view file that carries the artifact (`.cnd`, `.binary`)
    pub extension: String,
    pub kind: ArtifactKind,
    pub serialization: SerializationType,
    /// Payload to import; `None` for artifacts describing existing content
    pub source: Option<InputSource>,
    /// View path the payload was recorded under
    pub view_path: Option<String>,
}

impl Artifact {
    pub fn new(
        relative_path: impl Into<String>,
        extension: impl Into<String>,
        kind: ArtifactKind,
        serialization: SerializationType,
    ) -> Self {
        Self {
            relative_path: relative_path.into(),
            extension: extension.into(),
            kind,
            serialization,
            source: None,
            view_path: None,
        }
    }

    /// Directory artifact for the aggregate itself
    pub fn directory() -> Self {
        Self::new("", "", ArtifactKind::Directory, SerializationType::Generic)
    }

    /// Attach the payload to import and the view path it came from
    pub fn with_source(mut self, source: InputSource, view_path: impl Into<String>) -> Self {
        self.source = Some(source);
        self.view_path = Some(view_path.into());
        self
    }

    pub fn with_view_path(mut self, view_path: impl Into<String>) -> Self {
        self.view_path = Some(view_path.into());
        self
    }

    /// Move the artifact to a different place inside its aggregate
    pub fn relocated(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::new(self.relative_path.clone(), self.kind)
    }

    /// Whether this artifact carries freshly recorded content
    pub fn is_import(&self) -> bool {
        self.source.is_some() || (self.kind == ArtifactKind::Directory && self.view_path.is_some())
    }
}

/// Ordered, keyed collection of artifacts
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: BTreeMap<ArtifactKey, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact, replacing any artifact with the same key
    pub fn add(&mut self, artifact: Artifact) -> Option<Artifact> {
        self.artifacts.insert(artifact.key(), artifact)
    }

    pub fn remove(&mut self, key: &ArtifactKey) -> Option<Artifact> {
        self.artifacts.remove(key)
    }

    pub fn clear(&mut self) {
        self.artifacts.clear();
    }

    pub fn get(&self, key: &ArtifactKey) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.artifacts.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn iter(&self) -> btree_map::Values<'_, ArtifactKey, Artifact> {
        self.artifacts.values()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, ArtifactKey, Artifact> {
        self.artifacts.keys()
    }

    /// The primary artifact of the aggregate itself, if present
    pub fn primary(&self) -> Option<&Artifact> {
        self.get(&ArtifactKey::new("", ArtifactKind::Primary))
    }

    /// Artifacts carrying freshly recorded content
    pub fn imports(&self) -> impl Iterator<Item = &Artifact> {
        self.iter().filter(|a| a.is_import())
    }
}

impl IntoIterator for ArtifactSet {
    type Item = Artifact;
    type IntoIter = btree_map::IntoValues<ArtifactKey, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.into_values()
    }
}
