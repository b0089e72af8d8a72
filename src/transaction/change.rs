//! Change ledger and sub-node index
//!
//! Every recorded edit becomes a `Change` whose repository path is derived
//! once, when it is recorded. The ledger is an arena: a change keeps its
//! `ChangeId` for the lifetime of the transaction, and resolved, folded or
//! failed changes leave their slot behind instead of shifting the others.

use crate::artifact::{Artifact, ArtifactKind, SerializationType};
use crate::docview;
use crate::input::InputSource;
use crate::vfs::fs::{BINARY_EXTENSION, CND_EXTENSION};
use crate::vfs::ViewFile;
use std::collections::{BTreeSet, HashMap};
use std::io;

/// Suffix marking a view directory that stands for a node of the same name
pub const DIRECTORY_MARKER: &str = ".dir";

pub const XML_EXTENSION: &str = ".xml";

/// Stable handle of a change in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChangeId(pub(crate) usize);

#[derive(Debug)]
pub enum ChangeKind {
    /// New file that is not a declared sub-node of a metadata document
    Added { artifact: Artifact },
    /// New metadata document; `sub_changes` are folded in before commit
    AddedAsMetadataChild {
        artifact: Artifact,
        sub_changes: Vec<Change>,
    },
    /// Update of an existing view file
    Modified {
        file: ViewFile,
        artifact: Artifact,
        sub_changes: Vec<Change>,
    },
    Deleted { file: ViewFile },
    MakeDirectory,
    /// Folded into another change
    Moved { into: ChangeId },
    /// Could not be resolved
    Error,
}

/// One recorded edit
#[derive(Debug)]
pub struct Change {
    repo_path: String,
    view_path: String,
    kind: ChangeKind,
}

impl Change {
    pub(crate) fn new(repo_path: String, view_path: String, kind: ChangeKind) -> Self {
        Self {
            repo_path,
            view_path,
            kind,
        }
    }

    /// Repository path derived when the change was recorded
    pub fn repo_path(&self) -> &str {
        &self.repo_path
    }

    pub fn view_path(&self) -> &str {
        &self.view_path
    }

    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ChangeKind::Added { .. } => "added",
            ChangeKind::AddedAsMetadataChild { .. } => "added-metadata",
            ChangeKind::Modified { .. } => "modified",
            ChangeKind::Deleted { .. } => "deleted",
            ChangeKind::MakeDirectory => "mkdir",
            ChangeKind::Moved { .. } => "moved",
            ChangeKind::Error => "error",
        }
    }

    fn marker(&self, kind: ChangeKind) -> Change {
        Change::new(self.repo_path.clone(), self.view_path.clone(), kind)
    }

    fn sub_changes_mut(&mut self) -> Option<&mut Vec<Change>> {
        match &mut self.kind {
            ChangeKind::AddedAsMetadataChild { sub_changes, .. }
            | ChangeKind::Modified { sub_changes, .. } => Some(sub_changes),
            _ => None,
        }
    }
}

/// Ordered arena of recorded changes
#[derive(Debug, Default)]
pub(crate) struct ChangeLedger {
    slots: Vec<Option<Change>>,
    live: BTreeSet<usize>,
}

impl ChangeLedger {
    /// Id the next recorded change will get
    pub(crate) fn next_id(&self) -> ChangeId {
        ChangeId(self.slots.len())
    }

    pub(crate) fn push(&mut self, change: Change) -> ChangeId {
        let id = self.next_id();
        self.slots.push(Some(change));
        self.live.insert(id.0);
        id
    }

    pub(crate) fn get(&self, id: ChangeId) -> Option<&Change> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn is_live(&self, id: ChangeId) -> bool {
        self.live.contains(&id.0)
    }

    /// Ids of pending changes in recording order
    pub(crate) fn live_ids(&self) -> Vec<ChangeId> {
        self.live.iter().copied().map(ChangeId).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Drop a resolved change, releasing its payload
    pub(crate) fn retire(&mut self, id: ChangeId) {
        if self.live.remove(&id.0) {
            if let Some(slot) = self.slots.get_mut(id.0) {
                *slot = None;
            }
        }
    }

    /// Move a live change into the sub-changes of `owner`
    ///
    /// Returns false (and leaves both changes untouched) when the owner
    /// cannot carry sub-changes.
    pub(crate) fn fold(&mut self, id: ChangeId, owner: ChangeId) -> bool {
        if id == owner || !self.is_live(id) || !self.is_live(owner) {
            return false;
        }
        let accepts = self
            .slots
            .get_mut(owner.0)
            .and_then(Option::as_mut)
            .map_or(false, |c| c.sub_changes_mut().is_some());
        if !accepts {
            return false;
        }

        let Some(change) = self.slots[id.0].take() else {
            return false;
        };
        self.slots[id.0] = Some(change.marker(ChangeKind::Moved { into: owner }));
        self.live.remove(&id.0);
        if let Some(sub_changes) = self.slots[owner.0]
            .as_mut()
            .and_then(Change::sub_changes_mut)
        {
            sub_changes.push(change);
        }
        true
    }

    /// Drop a live change made redundant by `owner`
    pub(crate) fn supersede(&mut self, id: ChangeId, owner: ChangeId) {
        if !self.live.remove(&id.0) {
            return;
        }
        if let Some(slot) = self.slots.get_mut(id.0) {
            *slot = slot
                .as_ref()
                .map(|c| c.marker(ChangeKind::Moved { into: owner }));
        }
    }

    /// Mark a live change as unresolvable; returns its view path
    pub(crate) fn fail(&mut self, id: ChangeId) -> Option<String> {
        if !self.live.remove(&id.0) {
            return None;
        }
        let slot = self.slots.get_mut(id.0)?;
        let marker = slot.as_ref()?.marker(ChangeKind::Error);
        let view_path = marker.view_path.clone();
        *slot = Some(marker);
        Some(view_path)
    }

    /// Drop every pending change
    pub(crate) fn clear(&mut self) {
        for id in std::mem::take(&mut self.live) {
            if let Some(slot) = self.slots.get_mut(id) {
                *slot = None;
            }
        }
    }

    /// Forget every change and marker; ids start over at zero
    pub(crate) fn reset(&mut self) {
        self.slots.clear();
        self.live.clear();
    }

    /// Folded and failed changes left behind as markers
    pub(crate) fn markers(&self) -> impl Iterator<Item = &Change> {
        self.slots
            .iter()
            .flatten()
            .filter(|c| matches!(c.kind, ChangeKind::Moved { .. } | ChangeKind::Error))
    }
}

/// A node declared by a metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubNodeEntry {
    pub owner: ChangeId,
    pub intermediate: bool,
    pub declared_type: Option<String>,
}

/// Declared sub-node path -> the change whose document declared it
#[derive(Debug, Default)]
pub(crate) struct SubNodeIndex {
    entries: HashMap<String, SubNodeEntry>,
}

impl SubNodeIndex {
    pub(crate) fn register(&mut self, path: String, entry: SubNodeEntry) {
        self.entries.insert(path, entry);
    }

    pub(crate) fn get(&self, path: &str) -> Option<&SubNodeEntry> {
        self.entries.get(path)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Classify a new file by its repository name
///
/// Returns the repository name to store it under (transport extensions
/// stripped) and the artifact describing it.
pub(crate) fn classify_add(repo_name: &str, source: &InputSource) -> io::Result<(String, Artifact)> {
    let (base, extension) = match repo_name.rfind('.') {
        Some(idx) if idx > 0 => (&repo_name[..idx], &repo_name[idx..]),
        _ => (repo_name, ""),
    };

    let classified = match extension {
        XML_EXTENSION => {
            if docview::is_docview(&source.read_all()?) {
                (
                    base,
                    Artifact::new(
                        "",
                        XML_EXTENSION,
                        ArtifactKind::Primary,
                        SerializationType::XmlDocView,
                    ),
                )
            } else {
                (repo_name, plain_file())
            }
        }
        CND_EXTENSION => (
            base,
            Artifact::new("", CND_EXTENSION, ArtifactKind::Primary, SerializationType::Cnd),
        ),
        BINARY_EXTENSION => (
            base,
            Artifact::new(
                "",
                BINARY_EXTENSION,
                ArtifactKind::Binary,
                SerializationType::Generic,
            ),
        ),
        _ => (repo_name, plain_file()),
    };
    Ok((classified.0.to_string(), classified.1))
}

fn plain_file() -> Artifact {
    Artifact::new("", "", ArtifactKind::File, SerializationType::Generic)
}
