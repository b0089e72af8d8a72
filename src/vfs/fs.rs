//! Filesystem view over a repository session
//!
//! Aggregation rules:
//! - `nt:file` nodes are single-file aggregates.
//! - Type-definition nodes surface as a single `<name>.cnd` file.
//! - Plain `nt:folder` nodes are directory aggregates.
//! - Every other node is a typed aggregate: a directory plus a
//!   `.content.xml` document. Typed descendants of a typed aggregate are
//!   serialized inline by that document; their binary content surfaces as
//!   `<name>.binary` files and, when they contain aggregates of their own,
//!   they show up as transient intermediate directories.

use crate::artifact::{Artifact, ArtifactKey, ArtifactKind, ArtifactSet, SerializationType};
use crate::docview::DOT_CONTENT_XML;
use crate::error::StorageError;
use crate::path;
use crate::platform;
use crate::repository::{Node, NodeShape, Session};
use crate::vfs::{import, ImportInfo, ImportTarget, VaultFileSystem, ViewFile};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::time::Instant;
use tracing::{debug, info, instrument};

pub const CND_EXTENSION: &str = ".cnd";
pub const BINARY_EXTENSION: &str = ".binary";

/// Filesystem view backed by a `Session`
pub struct VaultFs<S: Session> {
    session: S,
    files: BTreeMap<String, ViewFile>,
    stale: bool,
}

impl<S: Session> VaultFs<S> {
    /// Create the view and build it from the session's current state
    pub fn new(session: S) -> Self {
        let mut fs = Self {
            session,
            files: BTreeMap::new(),
            stale: true,
        };
        fs.rebuild();
        fs
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Mutable access to the session; call `invalidate` after changing it
    pub fn session_mut(&mut self) -> &mut S {
        self.stale = true;
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Whether the repository changed since the view was last built
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// All view files in path order
    pub fn files(&self) -> impl Iterator<Item = &ViewFile> {
        self.files.values()
    }

    fn rebuild(&mut self) {
        let start = Instant::now();
        let files = {
            let mut builder = ViewBuilder {
                session: &self.session,
                files: BTreeMap::new(),
            };
            if let Some(root) = self.session.node("/") {
                builder.add_aggregate("/", root, "/");
            }
            builder.files
        };
        self.files = files;
        self.stale = false;
        debug!(
            files = self.files.len(),
            duration_ms = start.elapsed().as_millis(),
            "Rebuilt filesystem view"
        );
    }
}

impl<S: Session> VaultFileSystem for VaultFs<S> {
    fn file(&self, view_path: &str) -> Option<ViewFile> {
        self.files.get(view_path).cloned()
    }

    fn invalidate(&mut self) {
        self.rebuild();
    }

    fn node_exists(&self, repo_path: &str) -> bool {
        self.session.node(repo_path).is_some()
    }

    fn artifacts(&self, aggregate: &str) -> Result<ArtifactSet, StorageError> {
        aggregate_artifacts(&self.session, aggregate)
    }

    fn is_attached(&self, aggregate: &str) -> bool {
        self.session.node(aggregate).is_some()
    }

    fn remove(&mut self, aggregate: &str, recursive: bool) -> Result<(), StorageError> {
        if !recursive && !self.session.children(aggregate).is_empty() {
            return Err(StorageError::ImportFailed {
                path: aggregate.to_string(),
                reason: "aggregate has child nodes".to_string(),
            });
        }
        self.session.remove_node(aggregate)?;
        self.stale = true;
        debug!(aggregate, "Removed aggregate");
        Ok(())
    }

    #[instrument(skip(self, artifacts), fields(artifacts = artifacts.len()))]
    fn import(
        &mut self,
        target: ImportTarget<'_>,
        artifacts: ArtifactSet,
    ) -> Result<ImportInfo, StorageError> {
        self.stale = true;
        import::apply(&mut self.session, target, &artifacts)
    }

    fn checkin(&mut self, info: &ImportInfo) -> Result<(), StorageError> {
        let mut checked_in = 0usize;
        for node_path in &info.checkin {
            let Some(node) = self.session.node(node_path) else {
                continue;
            };
            if !node.is_versionable() || !node.is_checked_out() {
                continue;
            }
            let node = node
                .clone()
                .with_property(crate::repository::node::CHECKED_OUT_PROPERTY, "false");
            self.session.put_node(node_path, node)?;
            checked_in += 1;
        }
        if checked_in > 0 {
            self.stale = true;
            info!(nodes = checked_in, "Checked in versionable nodes");
        }
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.session.save()
    }

    fn refresh(&mut self, keep_changes: bool) -> Result<(), StorageError> {
        self.stale = true;
        self.session.refresh(keep_changes)
    }
}

/// Describe the artifacts an existing aggregate is serialized as
pub(super) fn aggregate_artifacts<S: Session + ?Sized>(
    session: &S,
    aggregate: &str,
) -> Result<ArtifactSet, StorageError> {
    let node = session
        .node(aggregate)
        .ok_or_else(|| StorageError::NodeNotFound(aggregate.to_string()))?;

    let mut set = ArtifactSet::new();
    match node.shape() {
        NodeShape::File => {
            set.add(Artifact::new(
                "",
                "",
                ArtifactKind::File,
                SerializationType::Generic,
            ));
        }
        NodeShape::TypeDefinition => {
            set.add(Artifact::new(
                "",
                CND_EXTENSION,
                ArtifactKind::Primary,
                SerializationType::Cnd,
            ));
        }
        NodeShape::Folder => {
            set.add(Artifact::directory());
        }
        NodeShape::Typed => {
            set.add(Artifact::directory());
            set.add(Artifact::new(
                "",
                "",
                ArtifactKind::Primary,
                SerializationType::XmlDocView,
            ));
            for covered in covered_descendants(session, aggregate) {
                let has_content = session
                    .node(&covered)
                    .map_or(false, |n| n.content.is_some());
                if has_content {
                    let relative = path::relative_to(&covered, aggregate).unwrap_or_default();
                    set.add(Artifact::new(
                        relative,
                        BINARY_EXTENSION,
                        ArtifactKind::Binary,
                        SerializationType::Generic,
                    ));
                }
            }
        }
    }
    Ok(set)
}

/// Typed descendants serialized inline by a typed aggregate's document
pub(super) fn covered_descendants<S: Session + ?Sized>(session: &S, aggregate: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = vec![aggregate.to_string()];
    while let Some(parent) = pending.pop() {
        for child in session.children(&parent) {
            if session.node(&child).map(Node::shape) == Some(NodeShape::Typed) {
                pending.push(child.clone());
                out.push(child);
            }
        }
    }
    out.sort();
    out
}

struct ViewBuilder<'a, S: Session + ?Sized> {
    session: &'a S,
    files: BTreeMap<String, ViewFile>,
}

/// A view file of a typed aggregate, collected before `related` is known
struct Member {
    view_path: String,
    key: ArtifactKey,
    is_directory: bool,
}

impl<'a, S: Session + ?Sized> ViewBuilder<'a, S> {
    fn add_aggregate(&mut self, repo_path: &str, node: &Node, view_path: &str) {
        match node.shape() {
            NodeShape::File => {
                self.insert_single(repo_path, view_path.to_string(), ArtifactKind::File, false);
            }
            NodeShape::TypeDefinition => {
                let view_path = format!("{}{}", view_path, CND_EXTENSION);
                self.insert_single(repo_path, view_path, ArtifactKind::Primary, false);
            }
            NodeShape::Folder => {
                self.insert_single(
                    repo_path,
                    view_path.to_string(),
                    ArtifactKind::Directory,
                    true,
                );
                self.add_children(repo_path, view_path);
            }
            NodeShape::Typed => {
                let mut members = vec![
                    Member {
                        view_path: view_path.to_string(),
                        key: ArtifactKey::new("", ArtifactKind::Directory),
                        is_directory: true,
                    },
                    Member {
                        view_path: path::join(view_path, DOT_CONTENT_XML),
                        key: ArtifactKey::new("", ArtifactKind::Primary),
                        is_directory: false,
                    },
                ];
                self.add_covered(repo_path, repo_path, view_path, &mut members);

                let related: Vec<String> = members.iter().map(|m| m.view_path.clone()).collect();
                for member in members {
                    self.insert(ViewFile {
                        parent: path::parent(&member.view_path).map(str::to_string),
                        path: member.view_path,
                        aggregate: Some(repo_path.to_string()),
                        artifact: Some(member.key),
                        related: related.clone(),
                        is_directory: member.is_directory,
                        transient: false,
                    });
                }
            }
        }
    }

    fn add_children(&mut self, repo_path: &str, view_path: &str) {
        let session = self.session;
        for child in session.children(repo_path) {
            if let Some(node) = session.node(&child) {
                let child_view = path::join(view_path, &platform::platform_name(path::name(&child)));
                self.add_aggregate(&child, node, &child_view);
            }
        }
    }

    fn add_covered(
        &mut self,
        aggregate: &str,
        parent_repo: &str,
        parent_view: &str,
        members: &mut Vec<Member>,
    ) {
        let session = self.session;
        for child in session.children(parent_repo) {
            let Some(node) = session.node(&child) else {
                continue;
            };
            let child_view = path::join(parent_view, &platform::platform_name(path::name(&child)));
            if node.shape() != NodeShape::Typed {
                self.add_aggregate(&child, node, &child_view);
                continue;
            }

            if node.content.is_some() {
                let relative = path::relative_to(&child, aggregate).unwrap_or_default();
                members.push(Member {
                    view_path: format!("{}{}", child_view, BINARY_EXTENSION),
                    key: ArtifactKey::new(relative, ArtifactKind::Binary),
                    is_directory: false,
                });
            }
            self.add_covered(aggregate, &child, &child_view, members);
            if self.has_entries_below(&child_view, members) {
                self.insert(ViewFile {
                    path: child_view.clone(),
                    aggregate: None,
                    artifact: None,
                    related: vec![child_view.clone()],
                    parent: path::parent(&child_view).map(str::to_string),
                    is_directory: true,
                    transient: true,
                });
            }
        }
    }

    fn has_entries_below(&self, view_path: &str, members: &[Member]) -> bool {
        let prefix = format!("{}/", view_path);
        let in_files = self
            .files
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .next()
            .map_or(false, |(p, _)| p.starts_with(&prefix));
        in_files || members.iter().any(|m| m.view_path.starts_with(&prefix))
    }

    fn insert_single(&mut self, repo_path: &str, view_path: String, kind: ArtifactKind, is_directory: bool) {
        self.insert(ViewFile {
            parent: path::parent(&view_path).map(str::to_string),
            related: vec![view_path.clone()],
            path: view_path,
            aggregate: Some(repo_path.to_string()),
            artifact: Some(ArtifactKey::new("", kind)),
            is_directory,
            transient: false,
        });
    }

    fn insert(&mut self, file: ViewFile) {
        self.files.insert(file.path.clone(), file);
    }
}
