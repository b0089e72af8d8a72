//! Importing staged artifact sets into the repository

use crate::artifact::{Artifact, ArtifactKey, ArtifactKind, ArtifactSet, SerializationType};
use crate::docview::{self, DocViewNode, MIXIN_TYPES};
use crate::error::StorageError;
use crate::path;
use crate::repository::node::{NT_FOLDER, NT_UNSTRUCTURED};
use crate::repository::{Node, NodeShape, Session};
use crate::vfs::fs::covered_descendants;
use crate::vfs::{ImportInfo, ImportTarget};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// Apply an artifact set to the repository
pub(super) fn apply<S: Session + ?Sized>(
    session: &mut S,
    target: ImportTarget<'_>,
    artifacts: &ArtifactSet,
) -> Result<ImportInfo, StorageError> {
    let (aggregate, existed) = match target {
        ImportTarget::Existing(aggregate) => {
            if session.node(aggregate).is_none() {
                return Err(StorageError::NodeNotFound(aggregate.to_string()));
            }
            (aggregate.to_string(), true)
        }
        ImportTarget::Child { parent, name } => {
            if session.node(parent).is_none() {
                return Err(StorageError::NodeNotFound(parent.to_string()));
            }
            let aggregate = path::join(parent, name);
            let existed = session.node(&aggregate).is_some();
            (aggregate, existed)
        }
    };

    let mut importer = Importer {
        session,
        info: ImportInfo::default(),
    };
    importer.apply_root(&aggregate, existed, artifacts)?;
    for artifact in artifacts.imports() {
        if !artifact.relative_path.is_empty() {
            importer.apply_sub_artifact(&aggregate, artifact)?;
        }
    }
    if existed {
        importer.clear_dropped_binaries(&aggregate, artifacts)?;
    }

    debug!(
        aggregate = %aggregate,
        added = importer.info.added.len(),
        modified = importer.info.modified.len(),
        removed = importer.info.removed.len(),
        "Imported artifacts"
    );
    Ok(importer.info)
}

struct Importer<'s, S: Session + ?Sized> {
    session: &'s mut S,
    info: ImportInfo,
}

impl<'s, S: Session + ?Sized> Importer<'s, S> {
    fn apply_root(
        &mut self,
        aggregate: &str,
        existed: bool,
        artifacts: &ArtifactSet,
    ) -> Result<(), StorageError> {
        let primary = artifacts.primary();
        let file = artifacts.get(&ArtifactKey::new("", ArtifactKind::File));
        let directory = artifacts.get(&ArtifactKey::new("", ArtifactKind::Directory));

        if let Some(primary) = primary.filter(|a| a.source.is_some()) {
            return self.apply_primary(aggregate, primary);
        }
        if let Some(file) = file.filter(|a| a.source.is_some()) {
            let content = read(aggregate, file)?;
            let node = match self.session.node(aggregate).cloned() {
                Some(existing) if existing.shape() == NodeShape::File => {
                    existing.with_content(content)
                }
                _ => Node::file(content),
            };
            return self.put(aggregate, node);
        }
        if directory.is_some() && primary.is_none() && file.is_none() {
            return match self.session.node(aggregate).map(Node::shape) {
                None => self.put(aggregate, Node::folder()),
                Some(NodeShape::Typed) => {
                    // The metadata document is gone: keep the node as a plain folder.
                    trace!(aggregate, "Converting typed aggregate to folder");
                    self.put(aggregate, Node::new(NT_FOLDER))
                }
                Some(_) => Ok(()),
            };
        }
        if !existed {
            return Err(StorageError::ImportFailed {
                path: aggregate.to_string(),
                reason: "no artifact describes the new node".to_string(),
            });
        }
        Ok(())
    }

    fn apply_primary(&mut self, target: &str, artifact: &Artifact) -> Result<(), StorageError> {
        let content = read(target, artifact)?;
        match artifact.serialization {
            SerializationType::XmlDocView => {
                let document = docview::parse(&content)?;
                self.apply_document(target, &document)
            }
            SerializationType::Cnd => self.put(target, Node::type_definition(content)),
            SerializationType::Generic => self.put(target, Node::file(content)),
        }
    }

    fn apply_sub_artifact(&mut self, aggregate: &str, artifact: &Artifact) -> Result<(), StorageError> {
        let target = path::join(aggregate, &artifact.relative_path);
        match artifact.kind {
            ArtifactKind::Primary => self.apply_primary(&target, artifact),
            ArtifactKind::File => {
                let content = read(&target, artifact)?;
                self.put(&target, Node::file(content))
            }
            ArtifactKind::Binary => {
                let content = read(&target, artifact)?;
                let node = self
                    .session
                    .node(&target)
                    .cloned()
                    .unwrap_or_else(|| Node::new(NT_UNSTRUCTURED))
                    .with_content(content);
                self.put(&target, node)
            }
            ArtifactKind::Directory => {
                if self.session.node(&target).is_none() {
                    self.put(&target, Node::folder())
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Write a document's node and its inline sub-nodes
    fn apply_document(&mut self, node_path: &str, document: &DocViewNode) -> Result<(), StorageError> {
        let existing = self.session.node(node_path).cloned();

        let mut properties: BTreeMap<String, String> = document.properties.clone();
        let mut node = Node::new(
            document
                .primary_type
                .clone()
                .unwrap_or_else(|| NT_UNSTRUCTURED.to_string()),
        );
        if let Some(mixins) = properties.remove(MIXIN_TYPES) {
            node.mixins = parse_mixins(&mixins);
        }
        node.properties = properties;
        node.content = existing.and_then(|n| n.content);

        let prune = node.shape() == NodeShape::Typed;
        self.put(node_path, node)?;
        self.apply_declared_children(node_path, document, prune)
    }

    fn apply_declared_children(
        &mut self,
        node_path: &str,
        document: &DocViewNode,
        prune: bool,
    ) -> Result<(), StorageError> {
        let mut declared = BTreeSet::new();
        for child in &document.children {
            let child_path = path::join(node_path, &child.name);
            declared.insert(child_path.clone());
            if !child.intermediate {
                self.apply_document(&child_path, child)?;
            } else if self.session.node(&child_path).is_some() {
                // Ordering-only entry; its own children may still be declared.
                self.apply_declared_children(&child_path, child, false)?;
            }
        }

        if prune {
            for child_path in self.session.children(node_path) {
                if declared.contains(&child_path) {
                    continue;
                }
                let inline = self
                    .session
                    .node(&child_path)
                    .map_or(false, |n| n.shape() == NodeShape::Typed);
                if inline {
                    self.session.remove_node(&child_path)?;
                    trace!(path = %child_path, "Removed undeclared inline node");
                    self.info.removed.insert(child_path);
                }
            }
        }
        Ok(())
    }

    /// Clear binaries of inline nodes that are no longer part of the set
    fn clear_dropped_binaries(
        &mut self,
        aggregate: &str,
        artifacts: &ArtifactSet,
    ) -> Result<(), StorageError> {
        for covered in covered_descendants(&*self.session, aggregate) {
            let Some(node) = self.session.node(&covered) else {
                continue;
            };
            if node.content.is_none() {
                continue;
            }
            let relative = path::relative_to(&covered, aggregate).unwrap_or_default();
            let key = ArtifactKey::new(relative, ArtifactKind::Binary);
            if !artifacts.contains(&key) {
                let mut node = node.clone();
                node.content = None;
                self.put(&covered, node)?;
            }
        }
        Ok(())
    }

    fn put(&mut self, node_path: &str, node: Node) -> Result<(), StorageError> {
        let existed = self.session.node(node_path).is_some();
        let versionable = node.is_versionable();
        self.session.put_node(node_path, node)?;
        if existed {
            self.info.modified.insert(node_path.to_string());
        } else {
            self.info.added.insert(node_path.to_string());
        }
        if versionable {
            self.info.checkin.insert(node_path.to_string());
        }
        Ok(())
    }
}

fn read(target: &str, artifact: &Artifact) -> Result<Vec<u8>, StorageError> {
    let source = artifact
        .source
        .as_ref()
        .ok_or_else(|| StorageError::ImportFailed {
            path: target.to_string(),
            reason: "artifact has no content".to_string(),
        })?;
    Ok(source.read_all()?)
}

/// Parse a mixin list written as `[a,b]` or `a,b`
fn parse_mixins(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
