//! Transaction engine
//!
//! A `Transaction` records filesystem-shaped edits against a view and, on
//! commit, translates them into aggregate imports and removals. Commit runs
//! resolver passes until every change is applied: a pass that makes no
//! progress switches from lenient to strict resolution, and a strict pass
//! without progress turns the remaining changes into errors and aborts the
//! whole transaction.

pub mod change;
mod info;
mod resolver;

pub use change::{Change, ChangeId, ChangeKind, SubNodeEntry};
pub use info::{InfoKind, ResultInfo};
pub use resolver::Leniency;

use crate::artifact::{Artifact, ArtifactKey, ArtifactKind, SerializationType};
use crate::config::TransactionConfig;
use crate::docview::{DocViewAnalyzer, MetadataAnalyzer, DOT_CONTENT_XML};
use crate::error::{ApiError, TransactionError};
use crate::filter::WorkspaceFilter;
use crate::input::InputSource;
use crate::path;
use crate::platform;
use crate::vfs::fs::{BINARY_EXTENSION, CND_EXTENSION};
use crate::vfs::{ImportInfo, VaultFileSystem, ViewFile};
use change::{classify_add, ChangeLedger, SubNodeIndex, DIRECTORY_MARKER};
use info::InfoMap;
use resolver::Resolver;
use std::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

/// A node reported by a metadata document: (path, intermediate, declared type)
type DeclaredNode = (String, bool, Option<String>);

/// Records edits against a filesystem view and commits them atomically
pub struct Transaction<'a, F: VaultFileSystem + ?Sized> {
    fs: &'a mut F,
    analyzer: Box<dyn MetadataAnalyzer>,
    filter: WorkspaceFilter,
    verbose: bool,
    ledger: ChangeLedger,
    sub_nodes: SubNodeIndex,
    passes: usize,
    warnings: Vec<String>,
}

impl<'a, F: VaultFileSystem + ?Sized> Transaction<'a, F> {
    pub fn new(fs: &'a mut F) -> Self {
        Self {
            fs,
            analyzer: Box::new(DocViewAnalyzer),
            filter: WorkspaceFilter::new(),
            verbose: false,
            ledger: ChangeLedger::default(),
            sub_nodes: SubNodeIndex::default(),
            passes: 0,
            warnings: Vec::new(),
        }
    }

    /// Create a transaction configured from its configuration section
    pub fn with_config(fs: &'a mut F, config: &TransactionConfig) -> Result<Self, ApiError> {
        let filter = WorkspaceFilter::from_config(&config.filter)?;
        Ok(Self::new(fs).with_filter(filter).with_verbose(config.verbose))
    }

    pub fn with_filter(mut self, filter: WorkspaceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Log every resolved change at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Use a different analyzer for metadata documents
    pub fn with_analyzer(mut self, analyzer: Box<dyn MetadataAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Look up a view file, e.g. to record a modification or deletion
    pub fn file(&self, view_path: &str) -> Option<ViewFile> {
        let view_path = path::normalize(view_path).ok()?;
        self.fs.file(&view_path)
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Resolver passes run by the last commit
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Repository paths that were written outside of the workspace filter
    pub fn filter_warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Sub-nodes declared by recorded metadata documents
    pub fn declared_nodes(&self) -> usize {
        self.sub_nodes.len()
    }

    /// Record a new file at `view_path`
    #[instrument(skip(self, source))]
    pub fn record_add(&mut self, view_path: &str, source: InputSource) -> Result<(), TransactionError> {
        let view_path = normalize(view_path)?;
        let parent_view = path::parent(&view_path)
            .ok_or_else(|| TransactionError::InvalidArgument("cannot add the root".to_string()))?;
        let repo_parent = platform::repository_path(parent_view);
        let view_name = path::name(&view_path);

        if view_name == DOT_CONTENT_XML {
            let declared = self.analyze(&source, &repo_parent)?;
            let artifact = Artifact::new("", "", ArtifactKind::Primary, SerializationType::XmlDocView)
                .with_source(source, view_path.as_str());
            let id = self.ledger.push(Change::new(
                repo_parent,
                view_path,
                ChangeKind::AddedAsMetadataChild {
                    artifact,
                    sub_changes: Vec::new(),
                },
            ));
            self.register(id, declared);
            return Ok(());
        }

        let (repo_name, artifact) = classify_add(&platform::repository_name(view_name), &source)?;
        let artifact = artifact.with_source(source, view_path.as_str());
        let repo_path = path::join(&repo_parent, &repo_name);
        debug!(repo_path = %repo_path, kind = ?artifact.kind, "Recorded add");
        self.ledger
            .push(Change::new(repo_path, view_path, ChangeKind::Added { artifact }));
        Ok(())
    }

    /// Record new content for an existing view file
    #[instrument(skip(self, file, source), fields(path = %file.path))]
    pub fn record_modify(&mut self, file: &ViewFile, source: InputSource) -> Result<(), TransactionError> {
        if file.is_directory {
            return Err(TransactionError::InvalidArgument(format!(
                "cannot modify directory {}",
                file.path
            )));
        }
        let key = file
            .artifact
            .clone()
            .unwrap_or_else(|| ArtifactKey::new("", ArtifactKind::File));
        let repo_path = repository_path_of(file, &key);

        let name = file.name();
        let (extension, serialization) = match key.kind {
            ArtifactKind::Primary if name.ends_with(CND_EXTENSION) => {
                (CND_EXTENSION, SerializationType::Cnd)
            }
            ArtifactKind::Primary => ("", SerializationType::XmlDocView),
            ArtifactKind::Binary => (BINARY_EXTENSION, SerializationType::Generic),
            _ => ("", SerializationType::Generic),
        };
        let declared = if name == DOT_CONTENT_XML {
            let base = match &file.aggregate {
                Some(aggregate) => aggregate.clone(),
                None => platform::repository_path(path::parent(&file.path).unwrap_or("/")),
            };
            self.analyze(&source, &base)?
        } else {
            Vec::new()
        };
        let artifact = Artifact::new(key.relative_path, extension, key.kind, serialization)
            .with_source(source, file.path.as_str());

        debug!(repo_path = %repo_path, "Recorded modify");
        let id = self.ledger.push(Change::new(
            repo_path,
            file.path.clone(),
            ChangeKind::Modified {
                file: file.clone(),
                artifact,
                sub_changes: Vec::new(),
            },
        ));
        self.register(id, declared);
        Ok(())
    }

    /// Record the deletion of a view file
    pub fn record_delete(&mut self, file: Option<&ViewFile>) -> Result<(), TransactionError> {
        let file = file.ok_or_else(|| {
            TransactionError::InvalidArgument("no file given to delete".to_string())
        })?;
        let repo_path = match &file.artifact {
            Some(key) => repository_path_of(file, key),
            None => platform::repository_path(&file.path),
        };
        debug!(path = %file.path, repo_path = %repo_path, "Recorded delete");
        self.ledger.push(Change::new(
            repo_path,
            file.path.clone(),
            ChangeKind::Deleted { file: file.clone() },
        ));
        Ok(())
    }

    /// Record a new directory at `view_path`
    pub fn record_make_directory(&mut self, view_path: &str) -> Result<(), TransactionError> {
        let view_path = normalize(view_path)?;
        let parent_view = path::parent(&view_path).ok_or_else(|| {
            TransactionError::InvalidArgument("cannot create the root".to_string())
        })?;
        let name = path::name(&view_path);
        let name = name
            .strip_suffix(DIRECTORY_MARKER)
            .filter(|n| !n.is_empty())
            .unwrap_or(name);
        let repo_path = path::join(
            &platform::repository_path(parent_view),
            &platform::repository_name(name),
        );
        debug!(path = %view_path, repo_path = %repo_path, "Recorded mkdir");
        self.ledger
            .push(Change::new(repo_path, view_path, ChangeKind::MakeDirectory));
        Ok(())
    }

    /// Apply all recorded changes
    ///
    /// Returns one result info per touched view path, ordered by path. When
    /// any change cannot be resolved, all repository changes are discarded
    /// and the unresolved paths are returned in `TransactionError::Aborted`.
    #[instrument(skip(self), fields(changes = self.ledger.len()))]
    pub fn commit(&mut self) -> Result<Vec<ResultInfo>, TransactionError> {
        let start = Instant::now();
        info!("Committing transaction");
        self.passes = 0;
        self.warnings.clear();
        self.fold_sub_nodes();

        let mut infos = InfoMap::default();
        let mut imports = ImportInfo::default();
        if let Err(err) = self.converge(&mut infos, &mut imports) {
            error!(error = %err, "Failed to apply changes, aborting");
            self.abort();
            return Err(err);
        }

        let errors = infos.errors();
        if !errors.is_empty() {
            error!(unresolved = errors.len(), "Transaction could not be resolved, aborting");
            self.abort();
            return Err(TransactionError::Aborted { errors });
        }

        if let Err(err) = self.finish(&imports) {
            error!(error = %err, "Failed to save transaction, aborting");
            self.abort();
            return Err(err.into());
        }

        info!(
            passes = self.passes,
            infos = infos.len(),
            duration_ms = start.elapsed().as_millis(),
            "Transaction committed"
        );
        self.reset();
        Ok(infos.into_vec())
    }

    /// Move binaries declared by a recorded metadata document into its change
    fn fold_sub_nodes(&mut self) {
        for id in self.ledger.live_ids() {
            let Some(change) = self.ledger.get(id) else {
                continue;
            };
            let Some(entry) = self.sub_nodes.get(change.repo_path()) else {
                continue;
            };
            if entry.intermediate || entry.owner == id {
                continue;
            }
            let owner = entry.owner;
            match change.kind() {
                ChangeKind::Added { artifact } if artifact.kind == ArtifactKind::Binary => {
                    let view_path = change.view_path().to_string();
                    if self.ledger.fold(id, owner) {
                        debug!(path = %view_path, "Folded binary into its metadata document");
                    }
                }
                ChangeKind::MakeDirectory if self.ledger.is_live(owner) => {
                    trace!(path = change.view_path(), "Directory declared by metadata document");
                    self.ledger.supersede(id, owner);
                }
                _ => {}
            }
        }
    }

    /// Run resolver passes until the ledger is empty
    fn converge(
        &mut self,
        infos: &mut InfoMap,
        imports: &mut ImportInfo,
    ) -> Result<(), TransactionError> {
        let mut leniency = Leniency::Lenient;
        while !self.ledger.is_empty() {
            self.passes += 1;
            let mut pass =
                Resolver::new(&*self.fs, &self.filter, leniency, self.verbose).pass(&self.ledger);
            self.warnings.append(&mut pass.warnings);
            debug!(
                pass = self.passes,
                resolved = pass.resolved.len(),
                pending = self.ledger.len(),
                ?leniency,
                "Resolver pass finished"
            );

            if !pass.resolved.is_empty() {
                for id in &pass.resolved {
                    self.ledger.retire(*id);
                }
                let info =
                    resolver::flush(&mut *self.fs, pass.accumulators, pass.deletions, infos)?;
                imports.merge(info);
                self.fs.invalidate();
                leniency = Leniency::Lenient;
            } else if leniency == Leniency::Lenient {
                debug!("No progress, retrying with strict resolution");
                leniency = Leniency::Strict;
            } else {
                for id in self.ledger.live_ids() {
                    if let Some(view_path) = self.ledger.fail(id) {
                        warn!(path = %view_path, "Change could not be resolved");
                        infos.put(InfoKind::Error, view_path);
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, imports: &ImportInfo) -> Result<(), crate::error::StorageError> {
        self.fs.checkin(imports)?;
        self.fs.save()?;
        self.fs.invalidate();
        Ok(())
    }

    fn abort(&mut self) {
        if let Err(err) = self.fs.refresh(false) {
            warn!(error = %err, "Failed to discard pending repository changes");
        }
        self.fs.invalidate();
        self.ledger.clear();
        for marker in self.ledger.markers() {
            trace!(change = marker.label(), path = marker.view_path(), "Change marker");
        }
        self.reset();
    }

    /// Drop the ledger and the sub-node index of a finished commit
    fn reset(&mut self) {
        self.ledger.reset();
        self.sub_nodes.clear();
    }

    fn analyze(&self, source: &InputSource, base_path: &str) -> Result<Vec<DeclaredNode>, TransactionError> {
        let payload = source.read_all()?;
        let mut declared = Vec::new();
        self.analyzer
            .analyze(&payload, base_path, &mut |node_path, intermediate, declared_type| {
                declared.push((
                    node_path.to_string(),
                    intermediate,
                    declared_type.map(str::to_string),
                ));
            })?;
        Ok(declared)
    }

    fn register(&mut self, owner: ChangeId, declared: Vec<DeclaredNode>) {
        for (node_path, intermediate, declared_type) in declared {
            trace!(path = %node_path, intermediate, "Indexed declared node");
            self.sub_nodes.register(
                node_path,
                SubNodeEntry {
                    owner,
                    intermediate,
                    declared_type,
                },
            );
        }
    }
}

fn normalize(view_path: &str) -> Result<String, TransactionError> {
    path::normalize(view_path).map_err(|e| TransactionError::InvalidArgument(e.to_string()))
}

/// Repository path of the item a view file carries
fn repository_path_of(file: &ViewFile, key: &ArtifactKey) -> String {
    match &file.aggregate {
        Some(aggregate) => path::join(aggregate, &key.relative_path),
        None => platform::repository_path(&file.path),
    }
}
