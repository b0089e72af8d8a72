//! Aggregation resolver
//!
//! One resolver pass walks the pending changes in recording order and
//! assigns each one to the aggregate it belongs to. Changes whose target
//! aggregate is not visible in the (stale) view yet are deferred to the
//! next pass. Resolved changes land in accumulators, one per aggregate,
//! which `flush` turns into imports and removals.

use crate::artifact::{Artifact, ArtifactKey, ArtifactKind, ArtifactSet};
use crate::docview::DOT_CONTENT_XML;
use crate::error::StorageError;
use crate::filter::WorkspaceFilter;
use crate::path;
use crate::platform;
use crate::transaction::change::{Change, ChangeId, ChangeKind, ChangeLedger, DIRECTORY_MARKER};
use crate::transaction::info::{InfoKind, InfoMap};
use crate::vfs::{ImportInfo, ImportTarget, VaultFileSystem, ViewFile};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, trace, warn};

/// How far the resolver may look for a target aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leniency {
    /// Climb ancestors to find the closest existing aggregate
    Lenient,
    /// Only the direct parent directory may be the target
    Strict,
}

/// Staged mutations for one aggregate
#[derive(Debug)]
pub(crate) struct Accumulator {
    /// Existing aggregate; `None` for a new one
    aggregate: Option<String>,
    /// Aggregate a new aggregate is created below
    parent_aggregate: Option<String>,
    /// Path of a new aggregate relative to `parent_aggregate`
    name: String,
    builder: ArtifactSet,
    /// View files replaced by this pass
    superseded: BTreeSet<String>,
    /// View files deleted by this pass
    removed: BTreeSet<String>,
    parent_file: Option<ViewFile>,
}

impl Accumulator {
    fn existing(aggregate: &str, builder: ArtifactSet, parent_file: Option<ViewFile>) -> Self {
        Self {
            aggregate: Some(aggregate.to_string()),
            parent_aggregate: None,
            name: String::new(),
            builder,
            superseded: BTreeSet::new(),
            removed: BTreeSet::new(),
            parent_file,
        }
    }

    fn new_child(parent_aggregate: &str, name: &str, parent_file: Option<ViewFile>) -> Self {
        Self {
            aggregate: None,
            parent_aggregate: Some(parent_aggregate.to_string()),
            name: name.to_string(),
            builder: ArtifactSet::new(),
            superseded: BTreeSet::new(),
            removed: BTreeSet::new(),
            parent_file,
        }
    }

    fn add(&mut self, artifact: Artifact) {
        self.builder.add(artifact);
    }

    fn contains(&self, key: &ArtifactKey) -> bool {
        self.builder.contains(key)
    }
}

pub(crate) type AccumulatorMap = BTreeMap<String, Accumulator>;

/// Outcome of one resolver pass
#[derive(Debug, Default)]
pub(crate) struct Pass {
    pub(crate) accumulators: AccumulatorMap,
    /// View files outside any aggregate that were deleted
    pub(crate) deletions: BTreeSet<String>,
    pub(crate) resolved: Vec<ChangeId>,
    /// Repository paths resolved outside the workspace filter
    pub(crate) warnings: Vec<String>,
}

pub(crate) struct Resolver<'r, F: VaultFileSystem + ?Sized> {
    fs: &'r F,
    filter: &'r WorkspaceFilter,
    leniency: Leniency,
    verbose: bool,
}

impl<'r, F: VaultFileSystem + ?Sized> Resolver<'r, F> {
    pub(crate) fn new(
        fs: &'r F,
        filter: &'r WorkspaceFilter,
        leniency: Leniency,
        verbose: bool,
    ) -> Self {
        Self {
            fs,
            filter,
            leniency,
            verbose,
        }
    }

    /// Try to resolve every pending change once
    pub(crate) fn pass(&self, ledger: &ChangeLedger) -> Pass {
        let mut pass = Pass::default();
        for id in ledger.live_ids() {
            let Some(change) = ledger.get(id) else {
                continue;
            };
            let resolved = self.resolve(change, &mut pass).is_some();
            if resolved {
                pass.resolved.push(id);
            } else {
                trace!(
                    change = change.label(),
                    path = change.view_path(),
                    leniency = ?self.leniency,
                    "Deferred change"
                );
            }
        }
        pass
    }

    fn resolve(&self, change: &Change, pass: &mut Pass) -> Option<()> {
        let Pass {
            accumulators,
            deletions,
            warnings,
            ..
        } = pass;
        match change.kind() {
            ChangeKind::MakeDirectory => self.resolve_directory(change, accumulators, warnings),
            ChangeKind::Added { artifact } => {
                self.resolve_added(change, artifact, accumulators, warnings)
            }
            ChangeKind::AddedAsMetadataChild {
                artifact,
                sub_changes,
            } => self.resolve_metadata(change, artifact, sub_changes, accumulators, warnings),
            ChangeKind::Modified {
                file,
                artifact,
                sub_changes,
            } => self.resolve_modified(change, file, artifact, sub_changes, accumulators, warnings),
            ChangeKind::Deleted { file } => {
                self.resolve_deleted(change, file, accumulators, deletions, warnings)
            }
            ChangeKind::Moved { .. } | ChangeKind::Error => None,
        }
    }

    fn resolve_directory(
        &self,
        change: &Change,
        accumulators: &mut AccumulatorMap,
        warnings: &mut Vec<String>,
    ) -> Option<()> {
        let parent = self.fs.file(path::parent(change.view_path())?)?;
        if parent.transient || !parent.is_directory {
            return None;
        }
        let parent_aggregate = parent.aggregate.clone()?;
        let name = path::name(change.repo_path());
        let target = path::join(&parent_aggregate, name);
        self.check_filter(&target, warnings);

        // The view already shows a directory here: nothing to create.
        let existing = self
            .fs
            .file(change.view_path())
            .or_else(|| self.fs.file(&platform::platform_path(&target)));
        if let Some(existing) = existing {
            if existing.is_directory {
                self.resolved(change, &target);
                return Some(());
            }
            debug!(path = change.view_path(), "Directory path is taken by a file");
            return None;
        }
        // Any other node at the target belongs to a file aggregate.
        let staged = accumulators.get(&target).map(|a| a.aggregate.is_some());
        if staged.unwrap_or_else(|| self.fs.node_exists(&target)) {
            debug!(path = change.view_path(), aggregate = %target, "Directory node is taken by a file");
            return None;
        }

        let accumulator =
            self.open_new(accumulators, &target, &parent_aggregate, name, Some(parent))?;
        let directory = ArtifactKey::new("", ArtifactKind::Directory);
        if !accumulator.contains(&directory) {
            accumulator.add(Artifact::directory().with_view_path(change.view_path()));
        }
        self.resolved(change, &target);
        Some(())
    }

    fn resolve_added(
        &self,
        change: &Change,
        artifact: &Artifact,
        accumulators: &mut AccumulatorMap,
        warnings: &mut Vec<String>,
    ) -> Option<()> {
        let (_, aggregate, mut relative) = self.walk_up(path::parent(change.view_path())?)?;
        relative.push(path::name(change.repo_path()).to_string());
        let relative = relative.join("/");
        self.check_filter(&path::join(&aggregate, &relative), warnings);

        let accumulator = self.open_existing(accumulators, &aggregate)?;
        accumulator.add(artifact.clone().relocated(relative));
        self.resolved(change, &aggregate);
        Some(())
    }

    fn resolve_metadata(
        &self,
        change: &Change,
        artifact: &Artifact,
        sub_changes: &[Change],
        accumulators: &mut AccumulatorMap,
        warnings: &mut Vec<String>,
    ) -> Option<()> {
        let aggregate_view = path::parent(change.view_path())?;

        // The document may describe a directory that already is an aggregate.
        if let Some((_, existing)) = self
            .aggregate_dir(aggregate_view)
            .filter(|(_, aggregate)| aggregate == change.repo_path())
        {
            self.check_filter(&existing, warnings);
            let replaced = self.fs.file(change.view_path());
            let accumulator = self.open_existing(accumulators, &existing)?;
            if let Some(replaced) = replaced {
                accumulator.superseded.extend(replaced.related);
            }
            accumulator.add(artifact.clone());
            fold_sub_changes(accumulator, &existing, sub_changes);
            self.resolved(change, &existing);
            return Some(());
        }

        let (parent, parent_aggregate, mut relative) =
            self.walk_up(path::parent(aggregate_view)?)?;
        relative.push(path::name(change.repo_path()).to_string());
        let name = relative.join("/");
        let target = path::join(&parent_aggregate, &name);
        self.check_filter(&target, warnings);

        let accumulator =
            self.open_new(accumulators, &target, &parent_aggregate, &name, Some(parent))?;
        accumulator.add(artifact.clone());
        fold_sub_changes(accumulator, &target, sub_changes);
        self.resolved(change, &target);
        Some(())
    }

    fn resolve_modified(
        &self,
        change: &Change,
        file: &ViewFile,
        artifact: &Artifact,
        sub_changes: &[Change],
        accumulators: &mut AccumulatorMap,
        warnings: &mut Vec<String>,
    ) -> Option<()> {
        let aggregate = file.aggregate.as_deref()?;
        self.check_filter(change.repo_path(), warnings);

        let accumulator = self.open_existing(accumulators, aggregate)?;
        accumulator.superseded.extend(file.related.iter().cloned());
        accumulator.add(artifact.clone());
        fold_sub_changes(accumulator, aggregate, sub_changes);
        self.resolved(change, aggregate);
        Some(())
    }

    fn resolve_deleted(
        &self,
        change: &Change,
        file: &ViewFile,
        accumulators: &mut AccumulatorMap,
        deletions: &mut BTreeSet<String>,
        warnings: &mut Vec<String>,
    ) -> Option<()> {
        self.check_filter(change.repo_path(), warnings);

        let Some(aggregate) = file.aggregate.as_deref() else {
            deletions.insert(file.path.clone());
            self.resolved(change, change.repo_path());
            return Some(());
        };

        let accumulator = self.open_existing(accumulators, aggregate)?;
        accumulator.superseded.extend(file.related.iter().cloned());
        accumulator.removed.insert(file.path.clone());
        match &file.artifact {
            Some(key) if key.kind != ArtifactKind::Directory || !key.relative_path.is_empty() => {
                accumulator.builder.remove(key);
            }
            _ => accumulator.builder.clear(),
        }
        self.resolved(change, aggregate);
        Some(())
    }

    /// Directory view file with an aggregate, as (file, aggregate path)
    fn aggregate_dir(&self, view_path: &str) -> Option<(ViewFile, String)> {
        let file = self.fs.file(view_path)?;
        if !file.is_directory {
            return None;
        }
        let aggregate = file.aggregate.clone()?;
        Some((file, aggregate))
    }

    /// Find the aggregate a new entry below `view_path` belongs to
    ///
    /// Returns the directory found, its aggregate and the repository names
    /// of the directories skipped on the way up. Skipped directories must
    /// exist as nodes covered by that aggregate.
    fn walk_up(&self, view_path: &str) -> Option<(ViewFile, String, Vec<String>)> {
        if let Some((file, aggregate)) = self.aggregate_dir(view_path) {
            return Some((file, aggregate, Vec::new()));
        }
        if self.leniency == Leniency::Strict {
            return None;
        }

        let mut skipped = Vec::new();
        let mut current = view_path.to_string();
        loop {
            let name = path::name(&current);
            let name = name
                .strip_suffix(DIRECTORY_MARKER)
                .filter(|n| !n.is_empty())
                .unwrap_or(name);
            skipped.insert(0, platform::repository_name(name));
            current = path::parent(&current)?.to_string();

            if let Some((file, aggregate)) = self.aggregate_dir(&current) {
                let covered = path::join(&aggregate, &skipped.join("/"));
                if !self.fs.node_exists(&covered) {
                    return None;
                }
                debug!(
                    from = view_path,
                    aggregate = %aggregate,
                    skipped = skipped.len(),
                    "Resolved through covered nodes"
                );
                return Some((file, aggregate, skipped));
            }
        }
    }

    fn open_existing<'m>(
        &self,
        accumulators: &'m mut AccumulatorMap,
        aggregate: &str,
    ) -> Option<&'m mut Accumulator> {
        if !accumulators.contains_key(aggregate) {
            let builder = match self.fs.artifacts(aggregate) {
                Ok(builder) => builder,
                Err(err) => {
                    debug!(aggregate, error = %err, "Aggregate not available");
                    return None;
                }
            };
            let parent_file = path::parent(&platform::platform_path(aggregate))
                .and_then(|parent| self.fs.file(parent));
            accumulators.insert(
                aggregate.to_string(),
                Accumulator::existing(aggregate, builder, parent_file),
            );
        }
        accumulators.get_mut(aggregate)
    }

    fn open_new<'m>(
        &self,
        accumulators: &'m mut AccumulatorMap,
        target: &str,
        parent_aggregate: &str,
        name: &str,
        parent_file: Option<ViewFile>,
    ) -> Option<&'m mut Accumulator> {
        if !accumulators.contains_key(target) {
            let exists = self
                .fs
                .file(&platform::platform_path(target))
                .and_then(|f| f.aggregate)
                .map_or(false, |aggregate| aggregate == target);
            if exists {
                return self.open_existing(accumulators, target);
            }
            accumulators.insert(
                target.to_string(),
                Accumulator::new_child(parent_aggregate, name, parent_file),
            );
        }
        accumulators.get_mut(target)
    }

    fn check_filter(&self, repo_path: &str, warnings: &mut Vec<String>) {
        if !self.filter.contains(repo_path) {
            warn!(path = repo_path, "Change resolves outside of the workspace filter");
            warnings.push(repo_path.to_string());
        }
    }

    fn resolved(&self, change: &Change, aggregate: &str) {
        if self.verbose {
            info!(
                change = change.label(),
                path = change.view_path(),
                aggregate,
                "Resolved change"
            );
        } else {
            debug!(
                change = change.label(),
                path = change.view_path(),
                aggregate,
                "Resolved change"
            );
        }
    }
}

/// Stage the changes folded into a metadata document change
fn fold_sub_changes(accumulator: &mut Accumulator, aggregate: &str, sub_changes: &[Change]) {
    for sub in sub_changes {
        let ChangeKind::Added { artifact } = sub.kind() else {
            continue;
        };
        match path::relative_to(sub.repo_path(), aggregate).filter(|r| !r.is_empty()) {
            Some(relative) => accumulator.add(artifact.clone().relocated(relative)),
            None => warn!(
                path = sub.view_path(),
                aggregate, "Folded change is outside of its aggregate, skipping"
            ),
        }
    }
}

/// Apply the accumulators of one pass, in aggregate path order
#[instrument(skip_all, fields(accumulators = accumulators.len(), deletions = deletions.len()))]
pub(crate) fn flush<F: VaultFileSystem + ?Sized>(
    fs: &mut F,
    accumulators: AccumulatorMap,
    deletions: BTreeSet<String>,
    infos: &mut InfoMap,
) -> Result<ImportInfo, StorageError> {
    let mut imports = ImportInfo::default();
    for view_path in deletions {
        infos.put(InfoKind::Deleted, view_path);
    }
    for (key, accumulator) in accumulators {
        let Accumulator {
            aggregate,
            parent_aggregate,
            name,
            builder,
            superseded,
            removed,
            parent_file,
        } = accumulator;

        match aggregate {
            Some(aggregate) if builder.is_empty() => {
                if fs.is_attached(&aggregate) {
                    fs.remove(&aggregate, true)?;
                    imports.removed.insert(aggregate.clone());
                }
                debug!(aggregate = %aggregate, "Removed emptied aggregate");
                for view_path in superseded {
                    infos.put(InfoKind::Deleted, view_path);
                }
                mark_parent_modified(fs, parent_file.as_ref(), infos);
            }
            Some(aggregate) => {
                let added: Vec<String> = builder
                    .imports()
                    .filter_map(|a| a.view_path.clone())
                    .filter(|p| !superseded.contains(p))
                    .collect();
                let info = fs.import(ImportTarget::Existing(&aggregate), builder)?;
                debug!(aggregate = %aggregate, "Updated aggregate");
                for view_path in added {
                    infos.put(InfoKind::Added, view_path);
                }
                for view_path in superseded {
                    infos.put(InfoKind::Modified, view_path);
                }
                for view_path in removed {
                    infos.put(InfoKind::Deleted, view_path);
                }
                imports.merge(info);
            }
            None if builder.is_empty() => {
                trace!(aggregate = %key, "Nothing staged for new aggregate");
            }
            None => {
                let parent = parent_aggregate.ok_or_else(|| StorageError::ImportFailed {
                    path: key.clone(),
                    reason: "new aggregate has no parent".to_string(),
                })?;
                let added: Vec<String> = builder
                    .imports()
                    .filter_map(|a| a.view_path.clone())
                    .collect();
                let info = fs.import(
                    ImportTarget::Child {
                        parent: &parent,
                        name: &name,
                    },
                    builder,
                )?;
                debug!(aggregate = %key, "Created aggregate");
                for view_path in added {
                    infos.put(InfoKind::Added, view_path);
                }
                mark_parent_modified(fs, parent_file.as_ref(), infos);
                imports.merge(info);
            }
        }
    }
    Ok(imports)
}

/// Report the parent's metadata document as touched, if it has one
fn mark_parent_modified<F: VaultFileSystem + ?Sized>(
    fs: &F,
    parent: Option<&ViewFile>,
    infos: &mut InfoMap,
) {
    let Some(parent) = parent else {
        return;
    };
    let document = path::join(&parent.path, DOT_CONTENT_XML);
    if fs.file(&document).is_some() {
        infos.put_if_absent(InfoKind::Modified, document);
    }
}
