//! Per-path outcome of a committed transaction

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoKind {
    Added,
    Modified,
    Deleted,
    Error,
}

impl fmt::Display for InfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InfoKind::Added => "A",
            InfoKind::Modified => "U",
            InfoKind::Deleted => "D",
            InfoKind::Error => "E",
        };
        f.write_str(label)
    }
}

/// What happened to one view path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultInfo {
    pub kind: InfoKind,
    pub path: String,
}

impl ResultInfo {
    pub fn new(kind: InfoKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for ResultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

/// Result infos keyed by path; the last write for a path wins
#[derive(Debug, Clone, Default)]
pub(crate) struct InfoMap {
    infos: BTreeMap<String, InfoKind>,
}

impl InfoMap {
    pub(crate) fn put(&mut self, kind: InfoKind, path: impl Into<String>) {
        self.infos.insert(path.into(), kind);
    }

    /// Record `kind` unless the path already has an entry
    pub(crate) fn put_if_absent(&mut self, kind: InfoKind, path: impl Into<String>) {
        self.infos.entry(path.into()).or_insert(kind);
    }

    pub(crate) fn errors(&self) -> Vec<ResultInfo> {
        self.infos
            .iter()
            .filter(|(_, kind)| **kind == InfoKind::Error)
            .map(|(path, kind)| ResultInfo::new(*kind, path.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.infos.len()
    }

    pub(crate) fn into_vec(self) -> Vec<ResultInfo> {
        self.infos
            .into_iter()
            .map(|(path, kind)| ResultInfo::new(kind, path))
            .collect()
    }
}
