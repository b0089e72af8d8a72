//! Workspace filter
//!
//! Decides which repository paths a transaction is expected to touch. A
//! filter is a list of roots; each root carries ordered include/exclude
//! rules matched against the full repository path. A path is contained when
//! it lies under one of the roots and the last rule matching it is an
//! include. When a root has rules but none of them match, the default is the
//! opposite of the first rule's kind. A filter with no roots contains
//! everything.
//!
//! The filter is advisory: the transaction warns about paths outside of it
//! but still applies them.

use crate::config::FilterConfig;
use crate::error::ApiError;
use crate::path;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whether a rule includes or excludes what it matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
struct FilterRule {
    kind: RuleKind,
    pattern: Regex,
}

/// One filter root with its rules
#[derive(Debug, Clone)]
pub struct PathFilterSet {
    root: String,
    rules: Vec<FilterRule>,
}

impl PathFilterSet {
    /// Create a filter set covering everything below `root`
    pub fn new(root: &str) -> Result<Self, ApiError> {
        let root = path::normalize(root)
            .map_err(|e| ApiError::ConfigError(format!("Invalid filter root: {}", e)))?;
        Ok(Self {
            root,
            rules: Vec::new(),
        })
    }

    /// Append an include rule
    pub fn include(mut self, pattern: &str) -> Result<Self, ApiError> {
        self.rules.push(FilterRule {
            kind: RuleKind::Include,
            pattern: compile(pattern)?,
        });
        Ok(self)
    }

    /// Append an exclude rule
    pub fn exclude(mut self, pattern: &str) -> Result<Self, ApiError> {
        self.rules.push(FilterRule {
            kind: RuleKind::Exclude,
            pattern: compile(pattern)?,
        });
        Ok(self)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Check whether the path is covered by this set
    pub fn contains(&self, repo_path: &str) -> bool {
        if !path::is_ancestor_or_self(&self.root, repo_path) {
            return false;
        }
        let Some(first) = self.rules.first() else {
            return true;
        };

        let mut included = first.kind == RuleKind::Exclude;
        for rule in &self.rules {
            if rule.pattern.is_match(repo_path) {
                included = rule.kind == RuleKind::Include;
            }
        }
        included
    }
}

/// The inclusion filter consulted by transactions
#[derive(Debug, Clone, Default)]
pub struct WorkspaceFilter {
    sets: Vec<PathFilterSet>,
}

impl WorkspaceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter root
    pub fn with_set(mut self, set: PathFilterSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Build a filter from its configuration section
    pub fn from_config(config: &FilterConfig) -> Result<Self, ApiError> {
        let mut filter = Self::new();
        for root in &config.roots {
            let mut set = PathFilterSet::new(&root.root)?;
            for rule in &root.rules {
                set = match rule.kind {
                    RuleKind::Include => set.include(&rule.pattern)?,
                    RuleKind::Exclude => set.exclude(&rule.pattern)?,
                };
            }
            filter.sets.push(set);
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Check whether a repository path is inside the filter
    pub fn contains(&self, repo_path: &str) -> bool {
        self.sets.is_empty() || self.sets.iter().any(|set| set.contains(repo_path))
    }
}

fn compile(pattern: &str) -> Result<Regex, ApiError> {
    // Patterns match whole paths.
    Regex::new(&format!("^(?:{})$", pattern))
        .map_err(|e| ApiError::ConfigError(format!("Invalid filter pattern '{}': {}", pattern, e)))
}
