//! Configuration
//!
//! Layered configuration: built-in defaults, the user's global file, the
//! workspace files and finally `VAULT_*` environment variables (nested keys
//! separated by `__`, e.g. `VAULT_TRANSACTION__VERBOSE=true`).

use crate::filter::RuleKind;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub transaction: TransactionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transaction settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Log every resolved change at info level
    #[serde(default)]
    pub verbose: bool,

    /// Workspace filter the transaction checks its writes against
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Workspace filter roots
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub roots: Vec<FilterRootConfig>,
}

/// One filter root with its rules, applied in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRootConfig {
    pub root: String,
    #[serde(default)]
    pub rules: Vec<FilterRuleConfig>,
}

/// `{ kind = "include" | "exclude", pattern = "<regex>" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRuleConfig {
    pub kind: RuleKind,
    pub pattern: String,
}

impl FilterRuleConfig {
    pub fn include(pattern: &str) -> Self {
        Self {
            kind: RuleKind::Include,
            pattern: pattern.to_string(),
        }
    }

    pub fn exclude(pattern: &str) -> Self {
        Self {
            kind: RuleKind::Exclude,
            pattern: pattern.to_string(),
        }
    }
}

/// Repository persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database backing saved sessions
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".vault/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Filter(String, String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Filter(root, msg) => write!(f, "Filter root '{}': {}", root, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl VaultConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for root in &self.transaction.filter.roots {
            if let Err(e) = crate::path::normalize(&root.root) {
                errors.push(ValidationError::Filter(root.root.clone(), e.to_string()));
            }
            for rule in &root.rules {
                if let Err(e) = regex::Regex::new(&rule.pattern) {
                    errors.push(ValidationError::Filter(
                        root.root.clone(),
                        format!("invalid pattern '{}': {}", rule.pattern, e),
                    ));
                }
            }
        }

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
