//! Configuration loader: stacks every source in precedence order.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::VaultConfig;
use crate::error::ApiError;
use config::Environment;
use std::path::Path;
use tracing::debug;

/// Loads `VaultConfig` from defaults, files and the environment
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate the configuration for a workspace
    pub fn load(workspace_root: &Path) -> Result<VaultConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("VAULT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: VaultConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ApiError::ConfigError(format!("Invalid configuration: {}", messages.join("; ")))
        })?;

        debug!(
            workspace = %workspace_root.display(),
            filter_roots = config.transaction.filter.roots.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Defaults only, ignoring files and the environment
    pub fn defaults() -> Result<VaultConfig, ApiError> {
        Ok(merge_policy::builder_with_defaults()?
            .build()?
            .try_deserialize()?)
    }
}
