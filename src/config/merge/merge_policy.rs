//! Merge rules: built-in defaults every layer overrides.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("transaction.verbose", false)?
        .set_default("storage.store_path", ".vault/store")?
        .set_default("logging.level", "info")
}
