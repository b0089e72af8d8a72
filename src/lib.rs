//! Vault transactions
//!
//! Applies filesystem-shaped edits (add, modify, delete, mkdir) made against
//! a filesystem view of a hierarchical content repository. One repository
//! node may be serialized as several view files; a `Transaction` works out
//! which aggregate every edit belongs to and imports the result atomically.

pub mod artifact;
pub mod config;
pub mod docview;
pub mod error;
pub mod filter;
pub mod input;
pub mod logging;
pub mod path;
pub mod platform;
pub mod repository;
pub mod transaction;
pub mod vfs;

pub use error::{ApiError, StorageError, TransactionError};
pub use input::InputSource;
pub use transaction::{InfoKind, ResultInfo, Transaction};
pub use vfs::{VaultFileSystem, VaultFs, ViewFile};
