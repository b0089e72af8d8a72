//! Content repository
//!
//! The hierarchical node tree the transaction engine writes into. Sessions
//! hold a working copy on top of the last saved state; `save()` makes the
//! working copy durable and `refresh(false)` throws it away.

pub mod node;
pub mod session;
pub mod store;

pub use node::{Node, NodeShape};
pub use session::{MemorySession, Session};
pub use store::SledNodeStore;
