//! Shared helpers for integration tests

use std::sync::Mutex;
use vault_tx::repository::{MemorySession, Node, Session};
use vault_tx::{InfoKind, ResultInfo, VaultFs};

/// Serializes tests that touch process-wide environment variables
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub const PAGE_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="cq:Page">
    <jcr:content jcr:primaryType="nt:unstructured" title="Home"/>
</jcr:root>"#;

/// Build a view over a session whose nodes are already saved
pub fn saved_fs(nodes: &[(&str, Node)]) -> VaultFs<MemorySession> {
    let mut session = MemorySession::new();
    for (path, node) in nodes {
        session.put_node(path, node.clone()).unwrap();
    }
    session.save().unwrap();
    VaultFs::new(session)
}

pub fn info(kind: InfoKind, path: &str) -> ResultInfo {
    ResultInfo::new(kind, path)
}

pub fn content(fs: &VaultFs<MemorySession>, path: &str) -> Option<Vec<u8>> {
    fs.session().node(path).and_then(|n| n.content.clone())
}

/// Run `f` with the given environment variables set, restoring them afterwards
pub fn with_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(k, _)| (k.to_string(), std::env::var(k).ok()))
        .collect();
    for (key, value) in vars {
        match value {
            Some(value) => std::env::set_var(key, value),
            None => std::env::remove_var(key),
        }
    }
    let result = f();
    for (key, value) in saved {
        match value {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }
    }
    result
}
