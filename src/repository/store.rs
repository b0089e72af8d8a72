//! Persistence layer for saved repository state

use crate::error::StorageError;
use crate::repository::Node;
use bincode;
use sled;
use std::collections::BTreeMap;
use std::path::Path;

/// Sled-based store for the saved node tree
///
/// Keys are repository paths, values are bincode-encoded `Node`s.
pub struct SledNodeStore {
    db: sled::Db,
}

impl SledNodeStore {
    /// Open (or create) a store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Ok(Self { db })
    }

    pub fn get(&self, path: &str) -> Result<Option<Node>, StorageError> {
        match self.db.get(path.as_bytes()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to get node: {}", e),
            ))
        })? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    /// Load the full saved tree
    pub fn load_all(&self) -> Result<BTreeMap<String, Node>, StorageError> {
        let mut nodes = BTreeMap::new();
        for item in self.db.iter() {
            let (key, value) = item.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate store: {}", e),
                ))
            })?;
            let path = String::from_utf8(key.to_vec()).map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Invalid node path in store: {}", e),
                ))
            })?;
            nodes.insert(path, decode(&value)?);
        }
        Ok(nodes)
    }

    /// Replace the stored tree with `nodes` in one batch and flush it
    pub fn replace_all(&self, nodes: &BTreeMap<String, Node>) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();

        for key in self.db.iter().keys() {
            let key = key.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate store: {}", e),
                ))
            })?;
            if !nodes.contains_key(String::from_utf8_lossy(&key).as_ref()) {
                batch.remove(key);
            }
        }
        for (path, node) in nodes {
            batch.insert(path.as_bytes(), encode(node)?);
        }

        self.db.apply_batch(batch).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to apply batch: {}", e),
            ))
        })?;
        self.flush()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }
}

fn encode(node: &Node) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(node).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize node: {}", e),
        ))
    })
}

fn decode(bytes: &[u8]) -> Result<Node, StorageError> {
    bincode::deserialize(bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to deserialize node: {}", e),
        ))
    })
}
