//! Index table
//!
//! Ordered in-memory map holding the live index contents.
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (required for checkpoint snapshots)
//! - Many concurrent readers, one writer

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// In-memory ordered table
pub struct IndexTable {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl IndexTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock), returning the new size
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> usize {
        let mut data = self.data.write();
        let (key_len, value_len) = (key.len(), value.len());
        match data.insert(key, value) {
            // Same key: only the value size changes
            Some(old) => {
                self.size.fetch_sub(old.len(), Ordering::Relaxed);
                self.size.fetch_add(value_len, Ordering::Relaxed);
            }
            None => {
                self.size.fetch_add(key_len + value_len, Ordering::Relaxed);
            }
        }
        self.size.load(Ordering::Relaxed)
    }

    /// Remove a key (write lock), returning whether it was present
    pub fn delete(&self, key: &[u8]) -> bool {
        let mut data = self.data.write();
        match data.remove(key) {
            Some(old) => {
                self.size.fetch_sub(key.len() + old.len(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.data.read().keys().cloned().collect()
    }

    /// Copy of all entries in sorted key order (for checkpoints)
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for IndexTable {
    fn default() -> Self {
        Self::new()
    }
}
