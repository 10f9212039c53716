//! Index Module
//!
//! Maps user keys to record locations.
//!
//! ## Responsibilities
//! - Define the `Index` seam the database depends on
//! - Encode `(chunk, offset)` locations as opaque values
//! - Provide `LogIndex`, a persistent ordered map (WAL + table + snapshot)
//!
//! ## Directory Layout
//! ```text
//! {index_dir}/
//!   ├── index.wal     (write-ahead log)
//!   └── index.snap    (checkpoint snapshot)
//! ```

mod log_index;
pub mod snapshot;
mod table;
pub mod wal;

pub use log_index::LogIndex;
pub use table::IndexTable;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Ordered persistent key-value store used as the record index
///
/// Single-key operations are atomic. `durable` asks for the change to be
/// on stable storage before the call returns.
pub trait Index: Send + Sync {
    /// Value stored for `key`, or `None`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Map `key` to `value`, replacing any previous value
    fn put(&self, key: &[u8], value: &[u8], durable: bool) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    fn delete(&self, key: &[u8], durable: bool) -> Result<()>;

    /// Make every buffered change durable
    fn flush(&self) -> Result<()>;
}

/// Where a record lives: chunk key plus byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub chunk: Uuid,
    pub offset: u64,
}

impl Location {
    pub fn new(chunk: Uuid, offset: u64) -> Self {
        Self { chunk, offset }
    }

    /// Serialize as an index value
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Parse an index value
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
