//! Log-structured index
//!
//! The default `Index`: a WAL plus an ordered in-memory table, with
//! periodic checkpoints that fold the table into a snapshot file.
//!
//! ## Write Path
//! 1. Append the operation to the WAL (fsync when durable)
//! 2. Apply it to the in-memory table
//! 3. Checkpoint once the WAL outgrows `checkpoint_bytes`
//!
//! ## Open Path
//! 1. Load the snapshot, if any
//! 2. Replay WAL entries newer than the snapshot
//! 3. Truncate a torn WAL tail

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};

use super::snapshot;
use super::table::IndexTable;
use super::wal::{Operation, WalRecovery, WalWriter};
use super::Index;

/// Persistent ordered map stored under one directory
pub struct LogIndex {
    dir: PathBuf,

    /// Live contents (internal RwLock)
    table: IndexTable,

    /// Write-ahead log; its lock also serializes writers
    wal: Mutex<WalWriter>,

    /// WAL size that triggers a checkpoint
    checkpoint_bytes: u64,
}

impl LogIndex {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "index.wal";
    const SNAPSHOT_FILENAME: &'static str = "index.snap";

    /// Whether an index has been created in `dir`
    pub fn exists(dir: &Path) -> bool {
        dir.join(Self::WAL_FILENAME).exists() || dir.join(Self::SNAPSHOT_FILENAME).exists()
    }

    /// Create a fresh index; fails if one already exists in `dir`
    pub fn create(dir: &Path, checkpoint_bytes: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        if Self::exists(dir) {
            return Err(StoreError::AlreadyExists(format!(
                "index in {}",
                dir.display()
            )));
        }

        let mut wal = WalWriter::open(&dir.join(Self::WAL_FILENAME), 1)?;
        wal.sync()?;

        debug!(dir = %dir.display(), "created index");

        Ok(Self {
            dir: dir.to_path_buf(),
            table: IndexTable::new(),
            wal: Mutex::new(wal),
            checkpoint_bytes,
        })
    }

    /// Open an existing index; fails if none exists in `dir`
    pub fn open(dir: &Path, checkpoint_bytes: u64) -> Result<Self> {
        let wal_path = dir.join(Self::WAL_FILENAME);
        let snapshot_path = dir.join(Self::SNAPSHOT_FILENAME);

        if !Self::exists(dir) {
            return Err(StoreError::NotFound(format!("index in {}", dir.display())));
        }

        let table = IndexTable::new();
        let mut last_lsn = 0;

        if snapshot_path.exists() {
            let snapshot = snapshot::read(&snapshot_path)?;
            last_lsn = snapshot.last_lsn;
            for (key, value) in snapshot.entries {
                table.put(key, value);
            }
        }

        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            debug!(
                recovered = result.entries_recovered,
                truncated = result.was_truncated,
                last_lsn = result.last_lsn,
                "index WAL recovery"
            );

            // Entries at or below the snapshot LSN are already folded in
            let snapshot_lsn = last_lsn;
            for entry in entries.into_iter().filter(|e| e.lsn > snapshot_lsn) {
                last_lsn = entry.lsn;
                match entry.operation {
                    Operation::Put { key, value } => {
                        table.put(key, value);
                    }
                    Operation::Delete { key } => {
                        table.delete(&key);
                    }
                }
            }
        }

        let wal = WalWriter::open(&wal_path, last_lsn + 1)?;

        debug!(dir = %dir.display(), entries = table.len(), "opened index");

        Ok(Self {
            dir: dir.to_path_buf(),
            table,
            wal: Mutex::new(wal),
            checkpoint_bytes,
        })
    }

    /// Fold the table into a snapshot and empty the WAL
    pub fn checkpoint(&self) -> Result<()> {
        let mut wal = self.wal.lock();
        self.checkpoint_locked(&mut wal)
    }

    /// Called with the WAL lock held
    fn checkpoint_locked(&self, wal: &mut WalWriter) -> Result<()> {
        wal.sync()?;
        let entries = self.table.entries();
        snapshot::write(
            &self.dir.join(Self::SNAPSHOT_FILENAME),
            wal.last_lsn(),
            &entries,
        )?;
        wal.truncate()?;

        debug!(entries = entries.len(), last_lsn = wal.last_lsn(), "index checkpoint");
        Ok(())
    }

    fn log(&self, operation: Operation, durable: bool) -> Result<()> {
        let mut wal = self.wal.lock();

        // Step 1: WAL first (durability guarantee)
        let apply = operation.clone();
        wal.append(operation)?;
        if durable {
            wal.sync()?;
        }

        // Step 2: In-memory table
        match apply {
            Operation::Put { key, value } => {
                self.table.put(key, value);
            }
            Operation::Delete { key } => {
                self.table.delete(&key);
            }
        }

        // Step 3: Checkpoint if the log is getting long
        if wal.len_bytes() >= self.checkpoint_bytes {
            self.checkpoint_locked(&mut wal)?;
        }

        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// All keys in sorted order
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.table.keys()
    }

    /// Current WAL size in bytes
    pub fn wal_bytes(&self) -> u64 {
        self.wal.lock().len_bytes()
    }
}

impl Index for LogIndex {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.table.get(key))
    }

    fn put(&self, key: &[u8], value: &[u8], durable: bool) -> Result<()> {
        self.log(
            Operation::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            },
            durable,
        )
    }

    fn delete(&self, key: &[u8], durable: bool) -> Result<()> {
        self.log(Operation::Delete { key: key.to_vec() }, durable)
    }

    fn flush(&self) -> Result<()> {
        self.wal.lock().sync()
    }
}
