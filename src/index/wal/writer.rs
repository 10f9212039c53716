//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

use super::{Operation, WalEntry};

/// Writes entries to the WAL file
///
/// Appends are buffered; `sync` pushes them to the OS and fsyncs.
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    next_lsn: u64,
    bytes_written: u64,
}

impl WalWriter {
    /// Open or create a WAL file, continuing numbering at `next_lsn`
    pub fn open(path: &Path, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn,
            bytes_written,
        })
    }

    /// Append an operation, returning its LSN
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let frame = WalEntry::new(lsn, operation).serialize()?;

        self.writer
            .write_all(&frame)
            .map_err(|e| StoreError::WalWrite(format!("{}: {}", self.path.display(), e)))?;

        self.next_lsn += 1;
        self.bytes_written += frame.len() as u64;
        Ok(lsn)
    }

    /// Force buffered entries to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Drop every entry (after a checkpoint made them redundant)
    pub fn truncate(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_ref();
        file.set_len(0)?;
        file.sync_all()?;
        self.bytes_written = 0;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn next_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// LSN of the most recent append (0 if none)
    pub fn last_lsn(&self) -> u64 {
        self.next_lsn - 1
    }

    /// Current size of the log in bytes, buffered entries included
    pub fn len_bytes(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
