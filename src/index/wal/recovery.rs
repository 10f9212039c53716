//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::error::Result;

use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of bytes discarded after the last valid entry
    pub bytes_discarded: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first torn or corrupted frame
    /// 3. Truncate everything from that frame on
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let (entries, valid_len, mut result) = Self::scan(path)?;

        if result.bytes_discarded > 0 {
            warn!(
                path = %path.display(),
                discarded = result.bytes_discarded,
                last_lsn = result.last_lsn,
                "truncating torn WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path).map(|(_, _, result)| result)
    }

    fn scan(path: &Path) -> Result<(Vec<WalEntry>, u64, RecoveryResult)> {
        let bytes = fs::read(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut pos = 0usize;

        while pos < bytes.len() {
            match WalEntry::parse_frame(&bytes[pos..]) {
                Ok((entry, frame_len)) => {
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    entries.push(entry);
                    pos += frame_len;
                }
                // Nothing after a bad frame can be trusted
                Err(_) => break,
            }
        }

        result.bytes_discarded = (bytes.len() - pos) as u64;
        Ok((entries, pos as u64, result))
    }
}
