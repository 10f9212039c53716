//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Frame header: LSN (8) + CRC32 (4) + payload length (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Map a key to a value
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Remove a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Frame the entry: `[lsn][crc32(payload)][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let mut frame = vec![0u8; HEADER_SIZE + payload.len()];
        LittleEndian::write_u64(&mut frame[0..8], self.lsn);
        LittleEndian::write_u32(&mut frame[8..12], crc32fast::hash(&payload));
        LittleEndian::write_u32(&mut frame[12..16], payload.len() as u32);
        frame[HEADER_SIZE..].copy_from_slice(&payload);
        Ok(frame)
    }

    /// Parse one frame from the start of `bytes`
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Self::parse_frame(bytes).map(|(entry, _)| entry)
    }

    /// Parse one frame, returning the entry and the frame length.
    ///
    /// A short buffer, a CRC mismatch, or an LSN that disagrees with the
    /// payload is reported as `WalCorruption`.
    pub(crate) fn parse_frame(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::WalCorruption(format!(
                "frame header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let lsn = LittleEndian::read_u64(&bytes[0..8]);
        let crc = LittleEndian::read_u32(&bytes[8..12]);
        let len = LittleEndian::read_u32(&bytes[12..16]) as usize;

        let end = HEADER_SIZE + len;
        if bytes.len() < end {
            return Err(StoreError::WalCorruption(format!(
                "frame for lsn {} is truncated ({} of {} payload bytes)",
                lsn,
                bytes.len() - HEADER_SIZE,
                len
            )));
        }

        let payload = &bytes[HEADER_SIZE..end];
        if crc32fast::hash(payload) != crc {
            return Err(StoreError::WalCorruption(format!(
                "CRC mismatch for lsn {}",
                lsn
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| StoreError::WalCorruption(format!("lsn {}: {}", lsn, e)))?;
        if entry.lsn != lsn {
            return Err(StoreError::WalCorruption(format!(
                "frame lsn {} disagrees with payload lsn {}",
                lsn, entry.lsn
            )));
        }

        Ok((entry, end))
    }
}
