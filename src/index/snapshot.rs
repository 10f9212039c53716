//! Index snapshot
//!
//! A checkpoint of the whole index table, written in sorted key order.
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌──────────┬──────────┬──────────┬───┐ │
//! │ │Magic (4) │Version(2)│Last LSN 8│Cnt│ │
//! │ └──────────┴──────────┴──────────┴───┘ │
//! ├────────────────────────────────────────┤
//! │ Data Block                             │
//! │ ┌────────┬────────┬─────┬───────────┐ │
//! │ │KeyLen  │ValLen  │ Key │   Value   │ │
//! │ └────────┴────────┴─────┴───────────┘ │
//! │ ... (repeated for each entry)         │
//! ├────────────────────────────────────────┤
//! │ Footer: CRC32 of data block (4)        │
//! └────────────────────────────────────────┘
//! ```
//!
//! Snapshots are written to a temporary file and renamed into place, so a
//! crash leaves either the old snapshot or the new one.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

/// Magic bytes identifying an index snapshot
pub const MAGIC: &[u8; 4] = b"CSIX";

/// Snapshot format version
pub const VERSION: u16 = 1;

/// Magic (4) + version (2) + last LSN (8) + entry count (8)
pub const HEADER_SIZE: usize = 22;

/// CRC32 of the data block
pub const FOOTER_SIZE: usize = 4;

/// Decoded snapshot contents
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Last WAL entry folded into this snapshot
    pub last_lsn: u64,

    /// Entries in sorted key order
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Atomically write `entries` as the snapshot at `path`
pub fn write(path: &Path, last_lsn: u64, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(file);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        LittleEndian::write_u16(&mut header[4..6], VERSION);
        LittleEndian::write_u64(&mut header[6..14], last_lsn);
        LittleEndian::write_u64(&mut header[14..22], entries.len() as u64);
        writer.write_all(&header)?;

        let mut hasher = crc32fast::Hasher::new();
        for (key, value) in entries {
            let mut lens = [0u8; 8];
            LittleEndian::write_u32(&mut lens[0..4], key.len() as u32);
            LittleEndian::write_u32(&mut lens[4..8], value.len() as u32);

            writer.write_all(&lens)?;
            writer.write_all(key)?;
            writer.write_all(value)?;

            hasher.update(&lens);
            hasher.update(key);
            hasher.update(value);
        }

        writer.write_all(&hasher.finalize().to_le_bytes())?;
        writer.flush()?;

        let file = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    sync_dir(path)?;
    Ok(())
}

/// Read and verify the snapshot at `path`
pub fn read(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path)?;

    if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(StoreError::WalCorruption(format!(
            "snapshot {} is too short ({} bytes)",
            path.display(),
            bytes.len()
        )));
    }

    if &bytes[0..4] != MAGIC {
        return Err(StoreError::WalCorruption(format!(
            "invalid snapshot magic: expected CSIX, got {:?}",
            &bytes[0..4]
        )));
    }

    let version = LittleEndian::read_u16(&bytes[4..6]);
    if version != VERSION {
        return Err(StoreError::WalCorruption(format!(
            "unsupported snapshot version: {}",
            version
        )));
    }

    let last_lsn = LittleEndian::read_u64(&bytes[6..14]);
    let entry_count = LittleEndian::read_u64(&bytes[14..22]);

    let data_end = bytes.len() - FOOTER_SIZE;
    let data = &bytes[HEADER_SIZE..data_end];
    let stored_crc = LittleEndian::read_u32(&bytes[data_end..]);
    if crc32fast::hash(data) != stored_crc {
        return Err(StoreError::WalCorruption(format!(
            "snapshot {} failed its CRC check",
            path.display()
        )));
    }

    // Every entry carries an 8-byte length prefix
    if entry_count > (data.len() / 8) as u64 {
        return Err(StoreError::WalCorruption(format!(
            "snapshot {} claims {} entries in {} data bytes",
            path.display(),
            entry_count,
            data.len()
        )));
    }

    // Parse entries: [key_len(4)][val_len(4)][key][value]
    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut pos = 0;
    while pos < data.len() {
        if pos + 8 > data.len() {
            return Err(truncated(path));
        }
        let key_len = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
        let val_len = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
        pos += 8;

        if pos + key_len + val_len > data.len() {
            return Err(truncated(path));
        }
        let key = data[pos..pos + key_len].to_vec();
        pos += key_len;
        let value = data[pos..pos + val_len].to_vec();
        pos += val_len;

        entries.push((key, value));
    }

    if entries.len() as u64 != entry_count {
        return Err(StoreError::WalCorruption(format!(
            "snapshot {} holds {} entries, header says {}",
            path.display(),
            entries.len(),
            entry_count
        )));
    }

    Ok(Snapshot { last_lsn, entries })
}

fn truncated(path: &Path) -> StoreError {
    StoreError::WalCorruption(format!("snapshot {} has a truncated entry", path.display()))
}

/// Make the rename itself durable
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
