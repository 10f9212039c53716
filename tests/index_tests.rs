//! Tests for the record index
//!
//! These tests verify:
//! - WAL framing, writer numbering, and torn-tail recovery
//! - The ordered in-memory table
//! - Snapshot write/read and corruption detection
//! - LogIndex persistence across reopen and checkpoint
//! - Location encoding

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chunkstore::index::snapshot;
use chunkstore::index::wal::{Operation, WalEntry, WalRecovery, WalWriter, HEADER_SIZE};
use chunkstore::index::IndexTable;
use chunkstore::{Index, Location, LogIndex, StoreError};
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put_op(i: usize) -> Operation {
    Operation::Put {
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
    }
}

/// Write `count` well-formed entries through the writer
fn write_entries(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, 1).unwrap();
    for i in 0..count {
        writer.append(put_op(i)).unwrap();
    }
    writer.sync().unwrap();
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// WAL Entry Tests
// =============================================================================

#[test]
fn test_entry_frame_layout() {
    let entry = WalEntry::new(7, put_op(1));
    let frame = entry.serialize().unwrap();

    assert_eq!(u64::from_le_bytes(frame[0..8].try_into().unwrap()), 7);
    let len = u32::from_le_bytes(frame[12..16].try_into().unwrap()) as usize;
    assert_eq!(frame.len(), HEADER_SIZE + len);

    let decoded = WalEntry::deserialize(&frame).unwrap();
    assert_eq!(decoded, entry);
}

#[test]
fn test_entry_crc_mismatch_detected() {
    let mut frame = WalEntry::new(1, put_op(1)).serialize().unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    assert!(matches!(
        WalEntry::deserialize(&frame),
        Err(StoreError::WalCorruption(_))
    ));
}

#[test]
fn test_entry_truncated_frame_detected() {
    let frame = WalEntry::new(1, put_op(1)).serialize().unwrap();

    assert!(WalEntry::deserialize(&frame[..HEADER_SIZE - 1]).is_err());
    assert!(WalEntry::deserialize(&frame[..frame.len() - 1]).is_err());
}

// =============================================================================
// WAL Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 1).unwrap();

    assert_eq!(writer.append(put_op(0)).unwrap(), 1);
    assert_eq!(writer.append(put_op(1)).unwrap(), 2);
    assert_eq!(writer.last_lsn(), 2);
    assert_eq!(writer.next_lsn(), 3);

    writer.sync().unwrap();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), writer.len_bytes());
}

#[test]
fn test_writer_truncate_empties_log() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, 1).unwrap();
    writer.append(put_op(0)).unwrap();
    writer.truncate().unwrap();

    assert_eq!(writer.len_bytes(), 0);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    // Numbering continues after a truncate
    assert_eq!(writer.append(put_op(1)).unwrap(), 2);
}

// =============================================================================
// WAL Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_clean_log() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 5);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 5);
    assert_eq!(result.last_lsn, 5);
    assert_eq!(entries[2].operation, put_op(2));
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);
    let clean_len = fs::metadata(&wal_path).unwrap().len();

    let frame = WalEntry::new(4, put_op(3)).serialize().unwrap();
    append_raw(&wal_path, &frame[..frame.len() / 2]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert!(result.was_truncated);
    assert_eq!(result.bytes_discarded, (frame.len() / 2) as u64);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_stops_at_corrupt_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 2);

    let mut bad = WalEntry::new(3, put_op(2)).serialize().unwrap();
    let last = bad.len() - 1;
    bad[last] ^= 0xFF;
    append_raw(&wal_path, &bad);
    append_raw(&wal_path, &WalEntry::new(4, put_op(3)).serialize().unwrap());

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 2);
    assert!(result.was_truncated);
}

#[test]
fn test_verify_does_not_modify() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 2);
    append_raw(&wal_path, &[1, 2, 3]);
    let len = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.bytes_discarded, 3);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len);
}

// =============================================================================
// Index Table Tests
// =============================================================================

#[test]
fn test_table_is_ordered() {
    let table = IndexTable::new();
    for key in ["delta", "alpha", "charlie", "bravo"] {
        table.put(key.as_bytes().to_vec(), b"v".to_vec());
    }

    let keys: Vec<Vec<u8>> = table.keys();
    assert_eq!(
        keys,
        vec![
            b"alpha".to_vec(),
            b"bravo".to_vec(),
            b"charlie".to_vec(),
            b"delta".to_vec()
        ]
    );
}

#[test]
fn test_table_size_tracking() {
    let table = IndexTable::new();

    assert_eq!(table.put(b"key".to_vec(), b"value".to_vec()), 8);
    // Replacing changes only the value part
    assert_eq!(table.put(b"key".to_vec(), b"v".to_vec()), 4);
    assert!(table.delete(b"key"));
    assert_eq!(table.size(), 0);
    assert!(!table.delete(b"key"));
    assert!(table.is_empty());
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_snapshot_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.snap");
    let entries = vec![
        (b"a".to_vec(), b"1".to_vec()),
        (b"b".to_vec(), Vec::new()),
        (b"c".to_vec(), vec![0u8; 300]),
    ];

    snapshot::write(&path, 42, &entries).unwrap();
    let read = snapshot::read(&path).unwrap();

    assert_eq!(read.last_lsn, 42);
    assert_eq!(read.entries, entries);
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn test_snapshot_corruption_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.snap");
    snapshot::write(&path, 1, &[(b"k".to_vec(), b"v".to_vec())]).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[snapshot::HEADER_SIZE + 8] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        snapshot::read(&path),
        Err(StoreError::WalCorruption(_))
    ));

    bytes[0] = b'X';
    fs::write(&path, &bytes).unwrap();
    assert!(snapshot::read(&path).is_err());
}

#[test]
fn test_snapshot_inflated_count_detected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("index.snap");
    snapshot::write(&path, 1, &[(b"k".to_vec(), b"v".to_vec())]).unwrap();

    // The CRC only covers the data block, so the count passes it
    let mut bytes = fs::read(&path).unwrap();
    bytes[14..22].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        snapshot::read(&path),
        Err(StoreError::WalCorruption(_))
    ));
}

// =============================================================================
// LogIndex Tests
// =============================================================================

#[test]
fn test_log_index_basic_operations() {
    let temp = TempDir::new().unwrap();
    let index = LogIndex::create(temp.path(), 1 << 20).unwrap();

    assert_eq!(index.get(b"missing").unwrap(), None);

    index.put(b"k1", b"v1", false).unwrap();
    index.put(b"k2", b"v2", true).unwrap();
    index.put(b"k1", b"v1b", false).unwrap();
    assert_eq!(index.get(b"k1").unwrap(), Some(b"v1b".to_vec()));
    assert_eq!(index.len(), 2);

    index.delete(b"k2", false).unwrap();
    assert_eq!(index.get(b"k2").unwrap(), None);
    // Deleting an absent key is not an error
    index.delete(b"k2", false).unwrap();
}

#[test]
fn test_log_index_create_twice_fails() {
    let temp = TempDir::new().unwrap();
    LogIndex::create(temp.path(), 1 << 20).unwrap();

    assert!(matches!(
        LogIndex::create(temp.path(), 1 << 20),
        Err(StoreError::AlreadyExists(_))
    ));
}

#[test]
fn test_log_index_open_missing_fails() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
        LogIndex::open(&temp.path().join("nope"), 1 << 20),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn test_log_index_reopen_replays_wal() {
    let temp = TempDir::new().unwrap();
    {
        let index = LogIndex::create(temp.path(), 1 << 20).unwrap();
        for i in 0..10 {
            index.put(format!("key{}", i).as_bytes(), b"value", false).unwrap();
        }
        index.delete(b"key3", false).unwrap();
        index.flush().unwrap();
    }

    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.len(), 9);
    assert_eq!(index.get(b"key3").unwrap(), None);
    assert_eq!(index.get(b"key9").unwrap(), Some(b"value".to_vec()));
}

#[test]
fn test_log_index_checkpoint_and_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let index = LogIndex::create(temp.path(), 1 << 20).unwrap();
        index.put(b"before", b"1", false).unwrap();
        index.checkpoint().unwrap();
        assert_eq!(index.wal_bytes(), 0);

        index.put(b"after", b"2", false).unwrap();
        index.delete(b"before", false).unwrap();
        index.flush().unwrap();
    }

    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.keys(), vec![b"after".to_vec()]);

    // New writes keep numbering past the snapshot
    index.put(b"third", b"3", true).unwrap();
    drop(index);
    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.len(), 2);
}

#[test]
fn test_log_index_skips_wal_entries_covered_by_snapshot() {
    let temp = TempDir::new().unwrap();
    LogIndex::create(temp.path(), 1 << 20).unwrap();

    // A checkpoint that wrote its snapshot but never truncated the WAL
    {
        let mut writer = WalWriter::open(&temp.path().join("index.wal"), 1).unwrap();
        writer.append(Operation::Put { key: b"k".to_vec(), value: b"old".to_vec() }).unwrap();
        writer.append(Operation::Delete { key: b"k".to_vec() }).unwrap();
        writer.sync().unwrap();
    }
    snapshot::write(&temp.path().join("index.snap"), 5, &[(b"k".to_vec(), b"new".to_vec())]).unwrap();

    {
        let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
        assert_eq!(index.get(b"k").unwrap(), Some(b"new".to_vec()));
        index.put(b"after", b"1", false).unwrap();
        index.flush().unwrap();
    }

    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.get(b"k").unwrap(), Some(b"new".to_vec()));
    assert_eq!(index.get(b"after").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_log_index_automatic_checkpoint() {
    let temp = TempDir::new().unwrap();
    let index = LogIndex::create(temp.path(), 256).unwrap();

    for i in 0..50 {
        index.put(format!("key{:02}", i).as_bytes(), b"value", false).unwrap();
    }

    assert!(index.wal_bytes() < 256);
    assert!(temp.path().join("index.snap").exists());
    drop(index);

    let index = LogIndex::open(temp.path(), 256).unwrap();
    assert_eq!(index.len(), 50);
    assert_eq!(index.keys()[0], b"key00".to_vec());
}

#[test]
fn test_log_index_survives_torn_tail() {
    let temp = TempDir::new().unwrap();
    {
        let index = LogIndex::create(temp.path(), 1 << 20).unwrap();
        index.put(b"a", b"1", true).unwrap();
        index.put(b"b", b"2", true).unwrap();
    }

    let frame = WalEntry::new(3, put_op(9)).serialize().unwrap();
    append_raw(&temp.path().join("index.wal"), &frame[..frame.len() - 3]);

    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.len(), 2);

    // The repaired log accepts new entries
    index.put(b"c", b"3", true).unwrap();
    drop(index);
    let index = LogIndex::open(temp.path(), 1 << 20).unwrap();
    assert_eq!(index.get(b"c").unwrap(), Some(b"3".to_vec()));
}

// =============================================================================
// Location Tests
// =============================================================================

#[test]
fn test_location_encoding() {
    let location = Location::new(Uuid::now_v7(), 4096);
    let bytes = location.encode().unwrap();

    assert_eq!(Location::decode(&bytes).unwrap(), location);
    assert!(Location::decode(&bytes[..4]).is_err());
}
