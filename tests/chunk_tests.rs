//! Tests for chunk files
//!
//! These tests verify:
//! - Creation stamps a valid header and a sparse file of the right size
//! - Bump allocation keeps `header_size <= head <= size`
//! - Reopening reads the header back from the mapping
//! - Corrupt or misnamed chunk files are rejected

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use chunkstore::chunk::{Chunk, CHUNK_HEADER_SIZE, CHUNK_VERSION};
use chunkstore::layout::Region;
use chunkstore::{Shape, Scalar, StoreError, View};
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Create Tests
// =============================================================================

#[test]
fn test_create_stamps_header() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(4096, temp.path(), None).unwrap();

    assert_eq!(chunk.size(), 4096);
    assert_eq!(chunk.head(), CHUNK_HEADER_SIZE);
    assert_eq!(chunk.remaining(), 4096 - CHUNK_HEADER_SIZE);
    assert!(chunk.created() > 0.0);

    let header = chunk.header().unwrap();
    assert!(header.used);
    assert_eq!(header.version, CHUNK_VERSION);
    assert_eq!(header.size, 4096);

    let path = temp.path().join(chunk.key().to_string());
    assert_eq!(chunk.path(), path.as_path());
    assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
}

#[test]
fn test_create_with_explicit_key() {
    let temp = setup_temp_dir();
    let key = Uuid::now_v7();
    let chunk = Chunk::create(1024, temp.path(), Some(key)).unwrap();

    assert_eq!(chunk.key(), key);
    assert_eq!(chunk.id(), Some(key));
}

#[test]
fn test_create_existing_key_fails() {
    let temp = setup_temp_dir();
    let key = Uuid::now_v7();
    Chunk::create(1024, temp.path(), Some(key)).unwrap();

    let result = Chunk::create(1024, temp.path(), Some(key));
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
}

#[test]
fn test_create_too_small_fails() {
    let temp = setup_temp_dir();
    let result = Chunk::create(CHUNK_HEADER_SIZE - 1, temp.path(), None);
    assert!(matches!(result, Err(StoreError::Definition(_))));
}

#[test]
fn test_header_view_reads_chunk_fields() {
    let temp = setup_temp_dir();
    let chunk = Arc::new(Chunk::create(2048, temp.path(), None).unwrap());
    let view = chunk.header_view().unwrap();

    assert!(view.used());
    assert_eq!(view.size().unwrap(), 2048);
    assert_eq!(view.get_int("head").unwrap(), CHUNK_HEADER_SIZE as i64);
    assert_eq!(view.get_str("key").unwrap(), chunk.key().to_string());
    assert_eq!(view.get_float("created").unwrap(), chunk.created());
}

// =============================================================================
// Reserve Tests
// =============================================================================

#[test]
fn test_reserve_bumps_head() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(256, temp.path(), None).unwrap();

    let first = chunk.reserve(24).unwrap();
    let second = chunk.reserve(24).unwrap();

    assert_eq!(first, CHUNK_HEADER_SIZE);
    assert_eq!(second, CHUNK_HEADER_SIZE + 24);
    assert_eq!(chunk.head(), CHUNK_HEADER_SIZE + 48);
}

#[test]
fn test_reserve_respects_bounds() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(CHUNK_HEADER_SIZE + 100, temp.path(), None).unwrap();

    while chunk.reserve(30).is_some() {
        assert!(chunk.head() >= CHUNK_HEADER_SIZE);
        assert!(chunk.head() <= chunk.size());
    }

    assert_eq!(chunk.head(), CHUNK_HEADER_SIZE + 90);
    assert!(chunk.reserve(11).is_none());
    // A failed reservation leaves head alone
    assert_eq!(chunk.head(), CHUNK_HEADER_SIZE + 90);
    assert_eq!(chunk.reserve(10), Some(CHUNK_HEADER_SIZE + 90));
    assert_eq!(chunk.remaining(), 0);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_preserves_header_and_records() {
    let temp = setup_temp_dir();
    let shape = Shape::record("Counter", [("n", Scalar::U32)]).unwrap();

    let (path, key, created, offset) = {
        let chunk = Arc::new(Chunk::create(1024, temp.path(), None).unwrap());
        let offset = chunk.reserve(shape.size()).unwrap();
        let view = View::new(chunk.clone() as Arc<dyn Region>, shape.clone(), offset).unwrap();
        view.initialize().unwrap();
        view.set_uint("n", 77).unwrap();
        chunk.flush().unwrap();
        (chunk.path().to_path_buf(), chunk.key(), chunk.created(), offset)
    };

    let chunk = Arc::new(Chunk::from_file(&path).unwrap());
    assert_eq!(chunk.key(), key);
    assert_eq!(chunk.size(), 1024);
    assert_eq!(chunk.created(), created);
    assert_eq!(chunk.head(), offset + shape.size());

    let view = View::new(chunk as Arc<dyn Region>, shape, offset).unwrap();
    assert_eq!(view.get_uint("n").unwrap(), 77);
}

#[test]
fn test_flush_is_idempotent() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(1024, temp.path(), None).unwrap();
    chunk.reserve(40).unwrap();
    chunk.write_at(CHUNK_HEADER_SIZE, b"payload");

    chunk.flush().unwrap();
    let once = fs::read(chunk.path()).unwrap();
    chunk.flush().unwrap();
    let twice = fs::read(chunk.path()).unwrap();

    assert_eq!(once, twice);
    assert_eq!(&once[CHUNK_HEADER_SIZE..CHUNK_HEADER_SIZE + 7], b"payload");
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_misnamed_chunk_rejected() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(1024, temp.path(), None).unwrap();
    let path = chunk.path().to_path_buf();
    chunk.close().unwrap();

    let renamed = temp.path().join(Uuid::now_v7().to_string());
    fs::rename(&path, &renamed).unwrap();

    let result = Chunk::from_file(&renamed);
    assert!(matches!(result, Err(StoreError::Consistency(_))));
}

#[test]
fn test_truncated_chunk_rejected() {
    let temp = setup_temp_dir();
    let path = temp.path().join(Uuid::now_v7().to_string());
    fs::write(&path, [0u8; 10]).unwrap();

    let result = Chunk::from_file(&path);
    assert!(matches!(result, Err(StoreError::Consistency(_))));
}

#[test]
fn test_size_mismatch_rejected() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(1024, temp.path(), None).unwrap();
    let path = chunk.path().to_path_buf();
    chunk.close().unwrap();

    OpenOptions::new().write(true).open(&path).unwrap().set_len(2048).unwrap();

    let result = Chunk::from_file(&path);
    assert!(matches!(result, Err(StoreError::Consistency(_))));
}

#[test]
fn test_head_out_of_range_rejected() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(1024, temp.path(), None).unwrap();
    let path = chunk.path().to_path_buf();
    chunk.close().unwrap();

    // head lives right after the 16-byte header and the 36-byte key
    overwrite(&path, 16 + 36, &4096i64.to_le_bytes());

    let result = Chunk::from_file(&path);
    assert!(matches!(result, Err(StoreError::Consistency(_))));
}

#[test]
fn test_unused_chunk_rejected() {
    let temp = setup_temp_dir();
    let chunk = Chunk::create(1024, temp.path(), None).unwrap();
    let path = chunk.path().to_path_buf();
    chunk.close().unwrap();

    let mut word = fs::read(&path).unwrap()[0..8].to_vec();
    word[0] &= !1;
    overwrite(&path, 0, &word);

    let result = Chunk::from_file(&path);
    assert!(matches!(result, Err(StoreError::Consistency(_))));
}
