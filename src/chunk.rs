//! Chunk Module
//!
//! One fixed-size, memory-mapped file acting as a bump-pointer arena.
//!
//! ## Responsibilities
//! - Create sparse chunk files and stamp their header
//! - Reopen chunk files by reading the header straight from the mapping
//! - Bump-allocate record space (head only moves forward)
//! - Flush dirty pages synchronously
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (68 bytes)                                           │
//! │ ┌───────────────┬─────────┬──────────┬─────────┬──────────┐ │
//! │ │used|ver|flags │size (8) │ key (36) │head (8) │created(8)│ │
//! │ └───────────────┴─────────┴──────────┴─────────┴──────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Record 1 (starts with its own record header)                │
//! │ Record 2                                                    │
//! │ ...                                                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Free space (zeroed, sparse)  ← head                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The chunk header is itself a record: `RecordHeader` logic applies to a
//! chunk exactly as to any user record.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::MmapMut;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::layout::{FieldType, RecordHeader, Region, Scalar, Shape, View, HEADER_SIZE};

/// Length of a UUID in its hyphenated text form
pub const KEY_LEN: usize = 36;

const KEY_OFFSET: usize = HEADER_SIZE;
const HEAD_OFFSET: usize = KEY_OFFSET + KEY_LEN;
const CREATED_OFFSET: usize = HEAD_OFFSET + 8;

/// Size of the chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = CREATED_OFFSET + 8;

/// Version tag stamped into new chunk headers
pub const CHUNK_VERSION: u16 = 1;

/// A memory-mapped chunk file
#[derive(Debug)]
pub struct Chunk {
    path: PathBuf,
    key: Uuid,
    size: usize,
    created: f64,
    mmap: RwLock<MmapMut>,
}

impl Chunk {
    /// Layout of the chunk header as a shape
    pub fn header_shape() -> Result<Shape> {
        Shape::builder("Chunk")
            .field("key", FieldType::Bytes(KEY_LEN))
            .field("head", Scalar::I64)
            .field("created", Scalar::F64)
            .build()
    }

    /// Create a new chunk file of `size` bytes in `dir`
    ///
    /// The file is named by `key` (a fresh time-ordered UUID if `None`) and
    /// must not exist yet. The header is flushed before returning.
    pub fn create(size: usize, dir: &Path, key: Option<Uuid>) -> Result<Self> {
        if size < CHUNK_HEADER_SIZE {
            return Err(StoreError::Definition(format!(
                "chunk must be at least {} bytes, got {}",
                CHUNK_HEADER_SIZE, size
            )));
        }

        let key = key.unwrap_or_else(Uuid::now_v7);
        let path = dir.join(key.to_string());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    StoreError::AlreadyExists(format!("chunk file {}", path.display()))
                }
                _ => StoreError::Io(e),
            })?;

        // Sparse: untouched pages read as zero and cost no disk
        file.set_len(size as u64)?;

        // SAFETY: the file was just created with create_new, so no other
        // handle can be resizing or rewriting it; the mapping lives inside
        // the Chunk and every access goes through the RwLock below.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let created = now_secs();
        let header = RecordHeader {
            used: true,
            version: CHUNK_VERSION,
            flags: 0,
            size: size as i64,
        };
        header.encode(&mut mmap[..HEADER_SIZE])?;
        mmap[KEY_OFFSET..HEAD_OFFSET].copy_from_slice(key.to_string().as_bytes());
        LittleEndian::write_i64(&mut mmap[HEAD_OFFSET..CREATED_OFFSET], CHUNK_HEADER_SIZE as i64);
        LittleEndian::write_f64(&mut mmap[CREATED_OFFSET..CHUNK_HEADER_SIZE], created);
        mmap.flush()?;

        debug!(chunk = %key, size, path = %path.display(), "created chunk");

        Ok(Self {
            path,
            key,
            size,
            created,
            mmap: RwLock::new(mmap),
        })
    }

    /// Map an existing chunk file
    ///
    /// The header is read straight from the mapped bytes and validated
    /// against the file itself.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len() as usize;

        if file_len < CHUNK_HEADER_SIZE {
            return Err(StoreError::Consistency(format!(
                "chunk file {} is {} bytes, smaller than the {}-byte header",
                path.display(),
                file_len,
                CHUNK_HEADER_SIZE
            )));
        }

        // SAFETY: the database holds the directory lock, so no other process
        // of ours resizes chunk files; the mapping lives inside the Chunk and
        // every access goes through the RwLock below.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let header = RecordHeader::decode(&mmap[..HEADER_SIZE])?;
        if !header.used {
            return Err(corrupt(path, "header is not marked used"));
        }
        if header.size != file_len as i64 {
            return Err(corrupt(
                path,
                &format!("stored size {} != file length {}", header.size, file_len),
            ));
        }

        let key_text = std::str::from_utf8(&mmap[KEY_OFFSET..HEAD_OFFSET])
            .map_err(|_| corrupt(path, "key is not UTF-8"))?;
        let key = Uuid::parse_str(key_text)
            .map_err(|_| corrupt(path, &format!("key {:?} is not a UUID", key_text)))?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if file_name != key.to_string() {
            return Err(corrupt(
                path,
                &format!("file name does not match stored key {}", key),
            ));
        }

        let head = LittleEndian::read_i64(&mmap[HEAD_OFFSET..CREATED_OFFSET]);
        if head < CHUNK_HEADER_SIZE as i64 || head > header.size {
            return Err(corrupt(
                path,
                &format!("head {} outside {}..={}", head, CHUNK_HEADER_SIZE, header.size),
            ));
        }

        let created = LittleEndian::read_f64(&mmap[CREATED_OFFSET..CHUNK_HEADER_SIZE]);

        debug!(chunk = %key, size = file_len, head, "mapped chunk");

        Ok(Self {
            path: path.to_path_buf(),
            key,
            size: file_len,
            created,
            mmap: RwLock::new(mmap),
        })
    }

    /// Reserve `need` bytes at the current head
    ///
    /// Returns the offset of the reserved range, or `None` if the chunk
    /// cannot fit it. Head only ever moves forward.
    pub fn reserve(&self, need: usize) -> Option<usize> {
        let mut mmap = self.mmap.write();
        let head = LittleEndian::read_i64(&mmap[HEAD_OFFSET..CREATED_OFFSET]) as usize;
        let next = head.checked_add(need)?;
        if next > self.size {
            return None;
        }
        LittleEndian::write_i64(&mut mmap[HEAD_OFFSET..CREATED_OFFSET], next as i64);
        Some(head)
    }

    /// Synchronously flush every dirty page of the mapping
    pub fn flush(&self) -> Result<()> {
        self.mmap.read().flush()?;
        Ok(())
    }

    /// Flush and release the mapping
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn key(&self) -> Uuid {
        self.key
    }

    /// Total file size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of the next free byte
    pub fn head(&self) -> usize {
        let mmap = self.mmap.read();
        LittleEndian::read_i64(&mmap[HEAD_OFFSET..CREATED_OFFSET]) as usize
    }

    /// Bytes left for allocation
    pub fn remaining(&self) -> usize {
        self.size - self.head()
    }

    /// Creation time, seconds since the Unix epoch
    pub fn created(&self) -> f64 {
        self.created
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generic record header at offset 0
    pub fn header(&self) -> Result<RecordHeader> {
        RecordHeader::decode(&self.mmap.read()[..HEADER_SIZE])
    }

    /// The chunk header as a view, like any other record
    pub fn header_view(self: &Arc<Self>) -> Result<View> {
        let region: Arc<dyn Region> = Arc::clone(self) as Arc<dyn Region>;
        View::new(region, Self::header_shape()?, 0)
    }
}

impl Region for Chunk {
    fn len(&self) -> usize {
        self.size
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let mmap = self.mmap.read();
        buf.copy_from_slice(&mmap[offset..offset + buf.len()]);
    }

    fn write_at(&self, offset: usize, data: &[u8]) {
        let mut mmap = self.mmap.write();
        mmap[offset..offset + data.len()].copy_from_slice(data);
    }

    fn modify_at(&self, offset: usize, len: usize, f: &mut dyn FnMut(&mut [u8])) {
        let mut mmap = self.mmap.write();
        f(&mut mmap[offset..offset + len]);
    }

    fn flush(&self) -> Result<()> {
        Chunk::flush(self)
    }

    fn id(&self) -> Option<Uuid> {
        Some(self.key)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn corrupt(path: &Path, reason: &str) -> StoreError {
    StoreError::Consistency(format!("chunk {}: {}", path.display(), reason))
}
