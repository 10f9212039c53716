//! Database Module
//!
//! Coordinates chunks, the index, and the record lifecycle.
//!
//! ## Responsibilities
//! - Create or reopen a database directory
//! - Bump-allocate records in the newest chunk, rolling over when full
//! - Map user keys to record locations through the index
//! - Flush chunks and the index on request or on close
//!
//! ## Record Lifecycle
//! ```text
//! unallocated ──allocate──▶ allocated (used=0) ──put──▶ used ──delete──▶ hole
//! ```
//! Holes are never reused: a deleted record's bytes stay where they are.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunk::{Chunk, CHUNK_HEADER_SIZE};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::index::{Index, Location, LogIndex};
use crate::layout::{header, Region, Shape, View, HEADER_SIZE};
use crate::lock::DirLock;

/// Open chunks in creation order
#[derive(Default)]
struct ChunkSet {
    /// Creation order; the last entry is the newest chunk
    ordered: Vec<Arc<Chunk>>,
    by_key: HashMap<Uuid, Arc<Chunk>>,
    newest: Option<Arc<Chunk>>,
}

impl ChunkSet {
    fn insert(&mut self, chunk: Arc<Chunk>) {
        self.by_key.insert(chunk.key(), Arc::clone(&chunk));
        self.ordered.push(Arc::clone(&chunk));
        self.newest = Some(chunk);
    }
}

/// An open chunkstore database
///
/// ## Concurrency Model: Single Writer
///
/// - The chunk set sits behind an RwLock so allocation (which may add a
///   chunk) can run through `&self` while views keep their chunks alive
/// - Field writes through views are not coordinated; callers serialize
///   writers to the same record
/// - One `Database` per directory, enforced with an advisory lock
pub struct Database {
    /// Database configuration (chunk size resolved)
    config: Config,

    /// Directory holding chunk files
    chunks_dir: PathBuf,

    /// Size of newly created chunks
    chunk_size: usize,

    /// Open chunks
    chunks: RwLock<ChunkSet>,

    /// User key → location
    index: Box<dyn Index>,

    /// Held for the lifetime of the database
    _lock: Option<DirLock>,
}

impl Database {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const INDEX_DIR: &'static str = "index";
    const CHUNK_DIR: &'static str = "chunks";

    /// Create a new database at `path` with the default index
    pub fn create(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path.as_ref())
            .chunk_size(chunk_size)
            .build();
        Self::create_with(config)
    }

    /// Create a new database from a config
    ///
    /// Fails with `AlreadyExists` if an index already exists under
    /// `data_dir/index`.
    pub fn create_with(config: Config) -> Result<Self> {
        let chunk_size = required_chunk_size(&config)?;
        fs::create_dir_all(&config.data_dir)?;
        let lock = Self::lock(&config)?;

        let index_dir = config.data_dir.join(Self::INDEX_DIR);
        if LogIndex::exists(&index_dir) {
            return Err(StoreError::AlreadyExists(format!(
                "index in {}",
                index_dir.display()
            )));
        }

        let index = LogIndex::create(&index_dir, config.index_checkpoint_bytes)?;
        Self::create_inner(config, chunk_size, lock, Box::new(index))
    }

    /// Create a new database over an externally supplied index
    pub fn create_with_index(config: Config, index: Box<dyn Index>) -> Result<Self> {
        let chunk_size = required_chunk_size(&config)?;
        fs::create_dir_all(&config.data_dir)?;
        let lock = Self::lock(&config)?;
        Self::create_inner(config, chunk_size, lock, index)
    }

    fn create_inner(
        config: Config,
        chunk_size: usize,
        lock: Option<DirLock>,
        index: Box<dyn Index>,
    ) -> Result<Self> {
        let chunks_dir = config.data_dir.join(Self::CHUNK_DIR);
        fs::create_dir_all(&chunks_dir)?;
        if fs::read_dir(&chunks_dir)?.next().is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "chunk files in {}",
                chunks_dir.display()
            )));
        }

        let db = Self {
            config,
            chunks_dir,
            chunk_size,
            chunks: RwLock::new(ChunkSet::default()),
            index,
            _lock: lock,
        };
        db.new_chunk(&mut db.chunks.write())?;

        info!(path = %db.path().display(), chunk_size, "created database");
        Ok(db)
    }

    /// Open an existing database at `path`
    ///
    /// Without `chunk_size`, new chunks take the size of the newest chunk
    /// on disk.
    pub fn open(path: impl AsRef<Path>, chunk_size: Option<usize>) -> Result<Self> {
        let mut builder = Config::builder().data_dir(path.as_ref());
        if let Some(size) = chunk_size {
            builder = builder.chunk_size(size);
        }
        Self::open_with(builder.build())
    }

    /// Open an existing database from a config
    pub fn open_with(config: Config) -> Result<Self> {
        if !config.data_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "database directory {}",
                config.data_dir.display()
            )));
        }
        let lock = Self::lock(&config)?;

        let index_dir = config.data_dir.join(Self::INDEX_DIR);
        let index = LogIndex::open(&index_dir, config.index_checkpoint_bytes)?;
        Self::open_inner(config, lock, Box::new(index))
    }

    /// Open an existing database over an externally supplied index
    pub fn open_with_index(config: Config, index: Box<dyn Index>) -> Result<Self> {
        if !config.data_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "database directory {}",
                config.data_dir.display()
            )));
        }
        let lock = Self::lock(&config)?;
        Self::open_inner(config, lock, index)
    }

    fn open_inner(mut config: Config, lock: Option<DirLock>, index: Box<dyn Index>) -> Result<Self> {
        let chunks_dir = config.data_dir.join(Self::CHUNK_DIR);
        if !chunks_dir.is_dir() {
            return Err(StoreError::NotFound(format!(
                "chunk directory {}",
                chunks_dir.display()
            )));
        }

        // Chunk keys are time-ordered UUIDs: name order is creation order
        let mut paths = Vec::new();
        for entry in fs::read_dir(&chunks_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut set = ChunkSet::default();
        for path in &paths {
            set.insert(Arc::new(Chunk::from_file(path)?));
        }

        let chunk_size = match (config.chunk_size, &set.newest) {
            (Some(size), _) => size,
            (None, Some(newest)) => newest.size(),
            (None, None) => {
                return Err(StoreError::Config(
                    "chunk_size must be given when the database has no chunks".into(),
                ))
            }
        };
        validate_chunk_size(chunk_size)?;
        config.chunk_size = Some(chunk_size);

        info!(
            path = %config.data_dir.display(),
            chunks = set.ordered.len(),
            chunk_size,
            "opened database"
        );

        Ok(Self {
            config,
            chunks_dir,
            chunk_size,
            chunks: RwLock::new(set),
            index,
            _lock: lock,
        })
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Reserve space for one `shape` record in the newest chunk
    ///
    /// Rolls over to a new chunk when the newest one cannot fit the record.
    /// The returned view has `used == 0` and its size fields stamped.
    pub fn allocate(&self, shape: &Shape, durable: bool) -> Result<View> {
        let need = shape.size();
        if need > self.chunk_size - CHUNK_HEADER_SIZE {
            return Err(StoreError::Definition(format!(
                "shape `{}` needs {} bytes but a chunk holds at most {}",
                shape.name(),
                need,
                self.chunk_size - CHUNK_HEADER_SIZE
            )));
        }

        let (chunk, offset) = {
            let mut set = self.chunks.write();
            let reserved = set
                .newest
                .as_ref()
                .and_then(|c| c.reserve(need).map(|offset| (Arc::clone(c), offset)));

            match reserved {
                Some(found) => found,
                None => {
                    if let Some(full) = &set.newest {
                        full.flush()?;
                        debug!(chunk = %full.key(), head = full.head(), need, "chunk full, rolling over");
                    }
                    let chunk = self.new_chunk(&mut set)?;
                    let offset = chunk.reserve(need).ok_or_else(|| {
                        StoreError::Definition(format!(
                            "shape `{}` does not fit in a fresh chunk",
                            shape.name()
                        ))
                    })?;
                    (chunk, offset)
                }
            }
        };

        let view = View::new(chunk.clone() as Arc<dyn Region>, shape.clone(), offset)?;
        view.initialize()?;
        if durable {
            chunk.flush()?;
        }
        Ok(view)
    }

    /// Commit `view` under `key`, generating a UUID key when none is given
    ///
    /// Marks the record used and records its location in the index.
    /// Returns the key actually used.
    pub fn put(&self, key: Option<&[u8]>, view: &View, durable: bool) -> Result<Vec<u8>> {
        let chunk = self.owning_chunk(view)?;
        if !allocated(&chunk, view.offset(), view.shape().size()) {
            return Err(StoreError::Access(format!(
                "view of `{}` at offset {} is not allocated space in chunk {}",
                view.shape().name(),
                view.offset(),
                chunk.key()
            )));
        }

        let key = match key {
            Some(k) if !k.is_empty() => k.to_vec(),
            _ => Uuid::now_v7().to_string().into_bytes(),
        };

        view.set_used(true)?;
        // Record bytes reach disk before the index can point at them
        if durable {
            chunk.flush()?;
        }

        let location = Location::new(chunk.key(), view.offset() as u64);
        self.index.put(&key, &location.encode()?, durable)?;
        Ok(key)
    }

    /// Look up `key` and bind `shape` to its record
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get(&self, key: &[u8], shape: &Shape) -> Result<Option<View>> {
        let location = match self.lookup(key)? {
            Some(location) => location,
            None => return Ok(None),
        };

        let chunk = self.resolve(&location)?;
        let offset = location.offset as usize;
        if !allocated(&chunk, offset, shape.size()) {
            return Err(StoreError::Consistency(format!(
                "location {}@{} cannot hold shape `{}` ({} bytes)",
                location.chunk,
                offset,
                shape.name(),
                shape.size()
            )));
        }

        Ok(Some(View::new(chunk as Arc<dyn Region>, shape.clone(), offset)?))
    }

    /// Like `get`, falling back to `default` on a miss
    pub fn get_or(&self, key: &[u8], shape: &Shape, default: View) -> Result<View> {
        Ok(self.get(key, shape)?.unwrap_or(default))
    }

    /// Remove `key` and clear its record's `used` bit
    ///
    /// The record's bytes become a hole; they are never reclaimed.
    /// Returns whether the key existed.
    pub fn delete(&self, key: &[u8], durable: bool) -> Result<bool> {
        let location = match self.lookup(key)? {
            Some(location) => location,
            None => return Ok(false),
        };

        let chunk = self.resolve(&location)?;
        let offset = location.offset as usize;
        if !allocated(&chunk, offset, HEADER_SIZE) {
            return Err(StoreError::Consistency(format!(
                "key points outside chunk {} (offset {})",
                location.chunk, offset
            )));
        }

        self.index.delete(key, durable)?;
        header::set_used(&*chunk, offset, false)?;
        if durable {
            chunk.flush()?;
        }
        Ok(true)
    }

    /// Flush every open chunk and the index
    pub fn flush_all(&self) -> Result<()> {
        for chunk in self.chunks.read().ordered.iter() {
            chunk.flush()?;
        }
        self.index.flush()
    }

    /// Flush everything and release the chunk mappings and the lock
    pub fn close(self) -> Result<()> {
        self.flush_all()?;
        debug!(path = %self.path().display(), "closed database");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The most recently created chunk
    pub fn newest_chunk(&self) -> Option<Arc<Chunk>> {
        self.chunks.read().newest.clone()
    }

    /// Open chunk with the given key
    pub fn chunk(&self, key: &Uuid) -> Option<Arc<Chunk>> {
        self.chunks.read().by_key.get(key).cloned()
    }

    /// All open chunks in creation order
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().ordered.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().ordered.len()
    }

    /// Size of newly created chunks
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn path(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn chunks_dir(&self) -> &Path {
        &self.chunks_dir
    }

    pub fn index(&self) -> &dyn Index {
        self.index.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lock(config: &Config) -> Result<Option<DirLock>> {
        if config.lock_directory {
            DirLock::acquire(&config.data_dir).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Create a chunk and make it the newest (called with the set locked)
    fn new_chunk(&self, set: &mut ChunkSet) -> Result<Arc<Chunk>> {
        let chunk = Arc::new(Chunk::create(self.chunk_size, &self.chunks_dir, None)?);
        info!(chunk = %chunk.key(), size = self.chunk_size, count = set.ordered.len() + 1, "new chunk");
        set.insert(Arc::clone(&chunk));
        Ok(chunk)
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Location>> {
        self.index
            .get(key)?
            .map(|raw| Location::decode(&raw))
            .transpose()
    }

    /// Open chunk for a location; a miss means index and chunks disagree
    fn resolve(&self, location: &Location) -> Result<Arc<Chunk>> {
        self.chunk(&location.chunk).ok_or_else(|| {
            StoreError::Consistency(format!(
                "index points at chunk {} which is not open",
                location.chunk
            ))
        })
    }

    /// The open chunk a view was allocated from
    fn owning_chunk(&self, view: &View) -> Result<Arc<Chunk>> {
        let key = view.region().id().ok_or(StoreError::ForeignView)?;
        let chunk = self.chunk(&key).ok_or(StoreError::ForeignView)?;

        // Same key, same mapping
        let region = Arc::as_ptr(view.region()) as *const u8;
        if region != Arc::as_ptr(&chunk) as *const u8 {
            return Err(StoreError::ForeignView);
        }
        Ok(chunk)
    }
}

/// Whether `len` bytes at `offset` lie between the chunk header and head
fn allocated(chunk: &Chunk, offset: usize, len: usize) -> bool {
    match offset.checked_add(len) {
        Some(end) => offset >= CHUNK_HEADER_SIZE && end <= chunk.head(),
        None => false,
    }
}

/// Chunk size a new database must be given
fn required_chunk_size(config: &Config) -> Result<usize> {
    let chunk_size = config
        .chunk_size
        .ok_or_else(|| StoreError::Config("chunk_size is required to create a database".into()))?;
    validate_chunk_size(chunk_size)?;
    Ok(chunk_size)
}

fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size <= CHUNK_HEADER_SIZE {
        return Err(StoreError::Definition(format!(
            "chunk size {} must exceed the {}-byte chunk header",
            chunk_size, CHUNK_HEADER_SIZE
        )));
    }
    Ok(())
}
