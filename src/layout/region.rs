//! Byte regions
//!
//! A `Region` is a fixed-length byte range that views read and write
//! through a shared reference. Chunks are regions backed by a mapped file;
//! `HeapRegion` is a plain in-memory buffer.
//!
//! Offsets handed to a region are bounds-checked when a view is built, so
//! the accessors here panic on out-of-range access rather than returning
//! errors.

use std::fmt;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Result;

/// Storage a view can be bound to
pub trait Region: Send + Sync + fmt::Debug {
    /// Length of the region in bytes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    fn read_at(&self, offset: usize, buf: &mut [u8]);

    /// Copy `data` into the region starting at `offset`
    fn write_at(&self, offset: usize, data: &[u8]);

    /// Read-modify-write `len` bytes at `offset` under one exclusive access
    fn modify_at(&self, offset: usize, len: usize, f: &mut dyn FnMut(&mut [u8]));

    /// Force written bytes to durable storage
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Identity of the backing storage, if it has one
    fn id(&self) -> Option<Uuid> {
        None
    }
}

/// Zero-initialized in-memory region
pub struct HeapRegion {
    bytes: RwLock<Vec<u8>>,
}

impl HeapRegion {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: RwLock::new(vec![0u8; len]),
        }
    }

    /// Copy of the whole buffer
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }
}

impl fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapRegion")
            .field("len", &self.bytes.read().len())
            .finish()
    }
}

impl Region for HeapRegion {
    fn len(&self) -> usize {
        self.bytes.read().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let bytes = self.bytes.read();
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
    }

    fn write_at(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.write();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn modify_at(&self, offset: usize, len: usize, f: &mut dyn FnMut(&mut [u8])) {
        let mut bytes = self.bytes.write();
        f(&mut bytes[offset..offset + len]);
    }
}
