//! Error types for chunkstore
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for chunkstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Definition Errors (shapes, chunk sizing)
    // -------------------------------------------------------------------------
    #[error("Definition error: {0}")]
    Definition(String),

    // -------------------------------------------------------------------------
    // Access Errors (field lookup, type mismatch, range)
    // -------------------------------------------------------------------------
    #[error("Access error: {0}")]
    Access(String),

    // -------------------------------------------------------------------------
    // Existence Errors
    // -------------------------------------------------------------------------
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // Consistency Errors (index/chunk desync, corrupt headers)
    // -------------------------------------------------------------------------
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("View is not backed by an open chunk of this database")]
    ForeignView,

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Directory is locked by another database: {0}")]
    Locked(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
