//! # chunkstore
//!
//! An embedded record store built from three layers:
//! - A binary layout engine: shapes describe fixed-size records, views read
//!   and write their fields in place
//! - Memory-mapped chunk files used as bump-pointer arenas
//! - A database that allocates records, commits them under keys, and
//!   looks them up through an ordered index
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                              │
//! │        allocate / put / get / delete / flush_all             │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!                 ▼                             ▼
//!   ┌───────────────────────────┐     ┌───────────────────┐
//!   │          Chunks           │     │      Index        │
//!   │  (mmap, bump allocation)  │     │ (WAL + snapshot)  │
//!   └─────────────┬─────────────┘     └───────────────────┘
//!                 │
//!                 ▼
//!   ┌───────────────────────────┐
//!   │      Layout Engine        │
//!   │ Shape → View / Array/Ring │
//!   └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use chunkstore::{Database, Scalar, Shape};
//!
//! # fn main() -> chunkstore::Result<()> {
//! let point = Shape::record("Point", [("x", Scalar::F64), ("y", Scalar::F64)])?;
//!
//! let db = Database::create("./points", 1024 * 1024)?;
//! let view = db.allocate(&point, false)?;
//! view.set_float("x", 1.5)?;
//! view.set_float("y", -2.0)?;
//! let key = db.put(Some(b"origin".as_slice()), &view, true)?;
//!
//! let found = db.get(&key, &point)?.expect("just written");
//! assert_eq!(found.get_float("x")?, 1.5);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod layout;
pub mod chunk;
pub mod index;
pub mod lock;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::Config;
pub use layout::{ArrayView, Cell, FieldType, RingView, Scalar, Shape, View};
pub use chunk::Chunk;
pub use index::{Index, Location, LogIndex};
pub use database::Database;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of chunkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
