//! Write-Ahead Log (WAL)
//!
//! Durability for the index through append-only logging.
//!
//! ## Responsibilities
//! - Append log entries before the in-memory table changes
//! - CRC32 checksums for corruption detection
//! - Log Sequence Numbers (LSN) for ordering
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Entry 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Entry 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ LSN (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```

mod entry;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
