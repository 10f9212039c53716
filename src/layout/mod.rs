//! Binary Layout Module
//!
//! Runtime-defined record shapes materialized directly over bytes.
//!
//! ## Responsibilities
//! - Compose immutable shape descriptors (fields, offsets, total size)
//! - Pack bit fields into 64-bit words, rejecting uneven packing
//! - Compose arrays, rings and nested records
//! - Bind shapes to byte regions as in-place views
//!
//! ## Record Layout
//! ```text
//! ┌────────────────────────────┬─────────┬────────────┬────────────────┐
//! │ used:1|version:15|flags:48 │ size(8) │ fields ... │ items (arrays) │
//! └────────────────────────────┴─────────┴────────────┴────────────────┘
//! ```
//!
//! This module never touches storage: sizes are computed, never allocated.

mod array;
mod codec;
pub mod header;
mod region;
mod shape;
mod view;

pub use array::{ArrayIter, ArrayView, RingView};
pub use header::{RecordHeader, HEADER_SIZE};
pub use region::{HeapRegion, Region};
pub use shape::{
    Field, FieldType, Scalar, Shape, ShapeBuilder, ShapeKind, ARRAY_HEADER_SIZE,
    ITEM_SIZE_FIELD, RING_HEADER_SIZE, RING_HEAD_FIELD,
};
pub use view::{Cell, View};
