//! Shape descriptors
//!
//! A `Shape` is an immutable description of a fixed-size binary record:
//! an ordered list of fields with pre-computed byte offsets, plus an
//! optional trailing block of homogeneous items (arrays and rings).
//!
//! ## Layout Rules
//! - Every shape starts with the 16-byte record header
//!   (`used:1 | version:15 | flags:48` word, then `size: i64`)
//! - Fields are packed in declaration order with no padding
//! - Consecutive bit fields share 64-bit words, least significant bit first;
//!   a run of bit fields must fill its words exactly
//! - Array items follow the array header (`item_size: i64`)
//! - Ring items follow the ring header (`item_size: i64`, `head: i64`)

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StoreError};

use super::header::{self, HEADER_SIZE};

/// Name of the per-item size field of arrays and rings
pub const ITEM_SIZE_FIELD: &str = "item_size";

/// Name of the logical-zero slot field of rings
pub const RING_HEAD_FIELD: &str = "head";

/// Header size of an array shape (record header + `item_size`)
pub const ARRAY_HEADER_SIZE: usize = HEADER_SIZE + 8;

/// Header size of a ring shape (array header + `head`)
pub const RING_HEADER_SIZE: usize = ARRAY_HEADER_SIZE + 8;

/// Width of the storage unit shared by consecutive bit fields
const WORD_BITS: u32 = 64;

// =============================================================================
// Field Types
// =============================================================================

/// Fixed-width numeric field types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl Scalar {
    /// Width of the scalar in bytes
    pub fn width(self) -> usize {
        match self {
            Scalar::I8 | Scalar::U8 => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::I64 | Scalar::U64 | Scalar::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }
}

/// The type of a single field (or of an array item)
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Fixed-width integer or float
    Scalar(Scalar),

    /// Unsigned bit field of the given width, packed into a 64-bit word
    Bits(u8),

    /// Fixed-length byte string (NUL padded)
    Bytes(usize),

    /// Nested record, array or ring
    Shape(Shape),
}

impl FieldType {
    /// Bytes occupied by a value of this type.
    ///
    /// Bit fields report the width of the word they live in.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Scalar(s) => s.width(),
            FieldType::Bits(_) => (WORD_BITS / 8) as usize,
            FieldType::Bytes(len) => *len,
            FieldType::Shape(shape) => shape.size(),
        }
    }

    /// Whether values of this type begin with a record header
    pub fn has_header(&self) -> bool {
        matches!(self, FieldType::Shape(_))
    }
}

impl From<Scalar> for FieldType {
    fn from(scalar: Scalar) -> Self {
        FieldType::Scalar(scalar)
    }
}

impl From<Shape> for FieldType {
    fn from(shape: Shape) -> Self {
        FieldType::Shape(shape)
    }
}

impl From<&Shape> for FieldType {
    fn from(shape: &Shape) -> Self {
        FieldType::Shape(shape.clone())
    }
}

/// A laid-out field: name, type, and position inside its shape
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    ty: FieldType,
    offset: usize,
    shift: u8,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Byte offset from the start of the shape
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bit position inside the containing word (bit fields only)
    pub fn shift(&self) -> u8 {
        self.shift
    }
}

/// What follows the declared fields of a shape
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    /// Plain record: declared fields only
    Record,

    /// `len` contiguous items addressed by physical index
    Array { len: usize, item: FieldType },

    /// `len` contiguous items addressed relative to the `head` field
    Ring { len: usize, item: FieldType },
}

// =============================================================================
// Shape
// =============================================================================

/// Immutable, cheaply clonable record layout descriptor
#[derive(Clone)]
pub struct Shape {
    inner: Arc<ShapeInner>,
}

#[derive(Debug, PartialEq)]
struct ShapeInner {
    name: String,
    /// Declared (name, type) pairs, kept for copy-on-extend
    declared: Vec<(String, FieldType)>,
    fields: Vec<Field>,
    kind: ShapeKind,
    /// Offset of the first item (== size for plain records)
    items_offset: usize,
    size: usize,
}

impl Shape {
    /// Start a new record shape. The record header is added automatically.
    ///
    /// `used`, `version`, `flags` and `size` are taken by the header;
    /// arrays and rings also reserve `item_size` and `head`.
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            declared: header::header_fields(),
            kind: ShapeKind::Record,
        }
    }

    /// Build a record shape from (name, type) pairs in one call
    pub fn record<N, T, I>(name: impl Into<String>, fields: I) -> Result<Shape>
    where
        N: Into<String>,
        T: Into<FieldType>,
        I: IntoIterator<Item = (N, T)>,
    {
        fields
            .into_iter()
            .fold(Self::builder(name), |b, (n, t)| b.field(n, t))
            .build()
    }

    /// Array of `len` items, addressed by physical index
    pub fn array(len: usize, item: impl Into<FieldType>) -> Result<Shape> {
        let item = item.into();
        let mut declared = header::header_fields();
        declared.push((ITEM_SIZE_FIELD.to_string(), FieldType::Scalar(Scalar::I64)));
        let name = format!("Array<{}; {}>", type_name(&item), len);
        Self::compose(name, declared, ShapeKind::Array { len, item })
    }

    /// Ring of `len` items with a movable logical zero
    pub fn ring(len: usize, item: impl Into<FieldType>) -> Result<Shape> {
        let item = item.into();
        let mut declared = header::header_fields();
        declared.push((ITEM_SIZE_FIELD.to_string(), FieldType::Scalar(Scalar::I64)));
        declared.push((RING_HEAD_FIELD.to_string(), FieldType::Scalar(Scalar::I64)));
        let name = format!("Ring<{}; {}>", type_name(&item), len);
        Self::compose(name, declared, ShapeKind::Ring { len, item })
    }

    /// Start a new shape that carries all of this shape's fields.
    ///
    /// The base descriptor is never modified; arrays and rings keep their
    /// items after the added fields.
    pub fn extend(&self, name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            declared: self.inner.declared.clone(),
            kind: self.inner.kind.clone(),
        }
    }

    /// Lay out declared fields and items, validating bit packing
    fn compose(name: String, declared: Vec<(String, FieldType)>, kind: ShapeKind) -> Result<Shape> {
        let mut fields: Vec<Field> = Vec::with_capacity(declared.len());
        let mut offset = 0usize;
        // (word offset, bits already used) of the open bit-field word
        let mut word: Option<(usize, u32)> = None;

        for (field_name, ty) in &declared {
            if fields.iter().any(|f| &f.name == field_name) {
                return Err(StoreError::Definition(format!(
                    "shape `{}` declares field `{}` twice",
                    name, field_name
                )));
            }

            match ty {
                FieldType::Bits(width) => {
                    let width = u32::from(*width);
                    if width == 0 || width > WORD_BITS {
                        return Err(StoreError::Definition(format!(
                            "bit field `{}` has width {}, expected 1..=64",
                            field_name, width
                        )));
                    }

                    let (start, used) = word.unwrap_or_else(|| {
                        let start = offset;
                        offset += (WORD_BITS / 8) as usize;
                        (start, 0)
                    });

                    if used + width > WORD_BITS {
                        return Err(StoreError::Definition(format!(
                            "bit field `{}` ({} bits) straddles a 64-bit word boundary ({} bits used)",
                            field_name, width, used
                        )));
                    }

                    fields.push(Field {
                        name: field_name.clone(),
                        ty: ty.clone(),
                        offset: start,
                        shift: used as u8,
                    });

                    let used = used + width;
                    word = if used == WORD_BITS { None } else { Some((start, used)) };
                }
                other => {
                    if let Some((_, used)) = word {
                        return Err(bit_packing_error(&name, used));
                    }
                    if let FieldType::Bytes(0) = other {
                        return Err(StoreError::Definition(format!(
                            "byte string field `{}` must be at least one byte",
                            field_name
                        )));
                    }

                    fields.push(Field {
                        name: field_name.clone(),
                        ty: other.clone(),
                        offset,
                        shift: 0,
                    });
                    offset += other.width();
                }
            }
        }

        if let Some((_, used)) = word {
            return Err(bit_packing_error(&name, used));
        }

        let items_offset = offset;
        let size = match &kind {
            ShapeKind::Record => offset,
            ShapeKind::Array { len, item } | ShapeKind::Ring { len, item } => {
                if *len == 0 {
                    return Err(StoreError::Definition(format!(
                        "shape `{}` must hold at least one item",
                        name
                    )));
                }
                match item {
                    FieldType::Bits(_) => {
                        return Err(StoreError::Definition(format!(
                            "shape `{}` cannot hold bit field items",
                            name
                        )))
                    }
                    FieldType::Bytes(0) => {
                        return Err(StoreError::Definition(format!(
                            "shape `{}` cannot hold zero-length byte strings",
                            name
                        )))
                    }
                    _ => {}
                }
                len.checked_mul(item.width())
                    .and_then(|items| items.checked_add(offset))
                    .ok_or_else(|| {
                        StoreError::Definition(format!("shape `{}` size overflows", name))
                    })?
            }
        };

        Ok(Shape {
            inner: Arc::new(ShapeInner {
                name,
                declared,
                fields,
                kind,
                items_offset,
                size,
            }),
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Total size of one instance in bytes
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Bytes before the first item (the whole record for plain shapes)
    pub fn header_size(&self) -> usize {
        self.inner.items_offset
    }

    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.inner.fields.iter().find(|f| f.name == name)
    }

    pub fn kind(&self) -> &ShapeKind {
        &self.inner.kind
    }

    pub fn is_array(&self) -> bool {
        matches!(self.inner.kind, ShapeKind::Array { .. })
    }

    pub fn is_ring(&self) -> bool {
        matches!(self.inner.kind, ShapeKind::Ring { .. })
    }

    /// Item count of an array or ring
    pub fn len(&self) -> Option<usize> {
        match &self.inner.kind {
            ShapeKind::Record => None,
            ShapeKind::Array { len, .. } | ShapeKind::Ring { len, .. } => Some(*len),
        }
    }

    /// Item type of an array or ring
    pub fn item(&self) -> Option<&FieldType> {
        match &self.inner.kind {
            ShapeKind::Record => None,
            ShapeKind::Array { item, .. } | ShapeKind::Ring { item, .. } => Some(item),
        }
    }

    /// Per-item size of an array or ring
    pub fn item_size(&self) -> Option<usize> {
        self.item().map(FieldType::width)
    }
}

impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("name", &self.inner.name)
            .field("size", &self.inner.size)
            .field("fields", &self.inner.fields.len())
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// Builder composing a record shape field by field
#[derive(Debug, Clone)]
pub struct ShapeBuilder {
    name: String,
    declared: Vec<(String, FieldType)>,
    kind: ShapeKind,
}

impl ShapeBuilder {
    /// Append a field
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        self.declared.push((name.into(), ty.into()));
        self
    }

    /// Validate and lay out the shape
    pub fn build(self) -> Result<Shape> {
        Shape::compose(self.name, self.declared, self.kind)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn bit_packing_error(shape: &str, used: u32) -> StoreError {
    StoreError::Definition(format!(
        "bit fields in shape `{}` fill only {} of 64 bits; runs must pack evenly into 64-bit words",
        shape, used
    ))
}

fn type_name(ty: &FieldType) -> String {
    match ty {
        FieldType::Scalar(s) => format!("{:?}", s),
        FieldType::Bits(w) => format!("Bits{}", w),
        FieldType::Bytes(len) => format!("Bytes{}", len),
        FieldType::Shape(shape) => shape.name().to_string(),
    }
}
