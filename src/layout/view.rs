//! Views and cells
//!
//! A `View` binds a `Shape` to a byte range of a `Region`. Nothing is
//! copied out: every accessor reads or writes the region in place.
//!
//! A `Cell` is one typed slot inside a region: a field of a view or an
//! item of an array. Nested shapes turn back into views with `as_view`.
//!
//! ## Usage
//!
//! ```ignore
//! let point = Shape::record("Point", [("x", Scalar::I32), ("y", Scalar::I32)])?;
//! let view = View::new(region, point, 0)?;
//! view.set_int("x", 3)?;
//! assert_eq!(view.get_int("x")?, 3);
//! ```

use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, StoreError};

use super::array::{ArrayView, RingView};
use super::codec;
use super::header::{self, RecordHeader, FLAGS_FIELD, SIZE_FIELD, VERSION_FIELD};
use super::region::Region;
use super::shape::{FieldType, Shape, ShapeKind, ITEM_SIZE_FIELD};

// =============================================================================
// View
// =============================================================================

/// Typed accessor over `shape.size()` bytes of a region
#[derive(Clone)]
pub struct View {
    region: Arc<dyn Region>,
    shape: Shape,
    offset: usize,
}

impl View {
    /// Bind `shape` to `region` at `offset`
    pub fn new(region: Arc<dyn Region>, shape: Shape, offset: usize) -> Result<Self> {
        let end = offset.checked_add(shape.size());
        match end {
            Some(end) if end <= region.len() => Ok(Self {
                region,
                shape,
                offset,
            }),
            _ => Err(StoreError::Access(format!(
                "shape `{}` ({} bytes) at offset {} exceeds region of {} bytes",
                shape.name(),
                shape.size(),
                offset,
                region.len()
            ))),
        }
    }

    pub fn region(&self) -> &Arc<dyn Region> {
        &self.region
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Byte offset of the record inside its region
    pub fn offset(&self) -> usize {
        self.offset
    }

    // =========================================================================
    // Record Header
    // =========================================================================

    pub fn header(&self) -> Result<RecordHeader> {
        RecordHeader::read_from(self.region.as_ref(), self.offset)
    }

    pub fn write_header(&self, header: &RecordHeader) -> Result<()> {
        header.write_to(self.region.as_ref(), self.offset)
    }

    pub fn used(&self) -> bool {
        header::is_used(self.region.as_ref(), self.offset)
    }

    pub fn set_used(&self, used: bool) -> Result<()> {
        header::set_used(self.region.as_ref(), self.offset, used)
    }

    pub fn version(&self) -> Result<u16> {
        Ok(self.get_uint(VERSION_FIELD)? as u16)
    }

    pub fn set_version(&self, version: u16) -> Result<()> {
        self.set_uint(VERSION_FIELD, u64::from(version))
    }

    pub fn flags(&self) -> Result<u64> {
        self.get_uint(FLAGS_FIELD)
    }

    pub fn set_flags(&self, flags: u64) -> Result<()> {
        self.set_uint(FLAGS_FIELD, flags)
    }

    /// Stored record size (zero until the record is initialized)
    pub fn size(&self) -> Result<i64> {
        self.get_int(SIZE_FIELD)
    }

    /// Stamp the stored `size` and `item_size` fields of this record and of
    /// every record nested inside it
    pub fn initialize(&self) -> Result<()> {
        self.set_int(SIZE_FIELD, self.shape.size() as i64)?;
        if let Some(item_size) = self.shape.item_size() {
            self.set_int(ITEM_SIZE_FIELD, item_size as i64)?;
        }

        for field in self.shape.fields() {
            if let FieldType::Shape(nested) = field.ty() {
                View::new(
                    Arc::clone(&self.region),
                    nested.clone(),
                    self.offset + field.offset(),
                )?
                .initialize()?;
            }
        }

        if let Some(FieldType::Shape(_)) = self.shape.item() {
            for cell in self.items()?.iter() {
                cell.as_view()?.initialize()?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Field Access
    // =========================================================================

    /// Cell for the named field
    pub fn field(&self, name: &str) -> Result<Cell> {
        let field = self.shape.field(name).ok_or_else(|| {
            StoreError::Access(format!(
                "shape `{}` has no field `{}`",
                self.shape.name(),
                name
            ))
        })?;

        Ok(Cell {
            region: Arc::clone(&self.region),
            offset: self.offset + field.offset(),
            ty: field.ty().clone(),
            shift: field.shift(),
        })
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.field(name)?.get_int()
    }

    pub fn set_int(&self, name: &str, value: i64) -> Result<()> {
        self.field(name)?.set_int(value)
    }

    pub fn get_uint(&self, name: &str) -> Result<u64> {
        self.field(name)?.get_uint()
    }

    pub fn set_uint(&self, name: &str, value: u64) -> Result<()> {
        self.field(name)?.set_uint(value)
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        self.field(name)?.get_float()
    }

    pub fn set_float(&self, name: &str, value: f64) -> Result<()> {
        self.field(name)?.set_float(value)
    }

    pub fn get_bytes(&self, name: &str) -> Result<Vec<u8>> {
        self.field(name)?.get_bytes()
    }

    pub fn set_bytes(&self, name: &str, value: &[u8]) -> Result<()> {
        self.field(name)?.set_bytes(value)
    }

    pub fn get_str(&self, name: &str) -> Result<String> {
        self.field(name)?.get_str()
    }

    pub fn set_str(&self, name: &str, value: &str) -> Result<()> {
        self.field(name)?.set_bytes(value.as_bytes())
    }

    /// View of a nested record field
    pub fn record(&self, name: &str) -> Result<View> {
        self.field(name)?.as_view()
    }

    /// Array view of a nested array field
    pub fn array(&self, name: &str) -> Result<ArrayView> {
        self.record(name)?.as_array()
    }

    /// Ring view of a nested ring field
    pub fn ring(&self, name: &str) -> Result<RingView> {
        self.record(name)?.as_ring()
    }

    /// Treat this view as an array. Rings are addressed physically.
    pub fn as_array(&self) -> Result<ArrayView> {
        self.items()
    }

    pub fn as_ring(&self) -> Result<RingView> {
        match self.shape.kind() {
            ShapeKind::Ring { .. } => Ok(RingView::new(self.items()?)),
            _ => Err(StoreError::Access(format!(
                "shape `{}` is not a ring",
                self.shape.name()
            ))),
        }
    }

    fn items(&self) -> Result<ArrayView> {
        match self.shape.kind() {
            ShapeKind::Array { .. } | ShapeKind::Ring { .. } => Ok(ArrayView::new(self.clone())),
            ShapeKind::Record => Err(StoreError::Access(format!(
                "shape `{}` is not an array",
                self.shape.name()
            ))),
        }
    }

    /// Copy of the record's bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.shape.size()];
        self.region.read_at(self.offset, &mut buf);
        buf
    }

    /// Flush the backing region
    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("shape", &self.shape.name())
            .field("offset", &self.offset)
            .field("region", &self.region)
            .finish()
    }
}

// =============================================================================
// Cell
// =============================================================================

/// One typed slot inside a region
#[derive(Clone)]
pub struct Cell {
    region: Arc<dyn Region>,
    offset: usize,
    ty: FieldType,
    shift: u8,
}

impl Cell {
    pub(crate) fn new(region: Arc<dyn Region>, offset: usize, ty: FieldType) -> Self {
        Self {
            region,
            offset,
            ty,
            shift: 0,
        }
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Byte offset of the slot inside its region
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Integer value (scalars and bit fields)
    pub fn get_int(&self) -> Result<i64> {
        let value = self.read_integer()?;
        i64::try_from(value).map_err(|_| {
            StoreError::Access(format!("value {} does not fit in i64", value))
        })
    }

    pub fn set_int(&self, value: i64) -> Result<()> {
        self.write_integer(i128::from(value))
    }

    /// Unsigned integer value (scalars and bit fields)
    pub fn get_uint(&self) -> Result<u64> {
        let value = self.read_integer()?;
        u64::try_from(value).map_err(|_| {
            StoreError::Access(format!("value {} does not fit in u64", value))
        })
    }

    pub fn set_uint(&self, value: u64) -> Result<()> {
        self.write_integer(i128::from(value))
    }

    pub fn get_float(&self) -> Result<f64> {
        match &self.ty {
            FieldType::Scalar(s) if s.is_float() => {
                let mut buf = vec![0u8; s.width()];
                self.region.read_at(self.offset, &mut buf);
                Ok(codec::decode_float(&buf, *s))
            }
            other => Err(mismatch(other, "float")),
        }
    }

    pub fn set_float(&self, value: f64) -> Result<()> {
        match &self.ty {
            FieldType::Scalar(s) if s.is_float() => {
                let mut buf = vec![0u8; s.width()];
                codec::encode_float(&mut buf, *s, value);
                self.region.write_at(self.offset, &buf);
                Ok(())
            }
            other => Err(mismatch(other, "float")),
        }
    }

    /// Raw bytes of a byte string field, padding included
    pub fn get_bytes(&self) -> Result<Vec<u8>> {
        match &self.ty {
            FieldType::Bytes(len) => {
                let mut buf = vec![0u8; *len];
                self.region.read_at(self.offset, &mut buf);
                Ok(buf)
            }
            other => Err(mismatch(other, "bytes")),
        }
    }

    /// Store `value`, NUL padding the rest of the field
    pub fn set_bytes(&self, value: &[u8]) -> Result<()> {
        match &self.ty {
            FieldType::Bytes(len) => {
                if value.len() > *len {
                    return Err(StoreError::Access(format!(
                        "{} bytes do not fit in a {}-byte field",
                        value.len(),
                        len
                    )));
                }
                let mut buf = vec![0u8; *len];
                buf[..value.len()].copy_from_slice(value);
                self.region.write_at(self.offset, &buf);
                Ok(())
            }
            other => Err(mismatch(other, "bytes")),
        }
    }

    /// Byte string up to the first NUL, as UTF-8
    pub fn get_str(&self) -> Result<String> {
        let bytes = self.get_bytes()?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec())
            .map_err(|e| StoreError::Access(format!("field is not valid UTF-8: {}", e)))
    }

    pub fn set_str(&self, value: &str) -> Result<()> {
        self.set_bytes(value.as_bytes())
    }

    /// View of a nested shape
    pub fn as_view(&self) -> Result<View> {
        match &self.ty {
            FieldType::Shape(shape) => {
                View::new(Arc::clone(&self.region), shape.clone(), self.offset)
            }
            other => Err(mismatch(other, "shape")),
        }
    }

    fn read_integer(&self) -> Result<i128> {
        match &self.ty {
            FieldType::Scalar(s) if !s.is_float() => {
                let mut buf = [0u8; 8];
                self.region.read_at(self.offset, &mut buf[..s.width()]);
                Ok(codec::decode_integer(&buf, *s))
            }
            FieldType::Bits(width) => {
                let mut buf = [0u8; 8];
                self.region.read_at(self.offset, &mut buf);
                Ok(i128::from(codec::decode_bits(
                    LittleEndian::read_u64(&buf),
                    self.shift,
                    *width,
                )))
            }
            other => Err(mismatch(other, "integer")),
        }
    }

    fn write_integer(&self, value: i128) -> Result<()> {
        match &self.ty {
            FieldType::Scalar(s) if !s.is_float() => {
                let mut buf = [0u8; 8];
                codec::encode_integer(&mut buf[..s.width()], *s, value)?;
                self.region.write_at(self.offset, &buf[..s.width()]);
                Ok(())
            }
            FieldType::Bits(width) => {
                let value = u64::try_from(value).map_err(|_| {
                    StoreError::Access(format!("bit fields cannot hold negative value {}", value))
                })?;
                let (shift, width) = (self.shift, *width);
                let mut result = Ok(());
                self.region.modify_at(self.offset, 8, &mut |buf: &mut [u8]| {
                    match codec::encode_bits(codec::read_word(buf), shift, width, value) {
                        Ok(word) => codec::write_word(buf, word),
                        Err(e) => result = Err(e),
                    }
                });
                result
            }
            other => Err(mismatch(other, "integer")),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("ty", &self.ty)
            .field("offset", &self.offset)
            .finish()
    }
}

fn mismatch(ty: &FieldType, wanted: &str) -> StoreError {
    StoreError::Access(format!("cannot access {:?} as {}", ty, wanted))
}
