//! Array and ring access
//!
//! `ArrayView` addresses items physically: item `i` lives at
//! `offset + header_size + i * item_size`.
//!
//! `RingView` addresses the same items logically: index `i` maps to slot
//! `(head + i) mod len`. `append` writes at `head` and advances it;
//! `prepend` steps `head` back and writes there. Once every slot has been
//! written, `append` overwrites the oldest element.

use std::sync::Arc;

use crate::error::{Result, StoreError};

use super::header;
use super::shape::{FieldType, RING_HEAD_FIELD};
use super::view::{Cell, View};

// =============================================================================
// ArrayView
// =============================================================================

/// Fixed-length sequence of items inside a view
#[derive(Debug, Clone)]
pub struct ArrayView {
    view: View,
    len: usize,
    item: FieldType,
    item_size: usize,
    items_offset: usize,
}

impl ArrayView {
    /// Callers guarantee `view` is an array or ring shape
    pub(crate) fn new(view: View) -> Self {
        let shape = view.shape();
        let len = shape.len().unwrap_or(0);
        let item = shape.item().cloned().unwrap_or(FieldType::Bytes(0));
        let item_size = item.width();
        let items_offset = view.offset() + shape.header_size();
        Self {
            view,
            len,
            item,
            item_size,
            items_offset,
        }
    }

    /// The array record itself
    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn item_type(&self) -> &FieldType {
        &self.item
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Item at physical index `index`
    pub fn get(&self, index: usize) -> Result<Cell> {
        if index >= self.len {
            return Err(StoreError::Access(format!(
                "index {} out of bounds (len={})",
                index, self.len
            )));
        }
        Ok(self.slot(index))
    }

    /// Item at `index` as a view (record items only)
    pub fn item(&self, index: usize) -> Result<View> {
        self.get(index)?.as_view()
    }

    /// Clear the `used` bit of item `index`. Other items are untouched.
    pub fn delete(&self, index: usize) -> Result<()> {
        if !self.item.has_header() {
            return Err(StoreError::Access(format!(
                "items of `{}` carry no record header",
                self.view.shape().name()
            )));
        }
        let cell = self.get(index)?;
        header::set_used(self.view.region().as_ref(), cell.offset(), false)
    }

    /// Items in physical order
    pub fn iter(&self) -> ArrayIter {
        ArrayIter {
            array: self.clone(),
            start: 0,
            front: 0,
            back: self.len,
        }
    }

    fn slot(&self, physical: usize) -> Cell {
        Cell::new(
            Arc::clone(self.view.region()),
            self.items_offset + physical * self.item_size,
            self.item.clone(),
        )
    }
}

/// Iterator over array or ring items.
///
/// Positions `front..back` are logical; the slot visited is
/// `(start + position) mod len`.
#[derive(Debug, Clone)]
pub struct ArrayIter {
    array: ArrayView,
    start: usize,
    front: usize,
    back: usize,
}

impl ArrayIter {
    fn physical(&self, position: usize) -> usize {
        (self.start + position) % self.array.len
    }
}

impl Iterator for ArrayIter {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let cell = self.array.slot(self.physical(self.front));
        self.front += 1;
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for ArrayIter {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.array.slot(self.physical(self.back)))
    }
}

impl ExactSizeIterator for ArrayIter {}

// =============================================================================
// RingView
// =============================================================================

/// Circular sequence with a movable logical zero
#[derive(Debug, Clone)]
pub struct RingView {
    array: ArrayView,
}

impl RingView {
    pub(crate) fn new(array: ArrayView) -> Self {
        Self { array }
    }

    /// The ring record itself
    pub fn view(&self) -> &View {
        self.array.view()
    }

    /// Physical addressing of the same items
    pub fn as_array(&self) -> &ArrayView {
        &self.array
    }

    /// Always the full capacity: every slot holds an element
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Physical slot of logical index 0
    pub fn head(&self) -> Result<usize> {
        let head = self.array.view().get_int(RING_HEAD_FIELD)?;
        Ok(head.rem_euclid(self.len() as i64) as usize)
    }

    fn set_head(&self, head: usize) -> Result<()> {
        self.array.view().set_int(RING_HEAD_FIELD, head as i64)
    }

    /// Item at logical index `index`
    pub fn get(&self, index: usize) -> Result<Cell> {
        let physical = self.physical(index)?;
        self.array.get(physical)
    }

    fn physical(&self, index: usize) -> Result<usize> {
        if index >= self.len() {
            return Err(StoreError::Access(format!(
                "index {} out of bounds (len={})",
                index,
                self.len()
            )));
        }
        Ok((self.head()? + index) % self.len())
    }

    pub fn item(&self, index: usize) -> Result<View> {
        self.get(index)?.as_view()
    }

    /// Clear the `used` bit of the item at logical index `index`
    pub fn delete(&self, index: usize) -> Result<()> {
        let physical = self.physical(index)?;
        self.array.delete(physical)
    }

    /// Slot to write at the current head; head then advances
    pub fn append(&self) -> Result<Cell> {
        let head = self.head()?;
        self.set_head((head + 1) % self.len())?;
        self.array.get(head)
    }

    /// Head steps back one slot; the returned slot is the new logical zero
    pub fn prepend(&self) -> Result<Cell> {
        let head = (self.head()? + self.len() - 1) % self.len();
        self.set_head(head)?;
        self.array.get(head)
    }

    /// Items from logical index 0 upwards
    pub fn iter(&self) -> Result<ArrayIter> {
        Ok(ArrayIter {
            array: self.array.clone(),
            start: self.head()?,
            front: 0,
            back: self.len(),
        })
    }

    /// Items from the last logical index down to 0
    pub fn iter_rev(&self) -> Result<std::iter::Rev<ArrayIter>> {
        Ok(self.iter()?.rev())
    }
}
