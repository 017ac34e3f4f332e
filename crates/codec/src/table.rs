//! Classic FlatBuffer table reading
//!
//! Zero-copy views over a finished buffer. Root resolution validates the
//! root offset and the root vtable; after that every accessor is total and
//! falls back to the caller's default (or `None`) when a field is absent or
//! points outside the buffer.
//!
//! # Wire Format
//!
//! ```text
//! [root offset:u32] -> [table]
//!                        [vtable soffset:i32]   vtable = table - soffset
//!                        [field data...]
//!
//! vtable: [vtable size:u16][object size:u16][field offset:u16 per slot]
//! ```
//!
//! Fields are addressed by slot index. Slot `n` lives at vtable byte offset
//! `4 + 2 * n`; see [`slot_voffset`].

use std::marker::PhantomData;

use crate::buffer::{Scalar, read_i32, read_scalar, read_u16, read_u32};
use crate::builder::FILE_IDENTIFIER_LENGTH;
use crate::{FlatError, Result};

/// Bytes taken by the vtable size and object size entries
pub const VTABLE_HEADER_SIZE: usize = 4;

const SIZE_U32: usize = 4;

/// Vtable byte offset of a field slot
#[inline]
pub fn slot_voffset(slot: u16) -> usize {
    VTABLE_HEADER_SIZE + 2 * usize::from(slot)
}

// =============================================================================
// Root resolution
// =============================================================================

/// Resolve the root table of a finished buffer
pub fn get_root(buf: &[u8]) -> Result<Table<'_>> {
    let root = read_u32(buf, 0)? as usize;
    Table::parse(buf, root)
}

/// Resolve the root table after checking the file identifier
pub fn get_root_with_identifier<'a>(buf: &'a [u8], identifier: &str) -> Result<Table<'a>> {
    check_identifier(buf, identifier, false)?;
    get_root(buf)
}

/// Resolve the root table of a buffer written by `finish_size_prefixed`
pub fn get_size_prefixed_root(buf: &[u8]) -> Result<Table<'_>> {
    get_root(size_prefixed_body(buf)?)
}

/// Check whether the buffer carries the given file identifier
pub fn buffer_has_identifier(buf: &[u8], identifier: &str, size_prefixed: bool) -> bool {
    check_identifier(buf, identifier, size_prefixed).is_ok()
}

fn size_prefixed_body(buf: &[u8]) -> Result<&[u8]> {
    let size = read_u32(buf, 0)? as usize;
    let end = SIZE_U32.saturating_add(size);
    buf.get(SIZE_U32..end)
        .ok_or_else(|| FlatError::too_small(end, buf.len()))
}

fn check_identifier(buf: &[u8], identifier: &str, size_prefixed: bool) -> Result<()> {
    let expected = identifier.as_bytes();
    if expected.len() != FILE_IDENTIFIER_LENGTH {
        return Err(FlatError::InvalidIdentifier(expected.len()));
    }

    let start = if size_prefixed { 2 * SIZE_U32 } else { SIZE_U32 };
    let end = start + FILE_IDENTIFIER_LENGTH;
    let found = buf
        .get(start..end)
        .ok_or_else(|| FlatError::too_small(end, buf.len()))?;

    if found != expected {
        return Err(FlatError::identifier_mismatch(expected, found));
    }
    Ok(())
}

// =============================================================================
// Tables
// =============================================================================

/// Zero-copy view of a table
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
    vtable: usize,
    vtable_size: usize,
}

impl<'a> Table<'a> {
    /// Parse the table at `pos`, validating its vtable
    pub fn parse(buf: &'a [u8], pos: usize) -> Result<Self> {
        if pos.saturating_add(SIZE_U32) > buf.len() {
            return Err(FlatError::invalid_offset(format!(
                "table offset {} exceeds buffer length {}",
                pos,
                buf.len()
            )));
        }

        // vtable = table - soffset, whatever the sign
        let soffset = read_i32(buf, pos)?;
        let vtable = pos as i64 - i64::from(soffset);
        if vtable < 0 || vtable as usize + VTABLE_HEADER_SIZE > buf.len() {
            return Err(FlatError::invalid_offset(format!(
                "vtable offset {} out of bounds for table at {}",
                vtable, pos
            )));
        }
        let vtable = vtable as usize;

        let vtable_size = read_u16(buf, vtable)? as usize;
        if vtable_size < VTABLE_HEADER_SIZE || vtable + vtable_size > buf.len() {
            return Err(FlatError::invalid_offset(format!(
                "invalid vtable size {} at offset {}",
                vtable_size, vtable
            )));
        }

        Ok(Self {
            buf,
            pos,
            vtable,
            vtable_size,
        })
    }

    /// Underlying buffer
    #[inline]
    pub fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// Absolute position of the table in the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute position of the table's vtable
    #[inline]
    pub fn vtable_position(&self) -> usize {
        self.vtable
    }

    /// Number of slots the vtable declares
    #[inline]
    pub fn num_slots(&self) -> usize {
        (self.vtable_size - VTABLE_HEADER_SIZE) / 2
    }

    /// Inline size of the table as recorded in its vtable
    pub fn object_size(&self) -> u16 {
        read_u16(self.buf, self.vtable + 2).unwrap_or(0)
    }

    /// Field offset stored at a vtable byte offset, 0 when absent
    pub fn get_offset(&self, vtable_offset: usize) -> u16 {
        if vtable_offset + 2 > self.vtable_size {
            return 0;
        }
        read_u16(self.buf, self.vtable + vtable_offset).unwrap_or(0)
    }

    /// Absolute position of a present field
    fn field(&self, slot: u16) -> Option<usize> {
        match self.get_offset(slot_voffset(slot)) {
            0 => None,
            off => Some(self.pos + usize::from(off)),
        }
    }

    /// Follow the `u32` reference stored in a field
    fn indirect(&self, slot: u16) -> Option<usize> {
        let pos = self.field(slot)?;
        follow_offset(self.buf, pos)
    }

    /// Whether the field was written
    #[inline]
    pub fn has_field(&self, slot: u16) -> bool {
        self.field(slot).is_some()
    }

    /// Scalar field, or `default` when absent
    pub fn get<T: Scalar>(&self, slot: u16, default: T) -> T {
        self.field(slot)
            .and_then(|pos| read_scalar(self.buf, pos).ok())
            .unwrap_or(default)
    }

    /// String field
    pub fn get_str(&self, slot: u16) -> Option<&'a str> {
        read_str(self.buf, self.indirect(slot)?)
    }

    /// Byte vector field
    pub fn get_bytes(&self, slot: u16) -> Option<&'a [u8]> {
        read_byte_run(self.buf, self.indirect(slot)?)
    }

    /// Vector field with typed elements
    pub fn get_vector<T: Follow<'a>>(&self, slot: u16) -> Option<Vector<'a, T>> {
        Vector::parse(self.buf, self.indirect(slot)?)
    }

    /// Absolute position of the first element of a vector field
    pub fn get_vector_start(&self, slot: u16) -> Option<usize> {
        let vector = self.indirect(slot)?;
        read_u32(self.buf, vector).ok()?;
        Some(vector + SIZE_U32)
    }

    /// Element count of a vector field, 0 when absent
    pub fn get_vector_len(&self, slot: u16) -> usize {
        self.indirect(slot)
            .and_then(|vector| read_u32(self.buf, vector).ok())
            .map_or(0, |len| len as usize)
    }

    /// Nested table field
    pub fn get_table(&self, slot: u16) -> Option<Table<'a>> {
        Table::parse(self.buf, self.indirect(slot)?).ok()
    }

    /// Union value field, resolved as a table
    pub fn get_union(&self, slot: u16) -> Option<Table<'a>> {
        self.get_table(slot)
    }

    /// Union read together with its type tag; tag 0 means NONE
    pub fn get_union_value(&self, type_slot: u16, value_slot: u16) -> Option<UnionValue<'a>> {
        let tag = self.get::<u8>(type_slot, 0);
        if tag == 0 {
            return None;
        }
        let table = self.get_union(value_slot)?;
        Some(UnionValue { tag, table })
    }

    /// Inline struct field
    pub fn get_struct(&self, slot: u16) -> Option<Struct<'a>> {
        let pos = self.field(slot)?;
        Some(Struct { buf: self.buf, pos })
    }
}

/// A union value tagged with the member type it holds
#[derive(Debug, Clone, Copy)]
pub struct UnionValue<'a> {
    pub tag: u8,
    pub table: Table<'a>,
}

/// View of a struct stored inline in a table or vector
#[derive(Debug, Clone, Copy)]
pub struct Struct<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Struct<'a> {
    /// Absolute position of the struct in the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Scalar member at a byte offset within the struct
    pub fn get<T: Scalar>(&self, offset: usize) -> T {
        read_scalar(self.buf, self.pos + offset).unwrap_or_default()
    }
}

// =============================================================================
// Vectors
// =============================================================================

/// Element type that can be read out of a vector slot
pub trait Follow<'a>: Sized {
    /// Width of one vector slot
    const SIZE: usize;

    /// Read the element stored at `pos`
    fn follow(buf: &'a [u8], pos: usize) -> Option<Self>;
}

macro_rules! impl_follow_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl<'a> Follow<'a> for $ty {
                const SIZE: usize = <$ty as Scalar>::SIZE;

                #[inline]
                fn follow(buf: &'a [u8], pos: usize) -> Option<Self> {
                    read_scalar(buf, pos).ok()
                }
            }
        )*
    };
}

impl_follow_scalar!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<'a> Follow<'a> for &'a str {
    const SIZE: usize = SIZE_U32;

    fn follow(buf: &'a [u8], pos: usize) -> Option<Self> {
        read_str(buf, follow_offset(buf, pos)?)
    }
}

impl<'a> Follow<'a> for Table<'a> {
    const SIZE: usize = SIZE_U32;

    fn follow(buf: &'a [u8], pos: usize) -> Option<Self> {
        Table::parse(buf, follow_offset(buf, pos)?).ok()
    }
}

/// Zero-copy view of a vector
#[derive(Debug)]
pub struct Vector<'a, T> {
    buf: &'a [u8],
    start: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for Vector<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Vector<'_, T> {}

impl<'a, T: Follow<'a>> Vector<'a, T> {
    /// Parse the vector whose length prefix is at `pos`
    pub fn parse(buf: &'a [u8], pos: usize) -> Option<Self> {
        let len = read_u32(buf, pos).ok()? as usize;
        let start = pos + SIZE_U32;
        if start.checked_add(len.checked_mul(T::SIZE)?)? > buf.len() {
            return None;
        }
        Some(Self {
            buf,
            start,
            len,
            _marker: PhantomData,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element at `index`
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        T::follow(self.buf, self.start + index * T::SIZE)
    }

    /// Iterate over the elements that can be read
    pub fn iter(self) -> impl Iterator<Item = T> {
        (0..self.len).filter_map(move |i| self.get(i))
    }
}

// =============================================================================
// Helpers
// =============================================================================

#[inline]
fn follow_offset(buf: &[u8], pos: usize) -> Option<usize> {
    let rel = read_u32(buf, pos).ok()? as usize;
    pos.checked_add(rel)
}

fn read_byte_run(buf: &[u8], pos: usize) -> Option<&[u8]> {
    let len = read_u32(buf, pos).ok()? as usize;
    let start = pos + SIZE_U32;
    buf.get(start..start.checked_add(len)?)
}

fn read_str(buf: &[u8], pos: usize) -> Option<&str> {
    std::str::from_utf8(read_byte_run(buf, pos)?).ok()
}
