//! FlexBuffers reader
//!
//! A [`Reference`] is a position plus the packed type that describes it.
//! Resolving the root checks the trailer; every accessor after that
//! returns `None` on a type mismatch or an out-of-range read.

use std::cmp::Ordering;

use super::{BitWidth, FlexType, unpack_type};
use crate::{FlatError, Result};

/// Resolve the root value of a finished FlexBuffer
pub fn get_root(buf: &[u8]) -> Result<Reference<'_>> {
    if buf.len() < 3 {
        return Err(FlatError::too_small(3, buf.len()));
    }
    let byte_width = usize::from(buf[buf.len() - 1]);
    let packed = buf[buf.len() - 2];

    if BitWidth::from_byte_width(byte_width).is_none() {
        return Err(FlatError::invalid_offset(format!(
            "root byte width {} is not 1, 2, 4 or 8",
            byte_width
        )));
    }
    if byte_width + 2 > buf.len() {
        return Err(FlatError::too_small(byte_width + 2, buf.len()));
    }

    let pos = buf.len() - 2 - byte_width;
    Reference::new(buf, pos, byte_width, packed, pos)
}

// =============================================================================
// Raw reads
// =============================================================================

fn read_uint(buf: &[u8], pos: usize, byte_width: usize) -> Option<u64> {
    let src = buf.get(pos..pos.checked_add(byte_width)?)?;
    let mut bytes = [0u8; 8];
    bytes.get_mut(..byte_width)?.copy_from_slice(src);
    Some(u64::from_le_bytes(bytes))
}

fn read_int(buf: &[u8], pos: usize, byte_width: usize) -> Option<i64> {
    let raw = read_uint(buf, pos, byte_width)?;
    let shift = 64 - 8 * byte_width as u32;
    Some(((raw << shift) as i64) >> shift)
}

fn read_float(buf: &[u8], pos: usize, byte_width: usize) -> Option<f64> {
    let src = buf.get(pos..pos.checked_add(byte_width)?)?;
    match byte_width {
        4 => Some(f64::from(f32::from_le_bytes(src.try_into().ok()?))),
        8 => Some(f64::from_le_bytes(src.try_into().ok()?)),
        _ => None,
    }
}

/// Follow the backward offset stored at `pos`
fn indirect(buf: &[u8], pos: usize, byte_width: usize) -> Option<usize> {
    let step = usize::try_from(read_uint(buf, pos, byte_width)?).ok()?;
    pos.checked_sub(step)
}

/// Bytes of the NUL-terminated key at `pos`, terminator excluded
fn cstr(buf: &[u8], pos: usize) -> Option<&[u8]> {
    let tail = buf.get(pos..)?;
    let len = tail.iter().position(|&b| b == 0)?;
    Some(&tail[..len])
}

// =============================================================================
// Values
// =============================================================================

/// Decoded value, dispatched on the stored type tag
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Key(&'a str),
    String(&'a str),
    Blob(&'a [u8]),
    Vector(Vector<'a>),
    Map(Map<'a>),
}

/// A typed position inside a FlexBuffer
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    buf: &'a [u8],
    pos: usize,
    /// Width the parent stores this value (or its offset) with
    parent_width: usize,
    /// Width of the value itself once an offset is followed
    byte_width: usize,
    flex_type: FlexType,
    /// Offsets must resolve below this position, the start of the parent
    limit: usize,
}

impl<'a> Reference<'a> {
    pub(crate) fn new(
        buf: &'a [u8],
        pos: usize,
        parent_width: usize,
        packed: u8,
        limit: usize,
    ) -> Result<Self> {
        let (width, flex_type) = unpack_type(packed)?;
        Ok(Self {
            buf,
            pos,
            parent_width,
            byte_width: width.byte_width(),
            flex_type,
            limit,
        })
    }

    #[inline]
    pub fn flex_type(&self) -> FlexType {
        self.flex_type
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.flex_type == FlexType::Null
    }

    /// Children are always written before their parent, so a target at or
    /// past the parent's start is rejected
    fn target(&self) -> Option<usize> {
        indirect(self.buf, self.pos, self.parent_width).filter(|&target| target < self.limit)
    }

    /// Length stored in front of a string, blob or vector
    fn prefixed_len(&self, start: usize, width: usize) -> Option<usize> {
        let len = read_uint(self.buf, start.checked_sub(width)?, width)?;
        usize::try_from(len).ok()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.flex_type {
            FlexType::Bool => Some(read_uint(self.buf, self.pos, self.parent_width)? != 0),
            _ => None,
        }
    }

    /// Signed value of any integer type that fits in `i64`
    pub fn as_int(&self) -> Option<i64> {
        match self.flex_type {
            FlexType::Int => read_int(self.buf, self.pos, self.parent_width),
            FlexType::IndirectInt => read_int(self.buf, self.target()?, self.byte_width),
            FlexType::UInt | FlexType::IndirectUInt => i64::try_from(self.as_uint()?).ok(),
            _ => None,
        }
    }

    /// Unsigned value of any non-negative integer
    pub fn as_uint(&self) -> Option<u64> {
        match self.flex_type {
            FlexType::UInt => read_uint(self.buf, self.pos, self.parent_width),
            FlexType::IndirectUInt => read_uint(self.buf, self.target()?, self.byte_width),
            FlexType::Int | FlexType::IndirectInt => u64::try_from(self.as_int()?).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.flex_type {
            FlexType::Float => read_float(self.buf, self.pos, self.parent_width),
            FlexType::IndirectFloat => read_float(self.buf, self.target()?, self.byte_width),
            _ => None,
        }
    }

    /// String contents; keys are accepted as well
    pub fn as_str(&self) -> Option<&'a str> {
        match self.flex_type {
            FlexType::String => std::str::from_utf8(self.string_bytes()?).ok(),
            FlexType::Key => self.as_key(),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&'a str> {
        if self.flex_type != FlexType::Key {
            return None;
        }
        std::str::from_utf8(cstr(self.buf, self.target()?)?).ok()
    }

    pub fn as_blob(&self) -> Option<&'a [u8]> {
        if self.flex_type != FlexType::Blob {
            return None;
        }
        self.string_bytes()
    }

    fn string_bytes(&self) -> Option<&'a [u8]> {
        let start = self.target()?;
        let len = self.prefixed_len(start, self.byte_width)?;
        self.buf.get(start..start.checked_add(len)?)
    }

    /// Any vector, typed or not
    pub fn as_vector(&self) -> Option<Vector<'a>> {
        if !self.flex_type.is_vector() {
            return None;
        }
        let data = self.target()?;
        let (len, header) = match self.flex_type.fixed_typed_vector_len() {
            Some(len) => (len, data),
            None => (
                self.prefixed_len(data, self.byte_width)?,
                data - self.byte_width,
            ),
        };
        Some(Vector {
            buf: self.buf,
            data,
            header,
            byte_width: self.byte_width,
            len,
            flex_type: self.flex_type,
        })
    }

    /// Variable-length vector whose elements share one type
    pub fn as_typed_vector(&self) -> Option<Vector<'a>> {
        self.flex_type
            .is_typed_vector()
            .then(|| self.as_vector())
            .flatten()
    }

    /// Vector of 2 to 4 numbers without a length prefix
    pub fn as_fixed_typed_vector(&self) -> Option<Vector<'a>> {
        self.flex_type
            .is_fixed_typed_vector()
            .then(|| self.as_vector())
            .flatten()
    }

    pub fn as_map(&self) -> Option<Map<'a>> {
        if self.flex_type != FlexType::Map {
            return None;
        }
        let data = self.target()?;
        let byte_width = self.byte_width;
        let len = self.prefixed_len(data, byte_width)?;

        let keys_loc = data.checked_sub(3 * byte_width)?;
        let keys_data = indirect(self.buf, keys_loc, byte_width).filter(|&keys| keys < keys_loc)?;
        let keys_width = usize::try_from(read_uint(self.buf, keys_loc + byte_width, byte_width)?).ok()?;
        BitWidth::from_byte_width(keys_width)?;

        Some(Map {
            values: Vector {
                buf: self.buf,
                data,
                header: keys_loc,
                byte_width,
                len,
                flex_type: FlexType::Map,
            },
            keys_data,
            keys_width,
        })
    }

    /// Decode into a tagged value; `None` if the bytes are out of range
    pub fn value(&self) -> Option<Value<'a>> {
        Some(match self.flex_type {
            FlexType::Null => Value::Null,
            FlexType::Bool => Value::Bool(self.as_bool()?),
            FlexType::Int | FlexType::IndirectInt => Value::Int(self.as_int()?),
            FlexType::UInt | FlexType::IndirectUInt => Value::UInt(self.as_uint()?),
            FlexType::Float | FlexType::IndirectFloat => Value::Float(self.as_float()?),
            FlexType::Key => Value::Key(self.as_key()?),
            FlexType::String => Value::String(self.as_str()?),
            FlexType::Blob => Value::Blob(self.as_blob()?),
            FlexType::Map => Value::Map(self.as_map()?),
            _ => Value::Vector(self.as_vector()?),
        })
    }
}

// =============================================================================
// Vectors
// =============================================================================

/// View of a vector, typed vector or the values of a map
#[derive(Debug, Clone, Copy)]
pub struct Vector<'a> {
    buf: &'a [u8],
    data: usize,
    /// First byte of the length prefix (or map header)
    header: usize,
    byte_width: usize,
    len: usize,
    flex_type: FlexType,
}

impl<'a> Vector<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shared element type, `None` for untyped vectors
    pub fn element_type(&self) -> Option<FlexType> {
        self.flex_type.typed_vector_element()
    }

    pub fn get(&self, index: usize) -> Option<Reference<'a>> {
        if index >= self.len {
            return None;
        }
        let pos = self.data + index * self.byte_width;
        match self.element_type() {
            Some(flex_type) => Some(Reference {
                buf: self.buf,
                pos,
                parent_width: self.byte_width,
                byte_width: 1,
                flex_type,
                limit: self.header,
            }),
            None => {
                let packed = *self.buf.get(self.data + self.len * self.byte_width + index)?;
                Reference::new(self.buf, pos, self.byte_width, packed, self.header).ok()
            }
        }
    }

    pub fn iter(self) -> impl Iterator<Item = Reference<'a>> {
        (0..self.len).filter_map(move |i| self.get(i))
    }
}

// =============================================================================
// Maps
// =============================================================================

/// View of a map: a values vector plus a sorted keys vector
#[derive(Debug, Clone, Copy)]
pub struct Map<'a> {
    values: Vector<'a>,
    keys_data: usize,
    keys_width: usize,
}

impl<'a> Map<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.len == 0
    }

    fn key_bytes(&self, index: usize) -> Option<&'a [u8]> {
        let pos = self.keys_data + index * self.keys_width;
        cstr(self.values.buf, indirect(self.values.buf, pos, self.keys_width)?)
    }

    pub fn key_at(&self, index: usize) -> Option<&'a str> {
        if index >= self.len() {
            return None;
        }
        std::str::from_utf8(self.key_bytes(index)?).ok()
    }

    pub fn value_at(&self, index: usize) -> Option<Reference<'a>> {
        self.values.get(index)
    }

    /// Binary search the sorted keys
    pub fn get(&self, key: &str) -> Option<Reference<'a>> {
        let target = key.as_bytes();
        let (mut low, mut high) = (0, self.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match self.key_bytes(mid)?.cmp(target) {
                Ordering::Equal => return self.value_at(mid),
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
            }
        }
        None
    }

    pub fn keys(self) -> impl Iterator<Item = &'a str> {
        (0..self.len()).filter_map(move |i| self.key_at(i))
    }

    pub fn values(self) -> Vector<'a> {
        self.values
    }

    /// Entries in key order
    pub fn iter(self) -> impl Iterator<Item = (&'a str, Reference<'a>)> {
        (0..self.len()).filter_map(move |i| Some((self.key_at(i)?, self.value_at(i)?)))
    }
}
