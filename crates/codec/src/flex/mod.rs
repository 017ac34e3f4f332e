//! FlexBuffers: schema-less self-describing encoding
//!
//! Unlike the classic format, FlexBuffers are written front to back. Every
//! value carries a packed type byte (`width | type << 2`) and every
//! container picks the smallest byte width that can hold all of its
//! elements and child offsets.
//!
//! # Wire Layout
//!
//! ```text
//! buffer:  [values...][root value][root packed type:u8][root byte width:u8]
//! vector:  [len][elem 0]...[elem n-1][packed type 0]...[packed type n-1]
//! typed:   [len][elem 0]...[elem n-1]
//! fixed:   [elem 0]...[elem n-1]                (2 to 4 numbers)
//! map:     [keys offset][keys byte width][len][values...][packed types...]
//! string:  [len][utf-8 bytes...][0]
//! key:     [utf-8 bytes...][0]
//! ```
//!
//! Offsets are unsigned and point backward: `target = position - stored`.

mod builder;
mod de;
mod json;
mod reader;
mod ser;

pub use builder::{FlexBuilder, FlexOptions};
pub use de::from_slice;
pub use reader::{Map, Reference, Value, Vector, get_root};
pub use ser::{Compound, to_vec, to_vec_with_options};

use crate::{FlatError, Result};

pub use flatwire_config::DEFAULT_FLEX_CAPACITY;

/// Maps with more stack slots than this are sorted with quicksort
pub(crate) const SELECTION_SORT_LIMIT: usize = 40;

// =============================================================================
// Bit widths
// =============================================================================

/// Width of a stored value, as a power of two bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum BitWidth {
    #[default]
    W8 = 0,
    W16 = 1,
    W32 = 2,
    W64 = 3,
}

impl BitWidth {
    /// Width code from the low two bits of a packed type
    #[inline]
    pub const fn from_code(code: u8) -> Self {
        match code & 0b11 {
            0 => Self::W8,
            1 => Self::W16,
            2 => Self::W32,
            _ => Self::W64,
        }
    }

    /// Width matching a byte count of 1, 2, 4 or 8
    pub fn from_byte_width(byte_width: usize) -> Option<Self> {
        match byte_width {
            1 => Some(Self::W8),
            2 => Some(Self::W16),
            4 => Some(Self::W32),
            8 => Some(Self::W64),
            _ => None,
        }
    }

    /// Number of bytes this width occupies
    #[inline]
    pub const fn byte_width(self) -> usize {
        1 << self as u8
    }
}

/// Smallest width that can hold an unsigned value
#[inline]
pub fn uwidth(value: u64) -> BitWidth {
    if value < 1 << 8 {
        BitWidth::W8
    } else if value < 1 << 16 {
        BitWidth::W16
    } else if value < 1 << 32 {
        BitWidth::W32
    } else {
        BitWidth::W64
    }
}

/// Smallest width that can hold a signed value
#[inline]
pub fn iwidth(value: i64) -> BitWidth {
    let shifted = (value as u64) << 1;
    uwidth(if value >= 0 { shifted } else { !shifted })
}

/// W32 when the value survives a round trip through `f32`, W64 otherwise
#[inline]
pub fn fwidth(value: f64) -> BitWidth {
    if f64::from(value as f32) == value {
        BitWidth::W32
    } else {
        BitWidth::W64
    }
}

/// Bytes needed to align `size` to `byte_width`
#[inline]
pub fn padding_size(size: usize, byte_width: usize) -> usize {
    (!size).wrapping_add(1) & (byte_width - 1)
}

// =============================================================================
// Value types
// =============================================================================

/// Type tag stored in the upper six bits of a packed type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FlexType {
    Null = 0,
    Int = 1,
    UInt = 2,
    Float = 3,
    Key = 4,
    String = 5,
    IndirectInt = 6,
    IndirectUInt = 7,
    IndirectFloat = 8,
    Map = 9,
    Vector = 10,
    VectorInt = 11,
    VectorUInt = 12,
    VectorFloat = 13,
    VectorKey = 14,
    VectorStringDeprecated = 15,
    VectorInt2 = 16,
    VectorUInt2 = 17,
    VectorFloat2 = 18,
    VectorInt3 = 19,
    VectorUInt3 = 20,
    VectorFloat3 = 21,
    VectorInt4 = 22,
    VectorUInt4 = 23,
    VectorFloat4 = 24,
    Blob = 25,
    Bool = 26,
    VectorBool = 36,
}

impl TryFrom<u8> for FlexType {
    type Error = FlatError;

    fn try_from(tag: u8) -> Result<Self> {
        use FlexType::*;
        Ok(match tag {
            0 => Null,
            1 => Int,
            2 => UInt,
            3 => Float,
            4 => Key,
            5 => String,
            6 => IndirectInt,
            7 => IndirectUInt,
            8 => IndirectFloat,
            9 => Map,
            10 => Vector,
            11 => VectorInt,
            12 => VectorUInt,
            13 => VectorFloat,
            14 => VectorKey,
            15 => VectorStringDeprecated,
            16 => VectorInt2,
            17 => VectorUInt2,
            18 => VectorFloat2,
            19 => VectorInt3,
            20 => VectorUInt3,
            21 => VectorFloat3,
            22 => VectorInt4,
            23 => VectorUInt4,
            24 => VectorFloat4,
            25 => Blob,
            26 => Bool,
            36 => VectorBool,
            _ => return Err(FlatError::UnknownType(tag)),
        })
    }
}

impl FlexType {
    /// Stored directly in its parent rather than behind an offset
    #[inline]
    pub fn is_inline(self) -> bool {
        self == Self::Bool || self as u8 <= Self::Float as u8
    }

    /// Int, UInt or Float
    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self, Self::Int | Self::UInt | Self::Float)
    }

    #[inline]
    pub fn is_indirect_number(self) -> bool {
        matches!(self, Self::IndirectInt | Self::IndirectUInt | Self::IndirectFloat)
    }

    /// Element type that may appear in an automatically typed vector
    ///
    /// The deprecated string-typed vector is never produced.
    #[inline]
    pub fn is_typed_vector_element(self) -> bool {
        matches!(self, Self::Int | Self::UInt | Self::Float | Self::Key | Self::Bool)
    }

    /// Variable-length vector whose elements share one type
    #[inline]
    pub fn is_typed_vector(self) -> bool {
        let tag = self as u8;
        (Self::VectorInt as u8..=Self::VectorStringDeprecated as u8).contains(&tag)
            || self == Self::VectorBool
    }

    /// Vector of 2, 3 or 4 numbers with no length prefix
    #[inline]
    pub fn is_fixed_typed_vector(self) -> bool {
        (Self::VectorInt2 as u8..=Self::VectorFloat4 as u8).contains(&(self as u8))
    }

    /// Any vector-like container, maps excluded
    #[inline]
    pub fn is_vector(self) -> bool {
        self == Self::Vector || self.is_typed_vector() || self.is_fixed_typed_vector()
    }

    /// Typed vector tag for elements of `self`; `fixed_len` of 2 to 4
    /// selects the fixed-length form, anything else the variable form
    pub fn to_typed_vector(self, fixed_len: usize) -> Option<Self> {
        if self == Self::Bool {
            return (fixed_len == 0).then_some(Self::VectorBool);
        }
        if !self.is_typed_vector_element() || (fixed_len != 0 && !self.is_number()) {
            return None;
        }
        let base = self as u8 - Self::Int as u8;
        let tag = match fixed_len {
            0 => Self::VectorInt as u8 + base,
            2 => Self::VectorInt2 as u8 + base,
            3 => Self::VectorInt3 as u8 + base,
            4 => Self::VectorInt4 as u8 + base,
            _ => return None,
        };
        Self::try_from(tag).ok()
    }

    /// Element type of a typed or fixed typed vector
    pub fn typed_vector_element(self) -> Option<Self> {
        if self == Self::VectorBool {
            return Some(Self::Bool);
        }
        if self.is_typed_vector() {
            return Self::try_from(self as u8 - Self::VectorInt as u8 + Self::Int as u8).ok();
        }
        if self.is_fixed_typed_vector() {
            let tag = (self as u8 - Self::VectorInt2 as u8) % 3 + Self::Int as u8;
            return Self::try_from(tag).ok();
        }
        None
    }

    /// Element count of a fixed typed vector
    pub fn fixed_typed_vector_len(self) -> Option<usize> {
        self.is_fixed_typed_vector()
            .then(|| usize::from((self as u8 - Self::VectorInt2 as u8) / 3) + 2)
    }

    /// Lower-case name used in error messages and logs
    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Float => "float",
            Self::Key => "key",
            Self::String => "string",
            Self::IndirectInt => "indirect_int",
            Self::IndirectUInt => "indirect_uint",
            Self::IndirectFloat => "indirect_float",
            Self::Map => "map",
            Self::Vector => "vector",
            Self::Blob => "blob",
            Self::Bool => "bool",
            Self::VectorBool => "vector_bool",
            _ if self.is_fixed_typed_vector() => "fixed_typed_vector",
            _ => "typed_vector",
        }
    }
}

/// Pack a width and a type into one byte
#[inline]
pub fn packed_type(width: BitWidth, flex_type: FlexType) -> u8 {
    width as u8 | (flex_type as u8) << 2
}

/// Split a packed type byte
pub fn unpack_type(packed: u8) -> Result<(BitWidth, FlexType)> {
    Ok((BitWidth::from_code(packed), FlexType::try_from(packed >> 2)?))
}

// Test modules - only compiled during testing
#[cfg(test)]
mod builder_test;
#[cfg(test)]
mod serde_test;
