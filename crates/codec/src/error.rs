//! Codec error types
//!
//! Two kinds of failure exist. Contract violations come from misusing a
//! builder (nesting, unbalanced stacks, forward references) and are
//! reported at the offending call. Malformed input is only reported when a
//! root is resolved; field accessors never fail after that.

use std::fmt::Display;

use thiserror::Error;

/// Errors produced by the builders and by root resolution
#[derive(Debug, Error)]
pub enum FlatError {
    /// Growing the buffer would exceed the 2 GiB limit
    #[error("buffer overflow: requested {requested} bytes exceeds maximum {max}")]
    BufferOverflow { requested: usize, max: usize },

    /// Object, vector or string started while another object or vector is open
    #[error("nesting violation: {0}")]
    Nesting(&'static str),

    /// Offset refers to data that has not been written yet
    #[error("forward reference: offset {offset} is beyond the current head {head}")]
    ForwardReference { offset: u32, head: u32 },

    /// Struct was not written immediately before being added to a table
    #[error("struct at offset {offset} must be serialized inline (head is {head})")]
    StructNotInline { offset: u32, head: u32 },

    /// Field slot is outside of the object's declared field count
    #[error("slot {slot} is out of range for an object with {fields} fields")]
    InvalidSlot { slot: u16, fields: usize },

    /// Object grew past what a 16-bit vtable entry can address
    #[error("object of {0} bytes is too large for a vtable")]
    ObjectTooLarge(usize),

    /// Required table field was not set
    #[error("required field in slot {slot} is missing")]
    MissingRequiredField { slot: u16 },

    /// File identifier is not exactly four bytes
    #[error("file identifier must be 4 bytes, got {0}")]
    InvalidIdentifier(usize),

    /// Buffer was read before `finish` was called
    #[error("buffer is not finished")]
    NotFinished,

    /// Value added to a FlexBuffers builder after `finish`
    #[error("adding values after finish is prohibited")]
    AlreadyFinished,

    /// Map value added without a preceding key
    #[error("adding a value to a map before adding its key is prohibited")]
    MissingKey,

    /// Key added while the previous key still waits for its value
    #[error("adding a key before the previous key has a value is prohibited")]
    KeyWithoutValue,

    /// Key added outside of a map
    #[error("adding a key outside of a map is prohibited")]
    KeyOutsideMap,

    /// `end_vector`/`end_map` does not match the open container
    #[error("container mismatch: expected to end a {expected}, but a {found} is open")]
    FrameMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// `end` called with no open vector or map
    #[error("no open vector or map to end")]
    NoOpenFrame,

    /// Stack must hold exactly one value at finish
    #[error("stack must hold exactly one value at finish, found {0}")]
    UnbalancedStack(usize),

    /// Non-key value found where map keys were expected
    #[error("map entry at stack position {0} is not a key")]
    NotAKey(usize),

    /// Offset does not fit in the chosen byte width
    #[error("offset {offset} does not fit in {byte_width} bytes")]
    WidthOverflow { offset: usize, byte_width: usize },

    /// Buffer is too short to hold what it claims to hold
    #[error("buffer too small: expected at least {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    /// Offset points outside of the buffer or is otherwise invalid
    #[error("invalid offset: {0}")]
    InvalidOffset(String),

    /// File identifier in the buffer does not match the expected one
    #[error("file identifier mismatch: expected {expected:?}, found {found:?}")]
    IdentifierMismatch { expected: String, found: String },

    /// FlexBuffers packed type byte holds an unknown type tag
    #[error("type could not be determined from packed type {0:#04x}")]
    UnknownType(u8),

    /// Value has no FlexBuffers encoding, such as a map key that is not a string
    #[error("serialize error: {0}")]
    Serialize(String),

    /// Decoded value does not fit the requested type
    #[error("deserialize error: {0}")]
    Deserialize(String),
}

impl FlatError {
    /// Create a nesting violation error
    #[inline]
    pub fn nesting(context: &'static str) -> Self {
        Self::Nesting(context)
    }

    /// Create a buffer too small error
    #[inline]
    pub fn too_small(expected: usize, actual: usize) -> Self {
        Self::BufferTooSmall { expected, actual }
    }

    /// Create an invalid offset error
    #[inline]
    pub fn invalid_offset(msg: impl Into<String>) -> Self {
        Self::InvalidOffset(msg.into())
    }

    /// Create an identifier mismatch error
    pub fn identifier_mismatch(expected: &[u8], found: &[u8]) -> Self {
        Self::IdentifierMismatch {
            expected: String::from_utf8_lossy(expected).into_owned(),
            found: String::from_utf8_lossy(found).into_owned(),
        }
    }

    /// Check if this error was caused by misuse of a builder rather than by
    /// the bytes being read
    pub fn is_contract_violation(&self) -> bool {
        !matches!(
            self,
            Self::BufferTooSmall { .. }
                | Self::InvalidOffset(_)
                | Self::IdentifierMismatch { .. }
                | Self::UnknownType(_)
                | Self::Deserialize(_)
        )
    }
}

impl serde::ser::Error for FlatError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Serialize(msg.to_string())
    }
}

impl serde::de::Error for FlatError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Deserialize(msg.to_string())
    }
}
