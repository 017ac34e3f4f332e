//! flatwire codec - FlatBuffers and FlexBuffers without code generation
//!
//! This crate provides:
//! - `Builder` - Back-to-front builder for the classic vtable format
//! - `Table` / `Vector` - Zero-copy readers for classic buffers
//! - `flex::FlexBuilder` - Width-inferring builder for schema-less FlexBuffers
//! - `flex::Reference` - Zero-copy FlexBuffers reader with JSON rendering
//! - `flex::to_vec` / `flex::from_slice` - serde integration for FlexBuffers
//!
//! # Design Principles
//!
//! - **Zero-copy reads**: Readers are `Copy` views over `&[u8]`
//! - **Reusable builders**: `reset()` keeps the allocation for the next buffer
//! - **Total accessors**: Once a root resolves, reads never fail; absent or
//!   out-of-range fields yield the caller's default or `None`
//!
//! # Errors
//!
//! Builder misuse and malformed roots are reported through [`FlatError`].

mod buffer;
mod builder;
mod error;
mod table;

pub mod flex;

pub use buffer::{ByteBuffer, MAX_BUFFER_SIZE, Scalar};
pub use builder::{Builder, DEFAULT_BUILDER_CAPACITY, FILE_IDENTIFIER_LENGTH, Offset};
pub use error::FlatError;
pub use table::{
    Follow, Struct, Table, UnionValue, VTABLE_HEADER_SIZE, Vector, buffer_has_identifier,
    get_root, get_root_with_identifier, get_size_prefixed_root, slot_voffset,
};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, FlatError>;
