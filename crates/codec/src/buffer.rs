//! Byte storage and little-endian scalar access
//!
//! `ByteBuffer` is the growable region the classic builder writes into from
//! back to front. Growing doubles the capacity and moves the existing bytes
//! to the tail of the new region, so every offset measured from the end of
//! the buffer stays valid.
//!
//! The free `read_*` helpers are the bounds-checked primitives every reader
//! in this crate is built on.

use crate::{FlatError, Result};

/// Largest buffer the builders will produce (2 GiB)
pub const MAX_BUFFER_SIZE: usize = 1 << 31;

/// A fixed-size value with a little-endian wire representation
///
/// Implemented for every integer and float width plus `bool` (stored as a
/// single byte). `read_le`/`write_le` expect a slice of at least `SIZE`
/// bytes; callers check bounds first.
pub trait Scalar: Copy + PartialEq + Default + std::fmt::Debug {
    /// Encoded size in bytes, which is also the natural alignment
    const SIZE: usize;

    /// Encode into the first `SIZE` bytes of `dst`
    fn write_le(self, dst: &mut [u8]);

    /// Decode from the first `SIZE` bytes of `src`
    fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const SIZE: usize = size_of::<$ty>();

                #[inline]
                fn write_le(self, dst: &mut [u8]) {
                    dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn read_le(src: &[u8]) -> Self {
                    let mut bytes = [0u8; size_of::<$ty>()];
                    bytes.copy_from_slice(&src[..Self::SIZE]);
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Scalar for bool {
    const SIZE: usize = 1;

    #[inline]
    fn write_le(self, dst: &mut [u8]) {
        dst[0] = u8::from(self);
    }

    #[inline]
    fn read_le(src: &[u8]) -> Self {
        src[0] != 0
    }
}

/// Growable byte region with absolute-offset scalar access
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Create a zero-filled buffer of the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
        }
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Whole region, including bytes before the builder's head
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the whole region
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Write a scalar at an absolute offset
    #[inline]
    pub fn put<T: Scalar>(&mut self, offset: usize, value: T) -> Result<()> {
        let capacity = self.data.len();
        let dst = self
            .data
            .get_mut(offset..offset + T::SIZE)
            .ok_or_else(|| FlatError::too_small(offset + T::SIZE, capacity))?;
        value.write_le(dst);
        Ok(())
    }

    /// Read a scalar at an absolute offset
    #[inline]
    pub fn get<T: Scalar>(&self, offset: usize) -> Result<T> {
        read_scalar(&self.data, offset)
    }

    /// Copy raw bytes to an absolute offset
    pub fn put_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let capacity = self.data.len();
        let dst = self
            .data
            .get_mut(offset..offset + bytes.len())
            .ok_or_else(|| FlatError::too_small(offset + bytes.len(), capacity))?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Grow to `new_capacity`, moving the current contents to the tail
    pub fn grow_front(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity > MAX_BUFFER_SIZE {
            return Err(FlatError::BufferOverflow {
                requested: new_capacity,
                max: MAX_BUFFER_SIZE,
            });
        }
        let old_capacity = self.data.len();
        if new_capacity <= old_capacity {
            return Ok(());
        }
        let mut data = vec![0; new_capacity];
        data[new_capacity - old_capacity..].copy_from_slice(&self.data);
        self.data = data;
        Ok(())
    }
}

// =============================================================================
// Bounds-checked little-endian reads
// =============================================================================

/// Read any scalar at `offset`
#[inline]
pub fn read_scalar<T: Scalar>(buf: &[u8], offset: usize) -> Result<T> {
    match buf.get(offset..offset.saturating_add(T::SIZE)) {
        Some(src) if src.len() == T::SIZE => Ok(T::read_le(src)),
        _ => Err(FlatError::too_small(offset.saturating_add(T::SIZE), buf.len())),
    }
}

#[inline]
pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    read_scalar(buf, offset)
}

#[inline]
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    read_scalar(buf, offset)
}

#[inline]
pub fn read_i32(buf: &[u8], offset: usize) -> Result<i32> {
    read_scalar(buf, offset)
}
