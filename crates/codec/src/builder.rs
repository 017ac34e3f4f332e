//! Back-to-front FlatBuffer construction
//!
//! The builder writes from the end of its buffer toward the front. Every
//! position handed out is an [`Offset`]: the distance from the end of the
//! buffer at the time the data was written. Because the data that is already
//! written never moves relative to the end, offsets survive buffer growth.
//!
//! # Wire Layout
//!
//! ```text
//! [size prefix:u32]? [root offset:u32] [file identifier:4]? ... data ...
//!
//! table:  [vtable soffset:i32][present fields...]
//! vtable: [vtable size:u16][object size:u16][field offset:u16]*
//! vector: [count:u32][elements...]
//! string: [count:u32][utf-8 bytes...][0]
//! ```
//!
//! Vtables are deduplicated: when a table's vtable is byte-identical to one
//! that was already emitted, the new copy is rolled back and the table points
//! at the existing one.

use std::collections::HashMap;

use bytes::Bytes;
use flatwire_config::BuilderConfig;
use tracing::{debug, trace};

use crate::buffer::{ByteBuffer, MAX_BUFFER_SIZE, Scalar};
use crate::{FlatError, Result};

pub use flatwire_config::DEFAULT_BUILDER_CAPACITY;

/// Length of the optional file identifier written by `finish`
pub const FILE_IDENTIFIER_LENGTH: usize = 4;

const SIZE_U16: usize = 2;
const SIZE_U32: usize = 4;

/// Vtable header entries: vtable size and object size
const VTABLE_HEADER_FIELDS: usize = 2;

/// Position of written data, measured from the end of the buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(u32);

impl Offset {
    /// Wrap a raw end-relative offset
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw end-relative value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// What is currently under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Idle,
    Object,
    Vector,
}

/// Classic FlatBuffer builder
///
/// # Example
///
/// ```
/// use flatwire_codec::{Builder, get_root};
///
/// let mut builder = Builder::new();
/// let name = builder.create_string("MyMonster")?;
/// builder.start_object(3)?;
/// builder.add_offset_field(0, name)?;
/// builder.add_field::<i16>(1, 80, 100)?;
/// builder.add_field::<i16>(2, 150, 150)?;
/// let monster = builder.end_object()?;
/// builder.finish(monster, None)?;
///
/// let table = get_root(builder.finished_data()?)?;
/// assert_eq!(table.get_str(0), Some("MyMonster"));
/// assert_eq!(table.get::<i16>(1, 100), 80);
/// assert_eq!(table.get::<i16>(2, 150), 150);
/// # Ok::<(), flatwire_codec::FlatError>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    buf: ByteBuffer,

    /// Index of the first written byte; data lives in `[head, capacity)`
    head: usize,

    /// Largest alignment requested so far
    min_align: usize,

    /// Per-slot end-relative position of the fields of the open object
    vtable: Vec<u32>,

    /// End-relative offsets of every vtable emitted so far
    vtables: Vec<u32>,

    object_start: u32,
    vector_num_elems: usize,
    frame: Frame,
    finished: bool,
    force_defaults: bool,
    shared_strings: HashMap<String, Offset>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Create a builder with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUILDER_CAPACITY)
    }

    /// Create a builder with the given initial capacity in bytes
    ///
    /// The capacity is clamped to `1..=MAX_BUFFER_SIZE`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BUFFER_SIZE);
        Self {
            buf: ByteBuffer::new(capacity),
            head: capacity,
            min_align: 1,
            vtable: Vec::new(),
            vtables: Vec::with_capacity(16),
            object_start: 0,
            vector_num_elems: 0,
            frame: Frame::Idle,
            finished: false,
            force_defaults: false,
            shared_strings: HashMap::new(),
        }
    }

    /// Like `with_capacity`, but rejects capacities above `MAX_BUFFER_SIZE`
    pub fn try_with_capacity(capacity: usize) -> Result<Self> {
        if capacity > MAX_BUFFER_SIZE {
            return Err(FlatError::BufferOverflow {
                requested: capacity,
                max: MAX_BUFFER_SIZE,
            });
        }
        Ok(Self::with_capacity(capacity))
    }

    /// Create a builder from the `[builder]` configuration section
    pub fn from_config(config: &BuilderConfig) -> Self {
        let mut builder = Self::with_capacity(config.initial_capacity);
        builder.force_defaults = config.force_defaults;
        builder
    }

    /// Forget everything written so far but keep the allocation
    pub fn reset(&mut self) {
        self.head = self.buf.capacity();
        self.min_align = 1;
        self.vtable.clear();
        self.vtables.clear();
        self.object_start = 0;
        self.vector_num_elems = 0;
        self.frame = Frame::Idle;
        self.finished = false;
        self.shared_strings.clear();
    }

    /// Write fields even when they equal their default
    pub fn set_force_defaults(&mut self, force_defaults: bool) {
        self.force_defaults = force_defaults;
    }

    #[inline]
    pub fn force_defaults(&self) -> bool {
        self.force_defaults
    }

    /// Current capacity of the backing buffer
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Largest alignment requested so far
    #[inline]
    pub fn min_align(&self) -> usize {
        self.min_align
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of distinct vtables written into the buffer
    #[inline]
    pub fn vtable_count(&self) -> usize {
        self.vtables.len()
    }

    /// Current head as an end-relative offset
    #[inline]
    pub fn offset(&self) -> Offset {
        Offset(self.used())
    }

    #[inline]
    fn used(&self) -> u32 {
        (self.buf.capacity() - self.head) as u32
    }

    // =========================================================================
    // Space management
    // =========================================================================

    /// Align so that a value of `size` bytes written after `additional_bytes`
    /// more bytes lands on a multiple of `size`, growing if needed
    pub fn prep(&mut self, size: usize, additional_bytes: usize) -> Result<()> {
        if size > self.min_align {
            self.min_align = size;
        }
        let pending = self.buf.capacity() - self.head + additional_bytes;
        let align_size = pending.wrapping_neg() & (size.max(1) - 1);
        while self.head < align_size + size + additional_bytes {
            self.grow()?;
        }
        self.pad(align_size)
    }

    fn grow(&mut self) -> Result<()> {
        let old_capacity = self.buf.capacity();
        let new_capacity = old_capacity.saturating_mul(2).max(1);
        self.buf.grow_front(new_capacity)?;
        self.head += new_capacity - old_capacity;
        debug!(old_capacity, new_capacity, "builder buffer grown");
        Ok(())
    }

    fn ensure_room(&mut self, len: usize) -> Result<()> {
        while self.head < len {
            self.grow()?;
        }
        Ok(())
    }

    /// Write `n` zero bytes before the head
    pub fn pad(&mut self, n: usize) -> Result<()> {
        self.ensure_room(n)?;
        self.head -= n;
        self.buf.as_mut_slice()[self.head..self.head + n].fill(0);
        Ok(())
    }

    // =========================================================================
    // Scalars and offsets
    // =========================================================================

    /// Write a scalar directly before the head without aligning
    pub fn place<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.ensure_room(T::SIZE)?;
        self.head -= T::SIZE;
        self.buf.put(self.head, value)
    }

    /// Align for and write a scalar
    pub fn prepend<T: Scalar>(&mut self, value: T) -> Result<()> {
        self.prep(T::SIZE, 0)?;
        self.place(value)
    }

    /// Write a 4-byte reference to already written data
    pub fn prepend_offset(&mut self, offset: Offset) -> Result<()> {
        self.prep(SIZE_U32, 0)?;
        let head = self.used();
        if offset.0 > head {
            return Err(FlatError::ForwardReference {
                offset: offset.0,
                head,
            });
        }
        self.place::<u32>(head - offset.0 + SIZE_U32 as u32)
    }

    fn not_nested(&self, context: &'static str) -> Result<()> {
        if self.frame != Frame::Idle {
            return Err(FlatError::nesting(context));
        }
        Ok(())
    }

    // =========================================================================
    // Vectors and strings
    // =========================================================================

    /// Reserve room for `count` elements of `elem_size` bytes
    ///
    /// Elements are then written in reverse index order with `prepend` or
    /// `prepend_offset`, and the vector is closed with `end_vector`.
    pub fn start_vector(&mut self, elem_size: usize, count: usize, alignment: usize) -> Result<()> {
        self.not_nested("start_vector called while an object or vector is under construction")?;
        let data_len = elem_size.checked_mul(count).ok_or(FlatError::BufferOverflow {
            requested: usize::MAX,
            max: MAX_BUFFER_SIZE,
        })?;
        self.vector_num_elems = count;
        self.prep(SIZE_U32, data_len)?;
        self.prep(alignment, data_len)?;
        self.frame = Frame::Vector;
        Ok(())
    }

    /// Write the element count and close the vector
    pub fn end_vector(&mut self) -> Result<Offset> {
        if self.frame != Frame::Vector {
            return Err(FlatError::nesting("end_vector called without start_vector"));
        }
        self.frame = Frame::Idle;
        self.place::<u32>(self.vector_num_elems as u32)?;
        Ok(self.offset())
    }

    /// Encode a NUL-terminated UTF-8 string
    pub fn create_string(&mut self, s: &str) -> Result<Offset> {
        self.not_nested("create_string called while an object or vector is under construction")?;
        self.prepend::<u8>(0)?;
        self.create_byte_run(s.as_bytes())
    }

    /// Encode a string once and return the same offset for equal strings
    pub fn create_shared_string(&mut self, s: &str) -> Result<Offset> {
        if let Some(&offset) = self.shared_strings.get(s) {
            trace!(len = s.len(), "reused shared string");
            return Ok(offset);
        }
        let offset = self.create_string(s)?;
        self.shared_strings.insert(s.to_owned(), offset);
        Ok(offset)
    }

    /// Encode a `[ubyte]` vector
    pub fn create_byte_vector(&mut self, bytes: &[u8]) -> Result<Offset> {
        self.not_nested("create_byte_vector called while an object or vector is under construction")?;
        self.create_byte_run(bytes)
    }

    fn create_byte_run(&mut self, bytes: &[u8]) -> Result<Offset> {
        self.start_vector(1, bytes.len(), 1)?;
        self.head -= bytes.len();
        self.buf.put_bytes(self.head, bytes)?;
        self.end_vector()
    }

    /// Encode a vector of scalars
    pub fn create_vector<T: Scalar>(&mut self, items: &[T]) -> Result<Offset> {
        self.start_vector(T::SIZE, items.len(), T::SIZE)?;
        for &item in items.iter().rev() {
            self.prepend(item)?;
        }
        self.end_vector()
    }

    /// Encode a vector of references to tables, strings or vectors
    pub fn create_vector_of_offsets(&mut self, offsets: &[Offset]) -> Result<Offset> {
        self.start_vector(SIZE_U32, offsets.len(), SIZE_U32)?;
        for &offset in offsets.iter().rev() {
            self.prepend_offset(offset)?;
        }
        self.end_vector()
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Open a table with `num_fields` vtable slots
    pub fn start_object(&mut self, num_fields: usize) -> Result<()> {
        self.not_nested("start_object called while an object or vector is under construction")?;
        self.vtable.clear();
        self.vtable.resize(num_fields, 0);
        self.object_start = self.used();
        self.frame = Frame::Object;
        Ok(())
    }

    fn check_slot(&self, slot: u16) -> Result<()> {
        if self.frame != Frame::Object {
            return Err(FlatError::nesting("field added outside of an object"));
        }
        if usize::from(slot) >= self.vtable.len() {
            return Err(FlatError::InvalidSlot {
                slot,
                fields: self.vtable.len(),
            });
        }
        Ok(())
    }

    /// Record that the value just written belongs to `slot`
    pub fn slot(&mut self, slot: u16) -> Result<()> {
        self.check_slot(slot)?;
        self.vtable[usize::from(slot)] = self.used();
        Ok(())
    }

    /// Add a scalar field, eliding it when it equals `default`
    pub fn add_field<T: Scalar>(&mut self, slot: u16, value: T, default: T) -> Result<()> {
        if self.force_defaults || value != default {
            self.check_slot(slot)?;
            self.prepend(value)?;
            self.slot(slot)?;
        }
        Ok(())
    }

    /// Add a reference field; a zero offset means "absent"
    pub fn add_offset_field(&mut self, slot: u16, offset: Offset) -> Result<()> {
        if offset.0 != 0 {
            self.check_slot(slot)?;
            self.prepend_offset(offset)?;
            self.slot(slot)?;
        }
        Ok(())
    }

    /// Add a struct that was written immediately before this call
    pub fn add_struct_field(&mut self, slot: u16, offset: Offset) -> Result<()> {
        if offset.0 != 0 {
            let head = self.used();
            if offset.0 != head {
                return Err(FlatError::StructNotInline {
                    offset: offset.0,
                    head,
                });
            }
            self.slot(slot)?;
        }
        Ok(())
    }

    /// Close the open table, writing or reusing its vtable
    pub fn end_object(&mut self) -> Result<Offset> {
        if self.frame != Frame::Object {
            return Err(FlatError::nesting("end_object called without start_object"));
        }

        self.prepend::<i32>(0)?;
        let vtable_loc = self.used();

        for i in (0..self.vtable.len()).rev() {
            let field = self.vtable[i];
            let field_offset = if field != 0 { vtable_loc - field } else { 0 };
            self.prepend::<u16>(field_offset as u16)?;
        }

        let object_size = (vtable_loc - self.object_start) as usize;
        let object_size = u16::try_from(object_size).map_err(|_| FlatError::ObjectTooLarge(object_size))?;
        let vtable_size = (self.vtable.len() + VTABLE_HEADER_FIELDS) * SIZE_U16;
        let vtable_size = u16::try_from(vtable_size).map_err(|_| FlatError::ObjectTooLarge(vtable_size))?;
        self.prepend::<u16>(object_size)?;
        self.prepend::<u16>(vtable_size)?;

        let capacity = self.buf.capacity();
        let existing = self.find_vtable(self.head, usize::from(vtable_size));

        match existing {
            Some(existing) => {
                self.head = capacity - vtable_loc as usize;
                self.buf.put::<i32>(self.head, existing as i32 - vtable_loc as i32)?;
                trace!(vtable = existing, table = vtable_loc, "reused vtable");
            }
            None => {
                let new_vtable = self.used();
                self.vtables.push(new_vtable);
                self.buf.put::<i32>(
                    capacity - vtable_loc as usize,
                    new_vtable as i32 - vtable_loc as i32,
                )?;
            }
        }

        self.frame = Frame::Idle;
        Ok(Offset(vtable_loc))
    }

    /// Most recently emitted vtable with the same bytes as the one at `pos`
    fn find_vtable(&self, pos: usize, len: usize) -> Option<u32> {
        let bytes = self.buf.as_slice();
        let capacity = bytes.len();
        let candidate = bytes.get(pos..pos + len)?;

        self.vtables.iter().rev().copied().find(|&vt| {
            let start = capacity - vt as usize;
            bytes
                .get(start..start + len)
                .is_some_and(|existing| existing == candidate)
        })
    }

    /// Check that `slot` was written in the table at `table`
    pub fn required(&self, table: Offset, slot: u16) -> Result<()> {
        let capacity = self.buf.capacity();
        let table_pos = capacity
            .checked_sub(table.0 as usize)
            .ok_or_else(|| FlatError::invalid_offset("table offset beyond buffer"))?;
        let soffset = self.buf.get::<i32>(table_pos)?;
        let vtable_pos = (table_pos as i64 - i64::from(soffset)) as usize;
        let vtable_size = self.buf.get::<u16>(vtable_pos)? as usize;
        let voffset = crate::table::slot_voffset(slot);

        let present = voffset < vtable_size && self.buf.get::<u16>(vtable_pos + voffset)? != 0;
        if !present {
            return Err(FlatError::MissingRequiredField { slot });
        }
        Ok(())
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    /// Write the root offset (and optional file identifier)
    pub fn finish(&mut self, root: Offset, file_identifier: Option<&str>) -> Result<()> {
        self.finish_with(root, file_identifier, false)
    }

    /// Like `finish`, but prefix the buffer with its own size
    pub fn finish_size_prefixed(&mut self, root: Offset, file_identifier: Option<&str>) -> Result<()> {
        self.finish_with(root, file_identifier, true)
    }

    fn finish_with(&mut self, root: Offset, file_identifier: Option<&str>, size_prefixed: bool) -> Result<()> {
        self.not_nested("finish called while an object or vector is under construction")?;

        let identifier = match file_identifier {
            Some(id) if id.len() != FILE_IDENTIFIER_LENGTH => {
                return Err(FlatError::InvalidIdentifier(id.len()));
            }
            Some(id) => Some(id.as_bytes()),
            None => None,
        };

        let prefix_len = if size_prefixed { SIZE_U32 } else { 0 };
        let identifier_len = identifier.map_or(0, <[u8]>::len);
        self.prep(self.min_align, SIZE_U32 + identifier_len + prefix_len)?;

        if let Some(identifier) = identifier {
            for &b in identifier.iter().rev() {
                self.place::<u8>(b)?;
            }
        }
        self.prepend_offset(root)?;

        if size_prefixed {
            let size = self.used();
            self.prepend::<u32>(size)?;
        }

        self.finished = true;
        debug!(
            size = self.used(),
            min_align = self.min_align,
            vtables = self.vtables.len(),
            "buffer finished"
        );
        Ok(())
    }

    /// The finished buffer
    pub fn finished_data(&self) -> Result<&[u8]> {
        if !self.finished {
            return Err(FlatError::NotFinished);
        }
        Ok(&self.buf.as_slice()[self.head..])
    }

    /// Bytes written so far, whether or not the buffer is finished
    pub fn unfinished_data(&self) -> &[u8] {
        &self.buf.as_slice()[self.head..]
    }

    /// Copy the finished buffer into shareable, immutable storage
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.finished_data().map(Bytes::copy_from_slice)
    }
}
