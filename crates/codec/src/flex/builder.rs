//! FlexBuffers builder
//!
//! Values are pushed onto a stack as they are added. Scalars stay on the
//! stack until their container is closed, at which point the container is
//! written with a byte width wide enough for every element and every child
//! offset. Strings, keys, blobs and indirect numbers are written to the
//! buffer immediately and only their position is kept on the stack.

use std::cmp::Ordering;
use std::collections::HashMap;

use bytes::Bytes;
use flatwire_config::FlexConfig;
use tracing::{debug, trace};

use super::{
    BitWidth, DEFAULT_FLEX_CAPACITY, FlexType, SELECTION_SORT_LIMIT, fwidth, iwidth, packed_type,
    padding_size, uwidth,
};
use crate::{FlatError, MAX_BUFFER_SIZE, Result};

/// Builder settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexOptions {
    /// Initial buffer capacity in bytes
    pub initial_capacity: usize,
    /// Write each distinct string once
    pub dedup_strings: bool,
    /// Write each distinct map key once
    pub dedup_keys: bool,
    /// Share the keys vector between maps with identical key sets
    pub dedup_key_vectors: bool,
}

impl Default for FlexOptions {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_FLEX_CAPACITY,
            dedup_strings: true,
            dedup_keys: true,
            dedup_key_vectors: true,
        }
    }
}

impl From<&FlexConfig> for FlexOptions {
    fn from(config: &FlexConfig) -> Self {
        Self {
            initial_capacity: config.initial_capacity,
            dedup_strings: config.dedup_strings,
            dedup_keys: config.dedup_keys,
            dedup_key_vectors: config.dedup_key_vectors,
        }
    }
}

// =============================================================================
// Stack values
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Absolute position of data already in the buffer
    Offset(usize),
}

/// A value waiting to be written into its parent
#[derive(Debug, Clone, Copy, PartialEq)]
struct StackValue {
    payload: Payload,
    flex_type: FlexType,
    /// Own width for inline values, child width for offsets
    width: BitWidth,
}

impl StackValue {
    fn inline(payload: Payload, flex_type: FlexType, width: BitWidth) -> Self {
        Self {
            payload,
            flex_type,
            width,
        }
    }

    fn offset(pos: usize, flex_type: FlexType, width: BitWidth) -> Self {
        Self {
            payload: Payload::Offset(pos),
            flex_type,
            width,
        }
    }

    fn key_position(&self) -> Option<usize> {
        match (self.flex_type, self.payload) {
            (FlexType::Key, Payload::Offset(pos)) => Some(pos),
            _ => None,
        }
    }

    /// Width needed to store this value as element `index` of a container
    /// whose data starts after `buf_size` bytes
    fn elem_width(&self, buf_size: usize, index: usize) -> Result<BitWidth> {
        let Payload::Offset(target) = self.payload else {
            return Ok(self.width);
        };
        for width in [BitWidth::W8, BitWidth::W16, BitWidth::W32, BitWidth::W64] {
            let byte_width = width.byte_width();
            let loc = buf_size + padding_size(buf_size, byte_width) + index * byte_width;
            if uwidth((loc - target) as u64) <= width {
                return Ok(width);
            }
        }
        Err(FlatError::WidthOverflow {
            offset: target,
            byte_width: BitWidth::W64.byte_width(),
        })
    }

    fn stored_width(&self, parent: BitWidth) -> BitWidth {
        if self.flex_type.is_inline() {
            self.width.max(parent)
        } else {
            self.width
        }
    }

    fn stored_packed_type(&self, parent: BitWidth) -> u8 {
        packed_type(self.stored_width(parent), self.flex_type)
    }
}

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Vector,
    Map { presorted: bool },
}

impl FrameKind {
    fn name(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Map { .. } => "map",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    start: usize,
    kind: FrameKind,
}

/// FlexBuffers builder
///
/// # Example
///
/// ```
/// use flatwire_codec::flex::{self, FlexBuilder};
///
/// let mut builder = FlexBuilder::new();
/// builder.start_map()?;
/// builder.add_key("hello")?;
/// builder.add_string("world")?;
/// builder.add_key("int")?;
/// builder.add_int(10)?;
/// builder.end()?;
///
/// let root = flex::get_root(builder.finish()?)?;
/// let map = root.as_map().unwrap();
/// assert_eq!(map.get("hello").and_then(|v| v.as_str()), Some("world"));
/// assert_eq!(map.get("int").and_then(|v| v.as_int()), Some(10));
/// # Ok::<(), flatwire_codec::FlatError>(())
/// ```
#[derive(Debug)]
pub struct FlexBuilder {
    buf: Vec<u8>,
    stack: Vec<StackValue>,
    frames: Vec<Frame>,
    finished: bool,
    options: FlexOptions,

    strings: HashMap<String, StackValue>,
    keys: HashMap<String, StackValue>,
    key_vectors: HashMap<Vec<usize>, StackValue>,
    indirect_ints: HashMap<i64, StackValue>,
    indirect_uints: HashMap<u64, StackValue>,
    indirect_floats: HashMap<u64, StackValue>,
}

impl Default for FlexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlexBuilder {
    /// Create a builder with default options
    pub fn new() -> Self {
        Self::with_options(FlexOptions::default())
    }

    pub fn with_options(options: FlexOptions) -> Self {
        let capacity = if options.initial_capacity > 0 {
            options.initial_capacity.min(MAX_BUFFER_SIZE)
        } else {
            DEFAULT_FLEX_CAPACITY
        };
        Self {
            buf: Vec::with_capacity(capacity),
            stack: Vec::new(),
            frames: Vec::new(),
            finished: false,
            options,
            strings: HashMap::new(),
            keys: HashMap::new(),
            key_vectors: HashMap::new(),
            indirect_ints: HashMap::new(),
            indirect_uints: HashMap::new(),
            indirect_floats: HashMap::new(),
        }
    }

    /// Create a builder from the `[flex]` configuration section
    pub fn from_config(config: &FlexConfig) -> Self {
        Self::with_options(FlexOptions::from(config))
    }

    #[inline]
    pub fn options(&self) -> FlexOptions {
        self.options
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Start over, keeping the buffer allocation
    pub fn reset(&mut self) {
        self.buf.clear();
        self.stack.clear();
        self.frames.clear();
        self.finished = false;
        self.strings.clear();
        self.keys.clear();
        self.key_vectors.clear();
        self.indirect_ints.clear();
        self.indirect_uints.clear();
        self.indirect_floats.clear();
    }

    // =========================================================================
    // Integrity checks
    // =========================================================================

    fn check_value(&self) -> Result<()> {
        if self.finished {
            return Err(FlatError::AlreadyFinished);
        }
        if let Some(frame) = self.frames.last()
            && matches!(frame.kind, FrameKind::Map { .. })
            && (self.stack.len() - frame.start) % 2 == 0
        {
            return Err(FlatError::MissingKey);
        }
        Ok(())
    }

    fn check_key(&self) -> Result<()> {
        if self.finished {
            return Err(FlatError::AlreadyFinished);
        }
        match self.frames.last() {
            Some(frame) if matches!(frame.kind, FrameKind::Map { .. }) => {
                if (self.stack.len() - frame.start) % 2 != 0 {
                    return Err(FlatError::KeyWithoutValue);
                }
                Ok(())
            }
            _ => Err(FlatError::KeyOutsideMap),
        }
    }

    // =========================================================================
    // Raw writes
    // =========================================================================

    /// Pad to `width` and return its byte width
    fn align(&mut self, width: BitWidth) -> usize {
        let byte_width = width.byte_width();
        let padding = padding_size(self.buf.len(), byte_width);
        self.buf.resize(self.buf.len() + padding, 0);
        byte_width
    }

    fn write_uint(&mut self, value: u64, byte_width: usize) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..byte_width]);
    }

    fn write_int(&mut self, value: i64, byte_width: usize) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..byte_width]);
    }

    fn write_float(&mut self, value: f64, byte_width: usize) {
        if byte_width == BitWidth::W64.byte_width() {
            self.buf.extend_from_slice(&value.to_le_bytes());
        } else {
            self.buf.extend_from_slice(&(value as f32).to_le_bytes());
        }
    }

    fn write_offset(&mut self, target: usize, byte_width: usize) -> Result<()> {
        let relative = (self.buf.len() - target) as u64;
        if byte_width < 8 && relative >> (8 * byte_width) != 0 {
            return Err(FlatError::WidthOverflow {
                offset: relative as usize,
                byte_width,
            });
        }
        self.write_uint(relative, byte_width);
        Ok(())
    }

    fn write_stack_value(&mut self, value: StackValue, byte_width: usize) -> Result<()> {
        match value.payload {
            Payload::Null => self.write_uint(0, byte_width),
            Payload::Bool(b) => self.write_uint(u64::from(b), byte_width),
            Payload::Int(i) => self.write_int(i, byte_width),
            Payload::UInt(u) => self.write_uint(u, byte_width),
            Payload::Float(f) => self.write_float(f, byte_width),
            Payload::Offset(target) => return self.write_offset(target, byte_width),
        }
        Ok(())
    }

    /// Length-prefixed byte run; returns the position of the first byte
    fn write_byte_run(&mut self, bytes: &[u8], width: BitWidth, terminate: bool) -> usize {
        let byte_width = self.align(width);
        self.write_uint(bytes.len() as u64, byte_width);
        let pos = self.buf.len();
        self.buf.extend_from_slice(bytes);
        if terminate {
            self.buf.push(0);
        }
        pos
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    pub fn add_null(&mut self) -> Result<()> {
        self.check_value()?;
        self.stack
            .push(StackValue::inline(Payload::Null, FlexType::Null, BitWidth::W8));
        Ok(())
    }

    pub fn add_bool(&mut self, value: bool) -> Result<()> {
        self.check_value()?;
        self.stack
            .push(StackValue::inline(Payload::Bool(value), FlexType::Bool, BitWidth::W8));
        Ok(())
    }

    pub fn add_int(&mut self, value: i64) -> Result<()> {
        self.check_value()?;
        self.stack
            .push(StackValue::inline(Payload::Int(value), FlexType::Int, iwidth(value)));
        Ok(())
    }

    pub fn add_uint(&mut self, value: u64) -> Result<()> {
        self.check_value()?;
        self.stack
            .push(StackValue::inline(Payload::UInt(value), FlexType::UInt, uwidth(value)));
        Ok(())
    }

    pub fn add_float(&mut self, value: f64) -> Result<()> {
        self.check_value()?;
        self.stack
            .push(StackValue::inline(Payload::Float(value), FlexType::Float, fwidth(value)));
        Ok(())
    }

    // =========================================================================
    // Indirect scalars
    // =========================================================================

    /// Store an int out of line; with `dedup` equal values share one copy
    pub fn add_indirect_int(&mut self, value: i64, dedup: bool) -> Result<()> {
        self.check_value()?;
        if dedup && let Some(&cached) = self.indirect_ints.get(&value) {
            self.stack.push(cached);
            return Ok(());
        }
        let width = iwidth(value);
        let byte_width = self.align(width);
        let pos = self.buf.len();
        self.write_int(value, byte_width);
        let stack_value = StackValue::offset(pos, FlexType::IndirectInt, width);
        if dedup {
            self.indirect_ints.insert(value, stack_value);
        }
        self.stack.push(stack_value);
        Ok(())
    }

    pub fn add_indirect_uint(&mut self, value: u64, dedup: bool) -> Result<()> {
        self.check_value()?;
        if dedup && let Some(&cached) = self.indirect_uints.get(&value) {
            self.stack.push(cached);
            return Ok(());
        }
        let width = uwidth(value);
        let byte_width = self.align(width);
        let pos = self.buf.len();
        self.write_uint(value, byte_width);
        let stack_value = StackValue::offset(pos, FlexType::IndirectUInt, width);
        if dedup {
            self.indirect_uints.insert(value, stack_value);
        }
        self.stack.push(stack_value);
        Ok(())
    }

    pub fn add_indirect_float(&mut self, value: f64, dedup: bool) -> Result<()> {
        self.check_value()?;
        if dedup && let Some(&cached) = self.indirect_floats.get(&value.to_bits()) {
            self.stack.push(cached);
            return Ok(());
        }
        let width = fwidth(value);
        let byte_width = self.align(width);
        let pos = self.buf.len();
        self.write_float(value, byte_width);
        let stack_value = StackValue::offset(pos, FlexType::IndirectFloat, width);
        if dedup {
            self.indirect_floats.insert(value.to_bits(), stack_value);
        }
        self.stack.push(stack_value);
        Ok(())
    }

    // =========================================================================
    // Strings, blobs and keys
    // =========================================================================

    pub fn add_string(&mut self, value: &str) -> Result<()> {
        self.check_value()?;
        if self.options.dedup_strings
            && let Some(&cached) = self.strings.get(value)
        {
            self.stack.push(cached);
            return Ok(());
        }
        let width = uwidth(value.len() as u64);
        let pos = self.write_byte_run(value.as_bytes(), width, true);
        let stack_value = StackValue::offset(pos, FlexType::String, width);
        if self.options.dedup_strings {
            self.strings.insert(value.to_owned(), stack_value);
        }
        self.stack.push(stack_value);
        Ok(())
    }

    pub fn add_blob(&mut self, value: &[u8]) -> Result<()> {
        self.check_value()?;
        let width = uwidth(value.len() as u64);
        let pos = self.write_byte_run(value, width, false);
        self.stack
            .push(StackValue::offset(pos, FlexType::Blob, width));
        Ok(())
    }

    /// Add the key for the next map value
    pub fn add_key(&mut self, key: &str) -> Result<()> {
        self.check_key()?;
        if self.options.dedup_keys
            && let Some(&cached) = self.keys.get(key)
        {
            self.stack.push(cached);
            return Ok(());
        }
        let pos = self.buf.len();
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.push(0);
        let stack_value = StackValue::offset(pos, FlexType::Key, BitWidth::W8);
        if self.options.dedup_keys {
            self.keys.insert(key.to_owned(), stack_value);
        }
        self.stack.push(stack_value);
        Ok(())
    }

    // =========================================================================
    // Containers
    // =========================================================================

    pub fn start_vector(&mut self) -> Result<()> {
        self.check_value()?;
        self.frames.push(Frame {
            start: self.stack.len(),
            kind: FrameKind::Vector,
        });
        Ok(())
    }

    /// Start a map whose keys are sorted when it ends
    pub fn start_map(&mut self) -> Result<()> {
        self.push_map(false)
    }

    /// Start a map whose keys the caller adds in sorted order
    pub fn start_map_presorted(&mut self) -> Result<()> {
        self.push_map(true)
    }

    fn push_map(&mut self, presorted: bool) -> Result<()> {
        self.check_value()?;
        self.frames.push(Frame {
            start: self.stack.len(),
            kind: FrameKind::Map { presorted },
        });
        Ok(())
    }

    /// Close the innermost open vector or map
    pub fn end(&mut self) -> Result<()> {
        let frame = self.frames.pop().ok_or(FlatError::NoOpenFrame)?;
        match frame.kind {
            FrameKind::Vector => self.end_vector_frame(frame.start),
            FrameKind::Map { presorted } => self.end_map_frame(frame.start, presorted),
        }
    }

    /// Close the innermost frame, which must be a vector
    pub fn end_vector(&mut self) -> Result<()> {
        self.expect_frame(FrameKind::Vector)?;
        self.end()
    }

    /// Close the innermost frame, which must be a map
    pub fn end_map(&mut self) -> Result<()> {
        self.expect_frame(FrameKind::Map { presorted: false })?;
        self.end()
    }

    fn expect_frame(&self, expected: FrameKind) -> Result<()> {
        let frame = self.frames.last().ok_or(FlatError::NoOpenFrame)?;
        if std::mem::discriminant(&frame.kind) != std::mem::discriminant(&expected) {
            return Err(FlatError::FrameMismatch {
                expected: expected.name(),
                found: frame.kind.name(),
            });
        }
        Ok(())
    }

    fn end_vector_frame(&mut self, start: usize) -> Result<()> {
        let len = self.stack.len() - start;
        let vector = self.create_vector(start, len, 1, None)?;
        self.stack.truncate(start);
        self.stack.push(vector);
        Ok(())
    }

    fn end_map_frame(&mut self, start: usize, presorted: bool) -> Result<()> {
        if (self.stack.len() - start) % 2 != 0 {
            return Err(FlatError::MissingKey);
        }
        if !presorted {
            self.sort_map(start)?;
        }

        let mut key_positions = Vec::with_capacity((self.stack.len() - start) / 2);
        for i in (start..self.stack.len()).step_by(2) {
            key_positions.push(self.stack[i].key_position().ok_or(FlatError::NotAKey(i))?);
        }
        let len = key_positions.len();

        let cached = if self.options.dedup_key_vectors {
            self.key_vectors.get(&key_positions).copied()
        } else {
            None
        };
        let keys = match cached {
            Some(cached) => {
                trace!(len, "reused map keys vector");
                cached
            }
            None => {
                let keys = self.create_vector(start, len, 2, None)?;
                if self.options.dedup_key_vectors {
                    self.key_vectors.insert(key_positions, keys);
                }
                keys
            }
        };

        let map = self.create_vector(start + 1, len, 2, Some(keys))?;
        self.stack.truncate(start);
        self.stack.push(map);
        Ok(())
    }

    /// Write `len` stack values starting at `start`, taking every `step`th
    fn create_vector(
        &mut self,
        start: usize,
        len: usize,
        step: usize,
        keys: Option<StackValue>,
    ) -> Result<StackValue> {
        let mut bit_width = uwidth(len as u64);
        let mut prefix = 1;
        if let Some(keys) = keys {
            bit_width = bit_width.max(keys.elem_width(self.buf.len(), 0)?);
            prefix += 2;
        }

        let mut vector_type = FlexType::Key;
        let mut typed = keys.is_none();
        for (ordinal, i) in (start..self.stack.len()).step_by(step).enumerate() {
            let elem = self.stack[i];
            bit_width = bit_width.max(elem.elem_width(self.buf.len(), ordinal + prefix)?);
            if ordinal == 0 {
                vector_type = elem.flex_type;
                typed &= vector_type.is_typed_vector_element();
            } else if elem.flex_type != vector_type {
                typed = false;
            }
        }

        let byte_width = self.align(bit_width);
        let fixed = typed && vector_type.is_number() && (2..=4).contains(&len);

        if let Some(keys) = keys {
            self.write_stack_value(keys, byte_width)?;
            self.write_uint(keys.width.byte_width() as u64, byte_width);
        }
        if !fixed {
            self.write_uint(len as u64, byte_width);
        }

        let pos = self.buf.len();
        for i in (start..self.stack.len()).step_by(step) {
            let elem = self.stack[i];
            self.write_stack_value(elem, byte_width)?;
        }
        if !typed {
            for i in (start..self.stack.len()).step_by(step) {
                let packed = self.stack[i].stored_packed_type(bit_width);
                self.buf.push(packed);
            }
        }

        let flex_type = if keys.is_some() {
            FlexType::Map
        } else if typed {
            vector_type
                .to_typed_vector(if fixed { len } else { 0 })
                .ok_or(FlatError::UnknownType(vector_type as u8))?
        } else {
            FlexType::Vector
        };
        Ok(StackValue::offset(pos, flex_type, bit_width))
    }

    // =========================================================================
    // Map sorting
    // =========================================================================

    /// Sort the key/value pairs above `start` by key bytes
    fn sort_map(&mut self, start: usize) -> Result<()> {
        let mut entries = Vec::with_capacity((self.stack.len() - start) / 2);
        for i in (start..self.stack.len()).step_by(2) {
            let key = self.stack[i];
            let pos = key.key_position().ok_or(FlatError::NotAKey(i))?;
            entries.push((pos, key, self.stack[i + 1]));
        }

        let buf = self.buf.as_slice();
        let sorted = entries
            .windows(2)
            .all(|pair| compare_keys(buf, pair[0].0, pair[1].0) != Ordering::Greater);
        if sorted {
            return Ok(());
        }

        if self.stack.len() - start > SELECTION_SORT_LIMIT {
            let right = entries.len() as isize - 1;
            quick_sort(buf, &mut entries, 0, right);
        } else {
            selection_sort(buf, &mut entries);
        }

        for (n, (_, key, value)) in entries.into_iter().enumerate() {
            self.stack[start + 2 * n] = key;
            self.stack[start + 2 * n + 1] = value;
        }
        Ok(())
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    /// Write the root value and return the finished buffer
    pub fn finish(&mut self) -> Result<&[u8]> {
        if self.finished {
            return Ok(&self.buf);
        }
        if !self.frames.is_empty() {
            return Err(FlatError::nesting("finish called with an open vector or map"));
        }
        if self.stack.len() != 1 {
            return Err(FlatError::UnbalancedStack(self.stack.len()));
        }

        let root = self.stack[0];
        let byte_width = self.align(root.elem_width(self.buf.len(), 0)?);
        self.write_stack_value(root, byte_width)?;
        self.buf.push(root.stored_packed_type(BitWidth::W8));
        self.buf.push(byte_width as u8);
        self.finished = true;

        debug!(
            size = self.buf.len(),
            root_type = root.flex_type.name(),
            byte_width,
            "flexbuffer finished"
        );
        Ok(&self.buf)
    }

    /// Copy the finished buffer into shareable, immutable storage
    pub fn to_bytes(&self) -> Result<Bytes> {
        if !self.finished {
            return Err(FlatError::NotFinished);
        }
        Ok(Bytes::copy_from_slice(&self.buf))
    }
}

type Entry = (usize, StackValue, StackValue);

/// Compare two NUL-terminated keys byte by byte, terminator included
fn compare_keys(buf: &[u8], a: usize, b: usize) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    key_bytes(buf, a).cmp(key_bytes(buf, b))
}

fn key_bytes(buf: &[u8], pos: usize) -> &[u8] {
    let tail = buf.get(pos..).unwrap_or_default();
    match tail.iter().position(|&b| b == 0) {
        Some(nul) => &tail[..=nul],
        None => tail,
    }
}

fn selection_sort(buf: &[u8], entries: &mut [Entry]) {
    for i in 0..entries.len() {
        let mut min = i;
        for j in i + 1..entries.len() {
            if compare_keys(buf, entries[min].0, entries[j].0) == Ordering::Greater {
                min = j;
            }
        }
        entries.swap(i, min);
    }
}

fn quick_sort(buf: &[u8], entries: &mut [Entry], left: isize, right: isize) {
    if left >= right {
        return;
    }
    let pivot = entries[(left + (right - left) / 2) as usize].0;
    let less = |a: usize, b: usize| compare_keys(buf, a, b) == Ordering::Less;

    let (mut lo, mut hi) = (left, right);
    while lo <= hi {
        while less(entries[lo as usize].0, pivot) {
            lo += 1;
        }
        while less(pivot, entries[hi as usize].0) {
            hi -= 1;
        }
        if lo <= hi {
            entries.swap(lo as usize, hi as usize);
            lo += 1;
            hi -= 1;
        }
    }

    quick_sort(buf, entries, left, hi);
    quick_sort(buf, entries, lo, right);
}
