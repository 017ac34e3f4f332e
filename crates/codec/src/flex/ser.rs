//! serde serialization into FlexBuffers
//!
//! `&mut FlexBuilder` is a `serde::Serializer`, so any `Serialize` type can
//! be written as a standalone buffer with [`to_vec`] or embedded in a
//! document that is otherwise built by hand.
//!
//! | Rust | FlexBuffers |
//! |------|-------------|
//! | `bool`, ints, floats | inline scalars |
//! | `char`, `&str`, `String` | string |
//! | `&[u8]` via `serialize_bytes` | blob |
//! | `()`, unit structs, `None` | null |
//! | sequences, tuples, tuple structs | vector |
//! | maps, structs | map sorted by key |
//! | unit variant | string holding the variant name |
//! | other variants | one-entry map from variant name to content |

use serde::Serialize;
use serde::ser::{self, Impossible};

use super::{FlexBuilder, FlexOptions};
use crate::{FlatError, Result};

/// Serialize a value into a finished FlexBuffer
pub fn to_vec<T: ?Sized + Serialize>(value: &T) -> Result<Vec<u8>> {
    to_vec_with_options(value, FlexOptions::default())
}

/// Serialize with explicit builder settings
pub fn to_vec_with_options<T: ?Sized + Serialize>(
    value: &T,
    options: FlexOptions,
) -> Result<Vec<u8>> {
    let mut builder = FlexBuilder::with_options(options);
    value.serialize(&mut builder)?;
    Ok(builder.finish()?.to_vec())
}

impl FlexBuilder {
    /// Add any `Serialize` value at the current position
    pub fn add_serialize<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    /// Open a map holding one entry keyed by the variant name
    fn start_variant(&mut self, variant: &str) -> Result<()> {
        self.start_map()?;
        self.add_key(variant)
    }
}

impl<'a> ser::Serializer for &'a mut FlexBuilder {
    type Ok = ();
    type Error = FlatError;

    type SerializeSeq = Compound<'a>;
    type SerializeTuple = Compound<'a>;
    type SerializeTupleStruct = Compound<'a>;
    type SerializeTupleVariant = Compound<'a>;
    type SerializeMap = Compound<'a>;
    type SerializeStruct = Compound<'a>;
    type SerializeStructVariant = Compound<'a>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.add_bool(v)
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.add_int(i64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.add_int(i64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.add_int(i64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.add_int(v)
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.add_uint(u64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.add_uint(u64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.add_uint(u64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.add_uint(v)
    }

    fn serialize_f32(self, v: f32) -> Result<()> {
        self.add_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<()> {
        self.add_float(v)
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.add_string(v.encode_utf8(&mut [0; 4]))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.add_string(v)
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.add_blob(v)
    }

    fn serialize_none(self) -> Result<()> {
        self.add_null()
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        self.add_null()
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        self.add_null()
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.add_string(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.start_variant(variant)?;
        value.serialize(&mut *self)?;
        self.end()
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Compound<'a>> {
        self.start_vector()?;
        Ok(Compound::new(self, 1))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Compound<'a>> {
        self.start_vector()?;
        Ok(Compound::new(self, 1))
    }

    fn serialize_tuple_struct(self, _name: &'static str, _len: usize) -> Result<Compound<'a>> {
        self.start_vector()?;
        Ok(Compound::new(self, 1))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>> {
        self.start_variant(variant)?;
        self.start_vector()?;
        Ok(Compound::new(self, 2))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Compound<'a>> {
        self.start_map()?;
        Ok(Compound::new(self, 1))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Compound<'a>> {
        self.start_map()?;
        Ok(Compound::new(self, 1))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>> {
        self.start_variant(variant)?;
        self.start_map()?;
        Ok(Compound::new(self, 2))
    }
}

// =============================================================================
// Containers
// =============================================================================

/// An open vector or map; variants also close their wrapping map
pub struct Compound<'a> {
    builder: &'a mut FlexBuilder,
    frames: usize,
}

impl<'a> Compound<'a> {
    fn new(builder: &'a mut FlexBuilder, frames: usize) -> Self {
        Self { builder, frames }
    }

    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut *self.builder)
    }

    fn field<T: ?Sized + Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.builder.add_key(key)?;
        value.serialize(&mut *self.builder)
    }

    fn close(self) -> Result<()> {
        for _ in 0..self.frames {
            self.builder.end()?;
        }
        Ok(())
    }
}

impl ser::SerializeSeq for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTuple for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleStruct for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeTupleVariant for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeMap for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<()> {
        key.serialize(KeySerializer {
            builder: &mut *self.builder,
        })
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        self.element(value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStruct for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

impl ser::SerializeStructVariant for Compound<'_> {
    type Ok = ();
    type Error = FlatError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.field(key, value)
    }

    fn end(self) -> Result<()> {
        self.close()
    }
}

// =============================================================================
// Map keys
// =============================================================================

/// Writes map keys; only string-like values are accepted
struct KeySerializer<'a> {
    builder: &'a mut FlexBuilder,
}

fn key_error(found: &str) -> FlatError {
    FlatError::Serialize(format!("map key must be a string, found {}", found))
}

impl ser::Serializer for KeySerializer<'_> {
    type Ok = ();
    type Error = FlatError;

    type SerializeSeq = Impossible<(), FlatError>;
    type SerializeTuple = Impossible<(), FlatError>;
    type SerializeTupleStruct = Impossible<(), FlatError>;
    type SerializeTupleVariant = Impossible<(), FlatError>;
    type SerializeMap = Impossible<(), FlatError>;
    type SerializeStruct = Impossible<(), FlatError>;
    type SerializeStructVariant = Impossible<(), FlatError>;

    fn serialize_str(self, v: &str) -> Result<()> {
        self.builder.add_key(v)
    }

    fn serialize_char(self, v: char) -> Result<()> {
        self.builder.add_key(v.encode_utf8(&mut [0; 4]))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<()> {
        self.builder.add_key(variant)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_bool(self, _v: bool) -> Result<()> {
        Err(key_error("bool"))
    }

    fn serialize_i8(self, _v: i8) -> Result<()> {
        Err(key_error("int"))
    }

    fn serialize_i16(self, _v: i16) -> Result<()> {
        Err(key_error("int"))
    }

    fn serialize_i32(self, _v: i32) -> Result<()> {
        Err(key_error("int"))
    }

    fn serialize_i64(self, _v: i64) -> Result<()> {
        Err(key_error("int"))
    }

    fn serialize_u8(self, _v: u8) -> Result<()> {
        Err(key_error("uint"))
    }

    fn serialize_u16(self, _v: u16) -> Result<()> {
        Err(key_error("uint"))
    }

    fn serialize_u32(self, _v: u32) -> Result<()> {
        Err(key_error("uint"))
    }

    fn serialize_u64(self, _v: u64) -> Result<()> {
        Err(key_error("uint"))
    }

    fn serialize_f32(self, _v: f32) -> Result<()> {
        Err(key_error("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<()> {
        Err(key_error("float"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<()> {
        Err(key_error("blob"))
    }

    fn serialize_none(self) -> Result<()> {
        Err(key_error("null"))
    }

    fn serialize_some<T: ?Sized + Serialize>(self, _value: &T) -> Result<()> {
        Err(key_error("option"))
    }

    fn serialize_unit(self) -> Result<()> {
        Err(key_error("null"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Err(key_error("null"))
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()> {
        Err(key_error("enum variant"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(key_error("vector"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(key_error("vector"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(key_error("vector"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(key_error("enum variant"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(key_error("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(key_error("map"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(key_error("enum variant"))
    }
}
