//! serde deserialization from FlexBuffers
//!
//! [`Reference`] is a `serde::Deserializer` that borrows strings and blobs
//! straight out of the buffer. The layout mirrors what the serializer
//! writes: enums are either a variant name or a one-entry map.

use serde::Deserialize;
use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeSeed, Visitor};

use super::{FlexType, Map, Reference, Value, Vector, get_root};
use crate::{FlatError, Result};

/// Deserialize a value from a finished FlexBuffer
pub fn from_slice<'de, T: Deserialize<'de>>(buf: &'de [u8]) -> Result<T> {
    T::deserialize(get_root(buf)?)
}

impl<'de> Reference<'de> {
    fn decode(&self) -> Result<Value<'de>> {
        self.value().ok_or_else(|| {
            FlatError::Deserialize(format!("{} value is out of range", self.flex_type().name()))
        })
    }

    fn unexpected(&self, expected: &str) -> FlatError {
        FlatError::Deserialize(format!(
            "expected {}, found {}",
            expected,
            self.flex_type().name()
        ))
    }
}

impl<'de> de::Deserializer<'de> for Reference<'de> {
    type Error = FlatError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.decode()? {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::Int(i) => visitor.visit_i64(i),
            Value::UInt(u) => visitor.visit_u64(u),
            Value::Float(f) => visitor.visit_f64(f),
            Value::Key(s) | Value::String(s) => visitor.visit_borrowed_str(s),
            Value::Blob(bytes) => visitor.visit_borrowed_bytes(bytes),
            Value::Vector(vector) => visitor.visit_seq(SeqReader::new(vector)),
            Value::Map(map) => visitor.visit_map(MapReader::new(map)),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.flex_type() {
            FlexType::String | FlexType::Key => {
                let variant = self.as_str().ok_or_else(|| self.unexpected("variant name"))?;
                visitor.visit_enum(EnumReader {
                    variant,
                    content: None,
                })
            }
            FlexType::Map => {
                let map = self.as_map().ok_or_else(|| self.unexpected("map"))?;
                if map.len() != 1 {
                    return Err(FlatError::Deserialize(format!(
                        "enum map must hold exactly one entry, found {}",
                        map.len()
                    )));
                }
                let (variant, content) = map
                    .iter()
                    .next()
                    .ok_or_else(|| self.unexpected("enum entry"))?;
                visitor.visit_enum(EnumReader {
                    variant,
                    content: Some(content),
                })
            }
            _ => Err(self.unexpected("enum")),
        }
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

// =============================================================================
// Containers
// =============================================================================

struct SeqReader<'de> {
    vector: Vector<'de>,
    index: usize,
}

impl<'de> SeqReader<'de> {
    fn new(vector: Vector<'de>) -> Self {
        Self { vector, index: 0 }
    }
}

impl<'de> de::SeqAccess<'de> for SeqReader<'de> {
    type Error = FlatError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.index >= self.vector.len() {
            return Ok(None);
        }
        let element = self.vector.get(self.index).ok_or_else(|| {
            FlatError::Deserialize(format!("vector element {} is out of range", self.index))
        })?;
        self.index += 1;
        seed.deserialize(element).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.vector.len() - self.index)
    }
}

struct MapReader<'de> {
    map: Map<'de>,
    index: usize,
}

impl<'de> MapReader<'de> {
    fn new(map: Map<'de>) -> Self {
        Self { map, index: 0 }
    }

    fn out_of_range(&self, what: &str) -> FlatError {
        FlatError::Deserialize(format!("map {} {} is out of range", what, self.index))
    }
}

impl<'de> de::MapAccess<'de> for MapReader<'de> {
    type Error = FlatError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if self.index >= self.map.len() {
            return Ok(None);
        }
        let key = self
            .map
            .key_at(self.index)
            .ok_or_else(|| self.out_of_range("key"))?;
        seed.deserialize(BorrowedStrDeserializer::<FlatError>::new(key))
            .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let value = self
            .map
            .value_at(self.index)
            .ok_or_else(|| self.out_of_range("value"))?;
        self.index += 1;
        seed.deserialize(value)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.map.len() - self.index)
    }
}

// =============================================================================
// Enums
// =============================================================================

struct EnumReader<'de> {
    variant: &'de str,
    content: Option<Reference<'de>>,
}

impl<'de> de::EnumAccess<'de> for EnumReader<'de> {
    type Error = FlatError;
    type Variant = VariantReader<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant)> {
        let variant = seed.deserialize(BorrowedStrDeserializer::<FlatError>::new(self.variant))?;
        Ok((
            variant,
            VariantReader {
                content: self.content,
            },
        ))
    }
}

struct VariantReader<'de> {
    content: Option<Reference<'de>>,
}

impl<'de> VariantReader<'de> {
    fn content(self) -> Result<Reference<'de>> {
        self.content
            .ok_or_else(|| FlatError::Deserialize("variant has no content".into()))
    }
}

impl<'de> de::VariantAccess<'de> for VariantReader<'de> {
    type Error = FlatError;

    fn unit_variant(self) -> Result<()> {
        match self.content {
            Some(content) if !content.is_null() => Err(content.unexpected("unit variant")),
            _ => Ok(()),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self.content()?)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(self.content()?, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_map(self.content()?, visitor)
    }
}
