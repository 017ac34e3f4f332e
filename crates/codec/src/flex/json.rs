//! JSON bridge
//!
//! `FlexBuilder::add` encodes any `serde_json::Value`; `Reference::to_json`
//! renders a decoded value back. Blobs render as arrays of byte values and
//! non-finite floats as `null`.

use serde_json::{Map as JsonMap, Number, Value as Json};

use super::{FlexBuilder, Reference, Value};
use crate::Result;

impl FlexBuilder {
    /// Add a JSON value; arrays become vectors and objects become maps
    pub fn add(&mut self, value: &Json) -> Result<()> {
        match value {
            Json::Null => self.add_null(),
            Json::Bool(b) => self.add_bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.add_int(i)
                } else if let Some(u) = n.as_u64() {
                    self.add_uint(u)
                } else {
                    self.add_float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => self.add_string(s),
            Json::Array(items) => {
                self.start_vector()?;
                for item in items {
                    self.add(item)?;
                }
                self.end()
            }
            Json::Object(fields) => {
                self.start_map()?;
                for (key, item) in fields {
                    self.add_key(key)?;
                    self.add(item)?;
                }
                self.end()
            }
        }
    }
}

impl Reference<'_> {
    /// Convert to a `serde_json::Value`; unreadable values become `null`
    pub fn to_json_value(&self) -> Json {
        let Some(value) = self.value() else {
            return Json::Null;
        };
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Int(i) => Json::from(i),
            Value::UInt(u) => Json::from(u),
            Value::Float(f) => Number::from_f64(f).map_or(Json::Null, Json::Number),
            Value::Key(s) | Value::String(s) => Json::String(s.to_owned()),
            Value::Blob(bytes) => Json::Array(bytes.iter().map(|&b| Json::from(b)).collect()),
            Value::Vector(vector) => Json::Array(vector.iter().map(|r| r.to_json_value()).collect()),
            Value::Map(map) => {
                let mut object = JsonMap::with_capacity(map.len());
                for (key, value) in map.iter() {
                    object.insert(key.to_owned(), value.to_json_value());
                }
                Json::Object(object)
            }
        }
    }

    /// Render as compact JSON text
    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }
}
