use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A single observation as stored in a measurement file.
///
/// Numeric readings and categorical flag codes share one position-aligned
/// sequence in the serialized payload; the variant is fixed at decode time.
/// A serialized null becomes `Numeric(NaN)`, which SQLite stores as `NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numeric(f64),
    Flag(String),
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Numeric(_))
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Value::Flag(_))
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            Value::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<&str> {
        match self {
            Value::Numeric(_) => None,
            Value::Flag(name) => Some(name),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Numeric(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Flag(value.to_string())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Numeric(v) => serializer.serialize_f64(*v),
            Value::Flag(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number, a flag string or null")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Numeric(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Numeric(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Numeric(v as f64))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Numeric(if v { 1.0 } else { 0.0 }))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::Flag(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::Flag(v))
    }

    // Python 2 pickles carry flag codes as byte strings
    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
        Ok(Value::Flag(String::from_utf8_lossy(v).into_owned()))
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Numeric(f64::NAN))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Numeric(f64::NAN))
    }
}
