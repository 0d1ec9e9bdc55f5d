//! Runtime values carried by entities, parameters, and results.

use super::types::PrimitiveKind;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A property, parameter, or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Guid(Uuid),
    DateTimeOffset(DateTime<FixedOffset>),
    Complex(ComplexValue),
    Collection(Vec<Value>),
}

/// An instance of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexValue {
    /// Full name of the (possibly derived) complex type.
    pub type_name: String,
    pub properties: BTreeMap<String, Value>,
}

impl ComplexValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Primitive kind of this value, if it is a non-null primitive.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Value::Boolean(_) => Some(PrimitiveKind::Boolean),
            Value::Int32(_) => Some(PrimitiveKind::Int32),
            Value::Int64(_) => Some(PrimitiveKind::Int64),
            Value::Double(_) => Some(PrimitiveKind::Double),
            Value::String(_) => Some(PrimitiveKind::String),
            Value::Guid(_) => Some(PrimitiveKind::Guid),
            Value::DateTimeOffset(_) => Some(PrimitiveKind::DateTimeOffset),
            Value::Null | Value::Complex(_) | Value::Collection(_) => None,
        }
    }

    /// Converts a primitive to `kind` when the conversion is lossless
    /// (e.g. an `Int32` literal used for an `Int64` key).
    pub fn coerce(self, kind: PrimitiveKind) -> Option<Value> {
        match (self, kind) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int32(v), PrimitiveKind::Int64) => Some(Value::Int64(i64::from(v))),
            (Value::Int64(v), PrimitiveKind::Int32) => i32::try_from(v).ok().map(Value::Int32),
            (Value::Int32(v), PrimitiveKind::Double) => Some(Value::Double(f64::from(v))),
            (Value::Int64(v), PrimitiveKind::Double) => Some(Value::Double(v as f64)),
            (Value::String(s), PrimitiveKind::Guid) => Uuid::parse_str(&s).ok().map(Value::Guid),
            (Value::String(s), PrimitiveKind::DateTimeOffset) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(Value::DateTimeOffset),
            (value, kind) if value.primitive_kind() == Some(kind) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<ComplexValue> for Value {
    fn from(v: ComplexValue) -> Self {
        Value::Complex(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_widens_integers() {
        assert_eq!(
            Value::Int32(4).coerce(PrimitiveKind::Int64),
            Some(Value::Int64(4))
        );
        assert_eq!(Value::Int64(i64::MAX).coerce(PrimitiveKind::Int32), None);
        assert_eq!(Value::from("x").coerce(PrimitiveKind::Int32), None);
        assert_eq!(Value::Null.coerce(PrimitiveKind::Guid), Some(Value::Null));
    }

    #[test]
    fn test_coerce_parses_guid_strings() {
        let guid = "0b4b2e1a-58e6-4a6b-9a3b-0c5d6f7e8a9b";
        assert!(matches!(
            Value::from(guid).coerce(PrimitiveKind::Guid),
            Some(Value::Guid(_))
        ));
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::String("a".into()));
    }
}
