//! Typed column values.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::common::{Error, Result};

/// Runtime type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Integer,
    Text,
    Float,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "NULL",
            DataType::Integer => "INTEGER",
            DataType::Text => "TEXT",
            DataType::Float => "FLOAT",
        };
        f.write_str(name)
    }
}

/// A single column value.
///
/// Stored rows only ever contain `Null`, `Integer` and `Text`; `Float` is
/// produced by computations such as `AVG` and cannot be written to a page.
///
/// Equality and hashing treat floats bitwise so that values can key the hash
/// tables used by joins and grouping.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
    Float(f64),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Integer(_) => DataType::Integer,
            Value::Text(_) => DataType::Text,
            Value::Float(_) => DataType::Float,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Compare two non-null values of compatible types.
    ///
    /// Returns `Ok(None)` when either side is NULL. Integers and floats compare
    /// numerically; any other mix is a type error, there is no coercion.
    pub fn compare(&self, other: &Value, op: &str) -> Result<Option<Ordering>> {
        let ordering = match (self, other) {
            (Value::Null, _) | (_, Value::Null) => return Ok(None),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                let (a, b) = (self.as_f64(), other.as_f64());
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
            _ => {
                return Err(Error::IncompatibleTypes {
                    op: op.to_string(),
                    left: self.data_type(),
                    right: other.data_type(),
                })
            }
        };
        Ok(Some(ordering))
    }

    /// Total order used by sorting and MIN/MAX: NULL sorts as the smallest value.
    pub fn sort_cmp(&self, other: &Value) -> Result<Ordering> {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Less),
            (false, true) => Ok(Ordering::Greater),
            (false, false) => Ok(self.compare(other, "ORDER BY")?.unwrap_or(Ordering::Equal)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(i) => i.hash(state),
            Value::Text(s) => s.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
            Value::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
