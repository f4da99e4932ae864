//! Rows and their on-page byte encoding.
//!
//! # Layout
//! ```text
//! count: u16 | value_0 | value_1 | ... | value_{count-1}
//!
//! value := 0x00                      NULL
//!        | 0x01 i64 (LE)             INTEGER
//!        | 0x02 len:u16 (LE) utf8    TEXT
//! ```

use std::ops::{Deref, DerefMut};

use thiserror::Error;

use super::value::Value;

const TAG_NULL: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_TEXT: u8 = 2;

/// Failure to encode or decode a row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("float values cannot be stored")]
    UnstorableFloat,
    #[error("text of {0} bytes is too long to store")]
    TextTooLong(usize),
    #[error("too many columns ({0})")]
    TooManyColumns(usize),
    #[error("row bytes truncated")]
    Truncated,
    #[error("unknown value tag {0}")]
    UnknownTag(u8),
    #[error("text is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} trailing bytes after row")]
    TrailingBytes(usize),
}

/// An ordered, column-aligned sequence of values.
///
/// The catalog is the source of truth for what each position means; a row
/// itself carries no column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Row(values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }

    /// Serialize the row for storage in a page slot.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let count = u16::try_from(self.0.len()).map_err(|_| CodecError::TooManyColumns(self.0.len()))?;
        let mut out = Vec::with_capacity(2 + self.0.len() * 9);
        out.extend_from_slice(&count.to_le_bytes());

        for value in &self.0 {
            match value {
                Value::Null => out.push(TAG_NULL),
                Value::Integer(i) => {
                    out.push(TAG_INTEGER);
                    out.extend_from_slice(&i.to_le_bytes());
                }
                Value::Text(s) => {
                    let len = u16::try_from(s.len()).map_err(|_| CodecError::TextTooLong(s.len()))?;
                    out.push(TAG_TEXT);
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                Value::Float(_) => return Err(CodecError::UnstorableFloat),
            }
        }

        Ok(out)
    }

    /// Deserialize a row previously produced by [`Row::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Row, CodecError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let count = u16::from_le_bytes(cursor.take_array()?) as usize;
        let mut values = Vec::with_capacity(count);

        for _ in 0..count {
            let value = match cursor.take(1)?[0] {
                TAG_NULL => Value::Null,
                TAG_INTEGER => Value::Integer(i64::from_le_bytes(cursor.take_array()?)),
                TAG_TEXT => {
                    let len = u16::from_le_bytes(cursor.take_array()?) as usize;
                    let raw = cursor.take(len)?;
                    let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                    Value::Text(text.to_string())
                }
                tag => return Err(CodecError::UnknownTag(tag)),
            };
            values.push(value);
        }

        let rest = bytes.len() - cursor.pos;
        if rest != 0 {
            return Err(CodecError::TrailingBytes(rest));
        }
        Ok(Row(values))
    }
}

impl Deref for Row {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for Row {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row(values)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }
}
