//! Table and column definitions.

use std::fmt;

use crate::common::{PageId, SchemaError};
use crate::types::{DataType, Value};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    /// Text of at most `max_len` bytes.
    Text { max_len: usize },
}

impl ColumnType {
    pub fn text(max_len: usize) -> Self {
        ColumnType::Text { max_len }
    }

    /// The runtime type of values this column accepts.
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnType::Integer => DataType::Integer,
            ColumnType::Text { .. } => DataType::Text,
        }
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text { .. } => "TEXT",
        }
    }

    pub(crate) fn max_len(&self) -> usize {
        match self {
            ColumnType::Integer => 0,
            ColumnType::Text { max_len } => *max_len,
        }
    }

    pub(crate) fn from_tag(tag: &str, max_len: usize) -> Option<Self> {
        match tag {
            "INTEGER" => Some(ColumnType::Integer),
            "TEXT" => Some(ColumnType::Text { max_len }),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => f.write_str("INTEGER"),
            ColumnType::Text { max_len } => write!(f, "TEXT({})", max_len),
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    /// A nullable column. The name is normalized to lower case.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            column_type,
            nullable: true,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn text(name: impl Into<String>, max_len: usize) -> Self {
        Self::new(name, ColumnType::text(max_len))
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Check a single value against this column.
    pub fn check(&self, value: &Value) -> Result<(), SchemaError> {
        match (value, &self.column_type) {
            (Value::Null, _) if self.nullable => Ok(()),
            (Value::Null, _) => Err(SchemaError::NullViolation(self.name.clone())),
            (Value::Integer(_), ColumnType::Integer) => Ok(()),
            (Value::Text(s), ColumnType::Text { max_len }) if s.len() > *max_len => {
                Err(SchemaError::ValueTooLong {
                    column: self.name.clone(),
                    max_len: *max_len,
                    len: s.len(),
                })
            }
            (Value::Text(_), ColumnType::Text { .. }) => Ok(()),
            (other, expected) => Err(SchemaError::TypeMismatch {
                column: self.name.clone(),
                expected: expected.data_type(),
                found: other.data_type(),
            }),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.column_type)?;
        if !self.nullable {
            f.write_str(" NOT NULL")?;
        }
        Ok(())
    }
}

/// The authoritative definition of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    /// Head of the table's page chain.
    pub first_page: PageId,
    /// Live rows; kept in memory and recomputed when the catalog loads.
    pub row_count: usize,
}

impl TableSchema {
    /// Position of a column by (case-insensitive) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Check column count, order and type compatibility of a record.
    pub fn validate(&self, values: &[Value]) -> Result<(), SchemaError> {
        if values.len() != self.columns.len() {
            return Err(SchemaError::ColumnCountMismatch {
                table: self.name.clone(),
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.columns
            .iter()
            .zip(values)
            .try_for_each(|(column, value)| column.check(value))
    }
}
