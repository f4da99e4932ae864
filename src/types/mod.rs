//! Value and row representations shared by the storage and execution layers.

mod row;
mod value;

pub use row::{CodecError, Row};
pub use value::{DataType, Value};
