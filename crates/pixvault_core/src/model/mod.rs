//! Domain document types and their registered stores.
//!
//! # Responsibility
//! - Declare the document shapes the application persists and the index
//!   tables derived from them.
//! - Keep index registration in one place per document type; nothing else
//!   may touch index tables.

use rusqlite::types::Value;

pub mod character;
pub mod face_cluster;
pub mod image;
pub mod tweet;

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

pub(crate) fn opt_integer(value: Option<i64>) -> Value {
    match value {
        Some(number) => Value::Integer(number),
        None => Value::Null,
    }
}

pub(crate) fn opt_real(value: Option<f64>) -> Value {
    match value {
        Some(number) => Value::Real(number),
        None => Value::Null,
    }
}
