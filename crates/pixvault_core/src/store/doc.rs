//! Identified document wrapper.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A stored record: opaque string id plus the typed content it round-trips
/// through the canonical JSON encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc<T> {
    pub id: String,
    pub content: T,
}

impl<T: Serialize + DeserializeOwned> Doc<T> {
    pub fn new(id: impl Into<String>, content: T) -> Self {
        Self {
            id: id.into(),
            content,
        }
    }
}
