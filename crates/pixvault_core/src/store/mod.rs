//! Generic document storage layer.
//!
//! # Responsibility
//! - Persist versioned JSON documents in content tables.
//! - Keep declaratively registered index tables exactly consistent with
//!   document content under concurrent writers.
//!
//! # See also
//! - `crate::search` for the tag predicate language the repository joins.

pub mod doc;
pub mod repo;
pub mod schema;
