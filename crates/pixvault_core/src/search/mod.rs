//! Query compilation over derived indexes.

pub mod tag_query;
