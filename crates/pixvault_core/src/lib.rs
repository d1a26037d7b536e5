//! Core storage engine for pixvault.
//!
//! Persists versioned JSON documents in SQLite while keeping declaratively
//! registered index tables exactly consistent with document content, and
//! compiles textual tag queries into predicates over those indexes. This
//! crate is the only code path allowed to mutate a document type's storage.

pub mod db;
pub mod logging;
pub mod model;
pub mod search;
pub mod store;

pub use db::{open_db, open_db_in_memory, Db, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use search::tag_query::{
    CompiledPredicate, MembershipSource, TagQuery, TagQueryBinding, TagQueryTerm, TagSelector,
};
pub use store::doc::Doc;
pub use store::repo::{RebuildStats, Repo, RepoError, RepoResult};
pub use store::schema::{FieldType, IndexEntries, IndexField, IndexHandle, Schema};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
