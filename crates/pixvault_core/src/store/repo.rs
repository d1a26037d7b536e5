//! Generic document repository over a declared schema.
//!
//! # Responsibility
//! - Provide the only mutation path for a document type's content table and
//!   its derived index tables.
//! - Keep content and every index table moving together: after a successful
//!   write, index rows for a document are exactly what its indexers extract.
//!
//! # Invariants
//! - Every mutating operation runs inside one scoped transaction.
//! - Index maintenance is delete-then-reinsert per document; stale, missing
//!   or duplicate index rows never survive a successful write.
//! - Engine errors are never retried here; retry policy belongs to callers.

use crate::db::{Db, DbError};
use crate::search::tag_query::CompiledPredicate;
use crate::store::doc::Doc;
use crate::store::schema::{IndexHandle, Indexer, Schema};
use log::{info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error taxonomy.
///
/// Read misses are not errors; they surface as `Ok(None)` or empty lists.
#[derive(Debug)]
pub enum RepoError {
    /// Engine-level failure (lock timeout, constraint violation, disconnect).
    Db(DbError),
    /// Content could not be serialized to the canonical JSON encoding.
    EncodeContent {
        id: String,
        source: serde_json::Error,
    },
    /// Stored content no longer deserializes into the declared shape.
    MalformedContent {
        id: String,
        source: serde_json::Error,
    },
    /// An extractor produced a row whose arity does not match its fields.
    IndexEntryShape {
        index: String,
        expected: usize,
        actual: usize,
    },
    /// The given index handle was not registered on this schema.
    UnknownIndex { index: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "storage operation failed: {err}"),
            Self::EncodeContent { id, source } => {
                write!(f, "cannot encode content for document `{id}`: {source}")
            }
            Self::MalformedContent { id, source } => {
                write!(f, "malformed stored content for document `{id}`: {source}")
            }
            Self::IndexEntryShape {
                index,
                expected,
                actual,
            } => write!(
                f,
                "indexer `{index}` produced a row of {actual} values, expected {expected}"
            ),
            Self::UnknownIndex { index } => {
                write!(f, "index `{index}` is not registered on this schema")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::EncodeContent { source, .. } | Self::MalformedContent { source, .. } => {
                Some(source)
            }
            Self::IndexEntryShape { .. } | Self::UnknownIndex { .. } => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Counters returned by [`Repo::rebuild_index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Documents whose index rows were recomputed.
    pub rebuilt: u64,
    /// Ids present in the initial scan but gone by the time they were locked.
    pub skipped_deleted: u64,
    /// Documents whose stored content failed to deserialize; left untouched.
    pub malformed: u64,
}

/// Progress callback for rebuilds: `(documents processed, total)`.
pub type RebuildProgress<'a> = &'a mut dyn FnMut(u64, u64);

/// Stateless CRUD/enumeration façade over one document type.
pub struct Repo<'a, T> {
    db: &'a Db,
    schema: &'a Schema<T>,
}

impl<'a, T: Serialize + DeserializeOwned> Repo<'a, T> {
    pub fn new(db: &'a Db, schema: &'a Schema<T>) -> Self {
        Self { db, schema }
    }

    pub fn db(&self) -> &Db {
        self.db
    }

    pub fn schema(&self) -> &Schema<T> {
        self.schema
    }

    /// Reads one document by id; absent is not an error.
    pub fn get(&self, id: &str) -> RepoResult<Option<Doc<T>>> {
        let row: Option<(String, String)> = self
            .db
            .conn()
            .query_row(
                &format!(
                    "SELECT id, content FROM {} WHERE id = ?1;",
                    self.schema.table_name()
                ),
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, content)) => decode_doc(id, &content).map(Some),
        }
    }

    /// Upserts content and rewrites every index table for this id.
    ///
    /// # Contract
    /// - Runs in one transaction: the content write and all index writes
    ///   commit or roll back together.
    /// - Concurrent `put`s for the same database serialize on the engine's
    ///   write lock; the second writer observes the first's committed state.
    pub fn put(&self, id: &str, content: &T) -> RepoResult<()> {
        let encoded = serde_json::to_string(content).map_err(|source| RepoError::EncodeContent {
            id: id.to_string(),
            source,
        })?;

        self.db.scoped_transaction(|db| {
            let existing: Option<String> = db
                .conn()
                .query_row(
                    &format!(
                        "SELECT id FROM {} WHERE id = ?1;",
                        self.schema.table_name()
                    ),
                    [id],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                db.conn().execute(
                    &format!(
                        "UPDATE {} SET content = ?2 WHERE id = ?1;",
                        self.schema.table_name()
                    ),
                    params![id, encoded],
                )?;
            } else {
                db.conn().execute(
                    &format!(
                        "INSERT INTO {} (id, content) VALUES (?1, ?2);",
                        self.schema.table_name()
                    ),
                    params![id, encoded],
                )?;
            }

            for indexer in self.schema.indexers() {
                apply_indexer(db, indexer, id, content)?;
            }
            Ok(())
        })
    }

    /// Convenience wrapper: `put(doc.id, doc.content)`.
    pub fn update(&self, doc: &Doc<T>) -> RepoResult<()> {
        self.put(&doc.id, &doc.content)
    }

    /// Streams every document in storage order through `visit`.
    ///
    /// Malformed rows are delivered as per-item `Err` values so callers can
    /// skip or halt; the scan itself continues. Re-invoking re-scans.
    pub fn scan(&self, mut visit: impl FnMut(RepoResult<Doc<T>>)) -> RepoResult<()> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT id, content FROM {};",
            self.schema.table_name()
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let content: String = row.get(1)?;
            visit(decode_doc(id, &content));
        }
        Ok(())
    }

    /// Collects the full scan; fails on the first malformed document.
    ///
    /// Intended for offline/batch consumers, not interactive paths.
    pub fn all(&self) -> RepoResult<Vec<Doc<T>>> {
        let mut docs = Vec::new();
        let mut first_error = None;
        self.scan(|item| match item {
            Ok(doc) => docs.push(doc),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        })?;
        match first_error {
            Some(err) => Err(err),
            None => Ok(docs),
        }
    }

    /// Total number of stored documents.
    pub fn count(&self) -> RepoResult<u64> {
        let count: i64 = self.db.conn().query_row(
            &format!("SELECT COUNT(*) FROM {};", self.schema.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of documents matching a compiled tag predicate.
    pub fn count_by(&self, predicate: &CompiledPredicate) -> RepoResult<u64> {
        let (where_sql, binds) = predicate.where_sql("d.id");
        let count: i64 = self.db.conn().query_row(
            &format!(
                "SELECT COUNT(*) FROM {} d WHERE {};",
                self.schema.table_name(),
                where_sql
            ),
            params_from_iter(binds),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Paginated read ordered by an index's leading column.
    ///
    /// An offset beyond the result size yields an empty vec, not an error.
    pub fn list_ordered(
        &self,
        index: &IndexHandle,
        offset: u32,
        limit: u32,
        descending: bool,
    ) -> RepoResult<Vec<Doc<T>>> {
        self.list_ordered_by(index, None, offset, limit, descending)
    }

    /// [`Repo::list_ordered`] constrained by a compiled tag predicate.
    pub fn list_ordered_by(
        &self,
        index: &IndexHandle,
        predicate: Option<&CompiledPredicate>,
        offset: u32,
        limit: u32,
        descending: bool,
    ) -> RepoResult<Vec<Doc<T>>> {
        let indexer = self.resolve(index)?;
        let direction = if descending { "DESC" } else { "ASC" };
        let (where_sql, mut binds) = match predicate {
            Some(predicate) => predicate.where_sql("d.id"),
            None => ("1 = 1".to_string(), Vec::new()),
        };

        let sql = format!(
            "SELECT d.id AS id, d.content AS content
             FROM {table} d
             JOIN {index} ix ON ix.id = d.id
             WHERE {where_sql}
             ORDER BY ix.\"{leading}\" {direction}
             LIMIT ? OFFSET ?;",
            table = self.schema.table_name(),
            index = indexer.handle.table_name(),
            leading = indexer.handle.leading_column(),
        );
        binds.push(Value::Integer(i64::from(limit)));
        binds.push(Value::Integer(i64::from(offset)));
        self.query_docs(&sql, binds)
    }

    /// Recomputes the given index tables for every stored document.
    ///
    /// # Contract
    /// - Ids are snapshotted once in storage order; each document is then
    ///   re-locked and re-read in its own transaction, so a long rebuild
    ///   never starves writers.
    /// - Ids deleted between snapshot and lock are skipped, not errors.
    /// - Malformed documents are counted, logged and left untouched.
    /// - Idempotent: extractors are pure, so rerunning changes nothing.
    pub fn rebuild_index(
        &self,
        indexes: &[&IndexHandle],
        mut progress: Option<RebuildProgress<'_>>,
    ) -> RepoResult<RebuildStats> {
        let mut indexers = Vec::with_capacity(indexes.len());
        for handle in indexes {
            indexers.push(self.resolve(handle)?);
        }

        let started_at = Instant::now();
        let ids = self.all_ids()?;
        let total = ids.len() as u64;
        info!(
            "event=index_rebuild module=store status=start table={} docs={} indexes={}",
            self.schema.table_name(),
            total,
            indexes.len()
        );

        let mut stats = RebuildStats::default();
        for (done, id) in ids.iter().enumerate() {
            self.db.scoped_transaction(|db| -> RepoResult<()> {
                let row: Option<String> = db
                    .conn()
                    .query_row(
                        &format!(
                            "SELECT content FROM {} WHERE id = ?1;",
                            self.schema.table_name()
                        ),
                        [id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(encoded) = row else {
                    stats.skipped_deleted += 1;
                    return Ok(());
                };

                let content = match serde_json::from_str::<T>(&encoded) {
                    Ok(content) => content,
                    Err(err) => {
                        warn!(
                            "event=index_rebuild module=store status=malformed table={} id={} error={}",
                            self.schema.table_name(),
                            id,
                            err
                        );
                        stats.malformed += 1;
                        return Ok(());
                    }
                };

                for indexer in &indexers {
                    apply_indexer(db, indexer, id, &content)?;
                }
                stats.rebuilt += 1;
                Ok(())
            })?;

            if let Some(callback) = progress.as_deref_mut() {
                callback(done as u64 + 1, total);
            }
        }

        info!(
            "event=index_rebuild module=store status=ok table={} rebuilt={} skipped_deleted={} malformed={} duration_ms={}",
            self.schema.table_name(),
            stats.rebuilt,
            stats.skipped_deleted,
            stats.malformed,
            started_at.elapsed().as_millis()
        );
        Ok(stats)
    }

    /// Runs a caller-built SELECT whose rows are `(id, content)` pairs.
    ///
    /// Crate-private escape hatch for stores that need joins the generic
    /// surface does not cover; mutation statements are not permitted here
    /// by convention.
    pub(crate) fn query_docs(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Doc<T>>> {
        let mut stmt = self.db.conn().prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            docs.push(doc_from_row(row)?);
        }
        Ok(docs)
    }

    fn resolve(&self, handle: &IndexHandle) -> RepoResult<&'a Indexer<T>> {
        self.schema
            .indexer_for(handle)
            .ok_or_else(|| RepoError::UnknownIndex {
                index: handle.table_name().to_string(),
            })
    }

    fn all_ids(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .db
            .conn()
            .prepare(&format!("SELECT id FROM {};", self.schema.table_name()))?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

/// Rewrites one index table's rows for one document: delete all, re-extract,
/// bulk insert. Must be called inside an active transaction.
fn apply_indexer<T>(db: &Db, indexer: &Indexer<T>, id: &str, content: &T) -> RepoResult<()> {
    let table = indexer.handle.table_name();
    db.conn()
        .execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [id])?;

    let entries = indexer.extract(content);
    if entries.is_empty() {
        return Ok(());
    }

    let columns = indexer
        .handle
        .columns()
        .iter()
        .map(|column| format!("\"{column}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=indexer.arity() + 1)
        .map(|n| format!("?{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = db.conn().prepare(&format!(
        "INSERT INTO {table} ({columns}, id) VALUES ({placeholders});"
    ))?;

    for entry in entries {
        if entry.len() != indexer.arity() {
            return Err(RepoError::IndexEntryShape {
                index: table.to_string(),
                expected: indexer.arity(),
                actual: entry.len(),
            });
        }
        let mut binds = entry;
        binds.push(Value::Text(id.to_string()));
        stmt.execute(params_from_iter(binds))?;
    }
    Ok(())
}

fn decode_doc<T: DeserializeOwned>(id: String, encoded: &str) -> RepoResult<Doc<T>> {
    match serde_json::from_str(encoded) {
        Ok(content) => Ok(Doc { id, content }),
        Err(source) => Err(RepoError::MalformedContent { id, source }),
    }
}

fn doc_from_row<T: DeserializeOwned>(row: &Row<'_>) -> RepoResult<Doc<T>> {
    let id: String = row.get("id")?;
    let content: String = row.get("content")?;
    decode_doc(id, &content)
}
