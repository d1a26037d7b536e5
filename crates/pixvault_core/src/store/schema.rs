//! Declarative storage schema and indexer registry for one document type.
//!
//! # Responsibility
//! - Describe the content table and every derived index table of a document
//!   type, registered once at process start.
//! - Generate deterministic physical names and idempotent DDL for them.
//!
//! # Invariants
//! - Index table names are pure functions of the content table name and the
//!   field list, with descending directions folded into the name so two
//!   indexers differing only in direction never collide.
//! - Extractors are pure and deterministic for a given content value; this
//!   is what makes rebuilds safe and idempotent.

use crate::db::{Db, DbResult};
use rusqlite::types::Value;
use std::fmt::Write as _;

/// Storage type of one indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    /// Stored as INTEGER 0/1.
    Boolean,
}

impl FieldType {
    fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// One column of an index table, with its position in the composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    name: String,
    field_type: FieldType,
    descending: bool,
}

impl IndexField {
    /// Ascending index field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            descending: false,
        }
    }

    /// Descending index field.
    pub fn descending(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            descending: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }
}

/// Rows produced by one extractor invocation; each inner vec is one index row.
pub type IndexEntries = Vec<Vec<Value>>;

type EntriesExtractor<T> = Box<dyn Fn(&T) -> IndexEntries + Send + Sync>;

/// Registered projection from document content to index rows.
pub(crate) struct Indexer<T> {
    pub(crate) handle: IndexHandle,
    fields: Vec<IndexField>,
    meta_fields: Vec<IndexField>,
    extractor: EntriesExtractor<T>,
}

impl<T> Indexer<T> {
    /// Expected number of values per extracted row (key + meta columns).
    pub(crate) fn arity(&self) -> usize {
        self.fields.len() + self.meta_fields.len()
    }

    pub(crate) fn extract(&self, content: &T) -> IndexEntries {
        (self.extractor)(content)
    }
}

/// Handle to a generated index table, used to build queries against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    table: String,
    columns: Vec<String>,
    ordinal: usize,
}

impl IndexHandle {
    /// Physical name of the index table.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Column names in declaration order (key fields, then meta fields).
    /// The trailing `id` foreign-key column is implicit.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// First key column; `list_ordered` sorts by it.
    pub fn leading_column(&self) -> &str {
        &self.columns[0]
    }

    pub(crate) fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Storage declaration for one document type: content table plus indexers.
///
/// Built once per document type at process start and treated as immutable
/// afterwards; repositories borrow it.
pub struct Schema<T> {
    table: String,
    indexers: Vec<Indexer<T>>,
}

impl<T> Schema<T> {
    /// Declares the content table `(id TEXT PRIMARY KEY, content TEXT)`.
    pub fn define(table_name: impl Into<String>) -> Self {
        Self {
            table: table_name.into(),
            indexers: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Registers an index table over `fields` populated by `extractor`.
    ///
    /// # Contract
    /// - `extractor` must be pure: no I/O, deterministic per content value.
    /// - Each extracted row must carry exactly one value per declared field,
    ///   in declaration order.
    pub fn add_indexer(
        &mut self,
        fields: Vec<IndexField>,
        extractor: impl Fn(&T) -> IndexEntries + Send + Sync + 'static,
    ) -> IndexHandle {
        self.add_indexer_with_meta(fields, Vec::new(), extractor)
    }

    /// Like [`Schema::add_indexer`], with extra stored-but-unindexed columns.
    ///
    /// Meta fields live in the index table and in extracted rows (after the
    /// key fields) but stay out of the composite key.
    pub fn add_indexer_with_meta(
        &mut self,
        fields: Vec<IndexField>,
        meta_fields: Vec<IndexField>,
        extractor: impl Fn(&T) -> IndexEntries + Send + Sync + 'static,
    ) -> IndexHandle {
        assert!(
            !fields.is_empty(),
            "indexer on `{}` needs at least one key field",
            self.table
        );

        let table = index_table_name(&self.table, &fields);
        let columns = fields
            .iter()
            .chain(meta_fields.iter())
            .map(|field| field.name.clone())
            .collect();
        let handle = IndexHandle {
            table,
            columns,
            ordinal: self.indexers.len(),
        };

        self.indexers.push(Indexer {
            handle: handle.clone(),
            fields,
            meta_fields,
            extractor: Box::new(extractor),
        });
        handle
    }

    /// Creates the content table and every index table if missing.
    ///
    /// DDL is idempotent and applied in one transaction, so a half-created
    /// schema is never observable.
    pub fn create_tables(&self, db: &Db) -> DbResult<()> {
        db.scoped_transaction(|db| {
            db.conn().execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL
                );",
                self.table
            ))?;

            for indexer in &self.indexers {
                db.conn().execute_batch(&self.index_table_ddl(indexer))?;
            }
            Ok(())
        })
    }

    pub(crate) fn indexers(&self) -> &[Indexer<T>] {
        &self.indexers
    }

    /// Resolves a handle back to its indexer, rejecting foreign handles.
    pub(crate) fn indexer_for(&self, handle: &IndexHandle) -> Option<&Indexer<T>> {
        self.indexers
            .get(handle.ordinal())
            .filter(|indexer| indexer.handle == *handle)
    }

    fn index_table_ddl(&self, indexer: &Indexer<T>) -> String {
        let table = indexer.handle.table_name();
        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {table} (\n");
        // Column names are always quoted: extracted fields may shadow SQL
        // keywords (e.g. a face's `index`).
        for field in indexer.fields.iter().chain(indexer.meta_fields.iter()) {
            let _ = writeln!(
                ddl,
                "    \"{}\" {},",
                field.name,
                field.field_type.sql_type()
            );
        }
        let _ = writeln!(ddl, "    id TEXT NOT NULL REFERENCES {}(id)", self.table);
        ddl.push_str(");\n");

        let key_columns = indexer
            .fields
            .iter()
            .map(|field| {
                if field.descending {
                    format!("\"{}\" DESC", field.name)
                } else {
                    format!("\"{}\"", field.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            ddl,
            "CREATE INDEX IF NOT EXISTS {table}_key ON {table} ({key_columns});"
        );
        let _ = writeln!(
            ddl,
            "CREATE INDEX IF NOT EXISTS {table}_doc ON {table} (id);"
        );
        ddl
    }
}

/// Deterministic index table name: `idx_<table>_on_<f1>[_desc][_and_<f2>...]`.
fn index_table_name(table: &str, fields: &[IndexField]) -> String {
    let mut name = format!("idx_{table}_on_");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            name.push_str("_and_");
        }
        name.push_str(&field.name);
        if field.descending {
            name.push_str("_desc");
        }
    }
    name
}
