//! Character document model and store.
//!
//! The name index carries meta columns (post count, creation date) so the
//! search path can order results without touching document content.

use crate::db::{Db, DbResult};
use crate::model::{opt_integer, opt_text};
use crate::store::doc::Doc;
use crate::store::repo::{Repo, RepoResult};
use crate::store::schema::{FieldType, IndexField, IndexHandle, Schema};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

/// A known character identity, enriched from an external booru.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub danbooru_id: Option<i64>,
    pub danbooru_post_count: Option<i64>,
    pub danbooru_created_at: Option<String>,
}

/// Schema and name search for character documents.
pub struct CharacterStore {
    schema: Schema<Character>,
    pub idx_name: IndexHandle,
}

impl CharacterStore {
    pub fn new() -> Self {
        let mut schema = Schema::define("characters");
        let idx_name = schema.add_indexer_with_meta(
            vec![IndexField::new("name", FieldType::Text)],
            vec![
                IndexField::new("danbooru_post_count", FieldType::Integer),
                IndexField::new("danbooru_created_at", FieldType::Text),
            ],
            |character: &Character| {
                vec![vec![
                    Value::Text(character.name.clone()),
                    opt_integer(character.danbooru_post_count),
                    opt_text(character.danbooru_created_at.as_deref()),
                ]]
            },
        );
        Self { schema, idx_name }
    }

    pub fn schema(&self) -> &Schema<Character> {
        &self.schema
    }

    pub fn create_tables(&self, db: &Db) -> DbResult<()> {
        self.schema.create_tables(db)
    }

    pub fn repo<'a>(&'a self, db: &'a Db) -> Repo<'a, Character> {
        Repo::new(db, &self.schema)
    }

    /// Substring name search, most-posted characters first.
    pub fn search(&self, db: &Db, q: &str, limit: u32) -> RepoResult<Vec<Doc<Character>>> {
        self.repo(db).query_docs(
            &format!(
                "SELECT d.id AS id, d.content AS content
                 FROM characters d
                 JOIN {index} ix ON ix.id = d.id
                 WHERE instr(ix.name, ?1) > 0
                 ORDER BY ix.danbooru_post_count DESC
                 LIMIT ?2;",
                index = self.idx_name.table_name()
            ),
            vec![
                Value::Text(q.to_string()),
                Value::Integer(i64::from(limit)),
            ],
        )
    }
}

impl Default for CharacterStore {
    fn default() -> Self {
        Self::new()
    }
}
