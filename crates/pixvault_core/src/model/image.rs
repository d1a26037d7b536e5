//! Image document model and store.
//!
//! # Responsibility
//! - Define the image record collected from external sources, with tags,
//!   embeddings and detected faces attached by pipeline tasks.
//! - Register every image index table and own the image query surface.
//!
//! # Invariants
//! - All timestamps are unix epoch milliseconds.
//! - Manual tags take precedence over automatic tags and default their
//!   score to 1.0.

use crate::db::{Db, DbResult};
use crate::model::face_cluster::FaceClusterStore;
use crate::model::opt_real;
use crate::search::tag_query::{MembershipSource, TagQuery, TagQueryBinding};
use crate::store::doc::Doc;
use crate::store::repo::{Repo, RepoResult};
use crate::store::schema::{FieldType, IndexField, IndexHandle, Schema};
use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Broad tag category, when the tagger reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagKind {
    Character,
    Rating,
}

/// One tag attached to an image, manually or by a tagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTag {
    pub tag: String,
    #[serde(rename = "type")]
    pub kind: Option<TagKind>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Opaque embedding payload: base64 bytes plus the dtype needed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub data: String,
    pub dtype: String,
}

/// A face detected in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageFace {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub embedding: Vector,
    pub score: f64,
    #[serde(default)]
    pub local_filename: Option<String>,
}

/// The image document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub local_filename: String,
    /// Collection time in epoch milliseconds; drives default ordering.
    pub collected_at: i64,

    pub source_url: Option<String>,
    pub tweet_id: Option<String>,
    #[serde(default)]
    pub tweet_username: Option<String>,

    /// `None` until the autotagger has run; an empty list means it ran and
    /// found nothing.
    #[serde(default)]
    pub tags: Option<Vec<ImageTag>>,
    #[serde(default)]
    pub manual_tags: Option<Vec<ImageTag>>,
    #[serde(default)]
    pub embedding: Option<Vector>,
    #[serde(default)]
    pub embeddings: Option<BTreeMap<String, Vector>>,
    #[serde(default)]
    pub faces: Option<Vec<ImageFace>>,
}

impl Image {
    /// Manual tags (score defaulted to 1.0) followed by automatic tags.
    pub fn all_tags(&self) -> Vec<ImageTag> {
        let mut tags = Vec::new();
        if let Some(manual) = &self.manual_tags {
            for tag in manual {
                let mut tag = tag.clone();
                tag.score = tag.score.or(Some(1.0));
                tags.push(tag);
            }
        }
        if let Some(auto) = &self.tags {
            tags.extend(auto.iter().cloned());
        }
        tags
    }
}

/// Schema, indexers and query surface for image documents.
pub struct ImageStore {
    schema: Schema<Image>,
    pub idx_collected_at: IndexHandle,
    pub idx_tag: IndexHandle,
    pub idx_tag_score: IndexHandle,
    pub idx_needs_autotagging: IndexHandle,
    pub idx_embedding_types: IndexHandle,
}

impl ImageStore {
    pub fn new() -> Self {
        let mut schema = Schema::define("images");

        let idx_collected_at = schema.add_indexer(
            vec![IndexField::descending("collected_at", FieldType::Integer)],
            |image: &Image| vec![vec![Value::Integer(image.collected_at)]],
        );
        let idx_tag = schema.add_indexer(
            vec![
                IndexField::new("tag", FieldType::Text),
                IndexField::descending("collected_at", FieldType::Integer),
            ],
            |image: &Image| {
                image
                    .all_tags()
                    .into_iter()
                    .map(|tag| {
                        vec![Value::Text(tag.tag), Value::Integer(image.collected_at)]
                    })
                    .collect()
            },
        );
        let idx_tag_score = schema.add_indexer(
            vec![
                IndexField::new("tag", FieldType::Text),
                IndexField::descending("score", FieldType::Real),
            ],
            |image: &Image| {
                image
                    .all_tags()
                    .into_iter()
                    .map(|tag| vec![Value::Text(tag.tag), opt_real(tag.score)])
                    .collect()
            },
        );
        let idx_needs_autotagging = schema.add_indexer(
            vec![IndexField::new("needs_autotagging", FieldType::Boolean)],
            |image: &Image| {
                if image.tags.is_none() {
                    vec![vec![Value::Integer(1)]]
                } else {
                    Vec::new()
                }
            },
        );
        let idx_embedding_types = schema.add_indexer(
            vec![IndexField::new("embedding_type", FieldType::Text)],
            |image: &Image| match &image.embeddings {
                Some(embeddings) => embeddings
                    .keys()
                    .map(|kind| vec![Value::Text(kind.clone())])
                    .collect(),
                None => Vec::new(),
            },
        );

        Self {
            schema,
            idx_collected_at,
            idx_tag,
            idx_tag_score,
            idx_needs_autotagging,
            idx_embedding_types,
        }
    }

    pub fn schema(&self) -> &Schema<Image> {
        &self.schema
    }

    pub fn create_tables(&self, db: &Db) -> DbResult<()> {
        self.schema.create_tables(db)
    }

    pub fn repo<'a>(&'a self, db: &'a Db) -> Repo<'a, Image> {
        Repo::new(db, &self.schema)
    }

    /// Membership sources for compiling tag queries against this store.
    ///
    /// Tag terms select document ids from the tag index; `face:` terms
    /// select image ids referenced by a face cluster's face-ref index.
    pub fn tag_binding(&self, face_clusters: &FaceClusterStore) -> TagQueryBinding {
        TagQueryBinding {
            tags: MembershipSource::new(self.idx_tag.table_name(), "tag", "id"),
            faces: MembershipSource::new(
                face_clusters.idx_face_ref.table_name(),
                "id",
                "image_id",
            ),
        }
    }

    /// Newest-first page of images (or oldest-first with `descending=false`).
    pub fn list_by_collected_at(
        &self,
        db: &Db,
        offset: u32,
        limit: u32,
        descending: bool,
    ) -> RepoResult<Vec<Doc<Image>>> {
        self.repo(db)
            .list_ordered(&self.idx_collected_at, offset, limit, descending)
    }

    /// Tag-filtered page ordered by collection time.
    pub fn list_by_tag_query(
        &self,
        db: &Db,
        binding: &TagQueryBinding,
        query: &TagQuery,
        offset: u32,
        limit: u32,
        descending: bool,
    ) -> RepoResult<Vec<Doc<Image>>> {
        let predicate = query.compile(binding);
        self.repo(db).list_ordered_by(
            &self.idx_collected_at,
            Some(&predicate),
            offset,
            limit,
            descending,
        )
    }

    pub fn count_by_tag_query(
        &self,
        db: &Db,
        binding: &TagQueryBinding,
        query: &TagQuery,
    ) -> RepoResult<u64> {
        self.repo(db).count_by(&query.compile(binding))
    }

    /// Images the autotagger has not processed yet.
    pub fn list_needs_autotagging(&self, db: &Db) -> RepoResult<Vec<Doc<Image>>> {
        self.repo(db).query_docs(
            &format!(
                "SELECT d.id AS id, d.content AS content
                 FROM images d
                 JOIN {index} ix ON ix.id = d.id
                 WHERE ix.needs_autotagging = 1;",
                index = self.idx_needs_autotagging.table_name()
            ),
            Vec::new(),
        )
    }

    /// Images missing an embedding of the given kind.
    pub fn list_needs_embedding(
        &self,
        db: &Db,
        embedding_type: &str,
    ) -> RepoResult<Vec<Doc<Image>>> {
        self.repo(db).query_docs(
            &format!(
                "SELECT d.id AS id, d.content AS content
                 FROM images d
                 LEFT JOIN {index} ix ON ix.id = d.id AND ix.embedding_type = ?1
                 WHERE ix.embedding_type IS NULL;",
                index = self.idx_embedding_types.table_name()
            ),
            vec![Value::Text(embedding_type.to_string())],
        )
    }

    /// Images that already carry an embedding of the given kind.
    pub fn list_has_embedding(
        &self,
        db: &Db,
        embedding_type: &str,
    ) -> RepoResult<Vec<Doc<Image>>> {
        self.repo(db).query_docs(
            &format!(
                "SELECT d.id AS id, d.content AS content
                 FROM images d
                 JOIN {index} ix ON ix.id = d.id AND ix.embedding_type = ?1;",
                index = self.idx_embedding_types.table_name()
            ),
            vec![Value::Text(embedding_type.to_string())],
        )
    }

    /// Tag names with document counts, optionally restricted by a tag query.
    pub fn list_tags_with_counts(
        &self,
        db: &Db,
        binding: &TagQueryBinding,
        filter: Option<&TagQuery>,
    ) -> RepoResult<Vec<(String, u64)>> {
        let (where_sql, binds) = match filter {
            Some(query) => query.compile(binding).where_sql("ix.id"),
            None => ("1 = 1".to_string(), Vec::new()),
        };
        let sql = format!(
            "SELECT ix.tag, COUNT(*)
             FROM {index} ix
             WHERE {where_sql}
             GROUP BY ix.tag
             ORDER BY ix.tag;",
            index = self.idx_tag_score.table_name()
        );

        let mut stmt = db.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next()? {
            let tag: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.push((tag, count as u64));
        }
        Ok(counts)
    }
}

impl Default for ImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Image, ImageTag, TagKind};

    fn bare_image() -> Image {
        Image {
            id: "1".to_string(),
            local_filename: "1.jpg".to_string(),
            collected_at: 1_700_000_000_000,
            source_url: None,
            tweet_id: None,
            tweet_username: None,
            tags: None,
            manual_tags: None,
            embedding: None,
            embeddings: None,
            faces: None,
        }
    }

    #[test]
    fn all_tags_defaults_manual_scores_and_keeps_order() {
        let mut image = bare_image();
        image.manual_tags = Some(vec![ImageTag {
            tag: "hand_picked".to_string(),
            kind: None,
            score: None,
        }]);
        image.tags = Some(vec![ImageTag {
            tag: "auto".to_string(),
            kind: Some(TagKind::Character),
            score: Some(0.8),
        }]);

        let tags = image.all_tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag, "hand_picked");
        assert_eq!(tags[0].score, Some(1.0));
        assert_eq!(tags[1].tag, "auto");
        assert_eq!(tags[1].score, Some(0.8));
    }

    #[test]
    fn tag_kind_uses_wire_names() {
        let json = serde_json::to_string(&TagKind::Character).unwrap();
        assert_eq!(json, "\"CHARACTER\"");
    }
}
