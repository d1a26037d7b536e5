//! Face cluster document model and store.
//!
//! # Responsibility
//! - Group detected faces across images into identity clusters.
//! - Index cluster membership so tag queries can filter images by identity.
//!
//! # Invariants
//! - A face is referenced by `(image_id, index)` where `index` is the face's
//!   position in the image's detected-face list.

use crate::db::{Db, DbResult};
use crate::store::doc::Doc;
use crate::store::repo::{Repo, RepoResult};
use crate::store::schema::{FieldType, IndexField, IndexHandle, Schema};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one detected face belonging to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceClusterFace {
    pub image_id: String,
    pub index: i64,
    pub embedding_hash: String,
}

/// An identity cluster of faces, optionally labeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceCluster {
    pub label: Option<String>,
    #[serde(default)]
    pub wikidata_qid: Option<String>,
    pub faces: Vec<FaceClusterFace>,
}

/// Schema, face-ref indexer and lookups for face clusters.
pub struct FaceClusterStore {
    schema: Schema<FaceCluster>,
    pub idx_face_ref: IndexHandle,
}

impl FaceClusterStore {
    pub fn new() -> Self {
        let mut schema = Schema::define("face_clusters");
        let idx_face_ref = schema.add_indexer(
            vec![
                IndexField::new("image_id", FieldType::Text),
                IndexField::new("index", FieldType::Integer),
            ],
            |cluster: &FaceCluster| {
                cluster
                    .faces
                    .iter()
                    .map(|face| {
                        vec![
                            Value::Text(face.image_id.clone()),
                            Value::Integer(face.index),
                        ]
                    })
                    .collect()
            },
        );
        Self {
            schema,
            idx_face_ref,
        }
    }

    pub fn schema(&self) -> &Schema<FaceCluster> {
        &self.schema
    }

    pub fn create_tables(&self, db: &Db) -> DbResult<()> {
        self.schema.create_tables(db)
    }

    pub fn repo<'a>(&'a self, db: &'a Db) -> Repo<'a, FaceCluster> {
        Repo::new(db, &self.schema)
    }

    /// Fresh cluster id for newly formed clusters.
    pub fn new_cluster_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Finds the cluster containing the face `(image_id, index)`, if any.
    pub fn get_by_face_ref(
        &self,
        db: &Db,
        image_id: &str,
        index: i64,
    ) -> RepoResult<Option<Doc<FaceCluster>>> {
        let clusters = self.repo(db).query_docs(
            &format!(
                "SELECT d.id AS id, d.content AS content
                 FROM face_clusters d
                 JOIN {index} ix ON ix.id = d.id
                 WHERE ix.image_id = ?1 AND ix.\"index\" = ?2;",
                index = self.idx_face_ref.table_name()
            ),
            vec![Value::Text(image_id.to_string()), Value::Integer(index)],
        )?;
        Ok(clusters.into_iter().next())
    }
}

impl Default for FaceClusterStore {
    fn default() -> Self {
        Self::new()
    }
}
