//! Tweet document model and store.
//!
//! The tweet store registers no indexers: tweets are looked up by id only,
//! so the content table alone is sufficient.

use crate::db::{Db, DbResult};
use crate::store::repo::Repo;
use crate::store::schema::Schema;
use serde::{Deserialize, Serialize};

/// A media attachment on a collected tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub tweet_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Attachment {
    /// Filename the downloader stores this attachment under.
    pub fn local_filename(&self) -> String {
        let basename = self.url.rsplit('/').next().unwrap_or(self.url.as_str());
        format!("{}.{}.{}", self.tweet_id, self.kind, basename)
    }
}

/// The tweet document as captured from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub raw_data: Option<serde_json::Value>,
}

/// Schema for tweet documents; no derived indexes.
pub struct TweetStore {
    schema: Schema<Tweet>,
}

impl TweetStore {
    pub fn new() -> Self {
        Self {
            schema: Schema::define("tweets"),
        }
    }

    pub fn schema(&self) -> &Schema<Tweet> {
        &self.schema
    }

    pub fn create_tables(&self, db: &Db) -> DbResult<()> {
        self.schema.create_tables(db)
    }

    pub fn repo<'a>(&'a self, db: &'a Db) -> Repo<'a, Tweet> {
        Repo::new(db, &self.schema)
    }
}

impl Default for TweetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Attachment;

    #[test]
    fn local_filename_uses_last_url_segment() {
        let attachment = Attachment {
            tweet_id: "123".to_string(),
            kind: "photo".to_string(),
            url: "https://pbs.example.com/media/abc.jpg".to_string(),
        };
        assert_eq!(attachment.local_filename(), "123.photo.abc.jpg");
    }
}
