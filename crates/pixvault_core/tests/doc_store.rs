use pixvault_core::{
    open_db_in_memory, Db, Doc, FieldType, IndexField, IndexHandle, Repo, RepoError, Schema,
};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    title: String,
    tags: Vec<String>,
    created_at: i64,
}

struct NoteStore {
    schema: Schema<Note>,
    idx_created_at: IndexHandle,
    idx_tag: IndexHandle,
}

fn note_store() -> NoteStore {
    let mut schema = Schema::define("notes");
    let idx_created_at = schema.add_indexer(
        vec![IndexField::descending("created_at", FieldType::Integer)],
        |note: &Note| vec![vec![Value::Integer(note.created_at)]],
    );
    let idx_tag = schema.add_indexer(
        vec![
            IndexField::new("tag", FieldType::Text),
            IndexField::descending("created_at", FieldType::Integer),
        ],
        |note: &Note| {
            note.tags
                .iter()
                .map(|tag| vec![Value::Text(tag.clone()), Value::Integer(note.created_at)])
                .collect()
        },
    );
    NoteStore {
        schema,
        idx_created_at,
        idx_tag,
    }
}

fn note(title: &str, tags: &[&str], created_at: i64) -> Note {
    Note {
        title: title.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        created_at,
    }
}

fn ready() -> (Db, NoteStore) {
    let db = open_db_in_memory().unwrap();
    let store = note_store();
    store.schema.create_tables(&db).unwrap();
    (db, store)
}

fn tag_rows(db: &Db, table: &str) -> Vec<(String, i64, String)> {
    let mut stmt = db
        .conn()
        .prepare(&format!(
            "SELECT tag, created_at, id FROM {table} ORDER BY id, tag;"
        ))
        .unwrap();
    let mut rows = stmt.query([]).unwrap();
    let mut result = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        result.push((
            row.get(0).unwrap(),
            row.get(1).unwrap(),
            row.get(2).unwrap(),
        ));
    }
    result
}

#[test]
fn get_missing_returns_none() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);
    assert!(repo.get("nope").unwrap().is_none());
}

#[test]
fn put_get_roundtrip() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    let first = note("first", &["red", "big"], 100);
    repo.put("1", &first).unwrap();

    let loaded = repo.get("1").unwrap().unwrap();
    assert_eq!(loaded.id, "1");
    assert_eq!(loaded.content, first);
}

#[test]
fn update_is_put_by_doc_identity() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    let doc = Doc::new("1", note("via update", &["a"], 5));
    repo.update(&doc).unwrap();
    assert_eq!(repo.get("1").unwrap().unwrap().content.title, "via update");
}

#[test]
fn index_rows_equal_extractor_output_exactly() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    repo.put("1", &note("n1", &["red", "big"], 100)).unwrap();
    repo.put("2", &note("n2", &["red"], 200)).unwrap();

    assert_eq!(
        tag_rows(&db, store.idx_tag.table_name()),
        vec![
            ("big".to_string(), 100, "1".to_string()),
            ("red".to_string(), 100, "1".to_string()),
            ("red".to_string(), 200, "2".to_string()),
        ]
    );
}

#[test]
fn repeated_put_with_unchanged_content_is_idempotent() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    let content = note("n1", &["red", "big"], 100);
    repo.put("1", &content).unwrap();
    let before = tag_rows(&db, store.idx_tag.table_name());
    repo.put("1", &content).unwrap();
    let after = tag_rows(&db, store.idx_tag.table_name());

    assert_eq!(before, after);
    assert_eq!(after.len(), 2);
}

#[test]
fn put_replaces_stale_index_rows() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    repo.put("1", &note("n1", &["red", "big"], 100)).unwrap();
    repo.put("1", &note("n1", &["small"], 150)).unwrap();

    assert_eq!(
        tag_rows(&db, store.idx_tag.table_name()),
        vec![("small".to_string(), 150, "1".to_string())]
    );
}

#[test]
fn empty_extraction_clears_index_rows() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    repo.put("1", &note("n1", &["red"], 100)).unwrap();
    repo.put("1", &note("n1", &[], 100)).unwrap();

    assert!(tag_rows(&db, store.idx_tag.table_name()).is_empty());
    // The single-row created_at index survives independently.
    let count: i64 = db
        .conn()
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM {};",
                store.idx_created_at.table_name()
            ),
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn count_tracks_documents_not_index_rows() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    assert_eq!(repo.count().unwrap(), 0);
    repo.put("1", &note("n1", &["a", "b", "c"], 1)).unwrap();
    repo.put("2", &note("n2", &[], 2)).unwrap();
    assert_eq!(repo.count().unwrap(), 2);
}

#[test]
fn all_returns_every_document() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    repo.put("1", &note("n1", &[], 1)).unwrap();
    repo.put("2", &note("n2", &[], 2)).unwrap();

    let mut ids: Vec<String> = repo.all().unwrap().into_iter().map(|doc| doc.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn scan_surfaces_malformed_rows_per_item_and_continues() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    repo.put("1", &note("good", &[], 1)).unwrap();
    db.conn()
        .execute(
            "INSERT INTO notes (id, content) VALUES ('bad', 'not json');",
            [],
        )
        .unwrap();
    repo.put("3", &note("also good", &[], 3)).unwrap();

    let mut good = Vec::new();
    let mut malformed = Vec::new();
    repo.scan(|item| match item {
        Ok(doc) => good.push(doc.id),
        Err(RepoError::MalformedContent { id, .. }) => malformed.push(id),
        Err(other) => panic!("unexpected error: {other}"),
    })
    .unwrap();

    good.sort();
    assert_eq!(good, vec!["1", "3"]);
    assert_eq!(malformed, vec!["bad"]);

    // The strict collector halts on the same row.
    assert!(matches!(
        repo.all(),
        Err(RepoError::MalformedContent { id, .. }) if id == "bad"
    ));
}

#[test]
fn failed_put_leaves_no_partial_state() {
    let db = open_db_in_memory().unwrap();
    let mut schema = Schema::define("notes");
    // Broken extractor: declares one field but emits two values per row.
    schema.add_indexer(
        vec![IndexField::new("tag", FieldType::Text)],
        |note: &Note| {
            note.tags
                .iter()
                .map(|tag| vec![Value::Text(tag.clone()), Value::Integer(note.created_at)])
                .collect()
        },
    );
    schema.create_tables(&db).unwrap();
    let repo = Repo::new(&db, &schema);

    let err = repo.put("1", &note("broken", &["a"], 1)).unwrap_err();
    assert!(matches!(err, RepoError::IndexEntryShape { .. }));

    // Content write rolled back together with the index writes.
    assert!(repo.get("1").unwrap().is_none());
    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn foreign_index_handle_is_rejected() {
    let (db, store) = ready();
    let repo = Repo::new(&db, &store.schema);

    let mut other_schema = Schema::<Note>::define("other_notes");
    let foreign = other_schema.add_indexer(
        vec![IndexField::new("tag", FieldType::Text)],
        |_: &Note| Vec::new(),
    );

    let err = repo.list_ordered(&foreign, 0, 10, true).unwrap_err();
    assert!(matches!(err, RepoError::UnknownIndex { .. }));
}
