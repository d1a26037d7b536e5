use pixvault_core::model::character::{Character, CharacterStore};
use pixvault_core::model::face_cluster::{FaceCluster, FaceClusterFace, FaceClusterStore};
use pixvault_core::model::image::{Image, ImageStore, ImageTag, Vector};
use pixvault_core::model::tweet::{Attachment, Tweet, TweetStore};
use pixvault_core::{open_db_in_memory, Db};
use std::collections::BTreeMap;

fn setup_images() -> (Db, ImageStore) {
    let db = open_db_in_memory().unwrap();
    let images = ImageStore::new();
    images.create_tables(&db).unwrap();
    (db, images)
}

fn image(id: &str, collected_at: i64) -> Image {
    Image {
        id: id.to_string(),
        local_filename: format!("{id}.jpg"),
        collected_at,
        source_url: None,
        tweet_id: None,
        tweet_username: None,
        tags: Some(Vec::new()),
        manual_tags: None,
        embedding: None,
        embeddings: None,
        faces: None,
    }
}

#[test]
fn pagination_past_the_end_returns_remainder_then_nothing() {
    let (db, images) = setup_images();
    let repo = images.repo(&db);
    for i in 0..25 {
        repo.put(&format!("img{i:02}"), &image(&format!("img{i:02}"), 1000 + i))
            .unwrap();
    }

    // Newest-first: offset 20 skips img24..img05, leaving the 5 oldest.
    let page = images.list_by_collected_at(&db, 20, 10, true).unwrap();
    let ids: Vec<String> = page.into_iter().map(|doc| doc.id).collect();
    assert_eq!(ids, vec!["img04", "img03", "img02", "img01", "img00"]);

    let empty = images.list_by_collected_at(&db, 25, 10, true).unwrap();
    assert!(empty.is_empty());
    let far_out = images.list_by_collected_at(&db, 1000, 10, true).unwrap();
    assert!(far_out.is_empty());
}

#[test]
fn ascending_order_flips_the_page() {
    let (db, images) = setup_images();
    let repo = images.repo(&db);
    for i in 0..3 {
        repo.put(&format!("img{i}"), &image(&format!("img{i}"), 1000 + i))
            .unwrap();
    }

    let ids: Vec<String> = images
        .list_by_collected_at(&db, 0, 10, false)
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    assert_eq!(ids, vec!["img0", "img1", "img2"]);
}

#[test]
fn needs_autotagging_tracks_untagged_documents() {
    let (db, images) = setup_images();
    let repo = images.repo(&db);

    let mut img = image("a", 1);
    img.tags = None;
    repo.put("a", &img).unwrap();
    repo.put("b", &image("b", 2)).unwrap();

    let pending: Vec<String> = images
        .list_needs_autotagging(&db)
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    assert_eq!(pending, vec!["a"]);

    // An empty tag list means the tagger ran and found nothing.
    img.tags = Some(Vec::new());
    repo.put("a", &img).unwrap();
    assert!(images.list_needs_autotagging(&db).unwrap().is_empty());
}

#[test]
fn embedding_presence_lists_split_by_kind() {
    let (db, images) = setup_images();
    let repo = images.repo(&db);

    let mut with_clip = image("a", 1);
    let mut embeddings = BTreeMap::new();
    embeddings.insert(
        "clip".to_string(),
        Vector {
            data: "AAAA".to_string(),
            dtype: "float32".to_string(),
        },
    );
    with_clip.embeddings = Some(embeddings);
    repo.put("a", &with_clip).unwrap();
    repo.put("b", &image("b", 2)).unwrap();

    let has: Vec<String> = images
        .list_has_embedding(&db, "clip")
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    assert_eq!(has, vec!["a"]);

    let mut needs: Vec<String> = images
        .list_needs_embedding(&db, "clip")
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    needs.sort();
    assert_eq!(needs, vec!["b"]);

    let mut needs_dino: Vec<String> = images
        .list_needs_embedding(&db, "dinov2")
        .unwrap()
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    needs_dino.sort();
    assert_eq!(needs_dino, vec!["a", "b"]);
}

#[test]
fn score_index_orders_mixed_manual_and_auto_tags() {
    let (db, images) = setup_images();
    let repo = images.repo(&db);

    let mut img = image("a", 1);
    img.tags = Some(vec![ImageTag {
        tag: "auto".to_string(),
        kind: None,
        score: Some(0.4),
    }]);
    img.manual_tags = Some(vec![ImageTag {
        tag: "manual".to_string(),
        kind: None,
        score: None,
    }]);
    repo.put("a", &img).unwrap();

    let mut stmt = db
        .conn()
        .prepare(&format!(
            "SELECT tag, score FROM {} ORDER BY score DESC;",
            images.idx_tag_score.table_name()
        ))
        .unwrap();
    let mut rows = stmt.query([]).unwrap();
    let mut scored = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        let tag: String = row.get(0).unwrap();
        let score: f64 = row.get(1).unwrap();
        scored.push((tag, score));
    }
    assert_eq!(
        scored,
        vec![("manual".to_string(), 1.0), ("auto".to_string(), 0.4)]
    );
}

#[test]
fn face_ref_lookup_finds_the_owning_cluster() {
    let db = open_db_in_memory().unwrap();
    let clusters = FaceClusterStore::new();
    clusters.create_tables(&db).unwrap();

    let cluster = FaceCluster {
        label: None,
        wikidata_qid: None,
        faces: vec![
            FaceClusterFace {
                image_id: "img1".to_string(),
                index: 0,
                embedding_hash: "h0".to_string(),
            },
            FaceClusterFace {
                image_id: "img1".to_string(),
                index: 1,
                embedding_hash: "h1".to_string(),
            },
        ],
    };
    let id = FaceClusterStore::new_cluster_id();
    clusters.repo(&db).put(&id, &cluster).unwrap();

    let found = clusters.get_by_face_ref(&db, "img1", 1).unwrap().unwrap();
    assert_eq!(found.id, id);
    assert!(clusters.get_by_face_ref(&db, "img1", 9).unwrap().is_none());
    assert!(clusters.get_by_face_ref(&db, "img2", 0).unwrap().is_none());
}

#[test]
fn character_search_orders_by_post_count() {
    let db = open_db_in_memory().unwrap();
    let characters = CharacterStore::new();
    characters.create_tables(&db).unwrap();
    let repo = characters.repo(&db);

    let mk = |id: &str, name: &str, posts: Option<i64>| Character {
        id: id.to_string(),
        name: name.to_string(),
        danbooru_id: None,
        danbooru_post_count: posts,
        danbooru_created_at: None,
    };
    repo.put("1", &mk("1", "anya", Some(50))).unwrap();
    repo.put("2", &mk("2", "lana", Some(500))).unwrap();
    repo.put("3", &mk("3", "bob", Some(9000))).unwrap();

    let hits: Vec<String> = characters
        .search(&db, "an", 10)
        .unwrap()
        .into_iter()
        .map(|doc| doc.content.name)
        .collect();
    assert_eq!(hits, vec!["lana", "anya"]);
}

#[test]
fn tweet_store_round_trips_without_indexes() {
    let db = open_db_in_memory().unwrap();
    let tweets = TweetStore::new();
    tweets.create_tables(&db).unwrap();
    let repo = tweets.repo(&db);

    let tweet = Tweet {
        id: "123".to_string(),
        username: Some("artist".to_string()),
        attachments: vec![Attachment {
            tweet_id: "123".to_string(),
            kind: "photo".to_string(),
            url: "https://pbs.example.com/media/abc.jpg".to_string(),
        }],
        raw_data: Some(serde_json::json!({"lang": "ja"})),
    };
    repo.put("123", &tweet).unwrap();

    let loaded = repo.get("123").unwrap().unwrap();
    assert_eq!(loaded.content, tweet);
    assert_eq!(repo.count().unwrap(), 1);
}
