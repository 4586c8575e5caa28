//! Tests for the bundled SQLite record store
//!
//! Seeding goes through the store's inherent host-side methods; assertions
//! go through the `RecordStore` trait the engine uses.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{
    db::{
        repos::{OverdueQuery, RecordStore},
        sqlite::SqliteRecordStore,
        tests::harness::migrated_sqlite_pool,
    },
    models::{Category, RecordStatus, normalize_field_value},
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn overdue(category_id: &str, cutoff: DateTime<Utc>) -> OverdueQuery {
    OverdueQuery {
        category_id: category_id.to_string(),
        cutoff,
        include_trash: false,
        require_files: false,
        after_id: None,
        limit: 100,
    }
}

async fn create_store() -> SqliteRecordStore {
    let store = SqliteRecordStore::new(migrated_sqlite_pool().await);
    store
        .upsert_category(
            &Category {
                id: "contact".to_string(),
                label: "Contact form".to_string(),
            },
            1,
        )
        .await
        .unwrap();
    store
        .upsert_category(
            &Category {
                id: "applications".to_string(),
                label: "Applications".to_string(),
            },
            0,
        )
        .await
        .unwrap();
    store.add_file_field("applications", "cv").await.unwrap();
    store
}

#[tokio::test]
async fn test_list_categories_ordered_by_position() {
    let store = create_store().await;

    let categories = store.list_categories().await.unwrap();
    let ids: Vec<&str> = categories.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["applications", "contact"]);
    assert_eq!(categories[1].label, "Contact form");
}

#[tokio::test]
async fn test_query_overdue_respects_cutoff() {
    let store = create_store().await;
    let old = store
        .create_record("contact", now() - Duration::days(40), &RecordStatus::Active)
        .await
        .unwrap();
    store
        .create_record("contact", now() - Duration::days(10), &RecordStatus::Active)
        .await
        .unwrap();
    store
        .create_record("applications", now() - Duration::days(40), &RecordStatus::Active)
        .await
        .unwrap();

    let query = overdue("contact", now() - Duration::days(30));
    let records = store.query_overdue(&query).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, old.id);
    assert_eq!(records[0].created_at, now() - Duration::days(40));
    assert_eq!(store.count_overdue(&query).await.unwrap(), 1);
}

#[tokio::test]
async fn test_query_overdue_trash_filter() {
    let store = create_store().await;
    store
        .create_record("contact", now() - Duration::days(40), &RecordStatus::Active)
        .await
        .unwrap();
    store
        .create_record("contact", now() - Duration::days(40), &RecordStatus::Trash)
        .await
        .unwrap();

    let mut query = overdue("contact", now());
    assert_eq!(store.count_overdue(&query).await.unwrap(), 1);

    query.include_trash = true;
    assert_eq!(store.count_overdue(&query).await.unwrap(), 2);
}

#[tokio::test]
async fn test_query_overdue_require_files() {
    let store = create_store().await;
    let created = now() - Duration::days(40);
    let with_file = store
        .create_record("applications", created, &RecordStatus::Active)
        .await
        .unwrap();
    store
        .set_field_value(with_file.id, "cv", "/srv/uploads/cv.pdf")
        .await
        .unwrap();

    let empty_array = store
        .create_record("applications", created, &RecordStatus::Active)
        .await
        .unwrap();
    store.set_field_value(empty_array.id, "cv", "[]").await.unwrap();

    let other_field = store
        .create_record("applications", created, &RecordStatus::Active)
        .await
        .unwrap();
    store
        .set_field_value(other_field.id, "notes", "/srv/uploads/notes.txt")
        .await
        .unwrap();

    let mut query = overdue("applications", now());
    query.require_files = true;
    let records = store.query_overdue(&query).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, with_file.id);
}

#[tokio::test]
async fn test_require_files_matches_normalized_references() {
    let store = create_store().await;
    let created = now() - Duration::days(40);

    let mut expected = Vec::new();
    for (value, has_reference) in [
        (r#"[""]"#, false),
        (r#"[[]]"#, false),
        (r#"[" ", [""]]"#, false),
        ("   ", false),
        (r#"["/srv/uploads/a.pdf"]"#, true),
        (r#"[[], ["/srv/uploads/b.pdf"]]"#, true),
        ("[not json", true),
    ] {
        let record = store
            .create_record("applications", created, &RecordStatus::Active)
            .await
            .unwrap();
        store.set_field_value(record.id, "cv", value).await.unwrap();

        let raw = store.get_field_value(record.id, "cv").await.unwrap().unwrap();
        assert_eq!(
            !normalize_field_value(&raw).is_empty(),
            has_reference,
            "normalizer disagrees for {value}"
        );
        if has_reference {
            expected.push(record.id);
        }
    }

    let mut query = overdue("applications", now());
    query.require_files = true;
    let ids: Vec<i64> = store
        .query_overdue(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, expected);
    assert_eq!(store.count_overdue(&query).await.unwrap(), expected.len() as u64);
}

#[tokio::test]
async fn test_query_overdue_keyset_and_limit() {
    let store = create_store().await;
    let mut ids = Vec::new();
    for _ in 0..5 {
        let record = store
            .create_record("contact", now() - Duration::days(40), &RecordStatus::Active)
            .await
            .unwrap();
        ids.push(record.id);
    }

    let mut query = overdue("contact", now());
    query.limit = 2;
    let first = store.query_overdue(&query).await.unwrap();
    assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), ids[..2]);

    query.after_id = Some(ids[1]);
    let second = store.query_overdue(&query).await.unwrap();
    assert_eq!(second.iter().map(|r| r.id).collect::<Vec<_>>(), ids[2..4]);

    // Counting ignores the limit but honors the cursor
    assert_eq!(store.count_overdue(&query).await.unwrap(), 3);
}

#[tokio::test]
async fn test_soft_delete() {
    let store = create_store().await;
    let record = store
        .create_record("contact", now(), &RecordStatus::Active)
        .await
        .unwrap();

    assert!(store.soft_delete(record.id).await.unwrap());
    let stored = store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::Trash);

    // Already trashed
    assert!(!store.soft_delete(record.id).await.unwrap());
}

#[tokio::test]
async fn test_hard_delete_removes_fields() {
    let store = create_store().await;
    let record = store
        .create_record("applications", now(), &RecordStatus::Trash)
        .await
        .unwrap();
    store
        .set_field_value(record.id, "cv", "/srv/uploads/cv.pdf")
        .await
        .unwrap();

    assert!(store.hard_delete(record.id).await.unwrap());
    assert!(store.get_record(record.id).await.unwrap().is_none());
    assert!(store.get_field_value(record.id, "cv").await.unwrap().is_none());
    assert!(!store.hard_delete(record.id).await.unwrap());
}

#[tokio::test]
async fn test_file_fields_and_values() {
    let store = create_store().await;
    assert_eq!(
        store.list_file_fields("applications").await.unwrap(),
        vec!["cv".to_string()]
    );
    assert!(store.list_file_fields("contact").await.unwrap().is_empty());

    let record = store
        .create_record("applications", now(), &RecordStatus::Other("draft".into()))
        .await
        .unwrap();
    store
        .set_field_value(record.id, "cv", r#"["/a.pdf","/b.pdf"]"#)
        .await
        .unwrap();

    let value = store.get_field_value(record.id, "cv").await.unwrap();
    assert_eq!(
        value,
        Some(serde_json::Value::String(r#"["/a.pdf","/b.pdf"]"#.to_string()))
    );

    let stored = store.get_record(record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::Other("draft".to_string()));
}
