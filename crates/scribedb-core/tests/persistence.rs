//! Persistence through the file-system backend: schemas, records and index
//! projections survive a close/reopen cycle.

mod common;

use common::{records_of, ticket_schema, INDEX};
use scribedb_core::{Config, FileBackend, ScribeDb, SearchOptions};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_reopen_over_file_backend_restores_state() {
    let dir = TempDir::new().unwrap();

    {
        let backend = Arc::new(FileBackend::open(dir.path()).unwrap());
        let db = ScribeDb::open_with_backend(Config::new("db"), backend)
            .await
            .unwrap();
        db.create_index(ticket_schema()).await.unwrap();
        db.insert(
            INDEX,
            "2653",
            json!({"ID": "2653", "Status": "Open", "Summary": "Apples", "Modifydate": 1000}),
        )
        .await
        .unwrap();
        db.insert(
            INDEX,
            "2654",
            json!({"ID": "2654", "Status": "Closed", "Summary": "Pears", "Modifydate": 1100}),
        )
        .await
        .unwrap();
        db.shutdown().await;
    }

    // A fresh instance over the same directory sees everything.
    let backend = Arc::new(FileBackend::open(dir.path()).unwrap());
    let db = ScribeDb::open_with_backend(Config::new("db"), backend)
        .await
        .unwrap();

    let schema = db.get_index(INDEX).unwrap();
    assert_eq!(schema.fields.len(), 3);

    let body = db.get(INDEX, "2653").await.unwrap();
    assert_eq!(body["Summary"], "Apples");

    let (records, total) = records_of(
        db.search(INDEX, "status:closed", SearchOptions::default())
            .await
            .unwrap(),
    );
    assert_eq!(total, 1);
    assert_eq!(records[0]["ID"], "2654");

    // Writes keep working against the reopened store.
    db.update(INDEX, "2653", &json!({"Status": "Closed"}))
        .await
        .unwrap();
    let (_, total) = records_of(
        db.search(INDEX, "status:closed", SearchOptions::default())
            .await
            .unwrap(),
    );
    assert_eq!(total, 2);
}

#[tokio::test]
async fn test_subscription_over_file_backend() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend::open(dir.path()).unwrap());
    let db = ScribeDb::open_with_backend(Config::new("db"), backend)
        .await
        .unwrap();
    db.create_index(ticket_schema()).await.unwrap();
    db.insert(
        INDEX,
        "2653",
        json!({"ID": "2653", "Status": "Closed", "Summary": "Apples", "Modifydate": 1000}),
    )
    .await
    .unwrap();

    let mut sub = db
        .subscribe(INDEX, "status:closed", SearchOptions::default())
        .unwrap();
    db.wait_for_view_updates().await;
    match sub.try_event().expect("initial change") {
        scribedb_core::SubscriberEvent::Change { records, total } => {
            assert_eq!(total, 1);
            assert_eq!(records[0]["ID"], "2653");
        }
        other => panic!("unexpected event {:?}", other),
    }
}
