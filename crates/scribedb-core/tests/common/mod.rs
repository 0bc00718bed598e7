//! Shared fixture for the scenario tests: a ticket index seeded with 13
//! records (2 Open, 11 Closed), in the shape the scenarios expect.

#![allow(dead_code)]

use scribedb_core::{Config, FieldDefinition, IndexSchema, ScribeDb, SearchResult};
use serde_json::{json, Value};

pub const INDEX: &str = "myapp";

/// Ids 2653..=2665; 2653 and 2654 are Open, the remaining 11 Closed.
pub const TICKET_IDS: [&str; 13] = [
    "2653", "2654", "2655", "2656", "2657", "2658", "2659", "2660", "2661", "2662", "2663",
    "2664", "2665",
];

pub fn ticket_schema() -> IndexSchema {
    IndexSchema::new(
        INDEX,
        vec![
            FieldDefinition::text("status", "/Status"),
            FieldDefinition::text("title", "/Summary"),
            FieldDefinition::text("modified", "/Modifydate"),
        ],
    )
}

/// Comment count per ticket: exactly one ticket (2655) has exactly one
/// comment.
pub fn comment_count(index: usize) -> usize {
    match TICKET_IDS[index] {
        "2653" => 2,
        "2655" => 1,
        "2660" => 3,
        _ => 0,
    }
}

/// Create and modify timestamps are different permutations of the same
/// value set, so the two sort orders disagree.
pub fn createdate(index: usize) -> i64 {
    1000 + ((index * 5) % 13) as i64 * 10
}

pub fn modifydate(index: usize) -> i64 {
    1000 + ((index * 7) % 13) as i64 * 10
}

pub fn ticket(index: usize) -> Value {
    let id = TICKET_IDS[index];
    let status = if index < 2 { "Open" } else { "Closed" };
    json!({
        "ID": id,
        "Status": status,
        "Summary": format!("Ticket {}", id),
        "Comments": {
            "Comment": vec![json!({"Text": "a comment"}); comment_count(index)]
        },
        "Createdate": createdate(index),
        "Modifydate": modifydate(index),
    })
}

/// Opens an in-memory instance with the ticket index created and all 13
/// records loaded.
pub async fn seeded_db() -> ScribeDb {
    let db = ScribeDb::open(Config::new("db")).await.expect("open");
    db.create_index(ticket_schema()).await.expect("create index");

    let entries: Vec<Value> = (0..TICKET_IDS.len())
        .map(|i| json!({"id": TICKET_IDS[i], "data": ticket(i)}))
        .collect();
    db.bulk_insert(INDEX, &entries).await.expect("bulk insert");
    db
}

/// Unwraps a record-page search result.
pub fn records_of(result: SearchResult) -> (Vec<Value>, usize) {
    match result {
        SearchResult::Records { records, total } => (records, total),
        SearchResult::Summary { .. } => panic!("expected records, got summary"),
    }
}

pub fn ids_of(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|r| r["ID"].as_str().expect("ID field").to_string())
        .collect()
}
