//! The index engine contract consumed by the document core.
//!
//! The write path, the search facade and the live-view layer only ever talk
//! to this trait; [`crate::inverted::InvertedIndex`] is the default
//! implementation. `search_single` is deliberately synchronous: it
//! evaluates a query against an in-memory projection without touching
//! storage, which is what lets views classify writes cheaply.

use crate::error::Result;
use crate::query::ParsedQuery;
use async_trait::async_trait;
use scribedb_commons::{ChangeState, IdxData, IndexSchema, RecordId, SortDir, SortPair};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[async_trait]
pub trait IndexEngine: Send + Sync {
    /// Parses a query string against the schema. Routes `( ... )` to the
    /// boolean grammar and everything else to the simple syntax.
    fn parse_query(&self, query: &str, schema: &IndexSchema) -> Result<ParsedQuery>;

    /// Updates the inverted index for one record and reports what changed.
    async fn index_record(
        &self,
        id: &RecordId,
        record: &Value,
        schema: &IndexSchema,
    ) -> Result<ChangeState>;

    /// Removes a record's index entries; the returned state carries the
    /// prior projection for view notifications.
    async fn unindex_record(&self, id: &RecordId, schema: &IndexSchema) -> Result<ChangeState>;

    /// Full query evaluation over the posting lists.
    async fn search_records(
        &self,
        query: &ParsedQuery,
        schema: &IndexSchema,
    ) -> Result<HashMap<RecordId, f64>>;

    /// Predicate evaluation against an in-memory projection. No storage.
    fn search_single(
        &self,
        query: &ParsedQuery,
        id: &RecordId,
        idx_data: &IdxData,
        schema: &IndexSchema,
    ) -> bool;

    /// Materialises the sort order of a result set under one sorter.
    async fn sort_records(
        &self,
        results: &HashMap<RecordId, f64>,
        sort_by: &str,
        sort_dir: SortDir,
        schema: &IndexSchema,
    ) -> Result<Vec<SortPair>>;

    /// Value histogram of a master-list field.
    async fn get_field_summary(
        &self,
        field_id: &str,
        schema: &IndexSchema,
    ) -> Result<BTreeMap<String, i64>>;

    /// Snapshot of all record ids in the index, in id order.
    async fn record_ids(&self, schema: &IndexSchema) -> Result<Vec<RecordId>>;

    /// Field types this engine accepts in schemas.
    fn supported_types(&self) -> &'static [&'static str];

    /// Field filters this engine accepts in schemas.
    fn supported_filters(&self) -> &'static [&'static str];
}
