//! Default [`IndexEngine`] implementation over the record store.
//!
//! Each index owns a key prefix (`schema.base_path`); postings, sorter
//! values and master-list histograms are persisted hashes under it. Every
//! write diffs the record's new projection against the stored one, so
//! postings and histograms stay consistent without full rebuilds.

use crate::analysis::{self, Analyzer};
use crate::engine::IndexEngine;
use crate::error::{IndexError, Result};
use crate::query::{ParsedQuery, QueryNode};
use crate::source_path::{resolve, value_text};
use async_trait::async_trait;
use scribedb_commons::sort::compare_sort_pairs;
use scribedb_commons::{ChangeState, IdxData, IndexSchema, RecordId, SortDir, SortPair};
use scribedb_store::{RecordStore, StoreError};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Inverted index persisted through the record store.
pub struct InvertedIndex {
    store: Arc<RecordStore>,
}

impl InvertedIndex {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    fn id_hash_path(schema: &IndexSchema) -> String {
        format!("{}/_id", schema.base_path)
    }

    fn data_path(schema: &IndexSchema, id: &RecordId) -> String {
        format!("{}/_data/{}", schema.base_path, id)
    }

    fn word_path(schema: &IndexSchema, field_id: &str, token: &str) -> String {
        format!("{}/word/{}/{}", schema.base_path, field_id, token)
    }

    fn sorter_path(schema: &IndexSchema, sorter_id: &str) -> String {
        format!("{}/sorter/{}", schema.base_path, sorter_id)
    }

    fn summary_path(schema: &IndexSchema, field_id: &str) -> String {
        format!("{}/summary/{}", schema.base_path, field_id)
    }

    /// Computes the projection of one record under the given schema,
    /// skipping fields and sorters flagged for deletion.
    fn project(record: &Value, schema: &IndexSchema) -> IdxData {
        let mut data = IdxData::default();

        for field in &schema.fields {
            if field.delete {
                continue;
            }
            let resolved = resolve(record, &field.source).or_else(|| field.default_value.clone());
            let text = resolved.as_ref().map(value_text).unwrap_or_default();
            let tokens = Analyzer::for_field(field, schema).tokens(&text);
            if !tokens.is_empty() {
                data.words.insert(field.id.clone(), tokens);
            }
            if field.is_master_list() {
                let canonical = analysis::summary_value(&text);
                if !canonical.is_empty() {
                    data.values.insert(field.id.clone(), canonical);
                }
            }
        }

        for sorter in &schema.sorters {
            if sorter.delete {
                continue;
            }
            if let Some(resolved) = resolve(record, &sorter.source) {
                let value = if sorter.is_number() {
                    analysis::number_token(&value_text(&resolved))
                        .and_then(|t| t.parse::<f64>().ok())
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                } else {
                    Value::String(value_text(&resolved))
                };
                data.sorters.insert(sorter.id.clone(), value);
            }
        }

        data
    }

    async fn load_idx_data(&self, schema: &IndexSchema, id: &RecordId) -> Result<Option<IdxData>> {
        match self.store.get(&Self::data_path(schema, id)).await? {
            Some(value) => {
                let data = serde_json::from_value(value).map_err(StoreError::from)?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Applies the posting/sorter/summary deltas between two projections.
    async fn apply_diff(
        &self,
        schema: &IndexSchema,
        id: &RecordId,
        prior: &IdxData,
        next: &IdxData,
    ) -> Result<BTreeSet<String>> {
        let mut changed = BTreeSet::new();

        let field_ids: BTreeSet<&String> = prior.words.keys().chain(next.words.keys()).collect();
        for field_id in field_ids {
            let old_tokens = prior.words.get(field_id.as_str());
            let new_tokens = next.words.get(field_id.as_str());
            if old_tokens != new_tokens {
                changed.insert(field_id.to_string());
            }
            let old_set: BTreeSet<&str> = old_tokens
                .map(|t| t.iter().map(String::as_str).collect())
                .unwrap_or_default();
            let new_set: BTreeSet<&str> = new_tokens
                .map(|t| t.iter().map(String::as_str).collect())
                .unwrap_or_default();
            for token in old_set.difference(&new_set) {
                self.store
                    .hash_delete(&Self::word_path(schema, field_id, token), id.as_str())
                    .await?;
            }
            for token in new_set.difference(&old_set) {
                self.store
                    .hash_put(&Self::word_path(schema, field_id, token), id.as_str(), Value::from(1))
                    .await?;
            }
        }

        let value_fields: BTreeSet<&String> =
            prior.values.keys().chain(next.values.keys()).collect();
        for field_id in value_fields {
            let old_value = prior.values.get(field_id.as_str());
            let new_value = next.values.get(field_id.as_str());
            if old_value == new_value {
                continue;
            }
            changed.insert(field_id.to_string());
            let summary = Self::summary_path(schema, field_id);
            if let Some(old_value) = old_value {
                self.store.hash_incr(&summary, old_value, -1).await?;
            }
            if let Some(new_value) = new_value {
                self.store.hash_incr(&summary, new_value, 1).await?;
            }
        }

        let sorter_ids: BTreeSet<&String> =
            prior.sorters.keys().chain(next.sorters.keys()).collect();
        for sorter_id in sorter_ids {
            let old_value = prior.sorters.get(sorter_id.as_str());
            let new_value = next.sorters.get(sorter_id.as_str());
            if old_value == new_value {
                continue;
            }
            let path = Self::sorter_path(schema, sorter_id);
            match new_value {
                Some(value) => self.store.hash_put(&path, id.as_str(), value.clone()).await?,
                None => self.store.hash_delete(&path, id.as_str()).await?,
            }
        }

        Ok(changed)
    }

    fn eval_node<'a>(
        &'a self,
        node: &'a QueryNode,
        schema: &'a IndexSchema,
    ) -> BoxFuture<'a, Result<BTreeSet<String>>> {
        Box::pin(async move {
            match node {
                QueryNode::Term { field, term } => {
                    let field_def = schema.field(field).ok_or_else(|| {
                        IndexError::InvalidQuery(format!(
                            "field '{}' not found in index '{}'",
                            field, schema.id
                        ))
                    })?;
                    let tokens = Analyzer::for_field(field_def, schema).tokens(term);
                    if tokens.is_empty() {
                        return Ok(BTreeSet::new());
                    }
                    let mut acc: Option<BTreeSet<String>> = None;
                    for token in &tokens {
                        let posting = self
                            .store
                            .hash_get_all(&Self::word_path(schema, field, token))
                            .await?;
                        let ids: BTreeSet<String> = posting.keys().cloned().collect();
                        acc = Some(match acc.take() {
                            None => ids,
                            Some(prev) => prev.intersection(&ids).cloned().collect(),
                        });
                        if matches!(&acc, Some(set) if set.is_empty()) {
                            break;
                        }
                    }
                    Ok(acc.unwrap_or_default())
                }
                QueryNode::And(children) => {
                    let mut acc: Option<BTreeSet<String>> = None;
                    for child in children {
                        let ids = self.eval_node(child, schema).await?;
                        acc = Some(match acc.take() {
                            None => ids,
                            Some(prev) => prev.intersection(&ids).cloned().collect(),
                        });
                        if matches!(&acc, Some(set) if set.is_empty()) {
                            break;
                        }
                    }
                    Ok(acc.unwrap_or_default())
                }
                QueryNode::Or(children) => {
                    let mut acc = BTreeSet::new();
                    for child in children {
                        acc.extend(self.eval_node(child, schema).await?);
                    }
                    Ok(acc)
                }
                QueryNode::Not(child) => {
                    let matched = self.eval_node(child, schema).await?;
                    let universe = self.store.hash_get_all(&Self::id_hash_path(schema)).await?;
                    Ok(universe
                        .keys()
                        .filter(|id| !matched.contains(*id))
                        .cloned()
                        .collect())
                }
            }
        })
    }

    fn eval_single(node: &QueryNode, idx_data: &IdxData, schema: &IndexSchema) -> bool {
        match node {
            QueryNode::Term { field, term } => {
                let Some(field_def) = schema.field(field) else {
                    return false;
                };
                let tokens = Analyzer::for_field(field_def, schema).tokens(term);
                !tokens.is_empty() && tokens.iter().all(|t| idx_data.has_token(field, t))
            }
            QueryNode::And(children) => children
                .iter()
                .all(|c| Self::eval_single(c, idx_data, schema)),
            QueryNode::Or(children) => children
                .iter()
                .any(|c| Self::eval_single(c, idx_data, schema)),
            QueryNode::Not(child) => !Self::eval_single(child, idx_data, schema),
        }
    }
}

#[async_trait]
impl IndexEngine for InvertedIndex {
    fn parse_query(&self, query: &str, schema: &IndexSchema) -> Result<ParsedQuery> {
        crate::query::parse(query, schema)
    }

    async fn index_record(
        &self,
        id: &RecordId,
        record: &Value,
        schema: &IndexSchema,
    ) -> Result<ChangeState> {
        let prior = self.load_idx_data(schema, id).await?;
        let new_record = prior.is_none();
        let prior = prior.unwrap_or_default();
        let next = Self::project(record, schema);

        let changed = self.apply_diff(schema, id, &prior, &next).await?;

        let data_value = serde_json::to_value(&next).map_err(StoreError::from)?;
        self.store
            .put(&Self::data_path(schema, id), &data_value)
            .await?;
        self.store
            .hash_put(&Self::id_hash_path(schema), id.as_str(), Value::from(1))
            .await?;

        log::debug!(
            "indexed record '{}' in '{}' (new={}, changed={:?})",
            id,
            schema.id,
            new_record,
            changed
        );
        Ok(ChangeState::insert(id.clone(), next, new_record, changed))
    }

    async fn unindex_record(&self, id: &RecordId, schema: &IndexSchema) -> Result<ChangeState> {
        let prior = self.load_idx_data(schema, id).await?.ok_or_else(|| {
            IndexError::NotFound(format!("record '{}' not in index '{}'", id, schema.id))
        })?;

        self.apply_diff(schema, id, &prior, &IdxData::default())
            .await?;
        self.store.delete(&Self::data_path(schema, id)).await?;
        self.store
            .hash_delete(&Self::id_hash_path(schema), id.as_str())
            .await?;

        log::debug!("unindexed record '{}' from '{}'", id, schema.id);
        Ok(ChangeState::delete(id.clone(), prior))
    }

    async fn search_records(
        &self,
        query: &ParsedQuery,
        schema: &IndexSchema,
    ) -> Result<HashMap<RecordId, f64>> {
        let ids = self.eval_node(&query.root, schema).await?;
        Ok(ids.into_iter().map(|id| (RecordId::new(id), 1.0)).collect())
    }

    fn search_single(
        &self,
        query: &ParsedQuery,
        _id: &RecordId,
        idx_data: &IdxData,
        schema: &IndexSchema,
    ) -> bool {
        Self::eval_single(&query.root, idx_data, schema)
    }

    async fn sort_records(
        &self,
        results: &HashMap<RecordId, f64>,
        sort_by: &str,
        sort_dir: SortDir,
        schema: &IndexSchema,
    ) -> Result<Vec<SortPair>> {
        let sorter = schema.sorter(sort_by).ok_or_else(|| {
            IndexError::NotFound(format!(
                "sorter '{}' not found in index '{}'",
                sort_by, schema.id
            ))
        })?;
        let values = self
            .store
            .hash_get_all(&Self::sorter_path(schema, sort_by))
            .await?;

        let mut pairs: Vec<SortPair> = results
            .keys()
            .map(|id| {
                let value = values.get(id.as_str()).cloned().unwrap_or(Value::Null);
                SortPair::new(id.clone(), value)
            })
            .collect();
        let numeric = sorter.is_number();
        pairs.sort_by(|a, b| compare_sort_pairs(a, b, numeric, sort_dir));
        Ok(pairs)
    }

    async fn get_field_summary(
        &self,
        field_id: &str,
        schema: &IndexSchema,
    ) -> Result<BTreeMap<String, i64>> {
        let field = schema.field(field_id).ok_or_else(|| {
            IndexError::NotFound(format!(
                "field '{}' not found in index '{}'",
                field_id, schema.id
            ))
        })?;
        if !field.is_master_list() {
            return Err(IndexError::InvalidQuery(format!(
                "field '{}' has no master list",
                field_id
            )));
        }
        let raw = self
            .store
            .hash_get_all(&Self::summary_path(schema, field_id))
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(value, count)| {
                let count = count.as_i64().unwrap_or(0);
                (count > 0).then_some((value, count))
            })
            .collect())
    }

    async fn record_ids(&self, schema: &IndexSchema) -> Result<Vec<RecordId>> {
        let mut ids = Vec::new();
        self.store
            .hash_each_page(&Self::id_hash_path(schema), |page| {
                ids.extend(page.iter().map(|(id, _)| RecordId::new(id.clone())));
            })
            .await?;
        Ok(ids)
    }

    fn supported_types(&self) -> &'static [&'static str] {
        analysis::SUPPORTED_TYPES
    }

    fn supported_filters(&self) -> &'static [&'static str] {
        analysis::SUPPORTED_FILTERS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribedb_commons::{ChangeAction, FieldDefinition, SorterDefinition};
    use scribedb_store::MemoryBackend;
    use serde_json::json;

    fn schema() -> IndexSchema {
        let mut schema = IndexSchema::new(
            "myapp",
            vec![
                FieldDefinition::text("status", "/Status").with_master_list(true),
                FieldDefinition::text("title", "/Summary"),
                FieldDefinition::number("num_comments", "/Comments/Comment/length"),
            ],
        )
        .with_sorters(vec![SorterDefinition::new(
            "created",
            "/Createdate",
            Some("number"),
        )]);
        schema.base_path = "db/index/myapp".to_string();
        schema
    }

    fn engine() -> InvertedIndex {
        InvertedIndex::new(Arc::new(RecordStore::new(Arc::new(MemoryBackend::new()), 50)))
    }

    fn ticket(status: &str, summary: &str, comments: usize, created: i64) -> Value {
        json!({
            "Status": status,
            "Summary": summary,
            "Comments": {"Comment": vec![json!({"Text": "c"}); comments]},
            "Createdate": created,
        })
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let engine = engine();
        let schema = schema();
        let state = engine
            .index_record(
                &RecordId::new("2653"),
                &ticket("Open", "Apples and pears", 2, 100),
                &schema,
            )
            .await
            .unwrap();
        assert!(state.new_record);
        assert!(state.changed.contains("status"));

        engine
            .index_record(
                &RecordId::new("2654"),
                &ticket("Closed", "Bananas", 1, 90),
                &schema,
            )
            .await
            .unwrap();

        let query = engine.parse_query("status:open", &schema).unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key(&RecordId::new("2653")));

        let query = engine.parse_query("num_comments:1", &schema).unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key(&RecordId::new("2654")));
    }

    #[tokio::test]
    async fn test_reindex_same_record_is_not_new_and_diffs() {
        let engine = engine();
        let schema = schema();
        let id = RecordId::new("2653");
        engine
            .index_record(&id, &ticket("Open", "Apples", 0, 100), &schema)
            .await
            .unwrap();

        let state = engine
            .index_record(&id, &ticket("Closed", "Apples", 0, 100), &schema)
            .await
            .unwrap();
        assert!(!state.new_record);
        assert!(state.changed.contains("status"));
        assert!(!state.changed.contains("title"));

        let query = engine.parse_query("status:open", &schema).unwrap();
        assert!(engine.search_records(&query, &schema).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unindex_removes_everything() {
        let engine = engine();
        let schema = schema();
        let id = RecordId::new("2653");
        engine
            .index_record(&id, &ticket("Open", "Apples", 0, 100), &schema)
            .await
            .unwrap();

        let state = engine.unindex_record(&id, &schema).await.unwrap();
        assert_eq!(state.action, ChangeAction::Delete);
        assert!(state.idx_data.has_token("status", "open"));

        let query = engine.parse_query("status:open", &schema).unwrap();
        assert!(engine.search_records(&query, &schema).await.unwrap().is_empty());
        assert!(engine.record_ids(&schema).await.unwrap().is_empty());

        let missing = engine.unindex_record(&id, &schema).await;
        assert!(matches!(missing, Err(IndexError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_field_summary_counts() {
        let engine = engine();
        let schema = schema();
        for (i, status) in ["Open", "Open", "Closed"].iter().enumerate() {
            engine
                .index_record(
                    &RecordId::new(format!("{}", i)),
                    &ticket(status, "x", 0, i as i64),
                    &schema,
                )
                .await
                .unwrap();
        }

        let summary = engine.get_field_summary("status", &schema).await.unwrap();
        assert_eq!(summary.get("open"), Some(&2));
        assert_eq!(summary.get("closed"), Some(&1));

        // Flipping a record moves its count.
        engine
            .index_record(&RecordId::new("0"), &ticket("Closed", "x", 0, 0), &schema)
            .await
            .unwrap();
        let summary = engine.get_field_summary("status", &schema).await.unwrap();
        assert_eq!(summary.get("open"), Some(&1));
        assert_eq!(summary.get("closed"), Some(&2));
    }

    #[tokio::test]
    async fn test_summary_requires_master_list() {
        let engine = engine();
        let schema = schema();
        let err = engine.get_field_summary("title", &schema).await.unwrap_err();
        assert!(matches!(err, IndexError::InvalidQuery(_)));
        let err = engine.get_field_summary("nope", &schema).await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sort_records_numeric() {
        let engine = engine();
        let schema = schema();
        for (id, created) in [("a", 30), ("b", 10), ("c", 20)] {
            engine
                .index_record(&RecordId::new(id), &ticket("Open", "x", 0, created), &schema)
                .await
                .unwrap();
        }
        let query = engine.parse_query("status:open", &schema).unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();

        let pairs = engine
            .sort_records(&hits, "created", SortDir::Asc, &schema)
            .await
            .unwrap();
        let order: Vec<&str> = pairs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);

        let pairs = engine
            .sort_records(&hits, "created", SortDir::Desc, &schema)
            .await
            .unwrap();
        let order: Vec<&str> = pairs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);

        let err = engine
            .sort_records(&hits, "missing", SortDir::Asc, &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_single_matches_search_records() {
        let engine = engine();
        let schema = schema();
        let id = RecordId::new("2653");
        let state = engine
            .index_record(&id, &ticket("Open", "Apples pears", 2, 100), &schema)
            .await
            .unwrap();

        let hit = engine.parse_query("status:open title:apples", &schema).unwrap();
        let miss = engine.parse_query("status:closed", &schema).unwrap();
        assert!(engine.search_single(&hit, &id, &state.idx_data, &schema));
        assert!(!engine.search_single(&miss, &id, &state.idx_data, &schema));

        let negated = engine.parse_query("(status != \"closed\")", &schema).unwrap();
        assert!(engine.search_single(&negated, &id, &state.idx_data, &schema));
    }

    #[tokio::test]
    async fn test_boolean_grammar_evaluation() {
        let engine = engine();
        let schema = schema();
        engine
            .index_record(&RecordId::new("1"), &ticket("Open", "Apples", 0, 1), &schema)
            .await
            .unwrap();
        engine
            .index_record(&RecordId::new("2"), &ticket("Closed", "Pears", 0, 2), &schema)
            .await
            .unwrap();
        engine
            .index_record(&RecordId::new("3"), &ticket("Closed", "Apples", 0, 3), &schema)
            .await
            .unwrap();

        let query = engine
            .parse_query("(status = \"closed\" && title = \"apples\")", &schema)
            .unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key(&RecordId::new("3")));

        let query = engine
            .parse_query("(title = \"apples\" || title = \"pears\")", &schema)
            .unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();
        assert_eq!(hits.len(), 3);

        let query = engine.parse_query("(!(status = \"open\"))", &schema).unwrap();
        let hits = engine.search_records(&query, &schema).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
