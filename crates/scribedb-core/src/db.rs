//! The ScribeDB facade.
//!
//! One [`ScribeDb`] instance owns the store, the index engine, the schema
//! registry, the job manager and the view manager. Admin operations live in
//! [`crate::admin`]; the write path in [`crate::mutator`].

use crate::error::{Result, ScribeDbError};
use crate::mutator::Mutator;
use crate::registry::IndexRegistry;
use scribedb_commons::sort::compare_sort_pairs;
use scribedb_commons::{Config, IndexName, IndexSchema, Job, RecordId, SortDir, SortPair};
use scribedb_index::{IndexEngine, InvertedIndex};
use scribedb_jobs::JobManager;
use scribedb_live::{SubscribeOptions, Subscriber, ViewManager};
use scribedb_store::{MemoryBackend, RecordStore, StorageBackend, StoreStats};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const ID_SORT: &str = "_id";

/// Options for `search` and `subscribe`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub offset: usize,
    /// `None` returns the whole result set.
    pub limit: Option<usize>,
    /// Defaults to the record id.
    pub sort_by: Option<String>,
    pub sort_dir: SortDir,
    /// Only consulted for the id sort (`"number"` selects numeric order).
    pub sort_type: Option<String>,
}

/// Result of a `search` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Records { records: Vec<Value>, total: usize },
    Summary { values: BTreeMap<String, i64> },
}

/// Operational counters for `get_stats`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub store: StoreStats,
    pub jobs: Vec<Job>,
    pub views: usize,
    pub indexes: usize,
}

/// An embeddable document store with live queries.
pub struct ScribeDb {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<RecordStore>,
    pub(crate) engine: Arc<dyn IndexEngine>,
    pub(crate) registry: IndexRegistry,
    pub(crate) jobs: Arc<JobManager>,
    pub(crate) views: Arc<ViewManager>,
    pub(crate) mutator: Mutator,
}

impl ScribeDb {
    /// Opens an in-memory instance.
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_backend(config, Arc::new(MemoryBackend::new())).await
    }

    /// Opens an instance over any storage backend.
    pub async fn open_with_backend(
        config: Config,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(RecordStore::new(backend, config.hash_page_size));
        let engine: Arc<dyn IndexEngine> = Arc::new(InvertedIndex::new(Arc::clone(&store)));
        let views = Arc::new(ViewManager::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&engine),
        ));
        let registry = IndexRegistry::new(Arc::clone(&config), Arc::clone(&store));
        registry.load().await?;
        let mutator = Mutator::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&engine),
            Arc::clone(&views),
        );

        log::info!(
            "scribedb opened at '{}' ({} indexes)",
            config.base_path,
            registry.len()
        );
        Ok(Self {
            config,
            store,
            engine,
            registry,
            jobs: Arc::new(JobManager::new()),
            views,
            mutator,
        })
    }

    pub(crate) fn record_id(id: &str) -> Result<RecordId> {
        if id.is_empty() || id.contains('/') {
            return Err(ScribeDbError::InvalidUpdate(format!(
                "invalid record id '{}'",
                id
            )));
        }
        Ok(RecordId::new(id))
    }

    // ---- records ----

    pub async fn insert(&self, index: &str, id: &str, record: Value) -> Result<()> {
        let schema = self.registry.require(&IndexName::new(index))?;
        self.mutator
            .insert(&schema, &Self::record_id(id)?, record)
            .await
    }

    /// Sparse merge update; see the mutator for the sugared string forms.
    pub async fn update(&self, index: &str, id: &str, patch: &Value) -> Result<Value> {
        let schema = self.registry.require(&IndexName::new(index))?;
        self.mutator
            .update(&schema, &Self::record_id(id)?, patch)
            .await
    }

    /// Update through a transform; returning `None` aborts.
    pub async fn update_with<F>(&self, index: &str, id: &str, transform: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Option<Value>,
    {
        let schema = self.registry.require(&IndexName::new(index))?;
        self.mutator
            .update_with(&schema, &Self::record_id(id)?, transform)
            .await
    }

    pub async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let schema = self.registry.require(&IndexName::new(index))?;
        self.mutator.delete(&schema, &Self::record_id(id)?).await
    }

    pub async fn get(&self, index: &str, id: &str) -> Result<Value> {
        let schema = self.registry.require(&IndexName::new(index))?;
        let key = self
            .config
            .record_path(&schema.id, &Self::record_id(id)?);
        self.store.get(&key).await?.ok_or_else(|| {
            ScribeDbError::NotFound(format!("record '{}' in index '{}'", id, index))
        })
    }

    /// Bulk fetch; the result aligns with `ids`.
    pub async fn get_multi(&self, index: &str, ids: &[&str]) -> Result<Vec<Option<Value>>> {
        let schema = self.registry.require(&IndexName::new(index))?;
        let mut keys = Vec::with_capacity(ids.len());
        for id in ids {
            keys.push(self.config.record_path(&schema.id, &Self::record_id(id)?));
        }
        Ok(self.store.get_multi(&keys).await?)
    }

    /// Inserts `{id, data}` entries in order; malformed entries fail the
    /// whole call up front. Already-inserted records are not rolled back on
    /// a later storage failure.
    pub async fn bulk_insert(&self, index: &str, records: &[Value]) -> Result<usize> {
        let schema = self.registry.require(&IndexName::new(index))?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ScribeDbError::InvalidUpdate(
                        "bulk record is missing a string 'id'".to_string(),
                    )
                })?;
            let data = record.get("data").ok_or_else(|| {
                ScribeDbError::InvalidUpdate(format!("bulk record '{}' is missing 'data'", id))
            })?;
            entries.push((Self::record_id(id)?, data.clone()));
        }

        for (id, data) in &entries {
            self.mutator.insert(&schema, id, data.clone()).await?;
        }
        Ok(entries.len())
    }

    pub async fn bulk_update(&self, index: &str, ids: &[&str], patch: &Value) -> Result<usize> {
        let schema = self.registry.require(&IndexName::new(index))?;
        for id in ids {
            self.mutator
                .update(&schema, &Self::record_id(id)?, patch)
                .await?;
        }
        Ok(ids.len())
    }

    pub async fn bulk_delete(&self, index: &str, ids: &[&str]) -> Result<usize> {
        let schema = self.registry.require(&IndexName::new(index))?;
        for id in ids {
            self.mutator.delete(&schema, &Self::record_id(id)?).await?;
        }
        Ok(ids.len())
    }

    // ---- queries ----

    /// Ad-hoc query with sort and pagination. A `#summary:<field>` query
    /// returns the field's value histogram instead of records.
    pub async fn search(
        &self,
        index: &str,
        query: &str,
        opts: SearchOptions,
    ) -> Result<SearchResult> {
        let schema = self.registry.require(&IndexName::new(index))?;

        if let Some(field_id) = scribedb_live::parse_summary_field(query) {
            let values = self.engine.get_field_summary(&field_id, &schema).await?;
            return Ok(SearchResult::Summary { values });
        }

        let parsed = self.engine.parse_query(query, &schema)?;
        let hits = self.engine.search_records(&parsed, &schema).await?;

        let sort_by = opts.sort_by.as_deref().unwrap_or(ID_SORT);
        let pairs = if sort_by == ID_SORT {
            let numeric = opts.sort_type.as_deref() == Some("number");
            let mut pairs: Vec<SortPair> = hits
                .keys()
                .map(|id| SortPair::new(id.clone(), Value::String(id.to_string())))
                .collect();
            pairs.sort_by(|a, b| compare_sort_pairs(a, b, numeric, opts.sort_dir));
            pairs
        } else {
            self.engine
                .sort_records(&hits, sort_by, opts.sort_dir, &schema)
                .await?
        };

        let total = pairs.len();
        let end = opts
            .offset
            .saturating_add(opts.limit.unwrap_or(usize::MAX))
            .min(total);
        let page = if opts.offset < end {
            &pairs[opts.offset..end]
        } else {
            &[]
        };

        let keys: Vec<String> = page
            .iter()
            .map(|pair| self.config.record_path(&schema.id, &pair.id))
            .collect();
        let records: Vec<Value> = self
            .store
            .get_multi(&keys)
            .await?
            .into_iter()
            .flatten()
            .collect();

        Ok(SearchResult::Records { records, total })
    }

    /// Attaches a live subscriber to the query's shared view. The first
    /// `Change` (or `Summary`) event carries the initial result page.
    pub fn subscribe(&self, index: &str, query: &str, opts: SearchOptions) -> Result<Subscriber> {
        let schema = self.registry.require(&IndexName::new(index))?;
        let live_opts = SubscribeOptions {
            offset: opts.offset,
            limit: opts.limit,
            sort_by: opts.sort_by,
            sort_dir: opts.sort_dir,
            sort_type: opts.sort_type,
        };
        Ok(self.views.subscribe(schema, query, live_opts)?)
    }

    // ---- ops ----

    pub fn get_index(&self, index: &str) -> Result<Arc<IndexSchema>> {
        self.registry.require(&IndexName::new(index))
    }

    pub fn get_stats(&self) -> Stats {
        Stats {
            store: self.store.stats(),
            jobs: self.jobs.all(),
            views: self.views.view_count(),
            indexes: self.registry.len(),
        }
    }

    /// Blocks until every background job has finished.
    pub async fn wait_for_all_jobs(&self) {
        self.jobs.wait_for_all().await;
    }

    /// Waits for the view-update queue to drain. Mostly useful in tests
    /// that assert on delivered events.
    pub async fn wait_for_view_updates(&self) {
        self.store.wait_idle().await;
    }

    /// Drains jobs and the view queue, destroys every view and stops the
    /// background worker.
    pub async fn shutdown(&self) {
        self.jobs.wait_for_all().await;
        self.views.destroy_all();
        self.store.wait_idle().await;
        self.store.close().await;
        log::info!("scribedb at '{}' shut down", self.config.base_path);
    }
}
