//! View manager: canonicalisation, de-duplication and change routing.
//!
//! Views are keyed by `(index, search_id)` where `search_id` digests the
//! parsed query's stable signature together with the sort parameters, so
//! every subscriber to the same logical query shares one view.
//!
//! `update_views` never runs view code inline with the writer: it snapshots
//! the affected views and enqueues one task on the store's FIFO queue. The
//! writer returns promptly and all view updates apply in write order.

use crate::error::{LiveError, Result};
use crate::subscriber::{Subscriber, SubscriberHandle};
use crate::summary_view::SummaryView;
use crate::view::View;
use dashmap::DashMap;
use scribedb_commons::{
    ChangeState, Config, IndexName, IndexSchema, SearchId, SortDir, SubscriberId,
};
use scribedb_index::{IndexEngine, ParsedQuery};
use scribedb_store::RecordStore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const ID_SORT: &str = "_id";
const SUMMARY_PREFIX: &str = "#summary:";

/// Options accepted by `subscribe`.
///
/// Sort parameters are fixed for the lifetime of the subscription; only the
/// window can change later via `change_options`.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub offset: usize,
    /// `None` means the whole result set.
    pub limit: Option<usize>,
    /// Defaults to the record id.
    pub sort_by: Option<String>,
    pub sort_dir: SortDir,
    /// Only consulted for the id sort (`"number"` selects numeric order).
    pub sort_type: Option<String>,
}

#[derive(Clone)]
enum ViewEntry {
    Results(Arc<View>),
    Summary(Arc<SummaryView>),
}

/// Process-wide registry of live views.
pub struct ViewManager {
    config: Arc<Config>,
    store: Arc<RecordStore>,
    engine: Arc<dyn IndexEngine>,
    views: DashMap<(IndexName, SearchId), ViewEntry>,
}

fn digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Canonical view key of a `(query, sort)` pair.
pub(crate) fn compute_search_id(
    parsed: &ParsedQuery,
    sort_by: &str,
    sort_dir: SortDir,
) -> SearchId {
    let signature = digest(&parsed.signature());
    SearchId::new(digest(&format!(
        "{}|{}|{}",
        signature,
        sort_by,
        i8::from(sort_dir)
    )))
}

fn summary_search_id(field_id: &str) -> SearchId {
    SearchId::new(digest(&format!("{}{}", SUMMARY_PREFIX, field_id)))
}

/// Extracts the field id of a `#summary:<field>` query (case-insensitive
/// prefix, leading whitespace tolerated).
pub fn parse_summary_field(query: &str) -> Option<String> {
    let trimmed = query.trim_start();
    if trimmed.len() < SUMMARY_PREFIX.len()
        || !trimmed[..SUMMARY_PREFIX.len()].eq_ignore_ascii_case(SUMMARY_PREFIX)
    {
        return None;
    }
    let field: String = trimmed[SUMMARY_PREFIX.len()..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    (!field.is_empty()).then_some(field)
}

impl ViewManager {
    pub fn new(config: Arc<Config>, store: Arc<RecordStore>, engine: Arc<dyn IndexEngine>) -> Self {
        Self {
            config,
            store,
            engine,
            views: DashMap::new(),
        }
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Attaches a subscriber to the view for `(query, sort)`, creating the
    /// view (and queueing its initial search) on first use.
    ///
    /// Synchronous errors — unparseable query, unknown field or sorter —
    /// return `Err`; asynchronous failures arrive on the subscriber's
    /// channel as `Error` events.
    pub fn subscribe(
        self: &Arc<Self>,
        schema: Arc<IndexSchema>,
        query: &str,
        opts: SubscribeOptions,
    ) -> Result<Subscriber> {
        if let Some(field_id) = parse_summary_field(query) {
            return self.subscribe_summary(schema, field_id, opts);
        }

        let parsed = self.engine.parse_query(query, &schema)?;
        let sort_by = opts
            .sort_by
            .clone()
            .unwrap_or_else(|| ID_SORT.to_string());
        let numeric_sort = if sort_by == ID_SORT {
            opts.sort_type.as_deref() == Some("number")
        } else {
            schema
                .sorter(&sort_by)
                .ok_or_else(|| {
                    LiveError::NotFound(format!(
                        "sorter '{}' not found in index '{}'",
                        sort_by, schema.id
                    ))
                })?
                .is_number()
        };

        let search_id = compute_search_id(&parsed, &sort_by, opts.sort_dir);
        let key = (schema.id.clone(), search_id.clone());
        let (handle, rx) = SubscriberHandle::channel(opts.offset, opts.limit.unwrap_or(usize::MAX));

        let mut created = false;
        let entry = self
            .views
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                ViewEntry::Results(Arc::new(View::new(
                    schema.id.clone(),
                    search_id.clone(),
                    parsed.clone(),
                    sort_by.clone(),
                    opts.sort_dir,
                    numeric_sort,
                )))
            })
            .clone();
        let ViewEntry::Results(view) = entry else {
            return Err(LiveError::InvalidQuery(
                "search id collides with a summary view".to_string(),
            ));
        };
        view.attach(handle.clone());

        let subscriber = Subscriber::new(
            handle.id.clone(),
            schema.id.clone(),
            search_id,
            rx,
            Arc::clone(self),
        );

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        if created {
            let manager = Arc::clone(self);
            self.store.enqueue("view-initial-search", async move {
                let ok = view
                    .initial_search(engine.as_ref(), store.as_ref(), config.as_ref(), &schema)
                    .await;
                if !ok {
                    manager.views.remove(&key);
                }
            })?;
        } else {
            self.store.enqueue("view-deliver", async move {
                if !handle.was_notified() {
                    view.deliver_to(&handle, store.as_ref(), config.as_ref()).await;
                }
            })?;
        }

        Ok(subscriber)
    }

    fn subscribe_summary(
        self: &Arc<Self>,
        schema: Arc<IndexSchema>,
        field_id: String,
        opts: SubscribeOptions,
    ) -> Result<Subscriber> {
        if schema.field(&field_id).is_none() {
            return Err(LiveError::InvalidQuery(format!(
                "field '{}' not found in index '{}'",
                field_id, schema.id
            )));
        }

        let search_id = summary_search_id(&field_id);
        let key = (schema.id.clone(), search_id.clone());
        let (handle, rx) = SubscriberHandle::channel(opts.offset, opts.limit.unwrap_or(usize::MAX));

        let mut created = false;
        let entry = self
            .views
            .entry(key.clone())
            .or_insert_with(|| {
                created = true;
                ViewEntry::Summary(Arc::new(SummaryView::new(
                    schema.id.clone(),
                    search_id.clone(),
                    field_id,
                )))
            })
            .clone();
        let ViewEntry::Summary(view) = entry else {
            return Err(LiveError::InvalidQuery(
                "search id collides with a results view".to_string(),
            ));
        };
        view.attach(handle.clone());

        let subscriber = Subscriber::new(
            handle.id.clone(),
            schema.id.clone(),
            search_id,
            rx,
            Arc::clone(self),
        );

        let engine = Arc::clone(&self.engine);
        if created {
            let manager = Arc::clone(self);
            self.store.enqueue("summary-initial", async move {
                let ok = view.refresh(engine.as_ref(), &schema).await;
                if !ok {
                    view.destroy();
                    manager.views.remove(&key);
                }
            })?;
        } else if !view.deliver_cached(&handle) {
            // First computation is still queued; hand over afterwards.
            self.store.enqueue("summary-deliver", async move {
                if !handle.was_notified() {
                    view.deliver_cached(&handle);
                }
            })?;
        }

        Ok(subscriber)
    }

    /// Routes one post-write change state to every view of the index, via
    /// the store's FIFO queue.
    pub fn update_views(
        &self,
        index: &IndexName,
        schema: Arc<IndexSchema>,
        state: ChangeState,
    ) -> Result<()> {
        let affected: Vec<ViewEntry> = self
            .views
            .iter()
            .filter(|entry| entry.key().0 == *index)
            .map(|entry| entry.value().clone())
            .collect();
        if affected.is_empty() {
            return Ok(());
        }

        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        self.store.enqueue("view-update", async move {
            for entry in affected {
                match entry {
                    ViewEntry::Results(view) => {
                        view.update(
                            &state,
                            engine.as_ref(),
                            store.as_ref(),
                            config.as_ref(),
                            &schema,
                        )
                        .await
                    }
                    ViewEntry::Summary(view) => {
                        view.update(&state, engine.as_ref(), &schema).await
                    }
                }
            }
        })?;
        Ok(())
    }

    /// Detaches a subscriber; the view goes away with its last subscriber.
    pub(crate) fn unsubscribe(
        &self,
        index: &IndexName,
        search_id: &SearchId,
        sub_id: &SubscriberId,
    ) {
        let key = (index.clone(), search_id.clone());
        let remaining = match self.views.get(&key).map(|entry| entry.value().clone()) {
            Some(ViewEntry::Results(view)) => view.detach(sub_id),
            Some(ViewEntry::Summary(view)) => view.detach(sub_id),
            None => return,
        };
        if remaining == 0 {
            self.views.remove(&key);
            log::debug!("view {}/{} destroyed (no subscribers)", index, search_id);
        }
    }

    /// Moves one subscriber's window and re-delivers its slice.
    pub(crate) fn change_options(
        &self,
        index: &IndexName,
        search_id: &SearchId,
        sub_id: &SubscriberId,
        offset: Option<usize>,
        limit: Option<usize>,
    ) -> Result<()> {
        let key = (index.clone(), search_id.clone());
        let entry = self
            .views
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                LiveError::NotFound(format!("no view for subscriber {}", sub_id))
            })?;

        match entry {
            ViewEntry::Results(view) => {
                let handle = view.handle(sub_id).ok_or_else(|| {
                    LiveError::NotFound(format!("subscriber {} not attached", sub_id))
                })?;
                handle.set_window(offset, limit);
                let store = Arc::clone(&self.store);
                let config = Arc::clone(&self.config);
                self.store.enqueue("view-deliver", async move {
                    view.deliver_to(&handle, store.as_ref(), config.as_ref()).await;
                })?;
            }
            ViewEntry::Summary(view) => {
                let handle = view.handle(sub_id).ok_or_else(|| {
                    LiveError::NotFound(format!("subscriber {} not attached", sub_id))
                })?;
                handle.set_window(offset, limit);
                view.deliver_cached(&handle);
            }
        }
        Ok(())
    }

    /// Destroys every view of one index (index deletion). Subscribers get
    /// a `Destroy` broadcast.
    pub fn destroy_views_for(&self, index: &IndexName) {
        let keys: Vec<(IndexName, SearchId)> = self
            .views
            .iter()
            .filter(|entry| entry.key().0 == *index)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            if let Some((_, entry)) = self.views.remove(&key) {
                match entry {
                    ViewEntry::Results(view) => view.destroy(),
                    ViewEntry::Summary(view) => view.destroy(),
                }
            }
        }
    }

    /// Destroys every view (shutdown).
    pub fn destroy_all(&self) {
        let keys: Vec<(IndexName, SearchId)> =
            self.views.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, entry)) = self.views.remove(&key) {
                match entry {
                    ViewEntry::Results(view) => view.destroy(),
                    ViewEntry::Summary(view) => view.destroy(),
                }
            }
        }
    }
}
