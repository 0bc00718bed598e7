//! Shared materialised view over one canonical `(query, sort)` pair.
//!
//! A view holds the full sorted result set; subscribers only differ in
//! their `(offset, limit)` window. Mutation happens exclusively from tasks
//! on the store's single-consumer queue, so the short `core` lock is never
//! contended across an await point.
//!
//! Invariants between updates:
//! - `results[id]` is the position of `id` in `sort_pairs`
//! - `sort_pairs` is sorted under the view's comparator (ties break on id)
//! - `|results| == |sort_pairs|`, no duplicates

use crate::events::SubscriberEvent;
use crate::subscriber::SubscriberHandle;
use parking_lot::Mutex;
use scribedb_commons::sort::compare_sort_pairs;
use scribedb_commons::{
    ChangeAction, ChangeState, Config, IndexName, IndexSchema, RecordId, SearchId, SortDir,
    SortPair, SubscriberId,
};
use scribedb_index::{IndexEngine, ParsedQuery};
use scribedb_store::RecordStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const ID_SORT: &str = "_id";

#[derive(Default)]
struct ViewCore {
    results: HashMap<RecordId, usize>,
    sort_pairs: Vec<SortPair>,
    initialized: bool,
}

enum UpdateOutcome {
    NotifyAll,
    NotifyPosition(usize),
    Nothing,
}

/// One shared result set, owned by the [`crate::manager::ViewManager`].
pub struct View {
    pub index: IndexName,
    pub search_id: SearchId,
    query: ParsedQuery,
    sort_by: String,
    sort_dir: SortDir,
    numeric_sort: bool,
    core: Mutex<ViewCore>,
    subs: dashmap::DashMap<SubscriberId, Arc<SubscriberHandle>>,
}

impl View {
    pub(crate) fn new(
        index: IndexName,
        search_id: SearchId,
        query: ParsedQuery,
        sort_by: String,
        sort_dir: SortDir,
        numeric_sort: bool,
    ) -> Self {
        Self {
            index,
            search_id,
            query,
            sort_by,
            sort_dir,
            numeric_sort,
            core: Mutex::new(ViewCore::default()),
            subs: dashmap::DashMap::new(),
        }
    }

    pub(crate) fn attach(&self, handle: Arc<SubscriberHandle>) {
        self.subs.insert(handle.id.clone(), handle);
    }

    /// Removes a subscriber; returns how many remain.
    pub(crate) fn detach(&self, sub_id: &SubscriberId) -> usize {
        self.subs.remove(sub_id);
        self.subs.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    pub(crate) fn handle(&self, sub_id: &SubscriberId) -> Option<Arc<SubscriberHandle>> {
        self.subs.get(sub_id).map(|entry| entry.value().clone())
    }

    /// Broadcasts `Destroy` and drops every subscriber.
    pub(crate) fn destroy(&self) {
        for entry in self.subs.iter() {
            entry.value().emit(SubscriberEvent::Destroy);
        }
        self.subs.clear();
    }

    fn broadcast_error(&self, message: String) {
        log::warn!("view {}/{}: {}", self.index, self.search_id, message);
        for entry in self.subs.iter() {
            entry.value().emit(SubscriberEvent::Error(message.clone()));
        }
    }

    fn sort_value_for(&self, state: &ChangeState) -> Value {
        if self.sort_by == ID_SORT {
            Value::String(state.id.to_string())
        } else {
            state
                .idx_data
                .sort_value(&self.sort_by)
                .cloned()
                .unwrap_or(Value::Null)
        }
    }

    fn resort(&self, core: &mut ViewCore) {
        let numeric = self.numeric_sort;
        let dir = self.sort_dir;
        core.sort_pairs
            .sort_by(|a, b| compare_sort_pairs(a, b, numeric, dir));
        Self::rebuild_positions(core);
    }

    fn rebuild_positions(core: &mut ViewCore) {
        core.results = core
            .sort_pairs
            .iter()
            .enumerate()
            .map(|(pos, pair)| (pair.id.clone(), pos))
            .collect();
    }

    /// Runs the full query once and installs the sorted result set.
    /// Returns `false` on failure (error broadcast; caller removes the
    /// view).
    pub(crate) async fn initial_search(
        &self,
        engine: &dyn IndexEngine,
        store: &RecordStore,
        config: &Config,
        schema: &IndexSchema,
    ) -> bool {
        let result = async {
            let hits = engine.search_records(&self.query, schema).await?;
            if self.sort_by == ID_SORT {
                let mut pairs: Vec<SortPair> = hits
                    .keys()
                    .map(|id| SortPair::new(id.clone(), Value::String(id.to_string())))
                    .collect();
                pairs.sort_by(|a, b| compare_sort_pairs(a, b, self.numeric_sort, self.sort_dir));
                Ok(pairs)
            } else {
                engine
                    .sort_records(&hits, &self.sort_by, self.sort_dir, schema)
                    .await
            }
        }
        .await;

        match result {
            Ok(pairs) => {
                {
                    let mut core = self.core.lock();
                    core.sort_pairs = pairs;
                    Self::rebuild_positions(&mut core);
                    core.initialized = true;
                }
                self.notify_all(store, config).await;
                true
            }
            Err(err) => {
                self.broadcast_error(err.to_string());
                self.destroy();
                false
            }
        }
    }

    /// Applies one post-write change state per the incremental rules.
    pub(crate) async fn update(
        &self,
        state: &ChangeState,
        engine: &dyn IndexEngine,
        store: &RecordStore,
        config: &Config,
        schema: &IndexSchema,
    ) {
        let outcome = {
            let mut core = self.core.lock();
            if !core.initialized {
                // Initial search is still queued behind us; it will read
                // the post-write index state directly.
                return;
            }

            let old_hit = core.results.contains_key(&state.id);
            let new_hit = match state.action {
                ChangeAction::Delete => false,
                ChangeAction::Insert => {
                    engine.search_single(&self.query, &state.id, &state.idx_data, schema)
                }
            };

            match (old_hit, new_hit) {
                (false, true) => {
                    let value = self.sort_value_for(state);
                    core.sort_pairs.push(SortPair::new(state.id.clone(), value));
                    self.resort(&mut core);
                    UpdateOutcome::NotifyAll
                }
                (true, false) => {
                    if let Some(pos) = core.results.get(&state.id).copied() {
                        core.sort_pairs.remove(pos);
                        Self::rebuild_positions(&mut core);
                    }
                    UpdateOutcome::NotifyAll
                }
                (true, true) => {
                    let pos = match core.results.get(&state.id).copied() {
                        Some(pos) => pos,
                        None => return,
                    };
                    if self.sort_by != ID_SORT {
                        let new_value = self.sort_value_for(state);
                        if core.sort_pairs[pos].value != new_value {
                            core.sort_pairs[pos].value = new_value;
                            self.resort(&mut core);
                            UpdateOutcome::NotifyAll
                        } else {
                            UpdateOutcome::NotifyPosition(pos)
                        }
                    } else {
                        // The id sort value cannot change.
                        UpdateOutcome::NotifyPosition(pos)
                    }
                }
                (false, false) => UpdateOutcome::Nothing,
            }
        };

        match outcome {
            UpdateOutcome::NotifyAll => self.notify_all(store, config).await,
            UpdateOutcome::NotifyPosition(pos) => self.notify_visible(pos, store, config).await,
            UpdateOutcome::Nothing => {}
        }
    }

    fn snapshot_windows(
        &self,
        only_position: Option<usize>,
    ) -> (usize, Vec<(Arc<SubscriberHandle>, Vec<RecordId>)>) {
        let core = self.core.lock();
        let total = core.sort_pairs.len();
        let mut slices = Vec::new();
        for entry in self.subs.iter() {
            let handle = entry.value().clone();
            let (offset, limit) = *handle.window.lock();
            let end = offset.saturating_add(limit).min(total);
            if let Some(pos) = only_position {
                if pos < offset || pos >= end {
                    continue;
                }
            }
            let ids: Vec<RecordId> = if offset < end {
                core.sort_pairs[offset..end]
                    .iter()
                    .map(|pair| pair.id.clone())
                    .collect()
            } else {
                Vec::new()
            };
            slices.push((handle, ids));
        }
        (total, slices)
    }

    async fn deliver(
        &self,
        store: &RecordStore,
        config: &Config,
        total: usize,
        slices: Vec<(Arc<SubscriberHandle>, Vec<RecordId>)>,
    ) {
        if slices.is_empty() {
            return;
        }

        // One bulk load covers the union of all visible windows.
        let mut keys: Vec<String> = Vec::new();
        for (_, ids) in &slices {
            for id in ids {
                let key = config.record_path(&self.index, id);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        let values = match store.get_multi(&keys).await {
            Ok(values) => values,
            Err(err) => {
                self.broadcast_error(err.to_string());
                return;
            }
        };
        let by_key: HashMap<&String, &Value> = keys
            .iter()
            .zip(values.iter())
            .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
            .collect();

        for (handle, ids) in slices {
            let records: Vec<Value> = ids
                .iter()
                .filter_map(|id| {
                    by_key
                        .get(&config.record_path(&self.index, id))
                        .map(|v| (*v).clone())
                })
                .collect();
            handle.emit(SubscriberEvent::Change { records, total });
        }
    }

    /// Notifies every subscriber with its current slice.
    pub(crate) async fn notify_all(&self, store: &RecordStore, config: &Config) {
        let (total, slices) = self.snapshot_windows(None);
        self.deliver(store, config, total, slices).await;
    }

    /// Notifies only subscribers whose window covers `position`.
    pub(crate) async fn notify_visible(
        &self,
        position: usize,
        store: &RecordStore,
        config: &Config,
    ) {
        let (total, slices) = self.snapshot_windows(Some(position));
        self.deliver(store, config, total, slices).await;
    }

    /// Re-delivers the current slice to one subscriber (window changes and
    /// late attachment).
    pub(crate) async fn deliver_to(
        &self,
        handle: &Arc<SubscriberHandle>,
        store: &RecordStore,
        config: &Config,
    ) {
        let snapshot = {
            let core = self.core.lock();
            if !core.initialized {
                None
            } else {
                let total = core.sort_pairs.len();
                let (offset, limit) = *handle.window.lock();
                let end = offset.saturating_add(limit).min(total);
                let ids: Vec<RecordId> = if offset < end {
                    core.sort_pairs[offset..end]
                        .iter()
                        .map(|pair| pair.id.clone())
                        .collect()
                } else {
                    Vec::new()
                };
                Some((total, ids))
            }
        };
        if let Some((total, ids)) = snapshot {
            self.deliver(store, config, total, vec![(handle.clone(), ids)])
                .await;
        }
    }

    /// Invariant check used by tests: positions line up with pairs and the
    /// order is sorted under the comparator.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> bool {
        let core = self.core.lock();
        if core.results.len() != core.sort_pairs.len() {
            return false;
        }
        for (pos, pair) in core.sort_pairs.iter().enumerate() {
            if core.results.get(&pair.id) != Some(&pos) {
                return false;
            }
        }
        core.sort_pairs.windows(2).all(|w| {
            compare_sort_pairs(&w[0], &w[1], self.numeric_sort, self.sort_dir)
                != std::cmp::Ordering::Greater
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::compute_search_id;
    use scribedb_commons::{FieldDefinition, SorterDefinition};
    use scribedb_index::{IndexEngine, InvertedIndex};
    use scribedb_store::MemoryBackend;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Rig {
        config: Config,
        store: Arc<RecordStore>,
        engine: InvertedIndex,
        schema: IndexSchema,
    }

    async fn rig() -> Rig {
        let config = Config::new("db");
        let store = Arc::new(RecordStore::new(Arc::new(MemoryBackend::new()), 50));
        let engine = InvertedIndex::new(Arc::clone(&store));
        let mut schema = IndexSchema::new(
            "myapp",
            vec![
                FieldDefinition::text("status", "/Status"),
                FieldDefinition::text("title", "/Summary"),
            ],
        )
        .with_sorters(vec![SorterDefinition::new(
            "priority",
            "/Priority",
            Some("number"),
        )]);
        schema.base_path = config.index_base_path(&IndexName::new("myapp"));
        Rig {
            config,
            store,
            engine,
            schema,
        }
    }

    impl Rig {
        async fn write(&self, id: &str, record: serde_json::Value) -> ChangeState {
            let record_id = RecordId::new(id);
            let key = self.config.record_path(&self.schema.id, &record_id);
            self.store.put(&key, &record).await.unwrap();
            self.engine
                .index_record(&record_id, &record, &self.schema)
                .await
                .unwrap()
        }

        fn view(&self, query: &str, sort_by: &str) -> (View, Arc<SubscriberHandle>, UnboundedReceiver<SubscriberEvent>) {
            let parsed = self.engine.parse_query(query, &self.schema).unwrap();
            let numeric = sort_by != ID_SORT;
            let view = View::new(
                IndexName::new("myapp"),
                compute_search_id(&parsed, sort_by, SortDir::Asc),
                parsed,
                sort_by.to_string(),
                SortDir::Asc,
                numeric,
            );
            let (handle, rx) = SubscriberHandle::channel(0, 10);
            view.attach(handle.clone());
            (view, handle, rx)
        }
    }

    fn ticket(status: &str, summary: &str, priority: i64) -> serde_json::Value {
        json!({"Status": status, "Summary": summary, "Priority": priority})
    }

    #[tokio::test]
    async fn test_add_and_remove_maintain_invariants() {
        let rig = rig().await;
        rig.write("b", ticket("Open", "x", 2)).await;
        rig.write("a", ticket("Open", "y", 1)).await;

        let (view, _handle, mut rx) = rig.view("status:open", ID_SORT);
        assert!(
            view.initial_search(&rig.engine, &rig.store, &rig.config, &rig.schema)
                .await
        );
        assert!(view.check_invariants());
        match rx.try_recv().unwrap() {
            SubscriberEvent::Change { records, total } => {
                assert_eq!(total, 2);
                assert_eq!(records[0]["Summary"], "y"); // id "a" first
            }
            other => panic!("unexpected {:?}", other),
        }

        // New record enters.
        let state = rig.write("c", ticket("Open", "z", 3)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        assert!(view.check_invariants());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SubscriberEvent::Change { total: 3, .. }
        ));

        // Record leaves on a non-matching rewrite.
        let state = rig.write("b", ticket("Closed", "x", 2)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        assert!(view.check_invariants());
        assert!(matches!(
            rx.try_recv().unwrap(),
            SubscriberEvent::Change { total: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_sort_value_change_resorts() {
        let rig = rig().await;
        rig.write("a", ticket("Open", "first", 1)).await;
        rig.write("b", ticket("Open", "second", 2)).await;

        let (view, _handle, mut rx) = rig.view("status:open", "priority");
        assert!(
            view.initial_search(&rig.engine, &rig.store, &rig.config, &rig.schema)
                .await
        );
        match rx.try_recv().unwrap() {
            SubscriberEvent::Change { records, .. } => {
                assert_eq!(records[0]["Summary"], "first");
            }
            other => panic!("unexpected {:?}", other),
        }

        // Push "a" past "b" in the sort order.
        let state = rig.write("a", ticket("Open", "first", 9)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        assert!(view.check_invariants());
        match rx.try_recv().unwrap() {
            SubscriberEvent::Change { records, .. } => {
                assert_eq!(records[0]["Summary"], "second");
                assert_eq!(records[1]["Summary"], "first");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unchanged_sort_value_notifies_visible_window_only() {
        let rig = rig().await;
        for i in 0..4i64 {
            rig.write(&format!("{}", i), ticket("Open", &format!("t{}", i), i))
                .await;
        }

        let (view, handle, mut rx) = rig.view("status:open", "priority");
        // Window covering positions 0..2 only.
        handle.set_window(Some(0), Some(2));
        assert!(
            view.initial_search(&rig.engine, &rig.store, &rig.config, &rig.schema)
                .await
        );
        assert!(rx.try_recv().is_ok());

        // Rewrite record 3 (position 3, outside the window) in place.
        let state = rig.write("3", ticket("Open", "renamed", 3)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        assert!(rx.try_recv().is_err(), "outside-window change must not notify");

        // Rewrite record 0 (position 0, inside the window) in place.
        let state = rig.write("0", ticket("Open", "renamed", 0)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        match rx.try_recv().unwrap() {
            SubscriberEvent::Change { records, total } => {
                assert_eq!(total, 4);
                assert_eq!(records[0]["Summary"], "renamed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_miss_to_miss_write_is_silent() {
        let rig = rig().await;
        rig.write("a", ticket("Open", "x", 1)).await;

        let (view, _handle, mut rx) = rig.view("status:closed", ID_SORT);
        assert!(
            view.initial_search(&rig.engine, &rig.store, &rig.config, &rig.schema)
                .await
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SubscriberEvent::Change { total: 0, .. }
        ));

        let state = rig.write("a", ticket("Open", "still open", 1)).await;
        view.update(&state, &rig.engine, &rig.store, &rig.config, &rig.schema)
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_destroy_broadcasts() {
        let rig = rig().await;
        let (view, _handle, mut rx) = rig.view("status:open", ID_SORT);
        view.destroy();
        assert!(matches!(rx.try_recv().unwrap(), SubscriberEvent::Destroy));
        assert_eq!(view.subscriber_count(), 0);
    }
}
