//! Specialised view tracking a field-value histogram.
//!
//! Backed by the engine's master-list summary rather than a result set.
//! Recomputed whenever a write could have moved a count: deletes, new
//! records, or changes to the tracked field.

use crate::events::SubscriberEvent;
use crate::subscriber::SubscriberHandle;
use dashmap::DashMap;
use parking_lot::Mutex;
use scribedb_commons::{ChangeAction, ChangeState, IndexName, IndexSchema, SearchId, SubscriberId};
use scribedb_index::IndexEngine;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct SummaryState {
    values: BTreeMap<String, i64>,
    initialized: bool,
}

/// Histogram view of one master-list field.
pub struct SummaryView {
    pub index: IndexName,
    pub search_id: SearchId,
    field_id: String,
    state: Mutex<SummaryState>,
    subs: DashMap<SubscriberId, Arc<SubscriberHandle>>,
}

impl SummaryView {
    pub(crate) fn new(index: IndexName, search_id: SearchId, field_id: String) -> Self {
        Self {
            index,
            search_id,
            field_id,
            state: Mutex::new(SummaryState::default()),
            subs: DashMap::new(),
        }
    }

    pub(crate) fn attach(&self, handle: Arc<SubscriberHandle>) {
        self.subs.insert(handle.id.clone(), handle);
    }

    pub(crate) fn detach(&self, sub_id: &SubscriberId) -> usize {
        self.subs.remove(sub_id);
        self.subs.len()
    }

    pub(crate) fn handle(&self, sub_id: &SubscriberId) -> Option<Arc<SubscriberHandle>> {
        self.subs.get(sub_id).map(|entry| entry.value().clone())
    }

    pub(crate) fn destroy(&self) {
        for entry in self.subs.iter() {
            entry.value().emit(SubscriberEvent::Destroy);
        }
        self.subs.clear();
    }

    /// Recomputes the histogram and broadcasts it. Returns `false` on
    /// engine failure (error broadcast; the caller decides whether the
    /// view survives).
    pub(crate) async fn refresh(&self, engine: &dyn IndexEngine, schema: &IndexSchema) -> bool {
        match engine.get_field_summary(&self.field_id, schema).await {
            Ok(values) => {
                {
                    let mut state = self.state.lock();
                    state.values = values.clone();
                    state.initialized = true;
                }
                for entry in self.subs.iter() {
                    entry.value().emit(SubscriberEvent::Summary {
                        values: values.clone(),
                    });
                }
                true
            }
            Err(err) => {
                log::warn!(
                    "summary view {}/{}: {}",
                    self.index,
                    self.search_id,
                    err
                );
                for entry in self.subs.iter() {
                    entry.value().emit(SubscriberEvent::Error(err.to_string()));
                }
                false
            }
        }
    }

    /// Recompute rule: deletes, new records, and changes touching the
    /// tracked field.
    pub(crate) async fn update(
        &self,
        state: &ChangeState,
        engine: &dyn IndexEngine,
        schema: &IndexSchema,
    ) {
        let relevant = state.action == ChangeAction::Delete
            || state.new_record
            || state.changed.contains(&self.field_id);
        if relevant {
            self.refresh(engine, schema).await;
        }
    }

    /// Hands a late subscriber the cached histogram immediately. Returns
    /// `false` when the first computation hasn't landed yet.
    pub(crate) fn deliver_cached(&self, handle: &Arc<SubscriberHandle>) -> bool {
        let state = self.state.lock();
        if !state.initialized {
            return false;
        }
        handle.emit(SubscriberEvent::Summary {
            values: state.values.clone(),
        });
        true
    }
}
