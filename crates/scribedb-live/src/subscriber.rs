//! Subscriber handles.
//!
//! A subscription has two halves: the [`SubscriberHandle`] the view keeps
//! (window + event sender) and the [`Subscriber`] the client holds (event
//! receiver + control methods). The channel between them is the "default
//! error sink" the design calls for — emitting to a dropped receiver is a
//! silent no-op, so an unobserved error can never take the process down.

use crate::error::Result;
use crate::events::SubscriberEvent;
use crate::manager::ViewManager;
use parking_lot::Mutex;
use scribedb_commons::{IndexName, SearchId, SubscriberId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// View-side half of a subscription.
pub(crate) struct SubscriberHandle {
    pub id: SubscriberId,
    /// `(offset, limit)` window into the view's sort order.
    pub window: Mutex<(usize, usize)>,
    tx: mpsc::UnboundedSender<SubscriberEvent>,
    /// Set once the subscriber has received its first `Change`/`Summary`;
    /// deferred deliveries use it to avoid double-sending the initial page.
    pub notified: AtomicBool,
}

impl SubscriberHandle {
    pub fn channel(
        offset: usize,
        limit: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SubscriberEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            id: SubscriberId::new(format!("sub_{}", uuid::Uuid::new_v4().simple())),
            window: Mutex::new((offset, limit.max(1))),
            tx,
            notified: AtomicBool::new(false),
        });
        (handle, rx)
    }

    /// Delivers an event; a detached receiver just swallows it.
    pub fn emit(&self, event: SubscriberEvent) {
        if matches!(
            event,
            SubscriberEvent::Change { .. } | SubscriberEvent::Summary { .. }
        ) {
            self.notified.store(true, Ordering::SeqCst);
        }
        if self.tx.send(event).is_err() {
            log::debug!("subscriber {} detached, dropping event", self.id);
        }
    }

    pub fn was_notified(&self) -> bool {
        self.notified.load(Ordering::SeqCst)
    }

    pub fn set_window(&self, offset: Option<usize>, limit: Option<usize>) {
        let mut window = self.window.lock();
        if let Some(offset) = offset {
            window.0 = offset;
        }
        if let Some(limit) = limit {
            window.1 = limit.max(1);
        }
    }
}

/// Client-side half of a subscription.
///
/// Holds the event receiver and a back reference to the manager; it never
/// owns the view. Sort parameters are fixed at subscribe time — only the
/// window can change.
pub struct Subscriber {
    id: SubscriberId,
    index: IndexName,
    search_id: SearchId,
    rx: mpsc::UnboundedReceiver<SubscriberEvent>,
    manager: Arc<ViewManager>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("search_id", &self.search_id)
            .finish()
    }
}

impl Subscriber {
    pub(crate) fn new(
        id: SubscriberId,
        index: IndexName,
        search_id: SearchId,
        rx: mpsc::UnboundedReceiver<SubscriberEvent>,
        manager: Arc<ViewManager>,
    ) -> Self {
        Self {
            id,
            index,
            search_id,
            rx,
            manager,
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn index(&self) -> &IndexName {
        &self.index
    }

    pub fn search_id(&self) -> &SearchId {
        &self.search_id
    }

    /// Waits for the next event. `None` after `Destroy` has been consumed
    /// and the view has released its sender.
    pub async fn next_event(&mut self) -> Option<SubscriberEvent> {
        self.rx.recv().await
    }

    /// Non-blocking poll for an already-delivered event.
    pub fn try_event(&mut self) -> Option<SubscriberEvent> {
        self.rx.try_recv().ok()
    }

    /// Moves this subscriber's window and re-delivers its slice from the
    /// view's current sort order. No index-engine call is involved.
    pub fn change_options(&self, offset: Option<usize>, limit: Option<usize>) -> Result<()> {
        self.manager
            .change_options(&self.index, &self.search_id, &self.id, offset, limit)
    }

    /// Detaches from the view; no further events will be delivered. The
    /// last subscriber leaving destroys the view.
    pub fn unsubscribe(&self) {
        self.manager
            .unsubscribe(&self.index, &self.search_id, &self.id);
    }
}
