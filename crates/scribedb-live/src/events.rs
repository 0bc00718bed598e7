//! Events delivered to subscribers.

use serde_json::Value;
use std::collections::BTreeMap;

/// One notification on a subscriber's channel.
///
/// `Change` carries the subscriber's visible slice reconstituted into
/// record bodies plus the view's total; `Summary` carries the current value
/// histogram of a `#summary` subscription. `Error` is informational — the
/// subscription stays alive. `Destroy` is terminal: the view is gone and no
/// further events will arrive.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberEvent {
    Change {
        records: Vec<Value>,
        total: usize,
    },
    Summary {
        values: BTreeMap<String, i64>,
    },
    Error(String),
    Destroy,
}
