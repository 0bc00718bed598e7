//! # scribedb-live
//!
//! The live query engine: shared materialised views over `(query, sort)`
//! pairs, per-client subscribers with their own pagination windows, and the
//! manager that routes post-write change states to affected views.
//!
//! ## Architecture
//!
//! ```text
//! ViewManager ── de-duplicates views by (index, search_id)
//!     │              routes ChangeState through the store's FIFO queue
//!     ├── View ──────── full sorted result set, incremental updates
//!     ├── SummaryView ─ field-value histogram
//!     └── Subscriber ── client handle: events + (offset, limit) window
//! ```
//!
//! View internals are only ever mutated by tasks on the store's
//! single-consumer background queue, so updates for one index apply in
//! write order and writers never block on fan-out.

pub mod error;
pub mod events;
pub mod manager;
pub mod subscriber;
pub mod summary_view;
pub mod view;

pub use error::{LiveError, Result};
pub use events::SubscriberEvent;
pub use manager::{parse_summary_field, SubscribeOptions, ViewManager};
pub use subscriber::Subscriber;
