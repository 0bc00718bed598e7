//! # scribedb-index
//!
//! The inverted-index engine behind ScribeDB queries.
//!
//! The rest of the system consumes the [`IndexEngine`] trait; the default
//! implementation here ([`InvertedIndex`]) persists postings, sorter values
//! and master-list histograms through the record store:
//!
//! ```text
//! <index base>/_id                    — hash: record id enumeration
//! <index base>/_data/<record_id>     — per-record projection (IdxData)
//! <index base>/word/<field>/<token>  — hash: posting list for one token
//! <index base>/sorter/<sorter_id>    — hash: record id → sort value
//! <index base>/summary/<field>      — hash: canonical value → count
//! ```
//!
//! Two query syntaxes are recognised: the simple `field:term` form and the
//! parenthesised boolean grammar (anything wrapped in `( ... )`).

pub mod analysis;
pub mod engine;
pub mod error;
pub mod inverted;
pub mod query;
pub mod source_path;

pub use analysis::{Analyzer, SUPPORTED_FILTERS, SUPPORTED_TYPES};
pub use engine::IndexEngine;
pub use error::{IndexError, Result};
pub use inverted::InvertedIndex;
pub use query::{ParsedQuery, QueryNode};
