//! Data models shared across ScribeDB crates.

pub mod change;
pub mod ids;
pub mod job;
pub mod schema;
pub mod sort;
