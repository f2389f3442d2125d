//! # burndown-store
//!
//! SQLite-backed implementation of the keyed record store the metrics
//! writer streams into. One row per record, keyed by `(path, seq)`.

pub mod record_store;

pub use record_store::SqliteRecordStore;
