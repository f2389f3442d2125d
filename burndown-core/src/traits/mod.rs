//! Traits at the seams of the engine: the keyed record store consumed by
//! the metrics writer.

pub mod store;

pub use store::{RecordReader, RecordStore, RecordWriter};
