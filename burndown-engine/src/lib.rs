//! # burndown-engine
//!
//! Incremental burndown history engine. Walks a version-controlled project
//! history (fed by an external driver as line-level edit operations) and
//! answers, for every sampled point in time, which lines written at which
//! prior time points still survive, attributed to which author, in which
//! file.

pub mod aggregator;
pub mod analyzer;
pub mod file;
pub mod metrics;
pub mod shard;
pub mod timeline;

pub use aggregator::Aggregator;
pub use analyzer::HistoryAnalyzer;
pub use file::File;
pub use timeline::{Segment, Timeline};
