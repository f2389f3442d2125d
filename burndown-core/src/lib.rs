//! # burndown-core
//!
//! Foundation crate for the burndown history engine.
//! Defines the shared types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod errors;
pub mod interning;
pub mod tracing;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use cancel::CancellationToken;
pub use config::BurndownConfig;
pub use errors::error_code::BurndownErrorCode;
pub use interning::PathInterner;
pub use types::collections::{FxHashMap, FxHashSet};
pub use types::history::{CommitEvent, CommitResult, SparseHistory, TickEvent, TickResult};
pub use types::identifiers::{AuthorId, PathId, Tick};
pub use types::timekey::{KeyCodec, TimeKey};
