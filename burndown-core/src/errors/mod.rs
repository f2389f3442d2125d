//! Error types for every layer of the engine, each carrying a stable
//! machine-readable code via [`error_code::BurndownErrorCode`].

pub mod engine_error;
pub mod error_code;
pub mod metrics_error;
pub mod store_error;

pub use engine_error::{CheckpointError, ConfigError, SpillError};
pub use metrics_error::MetricsError;
pub use store_error::StoreError;
