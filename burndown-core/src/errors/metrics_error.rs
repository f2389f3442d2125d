//! Errors surfaced by the metrics computation and store writer.

use super::engine_error::SpillError;
use super::error_code::{self, BurndownErrorCode};
use super::store_error::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Sentinel: the writer received an aggregator that is not its own type.
    #[error("aggregator is not a burndown aggregator")]
    AggregatorTypeMismatch,

    #[error("write record {kind:?}: {source}")]
    Store {
        kind: String,
        #[source]
        source: StoreError,
    },

    #[error("encode record {kind:?}: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Spilled state had to be collected first and that failed.
    #[error(transparent)]
    Spill(#[from] SpillError),

    #[error("cancelled")]
    Cancelled,
}

impl BurndownErrorCode for MetricsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AggregatorTypeMismatch => error_code::AGGREGATOR_TYPE_MISMATCH,
            Self::Store { .. } | Self::Encode { .. } => error_code::STORE_WRITE,
            Self::Spill(_) => error_code::SPILL_IO,
            Self::Cancelled => error_code::CANCELLED,
        }
    }
}
