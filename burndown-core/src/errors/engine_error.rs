//! Configuration, spill, and checkpoint errors.

use super::error_code::{self, BurndownErrorCode};

/// Rejected configuration, surfaced from `configure`/`initialize`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("people_count must be >= 0, got {0}")]
    NegativePeopleCount(i32),

    #[error("sampling must be >= 1, got {0}")]
    InvalidSampling(i32),

    #[error("granularity must be >= 1, got {0}")]
    InvalidGranularity(i32),

    #[error("reversed_people_dict has {got} names but people_count is {expected}")]
    PeopleDictShape { expected: i32, got: usize },

    #[error("fact {key:?} has unusable value {value}")]
    BadFact { key: String, value: String },
}

impl BurndownErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        error_code::CONFIG_INVALID
    }
}

/// I/O or codec failure on a spill file. Never retried; a corrupt spill is
/// fatal because each spill is authoritative.
#[derive(Debug, thiserror::Error)]
pub enum SpillError {
    #[error("create spill dir {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write spill file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read spill file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remove spill file {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encode {what} snapshot: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("decode {what} snapshot from {path}: {source}")]
    Decode {
        what: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no spill directory configured")]
    NoSpillDir,
}

impl BurndownErrorCode for SpillError {
    fn error_code(&self) -> &'static str {
        error_code::SPILL_IO
    }
}

/// I/O or codec failure on analyzer checkpoint save/load.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint io on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encode checkpoint field {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("decode checkpoint field {what} from {path}: {source}")]
    Decode {
        what: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BurndownErrorCode for CheckpointError {
    fn error_code(&self) -> &'static str {
        error_code::CHECKPOINT_IO
    }
}
