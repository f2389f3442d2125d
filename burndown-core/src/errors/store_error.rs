//! Record-store errors.

use super::error_code::{self, BurndownErrorCode};

/// Errors from a keyed record store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("no records stored under {path:?}")]
    NotFound { path: String },

    #[error("record store io: {message}")]
    Io { message: String },
}

impl BurndownErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        error_code::STORE_ERROR
    }
}
