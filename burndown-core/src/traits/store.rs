//! Keyed record store contract.
//!
//! A store holds, per report path, a sequence of `(kind, payload)` records.
//! Payloads are self-describing encoded values (serde_json throughout this
//! workspace). The engine writes only the kinds `"chart_data"` and
//! `"metrics"`.

use crate::errors::StoreError;
use crate::types::collections::FxHashMap;

/// Writer for one report path. Records are appended in call order.
pub trait RecordWriter {
    fn write(&mut self, kind: &str, payload: &[u8]) -> Result<(), StoreError>;

    /// Commit the written records. Dropping a writer without finishing
    /// discards nothing already written but forfeits atomicity guarantees
    /// an implementation may offer.
    fn finish(&mut self) -> Result<(), StoreError>;
}

/// Reader over one report path.
pub trait RecordReader {
    /// Distinct record kinds present, in first-seen order.
    fn kinds(&self) -> Result<Vec<String>, StoreError>;

    /// Visit every record of `kind` in write order.
    fn for_each(&self, kind: &str, f: &mut dyn FnMut(&[u8])) -> Result<(), StoreError>;
}

/// A keyed record store.
pub trait RecordStore {
    /// Start (or replace) the record set for `path`. `meta` is free-form
    /// string metadata attached to the report.
    fn begin(
        &self,
        path: &str,
        meta: &FxHashMap<String, String>,
    ) -> Result<Box<dyn RecordWriter + '_>, StoreError>;

    /// Open the record set previously written under `path`.
    fn open(&self, path: &str) -> Result<Box<dyn RecordReader + '_>, StoreError>;
}
