//! Thread-safe path interning with dense, monotonically assigned ids.
//!
//! The interner is shared by reference across forked analyzer instances:
//! cloning a [`PathInterner`] clones the inner `Arc`, so every fork observes
//! the same id assignments. Reads are lock-free in the fast path; new
//! interns synchronize inside `lasso`.

use std::sync::Arc;

use lasso::{Key, Spur, ThreadedRodeo};

use crate::types::identifiers::PathId;

/// Bidirectional mapping between file path strings and stable 32-bit ids.
#[derive(Debug, Clone)]
pub struct PathInterner {
    rodeo: Arc<ThreadedRodeo>,
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}

impl PathInterner {
    pub fn new() -> Self {
        Self {
            rodeo: Arc::new(ThreadedRodeo::default()),
        }
    }

    /// Intern `name`, returning its existing id or assigning the next one.
    pub fn intern(&self, name: &str) -> PathId {
        self.rodeo.get_or_intern(name).into_usize() as PathId
    }

    /// Id of `name` if it has been interned.
    pub fn get(&self, name: &str) -> Option<PathId> {
        self.rodeo.get(name).map(|s| s.into_usize() as PathId)
    }

    /// Path string for `id`. Unknown ids resolve to `None`.
    pub fn lookup(&self, id: PathId) -> Option<&str> {
        let spur = Spur::try_from_usize(id as usize)?;
        self.rodeo.try_resolve(&spur)
    }

    /// Path string for `id`, or the empty string for unknown ids.
    pub fn lookup_or_empty(&self, id: PathId) -> &str {
        self.lookup(id).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }

    /// True when `other` shares this interner's storage (fork identity).
    pub fn shares_storage_with(&self, other: &PathInterner) -> bool {
        Arc::ptr_eq(&self.rodeo, &other.rodeo)
    }

    /// All interned paths in id order, for checkpointing.
    pub fn snapshot(&self) -> Vec<String> {
        (0..self.len() as PathId)
            .map(|id| self.lookup_or_empty(id).to_string())
            .collect()
    }

    /// Rebuild from a checkpoint snapshot. Ids are reassigned in order, so
    /// they match the snapshot indices exactly.
    pub fn from_snapshot(paths: &[String]) -> Self {
        let interner = Self::new();
        for path in paths {
            interner.intern(path);
        }
        interner
    }
}
