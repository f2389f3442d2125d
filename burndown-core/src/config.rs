//! Analyzer configuration.
//!
//! The engine receives a typed [`BurndownConfig`]; the loosely typed facts
//! map accepted by drivers is an edge adapter ([`BurndownConfig::from_facts`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{DEFAULT_GRANULARITY, DEFAULT_SAMPLING, DEFAULT_TICK_SIZE_SECS};
use crate::errors::ConfigError;
use crate::types::collections::FxHashMap;

/// Configuration for the burndown history analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BurndownConfig {
    /// Band size in ticks.
    pub granularity: i32,
    /// Sample spacing in ticks. Clamped to ≤ granularity at initialize.
    pub sampling: i32,
    /// Enable per-file sparse histories.
    pub track_files: bool,
    /// Enable per-author tracking (packed time keys, people histories,
    /// interaction matrix, ownership snapshots).
    pub track_people: bool,
    /// Number of known authors. Must be ≥ 0.
    pub people_count: i32,
    /// Author names indexed by author id.
    pub reversed_people_dict: Vec<String>,
    /// Shard memory estimate above which shard state is spilled to disk.
    /// 0 disables hibernation.
    pub hibernation_threshold: i64,
    /// Whether hibernation writes to disk (as opposed to only compacting).
    pub hibernation_to_disk: bool,
    /// Directory for shard spill state.
    pub hibernation_dir: Option<PathBuf>,
    /// Worker count for shard-parallel operations. Must be ≥ 1.
    pub workers: usize,
    /// Seconds per tick.
    pub tick_size_secs: i64,
    pub debug: bool,
}

impl Default for BurndownConfig {
    fn default() -> Self {
        Self {
            granularity: DEFAULT_GRANULARITY,
            sampling: DEFAULT_SAMPLING,
            track_files: false,
            track_people: false,
            people_count: 0,
            reversed_people_dict: Vec::new(),
            hibernation_threshold: 0,
            hibernation_to_disk: false,
            hibernation_dir: None,
            workers: 1,
            tick_size_secs: DEFAULT_TICK_SIZE_SECS,
            debug: false,
        }
    }
}

impl BurndownConfig {
    /// Build a config from a driver facts map. Unknown keys are ignored;
    /// known keys with the wrong JSON type surface [`ConfigError::BadFact`].
    pub fn from_facts(facts: &FxHashMap<String, Value>) -> Result<Self, ConfigError> {
        const KNOWN: [&str; 13] = [
            "granularity",
            "sampling",
            "track_files",
            "track_people",
            "people_count",
            "reversed_people_dict",
            "hibernation_threshold",
            "hibernation_to_disk",
            "hibernation_dir",
            "goroutines",
            "workers",
            "tick_size_secs",
            "debug",
        ];
        for key in facts.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::debug!(key = %key, "ignoring unknown configuration fact");
            }
        }
        let mut config = Self::default();
        if let Some(v) = facts.get("granularity") {
            config.granularity = int_fact("granularity", v)? as i32;
        }
        if let Some(v) = facts.get("sampling") {
            config.sampling = int_fact("sampling", v)? as i32;
        }
        if let Some(v) = facts.get("track_files") {
            config.track_files = bool_fact("track_files", v)?;
        }
        if let Some(v) = facts.get("track_people") {
            config.track_people = bool_fact("track_people", v)?;
        }
        if let Some(v) = facts.get("people_count") {
            config.people_count = int_fact("people_count", v)? as i32;
        }
        if let Some(v) = facts.get("reversed_people_dict") {
            config.reversed_people_dict = string_list_fact("reversed_people_dict", v)?;
        }
        if let Some(v) = facts.get("hibernation_threshold") {
            config.hibernation_threshold = int_fact("hibernation_threshold", v)?;
        }
        if let Some(v) = facts.get("hibernation_to_disk") {
            config.hibernation_to_disk = bool_fact("hibernation_to_disk", v)?;
        }
        if let Some(v) = facts.get("hibernation_dir") {
            config.hibernation_dir = Some(PathBuf::from(str_fact("hibernation_dir", v)?));
        }
        // Accept either spelling; drivers ported from other runtimes use the
        // first.
        if let Some(v) = facts.get("goroutines").or_else(|| facts.get("workers")) {
            config.workers = int_fact("workers", v)?.max(1) as usize;
        }
        if let Some(v) = facts.get("tick_size_secs") {
            config.tick_size_secs = int_fact("tick_size_secs", v)?;
        }
        if let Some(v) = facts.get("debug") {
            config.debug = bool_fact("debug", v)?;
        }
        Ok(config)
    }

    /// Validate invariants that `initialize` relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.people_count < 0 {
            return Err(ConfigError::NegativePeopleCount(self.people_count));
        }
        if self.sampling < 1 {
            return Err(ConfigError::InvalidSampling(self.sampling));
        }
        if self.granularity < 1 {
            return Err(ConfigError::InvalidGranularity(self.granularity));
        }
        if self.track_people
            && !self.reversed_people_dict.is_empty()
            && self.reversed_people_dict.len() != self.people_count as usize
        {
            return Err(ConfigError::PeopleDictShape {
                expected: self.people_count,
                got: self.reversed_people_dict.len(),
            });
        }
        Ok(())
    }

    /// Sampling clamped to the granularity, as applied at initialize.
    pub fn effective_sampling(&self) -> i32 {
        self.sampling.min(self.granularity)
    }

    /// Tick size in nanoseconds, as written to chart records.
    pub fn tick_size_nanos(&self) -> i64 {
        self.tick_size_secs * 1_000_000_000
    }
}

fn int_fact(key: &str, v: &Value) -> Result<i64, ConfigError> {
    v.as_i64().ok_or_else(|| bad(key, v))
}

fn bool_fact(key: &str, v: &Value) -> Result<bool, ConfigError> {
    v.as_bool().ok_or_else(|| bad(key, v))
}

fn str_fact(key: &str, v: &Value) -> Result<String, ConfigError> {
    v.as_str().map(str::to_string).ok_or_else(|| bad(key, v))
}

fn string_list_fact(key: &str, v: &Value) -> Result<Vec<String>, ConfigError> {
    let list = v.as_array().ok_or_else(|| bad(key, v))?;
    list.iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(|| bad(key, v)))
        .collect()
}

fn bad(key: &str, v: &Value) -> ConfigError {
    ConfigError::BadFact {
        key: key.to_string(),
        value: v.to_string(),
    }
}
