//! Engine-wide constants. The sentinel values are part of the public
//! algorithm, not implementation details.

use crate::types::identifiers::AuthorId;
use crate::types::timekey::TimeKey;

/// Value of the terminating timeline segment. Excluded from every query.
pub const TREE_END: TimeKey = -1;

/// Author returned by the key codec when author tracking is disabled, and
/// the owner of lines whose author is unknown.
pub const AUTHOR_MISSING: AuthorId = -1;

/// Interaction-matrix column for an author modifying their own fresh lines.
pub const AUTHOR_SELF: AuthorId = -2;

/// Width of the tick field inside a packed [`TimeKey`]. Supports 16384
/// ticks, which at the default 24h tick size is ~44 years of history.
pub const TICK_BITS: u32 = 14;

/// Mask extracting the tick field from a packed [`TimeKey`].
pub const TICK_MASK: TimeKey = (1 << TICK_BITS) - 1;

/// Conservative per-entry byte cost of a sparse-history inner map entry,
/// used for the aggregator memory estimate.
pub const SPARSE_ENTRY_BYTES: i64 = 56;

/// Default band size, in ticks.
pub const DEFAULT_GRANULARITY: i32 = 30;

/// Default sample spacing, in ticks. Clamped to granularity at init.
pub const DEFAULT_SAMPLING: i32 = 30;

/// Default tick size: one day.
pub const DEFAULT_TICK_SIZE_SECS: i64 = 86_400;

/// Timeline edits between bulk coalescing passes.
pub const DEFAULT_COALESCE_CADENCE: u32 = 500;
