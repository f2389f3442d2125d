//! Identifier types shared across the engine.

/// Dense, monotonically assigned file path id. Never reused.
pub type PathId = u32;

/// Author id as assigned by the caller. Negative values are reserved
/// sentinels ([`crate::constants::AUTHOR_MISSING`],
/// [`crate::constants::AUTHOR_SELF`]).
pub type AuthorId = i32;

/// Integer timestamp chosen by the caller, typically
/// `floor(commit_time / tick_size)`.
pub type Tick = i32;
