//! Stable exit codes for designer CLI commands.

/// Command succeeded; for `designer run`, every target got primers.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unreadable input or other errors.
pub const INVALID: i32 = 1;
/// `designer run` finished but at least one target exhausted its ladder.
pub const EXHAUSTED: i32 = 2;
