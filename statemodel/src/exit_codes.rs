//! Stable exit codes for statemodel CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed: unreadable trace or store, selection or model error.
pub const ERROR: i32 = 1;
/// Configuration file is malformed or fails validation.
pub const CONFIG: i32 = 2;
