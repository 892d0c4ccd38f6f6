//! Stable exit codes for the `pilot` CLI.

/// Task completed (or the interactive session ended normally).
pub const OK: i32 = 0;
/// Fatal error: invalid configuration, backend/policy construction, or I/O failure.
pub const FATAL: i32 = 1;
/// One-shot task exhausted its step budget without completing.
pub const TIMED_OUT: i32 = 2;
