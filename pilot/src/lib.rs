//! Bounded observe/decide/act agent runner for graphical targets.
//!
//! A session binds one execution backend (the local display or a sandboxed
//! remote desktop) and one decision policy, then drives tasks through a
//! step-budgeted loop:
//!
//! - **[`core`]**: Pure, deterministic logic (the step state machine, shared
//!   types and reports). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (backends, policy command, config,
//!   step log). Isolated behind traits to enable scripted doubles in tests.
//!
//! [`controller`] coordinates core logic with I/O to run a task.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
