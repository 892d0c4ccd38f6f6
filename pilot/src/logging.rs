//! Diagnostic tracing for the runner.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!   Backend script output and per-step faults are reported here.
//!
//! - **Operator output (`main`)**: Step-by-step progress on stdout.
//!
//! - **Step log (`io/step_log`)**: Optional on-disk records under the
//!   configured log directory. Unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,pilot=info";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to [`DEFAULT_FILTER`] if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=pilot=debug pilot "open the settings menu"
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
