//! Development-time tracing for debugging phasegraph.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `PHASEGRAPH_LOG` or
//!   `RUST_LOG`, output to stderr. Not persisted, not part of command output.
//!
//! - **State files (`io/*_store`)**: Durable history under `.phasegraph/`.
//!   Always written, unaffected by the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PHASEGRAPH_LOG";

/// Initialize tracing subscriber for development logging.
///
/// Reads `PHASEGRAPH_LOG`, then `RUST_LOG`. Defaults to `warn` if neither
/// parses. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// PHASEGRAPH_LOG=phasegraph=debug phasegraph available
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
