//! Subscriber setup for the `quarry` binary
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the executable.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when neither `QUARRY_LOG` nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "quarry=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("QUARRY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to stderr. stdout stays clean for command output and the MCP stdio
/// transport.
pub fn init() {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // A second call (tests, embedding applications) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .try_init();
}
