//! Logging setup for the relayer process.
//!
//! The relayer has no distributed-tracing backend to export spans to, so this
//! is a plain `tracing-subscriber` fallback: an `EnvFilter` driven by
//! `RUST_LOG` (default `info`), writing to stdout.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// Call once at process startup, before anything logs. Safe to call at most
/// once per process; a second call panics, matching `tracing_subscriber`'s
/// own global-registry contract.
pub struct Telemetry;

impl Telemetry {
    /// Initializes the global subscriber from `RUST_LOG` (default: `info`).
    pub fn init() -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        Self
    }
}
