//! Global `tracing` logger configuration.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Initialize a global `tracing` logger printing to stdout.
///
/// Defaults to INFO and above; override per-target with a `RUST_LOG` env
/// var. Panics if a logger is already set.
pub fn init() {
    try_init().expect("failed to set up logger");
}

/// Logger init for tests: does nothing unless `RUST_LOG` is set, and never
/// panics when multiple test threads race to install the subscriber.
pub fn init_for_testing() {
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    let _ = try_init();
}

pub fn try_init() -> Result<(), TryInitError> {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|targets| Targets::from_str(&targets).ok())
        .unwrap_or_else(|| Targets::new().with_default(Level::INFO));

    let stdout_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(filter);

    tracing_subscriber::registry().with(stdout_log).try_init()
}
