//! Tracing subscriber setup.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Env var consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "METRICWATCH_LOG";

static INIT: Once = Once::new();

/// Install the global subscriber. Only the first call has any effect.
///
/// The filter comes from `METRICWATCH_LOG`, then `RUST_LOG`, then
/// `default_directive`.
pub fn init(default_directive: &str) {
    INIT.call_once(|| {
        let filter = filter(default_directive);

        // A subscriber installed by an embedding program wins.
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
    });
}

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
