//! Structured logging.
//!
//! Uses `tracing` with an `EnvFilter`. `RUST_LOG` wins over the configured
//! level so a single run can be made more verbose without editing config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directives for a configured log level.
pub fn default_directives(log_level: &str) -> String {
    format!("retarget_proxy={log_level},tower_http={log_level}")
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
