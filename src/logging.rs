//! Logging and tracing setup for pedis.
//!
//! Diagnostics go to stderr through `tracing`; the disassembly report itself
//! is written to stdout, so the two never interleave in redirected output.

use std::sync::Once;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Filter used when neither `RUST_LOG` nor the configuration names one.
pub const DEFAULT_FILTER: &str = "warn";

fn env_filter(directive: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.unwrap_or(DEFAULT_FILTER)))
}

/// Initialize the global tracing subscriber with human-readable output.
///
/// Subsequent calls (of either initializer) are ignored.
pub fn init_tracing(directive: Option<&str>) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time();

        let _ = tracing_subscriber::registry()
            .with(env_filter(directive))
            .with(fmt_layer)
            .try_init();

        debug!("pedis tracing initialized");
    });
}

/// Initialize tracing with JSON output for structured logging.
pub fn init_tracing_json(directive: Option<&str>) {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true);

        let _ = tracing_subscriber::registry()
            .with(env_filter(directive))
            .with(fmt_layer)
            .try_init();

        debug!("pedis tracing initialized (JSON mode)");
    });
}

/// Initialize tracing as described by a [`LoggingConfig`].
pub fn init_from_config(config: &LoggingConfig) {
    if config.json {
        init_tracing_json(config.filter.as_deref());
    } else {
        init_tracing(config.filter.as_deref());
    }
}
