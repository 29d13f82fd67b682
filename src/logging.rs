use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable holding per-module filter directives, e.g.
/// `PROGRESS_ENGINE_LOG=graduate_progress_engine::jobs=debug`.
pub const LOG_ENV: &str = "PROGRESS_ENGINE_LOG";

static INIT: Once = Once::new();

/// Installs the global subscriber. Directives in [`LOG_ENV`] win over the
/// configured level. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

        let registry = tracing_subscriber::registry().with(filter);
        if config.json {
            registry
                .with(fmt::layer().json().with_target(true).with_current_span(true))
                .init();
        } else {
            registry
                .with(fmt::layer().with_target(true).with_line_number(true))
                .init();
        }
    });
}

fn default_directive(level: &str) -> String {
    format!("graduate_progress_engine={}", level.trim().to_ascii_lowercase())
}
