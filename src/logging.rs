//! Structured logging setup using the `tracing` ecosystem.
//!
//! Configures a `tracing-subscriber` with either JSON output (for
//! production) or pretty-printed output (for TTY / local dev). Format
//! is auto-detected from the terminal but can be forced via `--json`
//! or `--pretty`. The pipeline logs with structured fields (`api_id`,
//! `request_id`, `reactor`) so both formats stay greppable.

use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

/// Filter applied to the subscriber: the chosen level for everything,
/// with the noisy HTTP client internals capped at `warn`.
#[must_use]
pub fn filter_for(level: &LogLevel) -> Targets {
    Targets::new()
        .with_default(level.to_tracing_level())
        .with_target("hyper_util", tracing::Level::WARN)
        .with_target("rustls", tracing::Level::WARN)
}

pub fn init(level: &LogLevel, format: LogFormat) {
    let filter = filter_for(level);

    #[cfg(feature = "sentry-integration")]
    let sentry_layer = sentry_tracing::layer();

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(feature = "sentry-integration")]
    let registry = registry.with(sentry_layer);

    match format {
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_target(false)).init();
        }
        LogFormat::Pretty => {
            registry.with(fmt::layer().pretty()).init();
        }
    }
}
