//! Structured Logging Configuration
//!
//! - JSON output for production (LOG_FORMAT=json)
//! - Human-readable output for development (default)
//!
//! ```rust,ignore
//! use warden_common::logging::init_logging;
//!
//! fn main() {
//!     init_logging("warden-sync");
//!     tracing::info!(principal_id = %id, "Session created");
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: "json" for JSON output, anything else for text (default: text)
//! - `RUST_LOG`: level filter (default: info), e.g. `RUST_LOG=warden_identity=debug,sqlx=warn`

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging for a service.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging(service_name: &str) {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    let json = log_format.eq_ignore_ascii_case("json");

    let installed = if json {
        init_json_logging(default_filter())
    } else {
        init_text_logging(default_filter())
    };

    if installed {
        tracing::debug!(service = %service_name, json, "Logging initialized");
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_json_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .flatten_event(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
        .is_ok()
}

fn init_text_logging(env_filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .try_init()
        .is_ok()
}

/// Initialize logging for tests. Output goes through the test writer so it
/// is captured unless `--nocapture` is passed.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_test_logging();
        init_logging("warden-test");
        init_logging("warden-test");
    }
}
