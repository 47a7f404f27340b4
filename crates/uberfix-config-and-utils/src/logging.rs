//! Logging initialization.
//!
//! Thin wrapper over the observability crate. Every UberFix process writes
//! structured JSONL to `~/.uberfix/logs/dev.jsonl`.

use crate::Paths;

/// Initialize logging for the main `uberfix` process.
///
/// ```ignore
/// init_logging("info", &paths);
/// tracing::info!("broker started");
/// ```
pub fn init_logging(level: &str, paths: &Paths) {
    init_logging_for_service("uberfix", level, paths);
}

/// Initialize logging with a custom service name.
///
/// One-shot CLI commands use a distinct name so they can be filtered out of
/// the stream written by a running broker.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
