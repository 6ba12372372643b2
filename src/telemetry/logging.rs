//! Logging configuration and initialization
//!
//! Structured logging with tracing: compact console output by default, JSON
//! on request, and an optional non-blocking log file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Filter override, checked before `RUST_LOG`
pub const LOG_ENV: &str = "MEDIA_PLAYER_LOG";
/// Set to `json` for JSON console output
pub const LOG_FORMAT_ENV: &str = "MEDIA_PLAYER_LOG_FORMAT";
/// Path of an additional log file
pub const LOG_FILE_ENV: &str = "MEDIA_PLAYER_LOG_FILE";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Also write to this file (default: None)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Filter used when neither environment variable is set (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Defaults with the given filter, plus any file path from `MEDIA_PLAYER_LOG_FILE`
    pub fn with_level(level: &str) -> Self {
        Self {
            file_path: std::env::var_os(LOG_FILE_ENV).map(PathBuf::from),
            default_level: level.to_string(),
            ..Default::default()
        }
    }
}

/// Whether a `MEDIA_PLAYER_LOG_FORMAT` value selects JSON
fn is_json_format(value: Option<&str>, fallback: bool) -> bool {
    value.map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(fallback)
}

/// Initialize the global subscriber.
///
/// Returns the file writer's guard when file logging is enabled; keep it
/// alive for the life of the program so buffered lines are flushed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = is_json_format(std::env::var(LOG_FORMAT_ENV).ok().as_deref(), config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;
    let file_layer = match &config.file_path {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            file_guard = Some(guard);
            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let json_layer = (config.console_enabled && use_json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    let console_layer = (config.console_enabled && !use_json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        target: "media_player",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        log_file = ?config.file_path,
        "Logging initialized"
    );

    Ok(file_guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(config.file_path.is_none());
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_json_format_detection() {
        assert!(is_json_format(Some("json"), false));
        assert!(is_json_format(Some("JSON"), false));
        assert!(!is_json_format(Some("pretty"), true));
        assert!(is_json_format(None, true));
        assert!(!is_json_format(None, false));
    }
}
