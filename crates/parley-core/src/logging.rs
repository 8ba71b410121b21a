//! Logging bootstrap on top of `tracing-subscriber`.
//!
//! Level and format strings come from [`LoggingConfig`]; `RUST_LOG`, when
//! set, takes precedence over the configured level.

use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level string (case-insensitive). Unknown values yield `None`.
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Parse a level string, defaulting to `Info`.
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or(Self::Info)
    }

    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

/// Output format for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    pub fn try_parse(s: &str) -> Option<Self> {
        match s.to_lowercase().trim() {
            "console" => Some(Self::Console),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Parse a format string (defaults to Console).
    pub fn parse(s: &str) -> Self {
        Self::try_parse(s).unwrap_or(Self::Console)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Build the env filter for a config, honouring `RUST_LOG` first.
pub fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LogLevel::parse(&cfg.level).as_filter()))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cfg: &LoggingConfig) -> Result<(), LoggingError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(cfg))
        .with_target(true)
        .with_writer(std::io::stderr);

    let result = match LogFormat::parse(&cfg.format) {
        LogFormat::Console => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|err| LoggingError::AlreadyInitialized(err.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("bogus"), LogLevel::Info);
        assert!(LogLevel::try_parse("bogus").is_none());
        assert!(LogLevel::Debug < LogLevel::Error);
    }

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" Console "), LogFormat::Console);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Console);
        assert!(LogFormat::try_parse("xml").is_none());
    }

    #[test]
    fn second_init_reports_already_initialized() {
        let cfg = LoggingConfig::default();
        // The first call may fail too if another test installed a subscriber.
        let _ = init_logging(&cfg);
        let err = init_logging(&cfg).unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyInitialized(_)));
    }
}
