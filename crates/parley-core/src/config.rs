//! Configuration for parley conversations.
//!
//! Precedence: built-in defaults < YAML config file < environment overrides.
//! Durations are written in milliseconds in the file (`*_ms` keys) and held
//! as [`Duration`] once loaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::logging::{LogFormat, LogLevel};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Root config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub capture: CaptureConfig,
    pub cleaner: CleanerConfig,
    pub participants: BTreeMap<String, ParticipantConfig>,
}

impl Config {
    /// Parse a YAML document and layer it over the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        let partial: PartialConfig = serde_yaml::from_str(text)?;
        apply_partial(&mut cfg, partial);
        Ok(cfg)
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: &str) -> Option<&ParticipantConfig> {
        self.participants.get(id)
    }

    /// Apply `PARLEY_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("PARLEY_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_string();
        }
        if let Some(format) = lookup("PARLEY_LOG_FORMAT").filter(|v| !v.trim().is_empty()) {
            self.logging.format = format.trim().to_string();
        }
        if let Some(raw) = lookup("PARLEY_TAIL_LIMIT").filter(|v| !v.trim().is_empty()) {
            self.capture.tail_limit = raw.trim().parse::<usize>().map_err(|err| {
                ConfigError::Invalid(format!("PARLEY_TAIL_LIMIT {raw:?}: {err}"))
            })?;
        }
        Ok(())
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Logging
        if LogLevel::try_parse(&self.logging.level).is_none() {
            return Err(invalid(
                "logging.level must be one of trace, debug, info, warn, error",
            ));
        }
        if LogFormat::try_parse(&self.logging.format).is_none() {
            return Err(invalid("logging.format must be one of console, json"));
        }

        // Capture
        if self.capture.tail_limit < 1 {
            return Err(invalid("capture.tail_limit must be at least 1"));
        }
        if self.capture.min_anchor_lines < 1 {
            return Err(invalid("capture.min_anchor_lines must be at least 1"));
        }
        if self.capture.indicator_scan_lines < 1 {
            return Err(invalid("capture.indicator_scan_lines must be at least 1"));
        }

        // Participants
        for (id, participant) in &self.participants {
            if id.trim().is_empty() {
                return Err(invalid("participants must not use an empty id"));
            }
            participant
                .validate()
                .map_err(|msg| ConfigError::Invalid(format!("participants.{id}.{msg}")))?;
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

// ---------------------------------------------------------------------------
// Section configs
// ---------------------------------------------------------------------------

/// Logging configuration section.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "console".into(),
        }
    }
}

/// Snapshot and delta tuning.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Cap on delta length; also the size of the fallback tail.
    pub tail_limit: usize,
    /// Shortest trailing run that counts as an alignment anchor.
    pub min_anchor_lines: usize,
    /// Trailing content lines searched for ready/loading indicators.
    pub indicator_scan_lines: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            tail_limit: 500,
            min_anchor_lines: 2,
            indicator_scan_lines: 40,
        }
    }
}

/// Chrome vocabulary for the output cleaner.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    pub response_markers: Vec<String>,
    pub spinner_glyphs: Vec<String>,
    pub strip_box_drawing: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            response_markers: vec!["⏺".into(), "●".into()],
            spinner_glyphs: [
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✻", "✽", "✢", "✶", "✳",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            strip_box_drawing: true,
        }
    }
}

/// Per-participant driving parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantConfig {
    /// tmux target of the participant's pane (e.g. `parley:0.1`).
    pub target: String,
    pub startup_timeout: Duration,
    pub response_timeout: Duration,
    pub ready_indicators: Vec<String>,
    /// Indicators for the first-ready wait; empty means `ready_indicators`.
    pub startup_ready_indicators: Vec<String>,
    pub loading_indicators: Vec<String>,
    pub check_interval: Duration,
    pub stable_checks_required: u32,
    pub post_ready_delay: Duration,
    pub text_enter_delay: Duration,
}

impl ParticipantConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            startup_timeout: Duration::from_secs(60),
            response_timeout: Duration::from_secs(300),
            ready_indicators: Vec::new(),
            startup_ready_indicators: Vec::new(),
            loading_indicators: Vec::new(),
            check_interval: Duration::from_millis(500),
            stable_checks_required: 3,
            post_ready_delay: Duration::from_millis(500),
            text_enter_delay: Duration::from_millis(200),
        }
    }

    /// Indicators used while waiting for the first ready signal.
    pub fn startup_indicators(&self) -> &[String] {
        if self.startup_ready_indicators.is_empty() {
            &self.ready_indicators
        } else {
            &self.startup_ready_indicators
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.target.trim().is_empty() {
            return Err("target is required".into());
        }
        if self.stable_checks_required < 1 {
            return Err("stable_checks_required must be at least 1".into());
        }
        if self.check_interval.is_zero() {
            return Err("check_interval_ms must be greater than 0".into());
        }
        if self.startup_timeout.is_zero() {
            return Err("startup_timeout_ms must be greater than 0".into());
        }
        if self.response_timeout.is_zero() {
            return Err("response_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File loading
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialConfig {
    logging: PartialLoggingConfig,
    capture: PartialCaptureConfig,
    cleaner: PartialCleanerConfig,
    participants: BTreeMap<String, PartialParticipantConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialLoggingConfig {
    level: String,
    format: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialCaptureConfig {
    tail_limit: Option<usize>,
    min_anchor_lines: Option<usize>,
    indicator_scan_lines: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialCleanerConfig {
    response_markers: Option<Vec<String>>,
    spinner_glyphs: Option<Vec<String>>,
    strip_box_drawing: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialParticipantConfig {
    target: String,
    startup_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    ready_indicators: Option<Vec<String>>,
    startup_ready_indicators: Option<Vec<String>>,
    loading_indicators: Option<Vec<String>>,
    check_interval_ms: Option<u64>,
    stable_checks_required: Option<u32>,
    post_ready_delay_ms: Option<u64>,
    text_enter_delay_ms: Option<u64>,
}

/// Load config: defaults < config file < `PARLEY_*` environment.
///
/// An explicit path that cannot be read is a hard error; a missing default
/// file is not. Returns the path that was used, if any.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut cfg = Config::default();
    let mut used = None;

    let (path_to_try, is_explicit) = match explicit {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (default_config_path(), false),
    };

    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                cfg = Config::from_yaml_str(&text)?;
                tracing::debug!(path = %path.display(), "loaded config file");
                used = Some(path);
            }
            Err(source) if is_explicit => {
                return Err(ConfigError::Read { path, source });
            }
            Err(_) => {}
        }
    }

    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok((cfg, used))
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("parley").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                PathBuf::from(home)
                    .join(".config")
                    .join("parley")
                    .join("config.yaml"),
            );
        }
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) {
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }

    if let Some(v) = partial.capture.tail_limit {
        cfg.capture.tail_limit = v;
    }
    if let Some(v) = partial.capture.min_anchor_lines {
        cfg.capture.min_anchor_lines = v;
    }
    if let Some(v) = partial.capture.indicator_scan_lines {
        cfg.capture.indicator_scan_lines = v;
    }

    if let Some(v) = partial.cleaner.response_markers {
        cfg.cleaner.response_markers = v;
    }
    if let Some(v) = partial.cleaner.spinner_glyphs {
        cfg.cleaner.spinner_glyphs = v;
    }
    if let Some(v) = partial.cleaner.strip_box_drawing {
        cfg.cleaner.strip_box_drawing = v;
    }

    for (id, p) in partial.participants {
        let mut participant = ParticipantConfig::new(p.target.trim());
        if let Some(ms) = p.startup_timeout_ms {
            participant.startup_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = p.response_timeout_ms {
            participant.response_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = p.ready_indicators {
            participant.ready_indicators = v;
        }
        if let Some(v) = p.startup_ready_indicators {
            participant.startup_ready_indicators = v;
        }
        if let Some(v) = p.loading_indicators {
            participant.loading_indicators = v;
        }
        if let Some(ms) = p.check_interval_ms {
            participant.check_interval = Duration::from_millis(ms);
        }
        if let Some(v) = p.stable_checks_required {
            participant.stable_checks_required = v;
        }
        if let Some(ms) = p.post_ready_delay_ms {
            participant.post_ready_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = p.text_enter_delay_ms {
            participant.text_enter_delay = Duration::from_millis(ms);
        }
        cfg.participants.insert(id, participant);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
logging:
  level: debug
capture:
  tail_limit: 120
participants:
  claude:
    target: "parley:0.0"
    ready_indicators: ["> "]
    loading_indicators: ["esc to interrupt"]
    check_interval_ms: 250
    stable_checks_required: 4
    response_timeout_ms: 90000
  codex:
    target: "parley:0.1"
    startup_ready_indicators: ["›"]
"#;

    #[test]
    fn config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "console");
        assert_eq!(cfg.capture.tail_limit, 500);
        assert_eq!(cfg.capture.min_anchor_lines, 2);
        assert!(cfg.cleaner.strip_box_drawing);
        assert!(cfg.participants.is_empty());
    }

    #[test]
    fn config_default_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn yaml_layers_over_defaults() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "console");
        assert_eq!(cfg.capture.tail_limit, 120);
        assert_eq!(cfg.capture.indicator_scan_lines, 40);

        let claude = cfg.participant("claude").unwrap();
        assert_eq!(claude.target, "parley:0.0");
        assert_eq!(claude.check_interval, Duration::from_millis(250));
        assert_eq!(claude.stable_checks_required, 4);
        assert_eq!(claude.response_timeout, Duration::from_secs(90));
        assert_eq!(claude.startup_timeout, Duration::from_secs(60));
        assert_eq!(claude.startup_indicators(), ["> ".to_string()]);

        let codex = cfg.participant("codex").unwrap();
        assert!(codex.ready_indicators.is_empty());
        assert_eq!(codex.startup_indicators(), ["›".to_string()]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_stable_checks() {
        let mut cfg = Config::default();
        let mut p = ParticipantConfig::new("s:0.0");
        p.stable_checks_required = 0;
        cfg.participants.insert("a".into(), p);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("participants.a.stable_checks_required"), "{err}");
    }

    #[test]
    fn validate_rejects_missing_target() {
        let cfg =
            Config::from_yaml_str("participants:\n  a:\n    check_interval_ms: 10\n").unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("target is required"), "{err}");
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
        cfg.logging.level = "WARNING".into();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("PARLEY_LOG_LEVEL", "warn"),
            ("PARLEY_LOG_FORMAT", "json"),
            ("PARLEY_TAIL_LIMIT", "64"),
        ]
        .into_iter()
        .collect();
        let mut cfg = Config::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.format, "json");
        assert_eq!(cfg.capture.tail_limit, 64);
    }

    #[test]
    fn env_override_rejects_non_numeric_tail_limit() {
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "PARLEY_TAIL_LIMIT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_config_reads_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let (cfg, used) = load_config(Some(file.path())).unwrap();
        assert_eq!(used.as_deref(), Some(file.path()));
        assert_eq!(cfg.participants.len(), 2);
    }

    #[test]
    fn load_config_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = Config::from_yaml_str("participants: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
