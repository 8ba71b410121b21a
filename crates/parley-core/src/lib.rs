//! parley-core: configuration and logging shared by the parley crates.

pub mod config;
pub mod logging;

pub use config::{load_config, CaptureConfig, CleanerConfig, Config, ConfigError, ParticipantConfig};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingError};
