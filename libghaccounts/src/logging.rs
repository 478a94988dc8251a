//! Logging setup for the gh-accounts binary
//!
//! All output goes to stderr so stdout stays clean for command results.
//! Format and level come from CLI flags, falling back to
//! `GH_ACCOUNTS_LOG_FORMAT` and `GH_ACCOUNTS_LOG_LEVEL`. `RUST_LOG`, when
//! set, overrides the level filter entirely.
//!
//! ```no_run
//! use libghaccounts::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

const FORMAT_ENV: &str = "GH_ACCOUNTS_LOG_FORMAT";
const LEVEL_ENV: &str = "GH_ACCOUNTS_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain text, no target
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line with source locations
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` says otherwise
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings from the environment, with an optional format override
    ///
    /// Unparseable `GH_ACCOUNTS_LOG_FORMAT` values fall back to text.
    pub fn from_env(format: Option<LogFormat>, verbose: bool) -> Self {
        let format = format.unwrap_or_else(|| {
            std::env::var(FORMAT_ENV)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default()
        });
        let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| "warn".to_string());

        Self::new(format, level, verbose)
    }

    fn filter(&self) -> EnvFilter {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    }

    /// Install the global subscriber
    ///
    /// Does nothing if a subscriber is already installed.
    pub fn init(&self) {
        let filter = self.filter();

        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        if installed.is_err() {
            tracing::debug!("Logging already initialized");
        }
    }
}

/// Initialize logging from the environment only
pub fn init_default() {
    LoggingConfig::from_env(None, false).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);

        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'xml'"));
    }

    #[test]
    fn test_log_format_display_round_trip() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var(FORMAT_ENV, "json");
        std::env::set_var(LEVEL_ENV, "trace");
        let config = LoggingConfig::from_env(None, false);
        let overridden = LoggingConfig::from_env(Some(LogFormat::Pretty), true);
        std::env::remove_var(FORMAT_ENV);
        std::env::remove_var(LEVEL_ENV);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "trace");
        assert_eq!(overridden.format, LogFormat::Pretty);
        assert!(overridden.verbose);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        std::env::set_var(FORMAT_ENV, "bogus");
        let config = LoggingConfig::from_env(None, false);
        std::env::remove_var(FORMAT_ENV);

        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        LoggingConfig::new(LogFormat::Text, "warn".to_string(), false).init();
        LoggingConfig::new(LogFormat::Json, "warn".to_string(), false).init();
    }
}
