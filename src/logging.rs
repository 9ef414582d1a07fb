// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tracing subscriber setup for the synthesizer

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log records are rendered on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Resolve the level from flags: explicit level, then verbose/quiet,
    /// then `IAC_LOG_LEVEL`, then info
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level) = log_level {
            parse_level(level)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            std::env::var("IAC_LOG_LEVEL")
                .map(|level| parse_level(&level))
                .unwrap_or(Level::INFO)
        };

        Self {
            level,
            format: LogFormat::Text,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        format!("iac_stacks={}", self.level)
    }
}

/// Parse a level name, falling back to info
pub fn parse_level(level: &str) -> Level {
    level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

/// Install the global subscriber once; later calls are no-ops
pub fn init_logging(config: &LoggingConfig) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) => EnvFilter::new(config.default_directive()),
        };

        let registry = tracing_subscriber::registry().with(filter);
        let result = match config.format {
            LogFormat::Text => registry
                .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
                .try_init(),
            LogFormat::Json => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init(),
        };

        if let Err(err) = result {
            eprintln!("Logging already initialised: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("trace", Level::TRACE)]
    #[test_case("DEBUG", Level::DEBUG)]
    #[test_case("warn", Level::WARN)]
    #[test_case("nonsense", Level::INFO)]
    fn test_parse_level(input: &str, expected: Level) {
        assert_eq!(parse_level(input), expected);
    }

    #[test]
    fn test_flags_precedence() {
        assert_eq!(
            LoggingConfig::from_flags(Some("error"), true, false).level,
            Level::ERROR
        );
        assert_eq!(LoggingConfig::from_flags(None, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_flags(None, false, true).level, Level::ERROR);
    }

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig::from_flags(Some("debug"), false, false);
        assert_eq!(config.default_directive(), "iac_stacks=DEBUG");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default().with_format(LogFormat::Json);
        init_logging(&config);
        init_logging(&config);
    }
}
