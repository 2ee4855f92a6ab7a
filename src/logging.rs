//! Subscriber setup for the `tracing` events emitted by the acquisition core.
//!
//! Events go to stderr so that tables and JSON reports on stdout stay clean.
//! `RUST_LOG` wins over the configured level when it is set.
//!
//! ```no_run
//! use resistivity_daq::{config::Settings, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings)?;
//! tracing::info!("Application started");
//! # Ok(())
//! # }
//! ```

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::{ApplicationSettings, Settings};

/// How log lines are rendered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Subscriber options derived from [`ApplicationSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: Level,
    /// Line format.
    pub format: LogFormat,
    /// Log span open/close, e.g. around a burst. On at debug and trace.
    pub span_events: bool,
    /// Colour escapes. Never used for JSON.
    pub ansi: bool,
}

impl TracingConfig {
    /// Options for `level` in `format`. Span events follow the level and colour
    /// follows whether stderr is a terminal.
    pub fn new(level: Level, format: LogFormat) -> Self {
        Self {
            level,
            format,
            span_events: matches!(level, Level::DEBUG | Level::TRACE),
            ansi: format != LogFormat::Json && std::io::stderr().is_terminal(),
        }
    }

    /// Options for the `[application]` section.
    pub fn from_settings(settings: &ApplicationSettings) -> Result<Self, String> {
        let level = parse_log_level(&settings.log_level)?;
        Ok(Self::new(level, settings.log_format))
    }

    /// Same options rendered in `format`, e.g. from a command-line override.
    pub fn with_format(self, format: LogFormat) -> Self {
        Self::new(self.level, format)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()))
    }
}

/// Install the global subscriber described by `settings.application`.
pub fn init_from_settings(settings: &Settings) -> Result<(), String> {
    init(TracingConfig::from_settings(&settings.application)?)
}

/// Install the global subscriber.
///
/// Does nothing when a global subscriber is already set, so test harnesses and
/// embedding applications keep theirs.
pub fn init(config: TracingConfig) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(spans);

    let layer = match config.format {
        LogFormat::Pretty => layer.pretty().with_ansi(config.ansi).boxed(),
        LogFormat::Compact => layer.compact().with_ansi(config.ansi).boxed(),
        LogFormat::Json => layer.json().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(config.filter()))
        .try_init()
        .map_err(|e| format!("Failed to install log subscriber: {e}"))
}

/// Level named by `level`, case-insensitive.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    let parsed = match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            return Err(format!(
                "Invalid log level '{level}'. Expected trace, debug, info, warn or error"
            ))
        }
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert_eq!(parse_log_level(" WARN "), Ok(Level::WARN));
        assert!(parse_log_level("verbose").unwrap_err().contains("verbose"));
        assert!(parse_log_level("3").is_err());
    }

    #[test]
    fn settings_choose_level_and_format() {
        let settings = ApplicationSettings {
            log_level: "debug".to_string(),
            log_format: LogFormat::Json,
        };
        let config = TracingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert!(!config.ansi);
    }

    #[test]
    fn quiet_levels_skip_span_events() {
        let config = TracingConfig::from_settings(&ApplicationSettings::default()).unwrap();
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.span_events);
    }

    #[test]
    fn format_override_keeps_level() {
        let config = TracingConfig::new(Level::WARN, LogFormat::Pretty).with_format(LogFormat::Json);
        assert_eq!(config.level, Level::WARN);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.ansi);
    }
}
