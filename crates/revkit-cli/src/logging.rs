//! Logging setup for the `revkit` binary.
//!
//! Library crates only emit `tracing` events; this module installs the
//! subscriber. Logs go to stderr so stdout stays clean for `--json` output.
//!
//! - `warn`: records that could not be compared
//! - `info`: per-run summary counts
//! - `debug`: import/export details and per-record warnings
//! - `trace`: per-pair comparison results

use std::io;
use std::str::FromStr;

use revkit_core::LoggingConfig;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub with_target: bool,
    pub with_ansi: bool,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_target: false,
            with_ansi: true,
            format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// - 0 (no `-v`): info level
    /// - 1 (`-v`): debug level
    /// - 2+ (`-vv`): trace level
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    /// Starts from the `[logging]` config section. `-v` flags can only make
    /// the output more verbose than the configured level.
    #[must_use]
    pub fn from_settings(settings: &LoggingConfig, verbosity: u8) -> Self {
        let mut config = Self::from_verbosity(verbosity);
        if let Ok(level) = Level::from_str(&settings.level) {
            // More verbose levels compare greater.
            config.level = if verbosity == 0 {
                level
            } else {
                config.level.max(level)
            };
        }
        config.format = settings.format.parse().unwrap_or_default();
        config
    }

    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }
}

/// Installs the global subscriber writing to stderr. Call once at startup.
pub fn init_logging(config: &LogConfig) {
    init_logging_with_writer(config, io::stderr);
}

pub fn init_logging_with_writer<W>(config: &LogConfig, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(config.with_target);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    }
}

/// `RUST_LOG` wins when set. Otherwise our crates log at `level` and
/// everything else at warn.
fn build_env_filter(level: Level) -> EnvFilter {
    let level = level.as_str().to_lowercase();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,revkit={level},revkit_core={level},revkit_formats={level}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(5).level, Level::TRACE);
    }

    #[test]
    fn settings_level_is_a_floor_for_verbosity() {
        let settings = LoggingConfig {
            level: "warn".to_string(),
            format: "json".to_string(),
        };
        let quiet = LogConfig::from_settings(&settings, 0);
        assert_eq!(quiet.level, Level::WARN);
        assert_eq!(quiet.format, LogFormat::Json);

        let loud = LogConfig::from_settings(&settings, 1);
        assert_eq!(loud.level, Level::DEBUG);
    }

    #[test]
    fn unknown_format_falls_back_to_pretty() {
        let settings = LoggingConfig {
            level: "nonsense".to_string(),
            format: "xml".to_string(),
        };
        let config = LogConfig::from_settings(&settings, 0);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
