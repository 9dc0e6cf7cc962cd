//! Subscriber settings and installation.

use std::collections::HashMap;
use std::env;
use std::io;

use tracing_subscriber::fmt::time::{ChronoLocal, ChronoUtc};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %z";
const UTC_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Filter target of the engine's own events.
pub const ENGINE_TARGET: &str = "strata_config";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// How events are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    #[default]
    Local,
    Utc,
    None,
}

impl TimestampFormat {
    /// Unknown names fall back to `Local`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "utc" => TimestampFormat::Utc,
            "none" | "off" => TimestampFormat::None,
            _ => TimestampFormat::Local,
        }
    }
}

/// Settings for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub timestamps: TimestampFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_level: String,
    /// Extra level for the engine's own events, appended to `default_level`
    pub engine_level: Option<String>,
    /// Source file and line
    pub include_location: bool,
    pub include_thread_ids: bool,
    /// Span context; JSON output only
    pub include_spans: bool,
    /// Write to stderr instead of stdout
    pub to_stderr: bool,
    pub app_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            timestamps: TimestampFormat::Local,
            default_level: "info".to_string(),
            engine_level: None,
            include_location: true,
            include_thread_ids: false,
            include_spans: false,
            to_stderr: false,
            app_name: None,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl LogConfig {
    /// Settings from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `LOG_FORMAT` | `format` |
    /// | `LOG_TIMESTAMPS` | `timestamps` |
    /// | `LOG_LEVEL` | `default_level` |
    /// | `STRATA_LOG_LEVEL` | `engine_level` |
    /// | `LOG_LOCATION` | `include_location` |
    /// | `LOG_THREAD_IDS` | `include_thread_ids` |
    /// | `LOG_STDERR` | `to_stderr` |
    /// | `LOG_APP_NAME` | `app_name` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Settings from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| lookup(key).map(|raw| parse_flag(&raw)).unwrap_or(default);

        Self {
            format: lookup("LOG_FORMAT").map(|s| LogFormat::parse(&s)).unwrap_or_default(),
            timestamps: lookup("LOG_TIMESTAMPS")
                .map(|s| TimestampFormat::parse(&s))
                .unwrap_or_default(),
            default_level: lookup("LOG_LEVEL").unwrap_or(defaults.default_level),
            engine_level: lookup("STRATA_LOG_LEVEL"),
            include_location: flag("LOG_LOCATION", defaults.include_location),
            include_thread_ids: flag("LOG_THREAD_IDS", defaults.include_thread_ids),
            include_spans: defaults.include_spans,
            to_stderr: flag("LOG_STDERR", defaults.to_stderr),
            app_name: lookup("LOG_APP_NAME"),
        }
    }

    /// Machine-readable output for log shippers.
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            timestamps: TimestampFormat::Utc,
            include_thread_ids: true,
            include_spans: true,
            ..Default::default()
        }
    }

    pub fn compact() -> Self {
        Self {
            format: LogFormat::Compact,
            include_location: false,
            ..Default::default()
        }
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Raises or lowers the engine's verbosity independently of the application.
    pub fn with_engine_level(mut self, level: impl Into<String>) -> Self {
        self.engine_level = Some(level.into());
        self
    }

    pub fn with_stderr(mut self) -> Self {
        self.to_stderr = true;
        self
    }

    /// The filter directive applied when `RUST_LOG` is unset.
    pub fn filter_directive(&self) -> String {
        match &self.engine_level {
            Some(level) => format!("{},{}={}", self.default_level, ENGINE_TARGET, level),
            None => self.default_level.clone(),
        }
    }
}

// Every format is its own layer type, so the timer has to be chosen per arm.
macro_rules! timed_layer {
    ($layer:expr, $timestamps:expr) => {
        match $timestamps {
            TimestampFormat::Local => $layer
                .with_timer(ChronoLocal::new(LOCAL_TIME_FORMAT.to_string()))
                .boxed(),
            TimestampFormat::Utc => $layer
                .with_timer(ChronoUtc::new(UTC_TIME_FORMAT.to_string()))
                .boxed(),
            TimestampFormat::None => $layer.without_time().boxed(),
        }
    };
}

fn output_layer(config: &LogConfig) -> BoxedLayer {
    let (writer, is_terminal) = if config.to_stderr {
        (BoxMakeWriter::new(io::stderr), atty::is(atty::Stream::Stderr))
    } else {
        (BoxMakeWriter::new(io::stdout), atty::is(atty::Stream::Stdout))
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_ansi(config.format != LogFormat::Json && is_terminal);

    match config.format {
        LogFormat::Json => timed_layer!(
            layer
                .json()
                .with_current_span(config.include_spans)
                .with_span_list(config.include_spans),
            config.timestamps
        ),
        LogFormat::Compact => timed_layer!(layer.compact(), config.timestamps),
        LogFormat::Pretty => timed_layer!(layer, config.timestamps),
    }
}

/// Installs a global subscriber built from `config`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))?;

    tracing_subscriber::registry()
        .with(output_layer(&config))
        .with(filter)
        .try_init()?;

    if let Some(name) = &config.app_name {
        tracing::info!(app = %name, format = ?config.format, "Logging initialized");
    }
    Ok(())
}

/// Variables from a fixed map, for [`LogConfig::from_lookup`].
pub fn lookup_in(vars: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
    move |key: &str| vars.get(key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
        assert_eq!(TimestampFormat::parse("UTC"), TimestampFormat::Utc);
        assert_eq!(TimestampFormat::parse("off"), TimestampFormat::None);
        assert_eq!(TimestampFormat::parse("whatever"), TimestampFormat::Local);
    }

    #[test]
    fn test_from_lookup() {
        let env = vars(&[
            ("LOG_FORMAT", "json"),
            ("LOG_LEVEL", "warn"),
            ("STRATA_LOG_LEVEL", "debug"),
            ("LOG_LOCATION", "false"),
            ("LOG_STDERR", "yes"),
            ("LOG_APP_NAME", "settings-daemon"),
        ]);
        let config = LogConfig::from_lookup(lookup_in(&env));

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.timestamps, TimestampFormat::Local);
        assert!(!config.include_location);
        assert!(config.to_stderr);
        assert_eq!(config.app_name.as_deref(), Some("settings-daemon"));
        assert_eq!(config.filter_directive(), "warn,strata_config=debug");
    }

    #[test]
    fn test_from_empty_lookup_matches_default() {
        let config = LogConfig::from_lookup(|_| None);
        let defaults = LogConfig::default();
        assert_eq!(config.format, defaults.format);
        assert_eq!(config.default_level, defaults.default_level);
        assert_eq!(config.include_location, defaults.include_location);
        assert_eq!(config.filter_directive(), "info");
    }

    #[test]
    fn test_presets() {
        let json = LogConfig::json();
        assert_eq!(json.timestamps, TimestampFormat::Utc);
        assert!(json.include_spans);

        let compact = LogConfig::compact().with_engine_level("trace").with_stderr();
        assert!(!compact.include_location);
        assert!(compact.to_stderr);
        assert_eq!(compact.filter_directive(), "info,strata_config=trace");
    }

    #[test]
    fn test_every_combination_builds() {
        for format in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            for timestamps in [TimestampFormat::Local, TimestampFormat::Utc, TimestampFormat::None] {
                for to_stderr in [false, true] {
                    let config = LogConfig {
                        format,
                        timestamps,
                        to_stderr,
                        ..Default::default()
                    };
                    let _layer = output_layer(&config);
                }
            }
        }
    }
}
