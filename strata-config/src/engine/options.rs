//! Engine options and the deployment environment.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Shortest accepted hot-reload poll interval.
pub const MIN_RELOAD_INTERVAL: Duration = Duration::from_millis(500);

/// Longest accepted hot-reload poll interval.
pub const MAX_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Placeholder replaced by the environment name in the filename template.
pub const ENV_PLACEHOLDER: &str = "{env}";

/// Deployment environment selecting the overlay document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[serde(alias = "dev")]
    Development,
    #[serde(alias = "test")]
    Testing,
    #[serde(alias = "stage")]
    Staging,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Testing,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Reads `STRATA_ENV`, falling back to `RUN_MODE`.
    pub fn from_env() -> ConfigResult<Option<Self>> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Option<Self>> {
        match lookup("STRATA_ENV").or_else(|| lookup("RUN_MODE")) {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Options controlling a [`ConfigurationEngine`](super::ConfigurationEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// The persisted user document
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// JSON Schema applied to the merged document
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    /// The default document; a built-in default is used when absent or unreadable
    #[serde(default)]
    pub default_config_path: Option<PathBuf>,

    #[serde(default)]
    pub auto_reload: bool,

    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: f64,

    /// Persist only the difference from the default document
    #[serde(default = "default_true")]
    pub save_diff_only: bool,

    #[serde(default = "default_true")]
    pub lock_default_config: bool,

    #[serde(default)]
    pub environment: Environment,

    /// Environment overlay filename, resolved next to the default document
    #[serde(default = "default_env_template")]
    pub env_config_filename_template: String,

    /// Quiet period before an external change is reloaded
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// CPU load above which hot-reload polling backs off
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f32,

    #[serde(default = "default_cpu_check_interval_secs")]
    pub cpu_check_interval_secs: u64,
}

fn default_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("strata").join("config.json");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".strata").join("config.json");
    }

    PathBuf::from("strata-config.json")
}

fn default_reload_interval_secs() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_env_template() -> String {
    format!("config.{}.json", ENV_PLACEHOLDER)
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_cpu_percent() -> f32 {
    50.0
}

fn default_cpu_check_interval_secs() -> u64 {
    5
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            schema_path: None,
            default_config_path: None,
            auto_reload: false,
            reload_interval_secs: default_reload_interval_secs(),
            save_diff_only: true,
            lock_default_config: true,
            environment: Environment::default(),
            env_config_filename_template: default_env_template(),
            debounce_ms: default_debounce_ms(),
            max_cpu_percent: default_max_cpu_percent(),
            cpu_check_interval_secs: default_cpu_check_interval_secs(),
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl EngineOptions {
    /// Options for a user document at `config_path`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `STRATA_*` environment variables.
    ///
    /// Reads `STRATA_CONFIG_PATH`, `STRATA_SCHEMA_PATH`,
    /// `STRATA_DEFAULT_CONFIG_PATH`, `STRATA_AUTO_RELOAD`,
    /// `STRATA_SAVE_DIFF_ONLY`, and `STRATA_ENV` (or `RUN_MODE`).
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut options = Self::default();
        if let Some(path) = lookup("STRATA_CONFIG_PATH") {
            options.config_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("STRATA_SCHEMA_PATH") {
            options.schema_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("STRATA_DEFAULT_CONFIG_PATH") {
            options.default_config_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup("STRATA_AUTO_RELOAD") {
            options.auto_reload = parse_flag(&flag);
        }
        if let Some(flag) = lookup("STRATA_SAVE_DIFF_ONLY") {
            options.save_diff_only = parse_flag(&flag);
        }
        if let Some(environment) = Environment::from_lookup(&lookup)? {
            options.environment = environment;
        }
        Ok(options)
    }

    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn with_default_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_config_path = Some(path.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    pub fn with_save_diff_only(mut self, enabled: bool) -> Self {
        self.save_diff_only = enabled;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// The configured poll interval, clamped to the accepted range.
    pub fn reload_interval(&self) -> Duration {
        let secs = if self.reload_interval_secs.is_finite() {
            self.reload_interval_secs
                .clamp(0.0, MAX_RELOAD_INTERVAL.as_secs_f64())
        } else {
            0.0
        };
        clamp_reload_interval(Duration::from_secs_f64(secs))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cpu_check_interval(&self) -> Duration {
        Duration::from_secs(self.cpu_check_interval_secs)
    }

    /// Path of the overlay document for `environment`.
    ///
    /// Resolved against the directory of the default document, or of the
    /// user document when no default path is configured.
    pub fn env_config_path(&self, environment: Environment) -> PathBuf {
        let anchor = self
            .default_config_path
            .as_deref()
            .unwrap_or(self.config_path.as_path());
        let dir = anchor.parent().unwrap_or_else(|| Path::new("."));
        let filename = self
            .env_config_filename_template
            .replace(ENV_PLACEHOLDER, environment.as_str());
        dir.join(filename)
    }
}

pub(crate) fn clamp_reload_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_RELOAD_INTERVAL, MAX_RELOAD_INTERVAL)
}

/// Per-call options for mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write the user document after the change is committed
    pub persist: bool,
    /// Validate the merged document before committing
    pub validate: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            persist: true,
            validate: true,
        }
    }
}

impl WriteOptions {
    /// Commit in memory only.
    pub fn in_memory() -> Self {
        Self {
            persist: false,
            ..Default::default()
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}
