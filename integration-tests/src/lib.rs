//! Integration test harness for strata-config
//!
//! Exercises the engine end to end against real files in a temporary
//! directory:
//!
//! ```text
//! default.json + config.<env>.json + user/config.json → ConfigurationEngine → callbacks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use integration_tests::ConfigFixture;
//!
//! let fixture = ConfigFixture::new();
//! fixture.write_default(json!({"version": "1.0", "display": {"width": 800}}));
//! let engine = ConfigurationEngine::initialize(fixture.options()).unwrap();
//! ```

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use strata_config::logging::{init_logging, LogConfig};
use strata_config::{EngineOptions, Environment};
use tempfile::TempDir;

/// A directory holding every document one engine reads.
pub struct ConfigFixture {
    dir: TempDir,
}

impl ConfigFixture {
    pub fn new() -> Self {
        init_test_logging();
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn default_path(&self) -> PathBuf {
        self.dir.path().join("default.json")
    }

    pub fn schema_path(&self) -> PathBuf {
        self.dir.path().join("schema.json")
    }

    pub fn user_path(&self) -> PathBuf {
        self.dir.path().join("user").join("config.json")
    }

    pub fn env_path(&self, environment: Environment) -> PathBuf {
        self.dir.path().join(format!("config.{}.json", environment))
    }

    pub fn write_default(&self, doc: Value) {
        write_json(&self.default_path(), &doc);
    }

    pub fn write_schema(&self, schema: Value) {
        write_json(&self.schema_path(), &schema);
    }

    pub fn write_env(&self, environment: Environment, doc: Value) {
        write_json(&self.env_path(environment), &doc);
    }

    pub fn write_user(&self, doc: Value) {
        write_json(&self.user_path(), &doc);
    }

    pub fn write_user_raw(&self, text: &str) {
        let path = self.user_path();
        fs::create_dir_all(path.parent().expect("user dir")).expect("create user dir");
        fs::write(path, text).expect("write user file");
    }

    /// The persisted user document.
    pub fn read_user(&self) -> Value {
        let text = fs::read_to_string(self.user_path()).expect("read user file");
        serde_json::from_str(&text).expect("user file is JSON")
    }

    /// Options pointing at this fixture's documents. The schema is included when written.
    pub fn options(&self) -> EngineOptions {
        let mut options = EngineOptions::new(self.user_path()).with_default_config_path(self.default_path());
        if self.schema_path().exists() {
            options = options.with_schema_path(self.schema_path());
        }
        options
    }

    /// A typical default document and schema pair.
    pub fn with_standard_documents(self) -> Self {
        self.write_default(standard_default());
        self.write_schema(standard_schema());
        self
    }
}

impl Default for ConfigFixture {
    fn default() -> Self {
        Self::new()
    }
}

pub fn standard_default() -> Value {
    json!({
        "version": "1.0",
        "display": {"width": 800, "height": 600, "fullscreen": false},
        "app": {"name": "Strata", "theme": "light"},
        "network": {"timeout_ms": 3000, "retries": 3}
    })
}

pub fn standard_schema() -> Value {
    json!({
        "type": "object",
        "required": ["version", "display"],
        "properties": {
            "version": {"type": "string"},
            "display": {
                "type": "object",
                "properties": {
                    "width": {"type": "integer", "minimum": 320, "maximum": 7680},
                    "height": {"type": "integer", "minimum": 240},
                    "fullscreen": {"type": "boolean"}
                }
            },
            "app": {
                "type": "object",
                "properties": {
                    "theme": {"enum": ["light", "dark"]}
                }
            }
        }
    })
}

fn write_json(path: &Path, doc: &Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let text = serde_json::to_string_pretty(doc).expect("serialize fixture");
    fs::write(path, text).expect("write fixture");
}

/// Installs compact engine logging once; `RUST_LOG` overrides the level.
pub fn init_test_logging() {
    let config = LogConfig::compact()
        .with_default_level("warn")
        .with_app_name("integration-tests");
    // Later calls find a subscriber already installed.
    let _ = init_logging(config);
}
