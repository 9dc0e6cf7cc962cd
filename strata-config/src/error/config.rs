//! The engine-wide error type.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the crate.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading, validating, migrating, or mutating configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A file could not be read, written, or created
    #[error("Storage error for '{}': {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document on disk is not valid JSON
    #[error("Failed to parse '{}': {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// A document could not be serialized
    #[error("Failed to serialize document: {0}")]
    Serialize(String),

    /// A schema document is not a valid JSON Schema
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Schema or custom validation rejected a document
    #[error("Validation failed at '{path}': {message}")]
    Validation { message: String, path: String },

    /// A version string is not dot-separated non-negative integers
    #[error("Invalid version string '{0}'")]
    VersionFormat(String),

    /// The user document is newer than the default document
    #[error("Document version {found} is newer than supported version {supported}")]
    Downgrade { found: String, supported: String },

    /// A migration edge would not move the version forward
    #[error("Migration edge {from} -> {to} does not move forward")]
    MigrationCycle { from: String, to: String },

    /// A migration transform failed
    #[error("Migration {from} -> {to} failed: {reason}")]
    Migration {
        from: String,
        to: String,
        reason: String,
    },

    /// A dotted key path is malformed
    #[error("Invalid key path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// An intermediate segment of a key path holds a non-mapping value
    #[error("Cannot write '{path}': segment '{segment}' is not a mapping")]
    PathConflict { path: String, segment: String },

    /// A key path does not exist
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A user-level write touched a protected key
    #[error("Key '{0}' is protected")]
    ProtectedKey(String),

    /// The default document is locked against modification
    #[error("Default configuration is locked")]
    DefaultLocked,

    /// An environment name could not be parsed
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),

    /// Background work was requested outside a tokio runtime
    #[error("Hot reload requires a running tokio runtime")]
    NoRuntime,
}

impl ConfigError {
    /// Creates a storage error.
    pub fn storage(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a parse error from a JSON error.
    pub fn parse(path: impl AsRef<Path>, source: &serde_json::Error) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            reason: format!("{} (line {}, column {})", source, source.line(), source.column()),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Creates an invalid path error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serialize(err.to_string())
    }
}
