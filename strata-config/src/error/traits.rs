//! Error classification for recovery decisions.
//!
//! Loading paths degrade to defaults on recoverable failures and surface
//! everything else, so every error describes which side of that line it is on.

use super::config::ConfigError;

/// Classification of error types for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// File missing, unreadable, or unwritable
    Storage,
    /// Malformed document contents
    Data,
    /// Schema or custom validation failure
    Validation,
    /// Version parsing, ordering, or migration failure
    Version,
    /// Invalid request from the caller (bad path, protected key, locked default)
    Caller,
    /// Runtime or programming environment problem
    Internal,
}

/// Trait for errors that can classify themselves.
pub trait ErrorClassification {
    /// Returns the category of this error
    fn category(&self) -> ErrorCategory;

    /// Returns true if loading should fall back to defaults and continue
    fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Storage | ErrorCategory::Data)
    }

    /// Returns true if the error describes a rejected request rather than a fault
    fn is_caller_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Version | ErrorCategory::Caller
        )
    }
}

impl ErrorClassification for ConfigError {
    fn category(&self) -> ErrorCategory {
        match self {
            ConfigError::Storage { .. } => ErrorCategory::Storage,
            ConfigError::Parse { .. } | ConfigError::Serialize(_) | ConfigError::InvalidSchema(_) => {
                ErrorCategory::Data
            }
            ConfigError::Validation { .. } => ErrorCategory::Validation,
            ConfigError::VersionFormat(_)
            | ConfigError::Downgrade { .. }
            | ConfigError::MigrationCycle { .. }
            | ConfigError::Migration { .. } => ErrorCategory::Version,
            ConfigError::InvalidPath { .. }
            | ConfigError::PathConflict { .. }
            | ConfigError::KeyNotFound(_)
            | ConfigError::ProtectedKey(_)
            | ConfigError::DefaultLocked
            | ConfigError::UnknownEnvironment(_) => ErrorCategory::Caller,
            ConfigError::NoRuntime => ErrorCategory::Internal,
        }
    }
}
