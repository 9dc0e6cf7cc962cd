//! The load sequence.
//!
//! Loading runs against a [`LoadContext`], an owned snapshot of everything
//! the sequence reads, so file I/O happens without holding the engine's
//! state lock. The outcome always carries a document to commit: on failure
//! it is the fallback `merge(default, environment)`.

use super::storage::{self, FileStamp};
use crate::diff::{diff, reconstitute};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{merge, ProtectionSet};
use crate::migration::Migrator;
use crate::schema::SchemaValidator;
use crate::tree::{self, Document, KeyPath};
use crate::version::{document_version, stamp_version};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A custom validation function for the value at one path.
pub type ValidatorFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct CustomValidator {
    pub path: KeyPath,
    pub check: ValidatorFn,
}

/// Runs the schema and every custom validator against a full document.
pub(crate) fn validate_document(
    doc: &Document,
    schema: Option<&SchemaValidator>,
    validators: &[CustomValidator],
) -> ConfigResult<()> {
    if let Some(schema) = schema {
        schema.check(doc)?;
    }

    for validator in validators {
        // Validators only constrain values that exist.
        if let Some(value) = tree::get(doc, &validator.path) {
            (validator.check)(value)
                .map_err(|message| ConfigError::validation(message, validator.path.to_slash_path()))?;
        }
    }
    Ok(())
}

/// What the user file should contain for a given merged document.
///
/// In diff-only mode this is the difference from `default` (an empty
/// mapping when there is none) carrying the document version; otherwise
/// the merged document itself.
pub(crate) fn serialize_for_storage(merged: &Document, default: &Document, diff_only: bool) -> Document {
    if !diff_only {
        return merged.clone();
    }

    match diff(merged, default) {
        None => Value::Object(Map::new()),
        Some(mut changes) => {
            let version = document_version(merged)
                .ok()
                .flatten()
                .or_else(|| document_version(default).ok().flatten());
            if let Some(version) = version {
                stamp_version(&mut changes, &version);
            }
            changes
        }
    }
}

fn is_empty_mapping(doc: &Document) -> bool {
    doc.as_object().map(Map::is_empty).unwrap_or(false)
}

/// Result of one run of the load sequence.
pub(crate) struct LoadOutcome {
    /// Document to commit, the fallback when `result` is an error
    pub merged: Document,
    pub result: ConfigResult<()>,
    /// Stamp of the user file as it was read
    pub stamp: Option<FileStamp>,
}

/// Snapshot of the engine state the load sequence needs.
#[derive(Clone)]
pub(crate) struct LoadContext {
    pub config_path: PathBuf,
    pub save_diff_only: bool,
    pub default: Document,
    /// The active environment's overlay document
    pub overlay: Option<Document>,
    pub protection: ProtectionSet,
    pub migrator: Migrator,
    pub schema: Option<Arc<SchemaValidator>>,
    pub validators: Vec<CustomValidator>,
}

impl LoadContext {
    /// `merge(default, environment)`.
    pub fn base(&self) -> Document {
        match &self.overlay {
            Some(overlay) => merge(&self.default, overlay, &self.protection),
            None => self.default.clone(),
        }
    }

    pub fn validate(&self, doc: &Document) -> ConfigResult<()> {
        validate_document(doc, self.schema.as_deref(), &self.validators)
    }

    /// Validates an environment overlay as it would apply over the default.
    pub fn check_environment(&self, overlay: &Document) -> ConfigResult<()> {
        self.validate(&merge(&self.default, overlay, &self.protection))
    }

    pub fn storage_form(&self, merged: &Document) -> Document {
        serialize_for_storage(merged, &self.default, self.save_diff_only)
    }

    /// Runs the full load sequence against the user file.
    pub fn load(&self) -> LoadOutcome {
        let base = self.base();
        let path = &self.config_path;

        if !path.exists() {
            info!(path = %path.display(), "No user configuration found, writing defaults");
            if let Err(e) = storage::write_document(path, &self.storage_form(&base)) {
                warn!(path = %path.display(), error = %e, "Failed to write initial user configuration");
            }
            return LoadOutcome {
                merged: base,
                result: Ok(()),
                stamp: FileStamp::of(path),
            };
        }

        let stamp = FileStamp::of(path);
        let fail = |base: Document, error: ConfigError| {
            warn!(path = %path.display(), error = %error, "Falling back to defaults");
            LoadOutcome {
                merged: base,
                result: Err(error),
                stamp,
            }
        };

        let parsed = match storage::read_mapping(path) {
            Ok(doc) => doc,
            Err(e) => return fail(base, e),
        };

        if self.save_diff_only && is_empty_mapping(&parsed) {
            debug!(path = %path.display(), "User configuration has no customizations");
            return LoadOutcome {
                merged: base,
                result: Ok(()),
                stamp,
            };
        }

        let (parsed, migrated) = match self.upgrade(parsed) {
            Ok(upgraded) => upgraded,
            Err(e) => return fail(base, e),
        };

        let merged = self.overlay_user(&base, &parsed);
        if let Err(e) = self.validate(&merged) {
            return fail(base, e);
        }

        let mut stamp = stamp;
        if migrated {
            match storage::write_document(path, &self.storage_form(&merged)) {
                Ok(()) => {
                    info!(path = %path.display(), "Persisted migrated configuration");
                    stamp = FileStamp::of(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to persist migrated configuration"),
            }
        }

        LoadOutcome {
            merged,
            result: Ok(()),
            stamp,
        }
    }

    /// Builds the merged document for a replacement user layer.
    pub fn compose_import(&self, doc: Document) -> ConfigResult<Document> {
        let doc = storage::require_mapping(doc, &self.config_path)?;
        let (doc, _) = self.upgrade(doc)?;
        let merged = merge(&self.base(), &doc, &self.protection);
        self.validate(&merged)?;
        Ok(merged)
    }

    fn overlay_user(&self, base: &Document, user: &Document) -> Document {
        if self.save_diff_only {
            // Protection applies to the reconstituted document as a whole,
            // so a scalar cannot replace a mapping holding a protected key.
            merge(base, &reconstitute(user, base), &self.protection)
        } else {
            merge(base, user, &self.protection)
        }
    }

    /// Migrates a user document older than the default. Returns whether it changed.
    fn upgrade(&self, doc: Document) -> ConfigResult<(Document, bool)> {
        let Some(target) = document_version(&self.default)? else {
            return Ok((doc, false));
        };

        match document_version(&doc)? {
            Some(found) if found < target => {
                let upgraded = self.migrator.upgrade(doc, &self.default, &self.protection)?;
                Ok((upgraded, true))
            }
            Some(found) if found > target => Err(ConfigError::Downgrade {
                found: found.to_string(),
                supported: target.to_string(),
            }),
            _ => Ok((doc, false)),
        }
    }
}
