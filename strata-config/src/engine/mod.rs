//! The configuration engine.
//!
//! [`ConfigurationEngine`] layers three documents into the merged view that
//! callers read:
//! - the default document (read-only unless explicitly unlocked)
//! - the overlay for the active [`Environment`]
//! - the persisted user document
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use strata_config::{ConfigurationEngine, EngineOptions, WriteOptions};
//!
//! let options = EngineOptions::new("/tmp/app/config.json")
//!     .with_default_config_path("/usr/share/app/default.json");
//! let engine = ConfigurationEngine::initialize(options).unwrap();
//!
//! let width = engine.get("display.width", json!(800));
//! engine.set("display.width", json!(1024), WriteOptions::default()).unwrap();
//! ```
//!
//! The engine is a cheap handle: clones share the same state. Reads take a
//! shared lock; mutations are serialized and commit atomically, so readers
//! never observe a half-applied change. Change callbacks run after every
//! lock is released and may call back into the engine.

mod audit;
mod loader;
mod options;
mod storage;
mod watcher;

pub use audit::{ConfigAction, ConfigAuditEntry, DEFAULT_MAX_AUDIT_ENTRIES};
pub use loader::ValidatorFn;
pub use options::{EngineOptions, Environment, WriteOptions, MAX_RELOAD_INTERVAL, MIN_RELOAD_INTERVAL};

use crate::diff::diff;
use crate::error::{ConfigError, ConfigResult, ErrorClassification};
use crate::merge::{merge, ProtectionSet};
use crate::migration::{Migrator, Transform, TransformError};
use crate::notify::{CallbackError, ChangeEvent, ChangeNotifier, SubscriptionId};
use crate::schema::SchemaValidator;
use crate::tree::{self, Document, KeyPath};
use crate::version::Version;
use audit::AuditLog;
use loader::{serialize_for_storage, validate_document, CustomValidator, LoadContext};
use options::clamp_reload_interval;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storage::FileStamp;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use watcher::WatcherHandle;

const RELOAD_CHANNEL_CAPACITY: usize = 64;

/// The document used when no default file is configured or it cannot be read.
pub fn builtin_default() -> Document {
    json!({"version": "1.0"})
}

/// Coarse notification sent for every whole-document replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReloaded {
    /// Increases by one per notification
    pub sequence: u64,
    pub environment: Environment,
    pub at: chrono::DateTime<chrono::Utc>,
}

struct EngineState {
    default: Document,
    environments: HashMap<Environment, Document>,
    environment: Environment,
    merged: Document,
    default_locked: bool,
    protection: ProtectionSet,
    schema: Option<Arc<SchemaValidator>>,
    validators: Vec<CustomValidator>,
    migrator: Migrator,
    /// Stamp of the user file when the engine last read or wrote it
    last_seen: Option<FileStamp>,
}

impl EngineState {
    fn context(&self, options: &EngineOptions) -> LoadContext {
        LoadContext {
            config_path: options.config_path.clone(),
            save_diff_only: options.save_diff_only,
            default: self.default.clone(),
            overlay: self.environments.get(&self.environment).cloned(),
            protection: self.protection.clone(),
            migrator: self.migrator.clone(),
            schema: self.schema.clone(),
            validators: self.validators.clone(),
        }
    }

    fn base(&self) -> Document {
        match self.environments.get(&self.environment) {
            Some(overlay) => merge(&self.default, overlay, &self.protection),
            None => self.default.clone(),
        }
    }

    fn validate(&self, doc: &Document) -> ConfigResult<()> {
        validate_document(doc, self.schema.as_deref(), &self.validators)
    }
}

pub(crate) struct EngineInner {
    options: EngineOptions,
    state: RwLock<EngineState>,
    notifier: ChangeNotifier,
    audit: AuditLog,
    reload_tx: broadcast::Sender<ConfigReloaded>,
    reload_sequence: AtomicU64,
    watcher: Mutex<Option<WatcherHandle>>,
    reload_interval: Mutex<Duration>,
    /// Serializes mutations and user-file access
    write_gate: Mutex<()>,
}

impl EngineInner {
    /// True if the user file changed since the engine last saw it.
    fn poll_modified(&self) -> bool {
        let Some(current) = FileStamp::of(&self.options.config_path) else {
            return false;
        };

        let mut state = self.state.write();
        if state.last_seen == Some(current) {
            return false;
        }
        state.last_seen = Some(current);
        true
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.get_mut().take() {
            watcher.signal();
        }
    }
}

/// Builder for [`ConfigurationEngine`].
///
/// Protection, migrations, and validators registered here are in place
/// before the first load.
pub struct EngineBuilder {
    options: EngineOptions,
    protected: Vec<String>,
    migrations: Vec<(String, String, Transform)>,
    validators: Vec<(String, ValidatorFn)>,
    max_audit_entries: usize,
}

impl EngineBuilder {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            protected: Vec::new(),
            migrations: Vec::new(),
            validators: Vec::new(),
            max_audit_entries: DEFAULT_MAX_AUDIT_ENTRIES,
        }
    }

    /// Protects a dotted path against user-level overrides.
    pub fn protect(mut self, path: impl Into<String>) -> Self {
        self.protected.push(path.into());
        self
    }

    pub fn migration<F>(mut self, from: impl Into<String>, to: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Document, &Version, &Version) -> Result<Document, TransformError> + Send + Sync + 'static,
    {
        self.migrations.push((from.into(), to.into(), Arc::new(transform)));
        self
    }

    pub fn validator<F>(mut self, path: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push((path.into(), Arc::new(check)));
        self
    }

    pub fn max_audit_entries(mut self, max: usize) -> Self {
        self.max_audit_entries = max;
        self
    }

    /// Loads every document and returns the running engine.
    ///
    /// Storage and parse problems degrade to defaults and are logged. Errors
    /// are returned for malformed registrations, and for `auto_reload`
    /// outside a tokio runtime.
    pub fn build(self) -> ConfigResult<ConfigurationEngine> {
        let options = self.options;

        let mut protection = ProtectionSet::new();
        for path in &self.protected {
            protection.insert(path)?;
        }

        let mut migrator = Migrator::new();
        for (from, to, transform) in self.migrations {
            migrator.register(&from, &to, move |doc, a, b| transform(doc, a, b))?;
        }

        let validators = self
            .validators
            .into_iter()
            .map(|(path, check)| -> ConfigResult<CustomValidator> {
                Ok(CustomValidator {
                    path: KeyPath::parse(&path)?,
                    check,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        let default = load_default(options.default_config_path.as_deref());
        let schema = load_schema(options.schema_path.as_deref());

        let mut state = EngineState {
            merged: default.clone(),
            default,
            environments: HashMap::new(),
            environment: options.environment,
            default_locked: options.lock_default_config,
            protection,
            schema,
            validators,
            migrator,
            last_seen: None,
        };

        let ctx = state.context(&options);
        for environment in Environment::ALL {
            match read_environment(&options, environment, &ctx) {
                Ok(Some(overlay)) => {
                    debug!(%environment, "Loaded environment overlay");
                    state.environments.insert(environment, overlay);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%environment, error = %e, "Skipping invalid environment overlay");
                }
            }
        }

        let (reload_tx, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
        let reload_interval = options.reload_interval();
        let auto_reload = options.auto_reload;

        let engine = ConfigurationEngine {
            inner: Arc::new(EngineInner {
                options,
                state: RwLock::new(state),
                notifier: ChangeNotifier::new(),
                audit: AuditLog::new(self.max_audit_entries),
                reload_tx,
                reload_sequence: AtomicU64::new(0),
                watcher: Mutex::new(None),
                reload_interval: Mutex::new(reload_interval),
                write_gate: Mutex::new(()),
            }),
        };

        let (result, _) = engine.load_and_commit();
        if let Err(e) = result {
            warn!(error = %e, "Initial load degraded to defaults");
        }

        if auto_reload {
            engine.start_watcher()?;
        }

        info!(
            path = %engine.inner.options.config_path.display(),
            environment = %engine.environment(),
            "Configuration engine initialized"
        );
        Ok(engine)
    }
}

fn load_default(path: Option<&Path>) -> Document {
    let Some(path) = path else {
        debug!("No default configuration path, using built-in default");
        return builtin_default();
    };

    match storage::read_mapping(path) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Using built-in default configuration");
            builtin_default()
        }
    }
}

fn load_schema(path: Option<&Path>) -> Option<Arc<SchemaValidator>> {
    let path = path?;
    match SchemaValidator::from_file(path) {
        Ok(schema) => {
            debug!(path = %path.display(), "Schema compiled");
            Some(Arc::new(schema))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Schema unavailable, validation disabled");
            None
        }
    }
}

/// Reads and validates the overlay for `environment`. `Ok(None)` when it has no file.
fn read_environment(
    options: &EngineOptions,
    environment: Environment,
    ctx: &LoadContext,
) -> ConfigResult<Option<Document>> {
    let path = options.env_config_path(environment);
    if !path.exists() {
        return Ok(None);
    }
    let overlay = storage::read_mapping(&path)?;
    ctx.check_environment(&overlay)?;
    Ok(Some(overlay))
}

fn parse_writable(path: &str) -> ConfigResult<KeyPath> {
    let key = KeyPath::parse(path)?;
    if key.is_root() {
        return Err(ConfigError::invalid_path(path, "the root is not writable"));
    }
    Ok(key)
}

/// Layered, versioned, hot-reloading configuration engine.
#[derive(Clone)]
pub struct ConfigurationEngine {
    inner: Arc<EngineInner>,
}

impl ConfigurationEngine {
    pub fn builder(options: EngineOptions) -> EngineBuilder {
        EngineBuilder::new(options)
    }

    /// Builds an engine with no registrations.
    pub fn initialize(options: EngineOptions) -> ConfigResult<Self> {
        EngineBuilder::new(options).build()
    }

    // ---- reads ----

    /// Value at `path`, or `fallback` when absent. The empty path returns the whole document.
    pub fn get(&self, path: &str, fallback: Value) -> Value {
        match KeyPath::parse(path) {
            Ok(key) => tree::get_or(&self.inner.state.read().merged, &key, fallback),
            Err(e) => {
                debug!(key = path, error = %e, "Invalid key path, returning fallback");
                fallback
            }
        }
    }

    pub fn get_value(&self, path: &str) -> ConfigResult<Option<Value>> {
        let key = KeyPath::parse(path)?;
        Ok(tree::get(&self.inner.state.read().merged, &key).cloned())
    }

    /// Deserializes the value at `path`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> ConfigResult<Option<T>> {
        let key = KeyPath::parse(path)?;
        let Some(value) = tree::get(&self.inner.state.read().merged, &key).cloned() else {
            return Ok(None);
        };
        serde_json::from_value(value).map(Some).map_err(|e| {
            ConfigError::validation(
                format!("cannot read as {}: {}", std::any::type_name::<T>(), e),
                key.to_slash_path(),
            )
        })
    }

    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get_value(path).ok().flatten()?.as_str().map(str::to_string)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_value(path).ok().flatten()?.as_bool()
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get_value(path).ok().flatten()?.as_i64()
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get_value(path).ok().flatten()?.as_f64()
    }

    // ---- mutations ----

    /// Writes `value` at `path`.
    ///
    /// With `validate`, the whole merged document is checked before the
    /// change commits; a rejected change leaves everything untouched. A
    /// persist failure is returned after the change has committed and its
    /// event has been published.
    pub fn set(&self, path: &str, value: Value, opts: WriteOptions) -> ConfigResult<()> {
        let key = parse_writable(path)?;
        let gate = self.inner.write_gate.lock();

        let old = {
            let mut state = self.inner.state.write();
            if state.protection.covers(&key) {
                return Err(ConfigError::ProtectedKey(key.to_string()));
            }

            let mut candidate = state.merged.clone();
            let old = tree::set(&mut candidate, &key, value.clone())?;
            if old.as_ref() == Some(&value) {
                return Ok(());
            }
            if opts.validate {
                state.validate(&candidate)?;
            }
            state.merged = candidate;
            old
        };

        let persisted = self.persist_if(opts.persist);
        drop(gate);

        self.record(&key, ConfigAction::Set, old.clone(), Some(value.clone()));
        self.inner.notifier.publish(&ChangeEvent::write(key, old, value));
        persisted
    }

    /// Removes the value at `path`. Succeeds without an event when it is already absent.
    pub fn delete(&self, path: &str, opts: WriteOptions) -> ConfigResult<()> {
        let key = parse_writable(path)?;
        let gate = self.inner.write_gate.lock();

        let old = {
            let mut state = self.inner.state.write();
            if state.protection.covers(&key) {
                return Err(ConfigError::ProtectedKey(key.to_string()));
            }

            let mut candidate = state.merged.clone();
            let old = match tree::delete(&mut candidate, &key) {
                Ok(old) => old,
                Err(ConfigError::KeyNotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            if opts.validate {
                state.validate(&candidate)?;
            }
            state.merged = candidate;
            old
        };

        let persisted = self.persist_if(opts.persist);
        drop(gate);

        self.record(&key, ConfigAction::Delete, Some(old.clone()), None);
        self.inner.notifier.publish(&ChangeEvent::delete(key, old));
        persisted
    }

    /// Restores `path` to its default, or the whole document when `path` is `None`.
    ///
    /// Defaults include the active environment overlay. A path with no
    /// default is deleted.
    pub fn reset(&self, path: Option<&str>, opts: WriteOptions) -> ConfigResult<()> {
        let Some(path) = path else {
            return self.reset_all(opts);
        };
        let key = parse_writable(path)?;
        let gate = self.inner.write_gate.lock();

        let event = {
            let mut state = self.inner.state.write();
            let target = tree::get(&state.base(), &key).cloned();
            let current = tree::get(&state.merged, &key).cloned();
            if current == target {
                return Ok(());
            }

            let mut candidate = state.merged.clone();
            let event = match target {
                Some(value) => {
                    tree::set(&mut candidate, &key, value.clone())?;
                    ChangeEvent::write(key.clone(), current, value)
                }
                None => {
                    let old = tree::delete(&mut candidate, &key)?;
                    ChangeEvent::delete(key.clone(), old)
                }
            };
            if opts.validate {
                state.validate(&candidate)?;
            }
            state.merged = candidate;
            event
        };

        let persisted = self.persist_if(opts.persist);
        drop(gate);

        self.record(&key, ConfigAction::Reset, event.old_value.clone(), event.new_value.clone());
        self.inner.notifier.publish(&event);
        persisted
    }

    fn reset_all(&self, opts: WriteOptions) -> ConfigResult<()> {
        let gate = self.inner.write_gate.lock();
        let (old, new) = {
            let mut state = self.inner.state.write();
            let base = state.base();
            let old = std::mem::replace(&mut state.merged, base.clone());
            (old, base)
        };

        let persisted = self.persist_if(opts.persist);
        drop(gate);

        if old != new {
            self.publish_reload(old, new, ConfigAction::Reset);
        }
        persisted
    }

    /// Re-runs the load sequence and publishes one `Reload` event if the merged document changed.
    ///
    /// On failure the fallback document is still committed and the error returned.
    pub fn reload(&self) -> ConfigResult<()> {
        let (result, change) = self.load_and_commit();
        if let Some((old, new)) = change {
            self.publish_reload(old, new, ConfigAction::Reload);
        }
        match &result {
            Ok(()) => info!("Configuration reloaded"),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "User configuration unreadable, serving defaults")
            }
            Err(e) => error!(error = %e, category = ?e.category(), "Configuration reload rejected"),
        }
        result
    }

    fn load_and_commit(&self) -> (ConfigResult<()>, Option<(Document, Document)>) {
        let _gate = self.inner.write_gate.lock();
        let ctx = self.inner.state.read().context(&self.inner.options);
        let outcome = ctx.load();

        let mut state = self.inner.state.write();
        let old = std::mem::replace(&mut state.merged, outcome.merged);
        if outcome.stamp.is_some() {
            state.last_seen = outcome.stamp;
        }
        let change = (old != state.merged).then(|| (old, state.merged.clone()));
        (outcome.result, change)
    }

    /// Writes the user document.
    pub fn save(&self) -> ConfigResult<()> {
        let _gate = self.inner.write_gate.lock();
        self.persist()?;
        info!(path = %self.inner.options.config_path.display(), "Configuration saved");
        Ok(())
    }

    fn persist_if(&self, enabled: bool) -> ConfigResult<()> {
        if !enabled {
            return Ok(());
        }
        self.persist().map_err(|e| {
            warn!(error = %e, "Change committed but could not be persisted");
            e
        })
    }

    // Callers hold the write gate.
    fn persist(&self) -> ConfigResult<()> {
        let doc = {
            let state = self.inner.state.read();
            serialize_for_storage(&state.merged, &state.default, self.inner.options.save_diff_only)
        };
        let path = &self.inner.options.config_path;
        storage::write_document(path, &doc)?;
        self.inner.state.write().last_seen = FileStamp::of(path);
        debug!(path = %path.display(), "Persisted user configuration");
        Ok(())
    }

    /// Switches the active environment and reloads.
    ///
    /// The new overlay is read from disk. If it is invalid or the reload
    /// fails, the previous environment stays active and nothing changes.
    pub fn set_environment(&self, environment: Environment) -> ConfigResult<()> {
        let gate = self.inner.write_gate.lock();
        let (previous, mut ctx) = {
            let state = self.inner.state.read();
            (state.environment, state.context(&self.inner.options))
        };

        let overlay = read_environment(&self.inner.options, environment, &ctx)?;
        ctx.overlay = overlay.clone();
        let outcome = ctx.load();
        if let Err(e) = outcome.result {
            warn!(from = %previous, to = %environment, error = %e, "Environment switch rolled back");
            return Err(e);
        }

        let (old, new) = {
            let mut state = self.inner.state.write();
            state.environment = environment;
            match overlay {
                Some(doc) => {
                    state.environments.insert(environment, doc);
                }
                None => {
                    state.environments.remove(&environment);
                }
            }
            if outcome.stamp.is_some() {
                state.last_seen = outcome.stamp;
            }
            let old = std::mem::replace(&mut state.merged, outcome.merged);
            (old, state.merged.clone())
        };
        drop(gate);

        info!(from = %previous, to = %environment, "Environment switched");
        if old != new {
            self.publish_reload(old, new, ConfigAction::Reload);
        }
        Ok(())
    }

    /// Replaces the user layer with `document`.
    ///
    /// The candidate `merge(default, environment, document)` is migrated and
    /// validated as a whole; on failure nothing changes.
    pub fn import(&self, document: Document, persist: bool) -> ConfigResult<()> {
        let gate = self.inner.write_gate.lock();
        let ctx = self.inner.state.read().context(&self.inner.options);
        let merged = ctx.compose_import(document)?;

        let old = std::mem::replace(&mut self.inner.state.write().merged, merged.clone());
        let persisted = self.persist_if(persist);
        drop(gate);

        if old != merged {
            self.publish_reload(old, merged, ConfigAction::Import);
        }
        persisted
    }

    pub fn import_from(&self, path: impl AsRef<Path>, persist: bool) -> ConfigResult<()> {
        let document = storage::read_document(path.as_ref())?;
        self.import(document, persist)
    }

    /// A copy of the merged document.
    pub fn export(&self) -> Document {
        self.inner.state.read().merged.clone()
    }

    /// Writes the merged document to `path` as pretty JSON.
    pub fn export_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        storage::write_document(path.as_ref(), &self.export())
    }

    // ---- hot reload ----

    /// Starts or stops the hot-reload watcher.
    ///
    /// `interval` is clamped to 0.5 s - 60 s. Stopping waits for the watcher
    /// task and cancels any pending debounced reload, so no reload runs
    /// after this returns.
    pub async fn set_auto_reload(&self, enabled: bool, interval: Option<Duration>) -> ConfigResult<()> {
        if let Some(interval) = interval {
            *self.inner.reload_interval.lock() = clamp_reload_interval(interval);
        }

        let running = self.inner.watcher.lock().take();
        if let Some(watcher) = running {
            watcher.stop().await;
        }

        if enabled {
            self.start_watcher()?;
        }
        Ok(())
    }

    fn start_watcher(&self) -> ConfigResult<()> {
        let handle = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let interval = *self.inner.reload_interval.lock();

        let mut slot = self.inner.watcher.lock();
        if slot.is_none() {
            *slot = Some(watcher::spawn_watcher(&self.inner, handle, interval));
        }
        Ok(())
    }

    /// Stops background work.
    pub async fn shutdown(&self) {
        let running = self.inner.watcher.lock().take();
        if let Some(watcher) = running {
            watcher.stop().await;
        }
    }

    pub fn is_auto_reload_enabled(&self) -> bool {
        self.inner.watcher.lock().is_some()
    }

    pub fn reload_interval(&self) -> Duration {
        *self.inner.reload_interval.lock()
    }

    // ---- protection and defaults ----

    /// Protects `path`. Takes effect on the next load or reload.
    pub fn protect_key(&self, path: &str) -> ConfigResult<bool> {
        self.inner.state.write().protection.insert(path)
    }

    pub fn unprotect_key(&self, path: &str) -> ConfigResult<bool> {
        self.inner.state.write().protection.remove(path)
    }

    pub fn protected_keys(&self) -> Vec<String> {
        self.inner
            .state
            .read()
            .protection
            .iter()
            .map(KeyPath::to_string)
            .collect()
    }

    pub fn lock_default(&self) {
        self.inner.state.write().default_locked = true;
    }

    pub fn unlock_default(&self) {
        self.inner.state.write().default_locked = false;
    }

    pub fn is_default_locked(&self) -> bool {
        self.inner.state.read().default_locked
    }

    /// Changes the default document at `path`.
    ///
    /// The merged document follows the new default when its value there
    /// was not customized.
    pub fn set_default(&self, path: &str, value: Value) -> ConfigResult<()> {
        let key = parse_writable(path)?;
        let gate = self.inner.write_gate.lock();

        let (previous_default, event) = {
            let mut state = self.inner.state.write();
            if state.default_locked {
                return Err(ConfigError::DefaultLocked);
            }

            let mut default = state.default.clone();
            let previous_default = tree::set(&mut default, &key, value.clone())?;

            let current = tree::get(&state.merged, &key).cloned();
            let follows_default = current == previous_default && current.as_ref() != Some(&value);
            let merged = if follows_default {
                let mut merged = state.merged.clone();
                tree::set(&mut merged, &key, value.clone())?;
                Some(merged)
            } else {
                None
            };

            state.default = default;
            let event = merged.map(|merged| {
                state.merged = merged;
                ChangeEvent::write(key.clone(), current, value.clone())
            });
            (previous_default, event)
        };
        drop(gate);

        self.record(&key, ConfigAction::SetDefault, previous_default, Some(value));
        if let Some(event) = event {
            self.inner.notifier.publish(&event);
        }
        Ok(())
    }

    pub fn default_document(&self) -> Document {
        self.inner.state.read().default.clone()
    }

    /// True when the merged document differs from the default.
    pub fn has_customizations(&self) -> bool {
        let state = self.inner.state.read();
        diff(&state.merged, &state.default).is_some()
    }

    // ---- registrations ----

    pub fn register_migration<F>(&self, from: &str, to: &str, transform: F) -> ConfigResult<()>
    where
        F: Fn(Document, &Version, &Version) -> Result<Document, TransformError> + Send + Sync + 'static,
    {
        self.inner.state.write().migrator.register(from, to, transform)
    }

    /// Registers a validator run against the value at `path` whenever validation runs.
    pub fn register_validator<F>(&self, path: &str, check: F) -> ConfigResult<()>
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let path = KeyPath::parse(path)?;
        self.inner.state.write().validators.push(CustomValidator {
            path,
            check: Arc::new(check),
        });
        Ok(())
    }

    /// Subscribes to changes at exactly `path`; the empty path receives every change.
    pub fn register_change_callback<F>(&self, path: &str, callback: F) -> ConfigResult<SubscriptionId>
    where
        F: Fn(&ChangeEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let key = KeyPath::parse(path)?;
        Ok(self.inner.notifier.subscribe(key, callback))
    }

    pub fn unregister_change_callback(&self, id: SubscriptionId) -> bool {
        self.inner.notifier.unsubscribe(id)
    }

    /// Receives a [`ConfigReloaded`] for every whole-document replacement.
    pub fn subscribe_reloads(&self) -> broadcast::Receiver<ConfigReloaded> {
        self.inner.reload_tx.subscribe()
    }

    // ---- introspection ----

    pub fn environment(&self) -> Environment {
        self.inner.state.read().environment
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.options.config_path
    }

    pub fn audit_log(&self) -> Vec<ConfigAuditEntry> {
        self.inner.audit.snapshot()
    }

    pub fn clear_audit_log(&self) {
        self.inner.audit.clear();
    }

    // ---- internal helpers ----

    fn record(&self, key: &KeyPath, action: ConfigAction, old: Option<Value>, new: Option<Value>) {
        self.inner
            .audit
            .record(ConfigAuditEntry::new(key.to_string(), action, old, new));
    }

    fn publish_reload(&self, old: Document, new: Document, action: ConfigAction) {
        self.inner.audit.record(ConfigAuditEntry::document(action));
        self.inner.notifier.publish(&ChangeEvent::reload(old, new));

        let notice = ConfigReloaded {
            sequence: self.inner.reload_sequence.fetch_add(1, Ordering::SeqCst) + 1,
            environment: self.environment(),
            at: chrono::Utc::now(),
        };
        // No receivers is fine.
        let _ = self.inner.reload_tx.send(notice);
    }
}

impl std::fmt::Debug for ConfigurationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationEngine")
            .field("config_path", &self.inner.options.config_path)
            .field("environment", &self.environment())
            .field("auto_reload", &self.is_auto_reload_enabled())
            .finish()
    }
}
