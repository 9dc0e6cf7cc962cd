// strata-config: Layered, versioned, hot-reloading configuration engine
// Used by applications that keep a JSON settings document on disk and edit it at runtime

pub mod debounce;
pub mod diff;
pub mod engine;
pub mod error;
pub mod logging;
pub mod merge;
pub mod migration;
pub mod notify;
pub mod scheduler;
pub mod schema;
pub mod tree;
pub mod version;

pub use debounce::Debouncer;
pub use diff::{diff, reconstitute};
pub use engine::{
    ConfigAction, ConfigAuditEntry, ConfigReloaded, ConfigurationEngine, EngineBuilder,
    EngineOptions, Environment, WriteOptions,
};
pub use error::{ConfigError, ConfigResult, ErrorCategory, ErrorClassification};
pub use merge::{merge, ProtectionSet};
pub use migration::{MigrationStep, Migrator, TransformError};
pub use notify::{ChangeEvent, ChangeKind, ChangeNotifier, SubscriptionId};
pub use scheduler::{CpuSampler, ProcStatSampler, ResourceAdaptiveScheduler};
pub use schema::{SchemaValidator, ValidationError, ValidationErrorCode, ValidationResult};
pub use tree::{Document, KeyPath};
pub use version::Version;
