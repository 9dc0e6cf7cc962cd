//! Optional subscriber setup.
//!
//! The engine emits `tracing` events under the `strata_config` target and
//! never installs a subscriber itself. Applications that have no logging
//! of their own can call [`init_logging`]:
//!
//! ```rust,ignore
//! use strata_config::logging::{init_logging, LogConfig};
//!
//! init_logging(LogConfig::from_env().with_app_name("settings-daemon"))?;
//! ```
//!
//! `RUST_LOG` always wins over the configured levels.

mod config;

pub use config::{init_logging, lookup_in, LogConfig, LogFormat, TimestampFormat, ENGINE_TARGET};
