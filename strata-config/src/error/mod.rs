//! Error handling for the configuration engine.
//!
//! This module provides:
//! - [`ConfigError`], the single error type returned by every loading and
//!   mutating operation
//! - [`ErrorClassification`], which lets the engine decide whether a failure
//!   degrades to defaults or is surfaced to the caller untouched
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_config::error::{ConfigError, ErrorClassification};
//!
//! match engine.set("display.width", json!(100), WriteOptions::default()) {
//!     Ok(()) => {}
//!     Err(e) if e.is_caller_error() => eprintln!("rejected: {e}"),
//!     Err(e) => tracing::warn!(error = %e, "storage problem"),
//! }
//! ```

mod config;
mod traits;

pub use config::*;
pub use traits::*;
