//! Bounded in-memory audit trail of committed changes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of entries kept before the oldest are dropped.
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 1000;

/// Audit log entry for a configuration change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigAuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Dotted key path; empty for whole-document actions
    pub path: String,
    pub action: ConfigAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

impl ConfigAuditEntry {
    pub fn new(
        path: impl Into<String>,
        action: ConfigAction,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            path: path.into(),
            action,
            old_value,
            new_value,
        }
    }

    /// A whole-document action. Documents are not copied into the log.
    pub fn document(action: ConfigAction) -> Self {
        Self::new(String::new(), action, None, None)
    }
}

/// Action performed on configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Set,
    Delete,
    Reset,
    Reload,
    Import,
    SetDefault,
}

#[derive(Debug)]
pub(crate) struct AuditLog {
    entries: RwLock<Vec<ConfigAuditEntry>>,
    max_entries: usize,
}

impl AuditLog {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub(crate) fn record(&self, entry: ConfigAuditEntry) {
        let mut log = self.entries.write();
        log.push(entry);

        if log.len() > self.max_entries {
            let drain_count = log.len() - self.max_entries;
            log.drain(0..drain_count);
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ConfigAuditEntry> {
        self.entries.read().clone()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }
}
