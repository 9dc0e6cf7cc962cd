//! Reading and writing JSON documents on disk.

use crate::error::{ConfigError, ConfigResult};
use crate::tree::Document;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Reads and parses a JSON document.
pub(crate) fn read_document(path: &Path) -> ConfigResult<Document> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::storage(path, e))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::parse(path, &e))
}

/// Reads a document whose top level must be a mapping.
pub(crate) fn read_mapping(path: &Path) -> ConfigResult<Document> {
    let doc = read_document(path)?;
    require_mapping(doc, path)
}

pub(crate) fn require_mapping(doc: Document, path: &Path) -> ConfigResult<Document> {
    if doc.is_object() {
        Ok(doc)
    } else {
        Err(ConfigError::Parse {
            path: path.to_path_buf(),
            reason: "top-level value must be a mapping".to_string(),
        })
    }
}

/// Writes `doc` as pretty JSON, creating the parent directory if needed.
///
/// The document is written to a sibling temporary file and renamed into
/// place, so readers never see a half-written file.
pub(crate) fn write_document(path: &Path, doc: &Document) -> ConfigResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigError::storage(parent, e))?;
    }

    let mut json = serde_json::to_string_pretty(doc)?;
    json.push('\n');

    let tmp = temp_path(path);
    fs::write(&tmp, json).map_err(|e| ConfigError::storage(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ConfigError::storage(path, e)
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Modification fingerprint of a file, used to detect external edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    /// Stamp of the file at `path`, or `None` if it cannot be inspected.
    pub(crate) fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("config.json");
        write_document(&path, &json!({"a": 1})).unwrap();

        assert_eq!(read_document(&path).unwrap(), json!({"a": 1}));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_read_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(read_document(&missing), Err(ConfigError::Storage { .. })));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ not json").unwrap();
        assert!(matches!(read_document(&corrupt), Err(ConfigError::Parse { .. })));

        let list = dir.path().join("list.json");
        fs::write(&list, "[1, 2]").unwrap();
        assert!(read_document(&list).is_ok());
        assert!(matches!(read_mapping(&list), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_file_stamp_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        assert_eq!(FileStamp::of(&path), None);

        write_document(&path, &json!({"a": 1})).unwrap();
        let first = FileStamp::of(&path).unwrap();
        write_document(&path, &json!({"a": 1, "longer": "content"})).unwrap();
        let second = FileStamp::of(&path).unwrap();
        assert_ne!(first, second);
    }
}
