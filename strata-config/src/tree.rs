//! Dotted-path navigation over JSON documents.
//!
//! A configuration document is a plain `serde_json::Value`. Nested mapping
//! entries are addressed with a [`KeyPath`] such as `app.display.width`.
//!
//! - [`get`] never fails; a missing segment or a non-mapping intermediate
//!   yields `None`
//! - [`set`] creates missing intermediate mappings, but refuses to descend
//!   through an existing non-mapping value and leaves the document untouched
//! - [`delete`] fails when any segment along the path is missing

use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A configuration document.
pub type Document = Value;

/// A parsed dotted key path.
///
/// The empty string parses to the root path, which addresses the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    /// Parses a dotted path. Empty segments (`a..b`, `.a`, `a.`) are rejected.
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(ConfigError::invalid_path(raw, "empty path segment"));
        }

        Ok(Self { segments })
    }

    /// The path addressing the whole document.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment, or `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing path, or `None` for the root.
    pub fn parent(&self) -> Option<KeyPath> {
        let (_, parents) = self.segments.split_last()?;
        Some(Self {
            segments: parents.to_vec(),
        })
    }

    /// Extends the path by one segment.
    pub fn child(&self, segment: impl Into<String>) -> KeyPath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// True if `prefix` equals this path or is one of its ancestors.
    pub fn starts_with(&self, prefix: &KeyPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Renders the path `/`-joined, the form used in validation messages.
    pub fn to_slash_path(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for KeyPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

/// Returns the value at `path`, or `None` if any segment is missing.
pub fn get<'a>(doc: &'a Document, path: &KeyPath) -> Option<&'a Value> {
    path.segments
        .iter()
        .try_fold(doc, |current, segment| current.get(segment.as_str()))
}

/// Returns the value at `path`, or `fallback` if it is missing.
pub fn get_or(doc: &Document, path: &KeyPath, fallback: Value) -> Value {
    get(doc, path).cloned().unwrap_or(fallback)
}

pub fn contains(doc: &Document, path: &KeyPath) -> bool {
    get(doc, path).is_some()
}

/// Writes `value` at `path`, returning the value it replaced.
///
/// Writing the root replaces the whole document.
pub fn set(doc: &mut Document, path: &KeyPath, value: Value) -> ConfigResult<Option<Value>> {
    let Some((leaf, parents)) = path.segments.split_last() else {
        return Ok(Some(std::mem::replace(doc, value)));
    };

    let conflict = |segment: &str| ConfigError::PathConflict {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    // Walk the existing prefix first so a conflict leaves `doc` untouched.
    if !doc.is_object() {
        return Err(conflict(""));
    }
    let mut cursor: &Value = doc;
    for segment in parents {
        match cursor.get(segment.as_str()) {
            Some(next) if next.is_object() => cursor = next,
            Some(_) => return Err(conflict(segment)),
            None => break,
        }
    }

    let mut current = doc;
    for segment in parents {
        let map = current.as_object_mut().ok_or_else(|| conflict(segment))?;
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = current.as_object_mut().ok_or_else(|| conflict(leaf))?;
    Ok(map.insert(leaf.clone(), value))
}

/// Removes and returns the value at `path`.
pub fn delete(doc: &mut Document, path: &KeyPath) -> ConfigResult<Value> {
    let Some((leaf, parents)) = path.segments.split_last() else {
        return Err(ConfigError::invalid_path("", "the root cannot be deleted"));
    };

    let mut current = doc;
    for segment in parents {
        current = current
            .get_mut(segment.as_str())
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))?;
    }

    current
        .as_object_mut()
        .and_then(|map| map.remove(leaf.as_str()))
        .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> KeyPath {
        KeyPath::parse(raw).unwrap()
    }

    #[test]
    fn test_parse_rejects_empty_segments() {
        for raw in ["a..b", ".a", "a.", "."] {
            let err = KeyPath::parse(raw).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPath { .. }), "{raw}");
        }
        assert!(KeyPath::parse("").unwrap().is_root());
        assert_eq!(path("a.b.c").segments().len(), 3);
    }

    #[test]
    fn test_path_relations() {
        let p = path("app.display.width");
        assert_eq!(p.leaf(), Some("width"));
        assert_eq!(p.parent(), Some(path("app.display")));
        assert!(p.starts_with(&path("app")));
        assert!(p.starts_with(&p));
        assert!(!p.starts_with(&path("app.disp")));
        assert!(!path("app").starts_with(&p));
        assert_eq!(p.to_slash_path(), "app/display/width");
        assert_eq!(path("app").child("theme").to_string(), "app.theme");
    }

    #[test]
    fn test_get_stops_at_missing_or_scalar() {
        let doc = json!({"a": {"b": 1}, "s": "text"});
        assert_eq!(get(&doc, &path("a.b")), Some(&json!(1)));
        assert_eq!(get(&doc, &path("a.x")), None);
        assert_eq!(get(&doc, &path("s.inner")), None);
        assert_eq!(get(&doc, &KeyPath::root()), Some(&doc));
        assert_eq!(get_or(&doc, &path("a.c"), json!(7)), json!(7));
        assert!(contains(&doc, &path("s")));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut doc = json!({});
        let old = set(&mut doc, &path("app.display.width"), json!(800)).unwrap();
        assert_eq!(old, None);
        assert_eq!(doc, json!({"app": {"display": {"width": 800}}}));

        let old = set(&mut doc, &path("app.display.width"), json!(1024)).unwrap();
        assert_eq!(old, Some(json!(800)));
    }

    #[test]
    fn test_set_conflict_leaves_document_untouched() {
        let mut doc = json!({"a": {"b": 5}});
        let before = doc.clone();
        let err = set(&mut doc, &path("a.b.c.d"), json!(1)).unwrap_err();
        match err {
            ConfigError::PathConflict { segment, .. } => assert_eq!(segment, "b"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(doc, before);
    }

    #[test]
    fn test_set_root_replaces_document() {
        let mut doc = json!({"a": 1});
        let old = set(&mut doc, &KeyPath::root(), json!({"b": 2})).unwrap();
        assert_eq!(old, Some(json!({"a": 1})));
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn test_delete() {
        let mut doc = json!({"a": {"b": 1, "c": 2}});
        assert_eq!(delete(&mut doc, &path("a.b")).unwrap(), json!(1));
        assert_eq!(doc, json!({"a": {"c": 2}}));

        assert!(matches!(
            delete(&mut doc, &path("a.b")),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert!(matches!(
            delete(&mut doc, &path("x.y")),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert!(delete(&mut doc, &KeyPath::root()).is_err());
    }
}
