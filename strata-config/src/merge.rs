//! Layer merging with write protection.
//!
//! [`merge`] overlays one document onto another. Mappings present on both
//! sides are merged recursively; any other overlay value replaces the base
//! value. Paths in a [`ProtectionSet`] keep their base value whenever the
//! base already holds them. Protection blocks overrides only: a protected
//! key that the base lacks is added from the overlay like any other key.

use crate::error::{ConfigError, ConfigResult};
use crate::tree::{self, Document, KeyPath};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Dotted paths that user-level layers may never override.
///
/// Matching is exact against the full path from the document root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionSet {
    paths: BTreeSet<KeyPath>,
}

impl ProtectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from dotted paths.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> ConfigResult<Self> {
        let mut set = Self::new();
        for raw in paths {
            set.insert(raw)?;
        }
        Ok(set)
    }

    /// Adds a path. Returns false if it was already protected.
    pub fn insert(&mut self, raw: &str) -> ConfigResult<bool> {
        let path = KeyPath::parse(raw)?;
        if path.is_root() {
            return Err(ConfigError::invalid_path(raw, "the root cannot be protected"));
        }
        Ok(self.paths.insert(path))
    }

    /// Removes a path. Returns false if it was not protected.
    pub fn remove(&mut self, raw: &str) -> ConfigResult<bool> {
        Ok(self.paths.remove(&KeyPath::parse(raw)?))
    }

    /// True if `path` is itself protected.
    pub fn contains(&self, path: &KeyPath) -> bool {
        self.paths.contains(path)
    }

    /// True if `path` is protected, lies inside a protected path, or
    /// encloses one. Writing such a path would touch protected data.
    pub fn covers(&self, path: &KeyPath) -> bool {
        self.paths
            .iter()
            .any(|p| path.starts_with(p) || p.starts_with(path))
    }

    /// True if `subtree`, located at `at`, holds a protected path strictly below `at`.
    fn guards_within(&self, at: &KeyPath, subtree: &Value) -> bool {
        self.paths
            .iter()
            .filter(|p| p.len() > at.len() && p.starts_with(at))
            .any(|p| {
                let relative = KeyPath::from(p.segments()[at.len()..].to_vec());
                tree::contains(subtree, &relative)
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyPath> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Overlays `overlay` onto a copy of `base`, honoring `protection`.
pub fn merge(base: &Document, overlay: &Document, protection: &ProtectionSet) -> Document {
    let mut result = base.clone();
    merge_at(&mut result, overlay, &KeyPath::root(), protection);
    result
}

fn merge_at(target: &mut Value, overlay: &Value, at: &KeyPath, protection: &ProtectionSet) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, incoming) in overlay_map {
                let child = at.child(key.as_str());
                let Some(existing) = target_map.get_mut(key) else {
                    target_map.insert(key.clone(), incoming.clone());
                    continue;
                };

                if protection.contains(&child) {
                    debug!(key = %child, "Skipping override of protected key");
                    continue;
                }

                if existing.is_object() && incoming.is_object() {
                    merge_at(existing, incoming, &child, protection);
                } else if protection.guards_within(&child, existing) {
                    debug!(key = %child, "Skipping replacement that would drop a protected key");
                } else {
                    *existing = incoming.clone();
                }
            }
        }
        (target, incoming) => {
            if protection.guards_within(at, target) {
                debug!(key = %at, "Skipping replacement that would drop a protected key");
            } else {
                *target = incoming.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn protect(paths: &[&str]) -> ProtectionSet {
        ProtectionSet::from_paths(paths.iter().copied()).unwrap()
    }

    #[test]
    fn test_plain_overlay() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let overlay = json!({"b": {"c": 5}, "e": [1, 2]});
        let merged = merge(&base, &overlay, &ProtectionSet::new());
        assert_eq!(merged, json!({"a": 1, "b": {"c": 5, "d": 3}, "e": [1, 2]}));
        // inputs are not mutated
        assert_eq!(base, json!({"a": 1, "b": {"c": 2, "d": 3}}));
    }

    #[test]
    fn test_nested_protection_invariant() {
        let base = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let overlay = json!({"a": 5, "b": {"c": 99, "d": 10}});
        let merged = merge(&base, &overlay, &protect(&["b.c"]));
        assert_eq!(merged, json!({"a": 5, "b": {"c": 2, "d": 10}}));
    }

    #[test]
    fn test_top_level_protection() {
        let base = json!({"version": "1.0", "name": "x"});
        let overlay = json!({"version": "9.9", "name": "y"});
        let merged = merge(&base, &overlay, &protect(&["version"]));
        assert_eq!(merged, json!({"version": "1.0", "name": "y"}));
    }

    #[test]
    fn test_protection_does_not_block_additions() {
        let base = json!({"a": {}});
        let overlay = json!({"a": {"secret": 1}});
        let merged = merge(&base, &overlay, &protect(&["a.secret"]));
        assert_eq!(merged, json!({"a": {"secret": 1}}));
    }

    #[test]
    fn test_matching_uses_full_path() {
        // a key sharing the protected leaf name elsewhere is not protected
        let base = json!({"x": {"c": 1}, "y": {"c": 1}});
        let overlay = json!({"x": {"c": 2}, "y": {"c": 2}});
        let merged = merge(&base, &overlay, &protect(&["x.c"]));
        assert_eq!(merged, json!({"x": {"c": 1}, "y": {"c": 2}}));
    }

    #[test]
    fn test_scalar_cannot_replace_protected_subtree() {
        let base = json!({"b": {"c": 2}});
        let overlay = json!({"b": "flat"});
        let merged = merge(&base, &overlay, &protect(&["b.c"]));
        assert_eq!(merged, base);

        // without anything protected beneath, replacement goes through
        let merged = merge(&base, &overlay, &protect(&["b.z"]));
        assert_eq!(merged, json!({"b": "flat"}));
    }

    #[test]
    fn test_covers() {
        let set = protect(&["app.security"]);
        assert!(set.covers(&KeyPath::parse("app.security").unwrap()));
        assert!(set.covers(&KeyPath::parse("app.security.token").unwrap()));
        assert!(set.covers(&KeyPath::parse("app").unwrap()));
        assert!(!set.covers(&KeyPath::parse("app.theme").unwrap()));
    }

    #[test]
    fn test_insert_remove() {
        let mut set = ProtectionSet::new();
        assert!(set.insert("a.b").unwrap());
        assert!(!set.insert("a.b").unwrap());
        assert!(set.insert("").is_err());
        assert!(set.insert("a..b").is_err());
        assert!(set.remove("a.b").unwrap());
        assert!(set.is_empty());
    }
}
