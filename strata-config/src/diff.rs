//! Minimal diffs against a baseline document.
//!
//! Reconstituting a diff against the baseline it was taken from yields the
//! original document, provided keys shared with the baseline hold values of
//! compatible shape. A `None` diff reconstitutes from an empty mapping.

use crate::tree::Document;
use serde_json::{Map, Value};

/// Returns the subset of `doc` that differs from `baseline`, or `None` if nothing differs.
///
/// Keys missing from `baseline` are copied verbatim. Mappings present on
/// both sides are compared recursively and kept only when something inside
/// them differs.
pub fn diff(doc: &Document, baseline: &Document) -> Option<Document> {
    match (doc, baseline) {
        (Value::Object(doc_map), Value::Object(base_map)) => {
            let mut out = Map::new();
            for (key, value) in doc_map {
                match base_map.get(key) {
                    None => {
                        out.insert(key.clone(), value.clone());
                    }
                    Some(base_value) => {
                        if let Some(changed) = diff(value, base_value) {
                            out.insert(key.clone(), changed);
                        }
                    }
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Value::Object(out))
            }
        }
        (doc, baseline) if doc == baseline => None,
        (doc, _) => Some(doc.clone()),
    }
}

/// Rebuilds a full document by overlaying `diff` onto a copy of `baseline`.
pub fn reconstitute(diff: &Document, baseline: &Document) -> Document {
    let mut result = baseline.clone();
    overlay(&mut result, diff);
    result
}

fn overlay(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => {
            *target = source.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_diff() {
        let base = json!({"app": {"name": "Default", "v": "1"}, "audio": {"vol": 0.8}});
        let user = json!({"app": {"name": "Custom", "v": "1"}, "audio": {"vol": 0.8}});
        let d = diff(&user, &base).unwrap();
        assert_eq!(d, json!({"app": {"name": "Custom"}}));
        assert_eq!(reconstitute(&d, &base), user);
    }

    #[test]
    fn test_no_diff_sentinel() {
        let base = json!({"a": {"b": [1, 2]}, "c": null});
        assert_eq!(diff(&base, &base), None);
        assert_eq!(diff(&json!({}), &base), None);
    }

    #[test]
    fn test_keys_absent_from_baseline_survive() {
        let base = json!({"a": 1});
        let user = json!({"a": 1, "extra": {"deep": true}});
        let d = diff(&user, &base).unwrap();
        assert_eq!(d, json!({"extra": {"deep": true}}));
        assert_eq!(reconstitute(&d, &base), user);
    }

    #[test]
    fn test_type_change_is_copied_whole() {
        let base = json!({"a": {"b": 1}});
        let user = json!({"a": "flat"});
        assert_eq!(diff(&user, &base), Some(json!({"a": "flat"})));
    }

    #[test]
    fn test_arrays_compare_as_values() {
        let base = json!({"list": [1, 2, 3]});
        let user = json!({"list": [1, 2]});
        assert_eq!(diff(&user, &base), Some(json!({"list": [1, 2]})));
    }
}
