//! Document versions.
//!
//! A version is a string of dot-separated non-negative integers. Comparison
//! pads the shorter operand with zeros, so `1.2` and `1.2.0` are equal and
//! `1.10` sorts after `1.2`.

use crate::error::{ConfigError, ConfigResult};
use crate::tree::Document;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Top-level key holding a document's version string.
pub const VERSION_KEY: &str = "version";

/// A parsed version string.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
    raw: String,
}

impl Version {
    pub fn parse(raw: &str) -> ConfigResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::VersionFormat(raw.to_string()));
        }

        let components = trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ConfigError::VersionFormat(raw.to_string()));
                }
                part.parse::<u64>()
                    .map_err(|_| ConfigError::VersionFormat(raw.to_string()))
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            components,
            raw: trimmed.to_string(),
        })
    }

    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// The string this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    // Trailing zeros don't affect ordering, so they must not affect hashing either.
    fn significant(&self) -> &[u64] {
        let end = self
            .components
            .iter()
            .rposition(|c| *c != 0)
            .map_or(0, |i| i + 1);
        &self.components[..end]
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| {
                let a = self.components.get(i).copied().unwrap_or(0);
                let b = other.components.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Version {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compares two version strings.
pub fn compare(a: &str, b: &str) -> ConfigResult<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Reads the document's `version` entry.
///
/// Returns `Ok(None)` when the document carries no version. A version that
/// is present but not a well-formed string is a `VersionFormat` error.
pub fn document_version(doc: &Document) -> ConfigResult<Option<Version>> {
    match doc.get(VERSION_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Version::parse(raw).map(Some),
        Some(other) => Err(ConfigError::VersionFormat(other.to_string())),
    }
}

/// Writes `version` into the document's top-level `version` entry.
///
/// Non-mapping documents are left as they are.
pub fn stamp_version(doc: &mut Document, version: &Version) {
    if let Some(map) = doc.as_object_mut() {
        map.insert(VERSION_KEY.to_string(), Value::String(version.as_str().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_zero_padding() {
        assert_eq!(compare("1.2", "1.2.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1", "1.0.0.0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.2.1", "1.2").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(compare("1.10", "1.2").unwrap(), Ordering::Greater);
        assert_eq!(compare("0.9", "0.10").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_malformed_versions() {
        for raw in ["", "1..2", "1.a", "v1.0", "-1", "1.2."] {
            assert!(
                matches!(Version::parse(raw), Err(ConfigError::VersionFormat(_))),
                "{raw} should be rejected"
            );
        }
        assert!(compare("1.0", "x").is_err());
    }

    #[test]
    fn test_equal_versions_hash_alike() {
        let mut set = HashSet::new();
        set.insert(Version::parse("1.2").unwrap());
        assert!(set.contains(&Version::parse("1.2.0").unwrap()));
        assert_eq!(Version::parse("1.2.0").unwrap().to_string(), "1.2.0");
    }

    #[test]
    fn test_document_version() {
        assert_eq!(document_version(&json!({})).unwrap(), None);
        assert_eq!(
            document_version(&json!({"version": "1.1"})).unwrap(),
            Some(Version::parse("1.1").unwrap())
        );
        assert!(document_version(&json!({"version": 1.1})).is_err());
    }

    #[test]
    fn test_stamp_version() {
        let mut doc = json!({"a": 1});
        stamp_version(&mut doc, &Version::parse("2.0").unwrap());
        assert_eq!(doc, json!({"a": 1, "version": "2.0"}));
    }
}
