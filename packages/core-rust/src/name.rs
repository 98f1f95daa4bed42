//! Hierarchical component names such as `/scope/category/Name`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigurationError;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.$-]+$").expect("segment pattern is valid"));

/// Validated, immutable address of a dependency in the host's component tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName(String);

impl ComponentName {
    /// Parses and validates a component name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingComponentName` for an empty string and
    /// `ConfigurationError::InvalidComponentName` when the name is not absolute or
    /// contains an empty or malformed segment.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::MissingComponentName);
        }
        let invalid = |reason| ConfigurationError::InvalidComponentName {
            name: name.clone(),
            reason,
        };
        let Some(rest) = name.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };
        if rest.is_empty() {
            return Err(invalid("must contain at least one segment"));
        }
        for segment in rest.split('/') {
            if segment.is_empty() {
                return Err(invalid("contains an empty segment"));
            }
            if !SEGMENT.is_match(segment) {
                return Err(invalid("contains an unsupported character"));
            }
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    /// Final segment (the component's own name).
    #[must_use]
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Enclosing scope, or `None` for a top-level name.
    #[must_use]
    pub fn parent(&self) -> Option<ComponentName> {
        let idx = self.0.rfind('/')?;
        if idx == 0 {
            None
        } else {
            Some(Self(self.0[..idx].to_string()))
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ComponentName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ComponentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ComponentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ComponentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_hierarchical_name() {
        let name = ComponentName::new("/atg/dynamo/transaction/TransactionManager").unwrap();
        assert_eq!(
            name.segments().collect::<Vec<_>>(),
            vec!["atg", "dynamo", "transaction", "TransactionManager"]
        );
        assert_eq!(name.leaf(), "TransactionManager");
        assert_eq!(name.parent().unwrap().as_str(), "/atg/dynamo/transaction");
    }

    #[test]
    fn top_level_name_has_no_parent() {
        let name = ComponentName::new("/Root").unwrap();
        assert!(name.parent().is_none());
        assert_eq!(name.leaf(), "Root");
    }

    #[test]
    fn empty_name_is_missing() {
        assert_eq!(
            ComponentName::new("  "),
            Err(ConfigurationError::MissingComponentName)
        );
    }

    #[test]
    fn rejects_malformed_names() {
        for raw in ["relative/Name", "/", "/a//b", "/a/b/", "/a/b c"] {
            assert!(
                matches!(
                    ComponentName::new(raw),
                    Err(ConfigurationError::InvalidComponentName { .. })
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn deserializes_with_validation() {
        let ok: ComponentName = serde_json::from_str("\"/a/B\"").unwrap();
        assert_eq!(ok.as_str(), "/a/B");
        assert!(serde_json::from_str::<ComponentName>("\"nope\"").is_err());
    }

    proptest! {
        #[test]
        fn segments_survive_parsing(segs in prop::collection::vec("[A-Za-z0-9_.$-]{1,12}", 1..6)) {
            let raw = format!("/{}", segs.join("/"));
            let name = ComponentName::new(raw.clone()).unwrap();
            prop_assert_eq!(name.as_str(), raw.as_str());
            prop_assert_eq!(name.segments().collect::<Vec<_>>(), segs.iter().map(String::as_str).collect::<Vec<_>>());
            prop_assert_eq!(name.leaf(), segs.last().unwrap().as_str());
        }
    }
}
