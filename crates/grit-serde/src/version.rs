//! Schema versions of the network document.

use std::fmt;
use std::str::FromStr;

use grit_core::{GritError, GritResult};
use serde::{Deserialize, Serialize};

const NAMESPACE_BASE: &str = "http://www.grit-project.org/schema/grit/";
const EQUIPMENT_NAMESPACE_BASE: &str = "http://www.grit-project.org/schema/grit/equipment/";

/// A schema version. Variants are declared oldest first, so the derived
/// ordering is the version ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SchemaVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
    #[serde(rename = "1.4")]
    V1_4,
    #[serde(rename = "1.5")]
    V1_5,
    #[serde(rename = "1.6")]
    V1_6,
    #[serde(rename = "1.7")]
    V1_7,
    #[serde(rename = "1.8")]
    V1_8,
    #[serde(rename = "1.9")]
    V1_9,
    #[serde(rename = "1.10")]
    V1_10,
    #[serde(rename = "1.11")]
    V1_11,
    #[serde(rename = "1.12")]
    V1_12,
    #[serde(rename = "1.13")]
    V1_13,
    #[serde(rename = "1.14")]
    V1_14,
    #[serde(rename = "1.15")]
    V1_15,
    #[serde(rename = "1.16")]
    V1_16,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V1_16;

    pub const ALL: [SchemaVersion; 17] = [
        SchemaVersion::V1_0,
        SchemaVersion::V1_1,
        SchemaVersion::V1_2,
        SchemaVersion::V1_3,
        SchemaVersion::V1_4,
        SchemaVersion::V1_5,
        SchemaVersion::V1_6,
        SchemaVersion::V1_7,
        SchemaVersion::V1_8,
        SchemaVersion::V1_9,
        SchemaVersion::V1_10,
        SchemaVersion::V1_11,
        SchemaVersion::V1_12,
        SchemaVersion::V1_13,
        SchemaVersion::V1_14,
        SchemaVersion::V1_15,
        SchemaVersion::V1_16,
    ];

    /// First version with the unvalidated (equipment) namespace.
    pub const FIRST_WITH_EQUIPMENT_NAMESPACE: SchemaVersion = SchemaVersion::V1_7;

    fn minor(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        const NAMES: [&str; 17] = [
            "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "1.8", "1.9", "1.10",
            "1.11", "1.12", "1.13", "1.14", "1.15", "1.16",
        ];
        NAMES[self.minor()]
    }

    /// Version suffix used in namespace URIs, `1_12` for 1.12.
    pub fn namespace_suffix(self) -> String {
        format!("1_{}", self.minor())
    }

    /// Namespace URI of the document root. `valid` selects the validated
    /// namespace; the equipment namespace only exists from 1.7 on.
    pub fn namespace_uri(self, valid: bool) -> String {
        if valid || self < Self::FIRST_WITH_EQUIPMENT_NAMESPACE {
            format!("{}{}", NAMESPACE_BASE, self.namespace_suffix())
        } else {
            format!("{}{}", EQUIPMENT_NAMESPACE_BASE, self.namespace_suffix())
        }
    }

    /// Reverse of [`namespace_uri`](Self::namespace_uri): the version and
    /// whether the namespace is the validated one.
    pub fn from_namespace_uri(uri: &str) -> Option<(SchemaVersion, bool)> {
        let (suffix, valid) = if let Some(s) = uri.strip_prefix(EQUIPMENT_NAMESPACE_BASE) {
            (s, false)
        } else {
            (uri.strip_prefix(NAMESPACE_BASE)?, true)
        };
        let version = Self::ALL
            .into_iter()
            .find(|v| v.namespace_suffix() == suffix)?;
        if !valid && version < Self::FIRST_WITH_EQUIPMENT_NAMESPACE {
            return None;
        }
        Some((version, valid))
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        SchemaVersion::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = GritError;

    fn from_str(s: &str) -> GritResult<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| GritError::Structural(format!("Unknown schema version '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_follows_minor_number() {
        assert!(SchemaVersion::V1_2 < SchemaVersion::V1_10);
        assert!(SchemaVersion::V1_16 > SchemaVersion::V1_9);
        assert_eq!(SchemaVersion::ALL.last(), Some(&SchemaVersion::CURRENT));
    }

    #[test]
    fn test_string_round_trip() {
        for version in SchemaVersion::ALL {
            assert_eq!(version.as_str().parse::<SchemaVersion>().unwrap(), version);
        }
        assert!("2.0".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_namespace_variants() {
        let v = SchemaVersion::V1_12;
        assert!(v.namespace_uri(true).ends_with("/grit/1_12"));
        assert!(v.namespace_uri(false).ends_with("/grit/equipment/1_12"));
        assert_eq!(SchemaVersion::from_namespace_uri(&v.namespace_uri(false)), Some((v, false)));

        // no equipment namespace before 1.7
        let old = SchemaVersion::V1_5;
        assert_eq!(old.namespace_uri(false), old.namespace_uri(true));
        assert_eq!(
            SchemaVersion::from_namespace_uri(
                "http://www.grit-project.org/schema/grit/equipment/1_5"
            ),
            None
        );
    }

    #[test]
    fn test_serde_uses_dotted_form() {
        let json = serde_json::to_string(&SchemaVersion::V1_11).unwrap();
        assert_eq!(json, "\"1.11\"");
    }
}
