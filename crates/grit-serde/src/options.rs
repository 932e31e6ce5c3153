//! Import and export options.
//!
//! Both option sets are plain serde structs so they can be built in code with
//! the `with_*` methods or loaded from a TOML file:
//!
//! ```toml
//! version = "1.11"
//! format = "json"
//! anonymized = true
//! excluded-extensions = ["entsoeArea"]
//! version-incompatibility-behavior = "log-error"
//!
//! [extension-versions]
//! activePowerControl = "1.0"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use grit_core::{GritError, GritResult};
use serde::{Deserialize, Serialize};

use crate::tree::TreeDataFormat;
use crate::version::SchemaVersion;

/// Level of topology detail written for voltage levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyLevel {
    /// Buses and switches as modelled.
    #[default]
    BusBreaker,
    /// Buses joined by closed switches are merged; switches are not written.
    BusBranch,
}

/// What to do when the network uses a feature the target version lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncompatibilityBehavior {
    #[default]
    ThrowException,
    /// Log a warning and leave the feature out of the document.
    LogError,
}

/// Extension filtering shared by import and export.
fn extension_selected(
    included: &Option<BTreeSet<String>>,
    excluded: &BTreeSet<String>,
    name: &str,
) -> bool {
    included.as_ref().map_or(true, |set| set.contains(name)) && !excluded.contains(name)
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> GritResult<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GritError::Config(format!("Cannot read options file {}: {}", path.display(), e))
    })?;
    toml::from_str(&contents)
        .map_err(|e| GritError::Config(format!("Invalid options file {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExportOptions {
    /// Target schema version
    pub version: SchemaVersion,

    /// Target encoding
    pub format: TreeDataFormat,

    /// Pretty-print markup and JSON output
    pub indent: bool,

    /// Replace identifiers by synthetic tokens
    pub anonymized: bool,

    pub topology_level: TopologyLevel,

    /// Extensions to write; `None` means every extension found
    pub included_extensions: Option<BTreeSet<String>>,

    pub excluded_extensions: BTreeSet<String>,

    /// Pinned extension versions, by extension name
    pub extension_versions: BTreeMap<String, String>,

    pub throw_exception_if_extension_not_found: bool,

    pub version_incompatibility_behavior: IncompatibilityBehavior,

    /// Sort entities by id for reproducible output
    pub sorted: bool,

    /// Write overload management systems
    pub with_automation_systems: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            version: SchemaVersion::CURRENT,
            format: TreeDataFormat::Xml,
            indent: true,
            anonymized: false,
            topology_level: TopologyLevel::BusBreaker,
            included_extensions: None,
            excluded_extensions: BTreeSet::new(),
            extension_versions: BTreeMap::new(),
            throw_exception_if_extension_not_found: false,
            version_incompatibility_behavior: IncompatibilityBehavior::ThrowException,
            sorted: false,
            with_automation_systems: true,
        }
    }
}

impl ExportOptions {
    pub fn from_toml_str(s: &str) -> GritResult<Self> {
        toml::from_str(s).map_err(|e| GritError::Config(format!("Invalid export options: {}", e)))
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> GritResult<Self> {
        read_toml(path.as_ref())
    }

    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_format(mut self, format: TreeDataFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_anonymized(mut self, anonymized: bool) -> Self {
        self.anonymized = anonymized;
        self
    }

    pub fn with_topology_level(mut self, level: TopologyLevel) -> Self {
        self.topology_level = level;
        self
    }

    /// Restricts the written extensions; the first call switches from
    /// "every extension" to an explicit list.
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.included_extensions
            .get_or_insert_with(BTreeSet::new)
            .insert(name.into());
        self
    }

    pub fn without_extension(mut self, name: impl Into<String>) -> Self {
        self.excluded_extensions.insert(name.into());
        self
    }

    pub fn with_extension_version(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.extension_versions.insert(name.into(), version.into());
        self
    }

    pub fn with_throw_exception_if_extension_not_found(mut self, throw: bool) -> Self {
        self.throw_exception_if_extension_not_found = throw;
        self
    }

    pub fn with_version_incompatibility_behavior(mut self, behavior: IncompatibilityBehavior) -> Self {
        self.version_incompatibility_behavior = behavior;
        self
    }

    pub fn with_sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn with_automation_systems(mut self, with: bool) -> Self {
        self.with_automation_systems = with;
        self
    }

    pub fn is_extension_selected(&self, name: &str) -> bool {
        extension_selected(&self.included_extensions, &self.excluded_extensions, name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImportOptions {
    /// Source encoding; sniffed from the first bytes when `None`
    pub format: Option<TreeDataFormat>,

    /// Extensions to read; `None` means every extension found
    pub included_extensions: Option<BTreeSet<String>>,

    pub excluded_extensions: BTreeSet<String>,

    pub throw_exception_if_extension_not_found: bool,
}

impl ImportOptions {
    pub fn from_toml_str(s: &str) -> GritResult<Self> {
        toml::from_str(s).map_err(|e| GritError::Config(format!("Invalid import options: {}", e)))
    }

    pub fn from_toml_path(path: impl AsRef<Path>) -> GritResult<Self> {
        read_toml(path.as_ref())
    }

    pub fn with_format(mut self, format: TreeDataFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.included_extensions
            .get_or_insert_with(BTreeSet::new)
            .insert(name.into());
        self
    }

    pub fn without_extension(mut self, name: impl Into<String>) -> Self {
        self.excluded_extensions.insert(name.into());
        self
    }

    pub fn with_throw_exception_if_extension_not_found(mut self, throw: bool) -> Self {
        self.throw_exception_if_extension_not_found = throw;
        self
    }

    pub fn is_extension_selected(&self, name: &str) -> bool {
        extension_selected(&self.included_extensions, &self.excluded_extensions, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_defaults() {
        let options = ExportOptions::default();
        assert_eq!(options.version, SchemaVersion::CURRENT);
        assert!(options.indent);
        assert!(options.with_automation_systems);
        assert!(options.is_extension_selected("anything"));
    }

    #[test]
    fn test_extension_filters() {
        let options = ExportOptions::default()
            .with_extension("activePowerControl")
            .with_extension("entsoeArea")
            .without_extension("entsoeArea");
        assert!(options.is_extension_selected("activePowerControl"));
        assert!(!options.is_extension_selected("entsoeArea"));
        assert!(!options.is_extension_selected("other"));
    }

    #[test]
    fn test_export_from_toml() {
        let options = ExportOptions::from_toml_str(
            r#"
            version = "1.11"
            format = "json"
            anonymized = true
            topology-level = "bus-branch"
            version-incompatibility-behavior = "log-error"

            [extension-versions]
            activePowerControl = "1.0"
            "#,
        )
        .unwrap();
        assert_eq!(options.version, SchemaVersion::V1_11);
        assert_eq!(options.format, TreeDataFormat::Json);
        assert!(options.anonymized);
        assert_eq!(options.topology_level, TopologyLevel::BusBranch);
        assert_eq!(
            options.version_incompatibility_behavior,
            IncompatibilityBehavior::LogError
        );
        assert_eq!(
            options.extension_versions.get("activePowerControl").map(String::as_str),
            Some("1.0")
        );
        // unspecified fields keep their defaults
        assert!(options.indent);
    }

    #[test]
    fn test_import_from_toml_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "format = \"bin\"\nexcluded-extensions = [\"entsoeArea\"]").unwrap();
        let options = ImportOptions::from_toml_path(file.path()).unwrap();
        assert_eq!(options.format, Some(TreeDataFormat::Bin));
        assert!(!options.is_extension_selected("entsoeArea"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ExportOptions::from_toml_str("version = \"9.9\"").unwrap_err();
        assert!(matches!(err, GritError::Config(_)));
    }
}
