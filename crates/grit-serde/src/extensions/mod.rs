//! Extension serializers and their negotiation.
//!
//! Each extension kind is written and read by an [`ExtensionSerDe`] plugin
//! with its own versions, namespace URI and prefix. An export first
//! [`negotiate`]s one version per extension present in the network and
//! checks that no two selected extensions share a namespace URI or prefix;
//! only then is any output produced.

pub mod active_power_control;
pub mod entsoe_area;
pub mod remote_reactive_power_control;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use grit_core::{Diagnostics, Extension, GritError, GritResult, Network};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::context::{DeserializerContext, SerializerContext};
use crate::mappings;
use crate::options::ExportOptions;
use crate::tree::xml::XmlNamespaces;
use crate::tree::ArrayNames;
use crate::version::SchemaVersion;

pub use active_power_control::{ActivePowerControl, ActivePowerControlSerDe};
pub use entsoe_area::{EntsoeArea, EntsoeAreaSerDe};
pub use remote_reactive_power_control::{
    RemoteReactivePowerControl, RemoteReactivePowerControlSerDe,
};

/// One version of an extension schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionVersion {
    pub version: &'static str,
    pub namespace_uri: &'static str,
    pub namespace_prefix: &'static str,
    /// Network versions this extension version can be embedded in.
    pub min_network_version: SchemaVersion,
    pub max_network_version: SchemaVersion,
}

impl ExtensionVersion {
    pub const fn new(
        version: &'static str,
        namespace_uri: &'static str,
        namespace_prefix: &'static str,
    ) -> Self {
        Self {
            version,
            namespace_uri,
            namespace_prefix,
            min_network_version: SchemaVersion::V1_0,
            max_network_version: SchemaVersion::CURRENT,
        }
    }

    pub const fn with_min_network_version(mut self, version: SchemaVersion) -> Self {
        self.min_network_version = version;
        self
    }

    pub fn supports(&self, network_version: SchemaVersion) -> bool {
        (self.min_network_version..=self.max_network_version).contains(&network_version)
    }
}

/// Writer and reader of one extension kind.
pub trait ExtensionSerDe: Send + Sync {
    fn extension_name(&self) -> &'static str;

    /// Known versions, oldest first.
    fn versions(&self) -> &[ExtensionVersion];

    /// Repeated child names and their group names, for encodings that
    /// wrap repeated siblings.
    fn array_names(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// Writes the attributes and children of the extension node.
    fn write(
        &self,
        extension: &dyn Extension,
        version: &ExtensionVersion,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()>;

    /// Reads the extension node of `owner_id`.
    fn read(
        &self,
        owner_id: &str,
        version: &ExtensionVersion,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Box<dyn Extension>>;

    fn version(&self, version: &str) -> Option<&ExtensionVersion> {
        self.versions().iter().find(|v| v.version == version)
    }

    /// Newest version that can be embedded in `network_version`.
    fn best_version(&self, network_version: SchemaVersion) -> Option<&ExtensionVersion> {
        self.versions()
            .iter()
            .rev()
            .find(|v| v.supports(network_version))
    }
}

/// Downcasts an extension to the type its serializer expects.
pub fn downcast<'e, E: Extension>(extension: &'e dyn Extension) -> GritResult<&'e E> {
    extension.as_any().downcast_ref::<E>().ok_or_else(|| {
        GritError::ExtensionResolution(format!(
            "Extension {} does not have the type its serializer expects",
            extension.name()
        ))
    })
}

/// Registry of extension serializers, keyed by extension name.
#[derive(Default)]
pub struct ExtensionProviders {
    serdes: BTreeMap<&'static str, Box<dyn ExtensionSerDe>>,
}

/// Built-in serializers, created on first use.
pub static DEFAULT_EXTENSIONS: Lazy<ExtensionProviders> = Lazy::new(ExtensionProviders::with_builtins);

impl ExtensionProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        Self::new()
            .register(ActivePowerControlSerDe)
            .register(EntsoeAreaSerDe)
            .register(RemoteReactivePowerControlSerDe)
    }

    /// Adds a serializer, replacing any serializer with the same name.
    pub fn register(mut self, serde: impl ExtensionSerDe + 'static) -> Self {
        self.serdes.insert(serde.extension_name(), Box::new(serde));
        self
    }

    pub fn find(&self, name: &str) -> Option<&dyn ExtensionSerDe> {
        self.serdes.get(name).map(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ExtensionSerDe> + '_ {
        self.serdes.values().map(|s| s.as_ref())
    }

    /// Group names of the network schema plus those of every extension.
    pub fn array_names(&self) -> GritResult<ArrayNames> {
        let mut names = ArrayNames::new();
        for (single, array) in mappings::ARRAY_NAMES {
            names.insert(single, array)?;
        }
        for serde in self.iter() {
            for (single, array) in serde.array_names() {
                names.insert(single, array)?;
            }
        }
        Ok(names)
    }

    /// Namespace URIs the markup reader can recognize.
    pub fn xml_namespaces(&self) -> XmlNamespaces {
        let mut namespaces = XmlNamespaces::default();
        for version in SchemaVersion::ALL {
            for valid in [true, false] {
                namespaces
                    .roots
                    .entry(version.namespace_uri(valid))
                    .or_insert_with(|| (version.to_string(), valid));
            }
        }
        for serde in self.iter() {
            for version in serde.versions() {
                namespaces.extensions.insert(
                    version.namespace_uri.to_string(),
                    (serde.extension_name().to_string(), version.version.to_string()),
                );
            }
        }
        namespaces
    }
}

impl fmt::Debug for ExtensionProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.serdes.keys()).finish()
    }
}

/// Extensions selected for one export, with their negotiated version.
#[derive(Default)]
pub struct ExtensionPlan<'p> {
    selected: BTreeMap<&'static str, (&'p dyn ExtensionSerDe, ExtensionVersion)>,
}

impl<'p> ExtensionPlan<'p> {
    pub fn get(&self, name: &str) -> Option<(&'p dyn ExtensionSerDe, &ExtensionVersion)> {
        self.selected
            .get(name)
            .map(|(serde, version)| (*serde, version))
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.selected.keys().copied()
    }

    /// Extension versions for the document header.
    pub fn versions(&self) -> BTreeMap<String, String> {
        self.selected
            .iter()
            .map(|(name, (_, version))| (name.to_string(), version.version.to_string()))
            .collect()
    }

    /// `(uri, prefix)` of every selected extension.
    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.selected
            .values()
            .map(|(_, v)| (v.namespace_uri, v.namespace_prefix))
    }
}

impl fmt::Debug for ExtensionPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.versions()).finish()
    }
}

/// Applies the missing-extension policy.
fn unresolved(
    message: String,
    options: &ExportOptions,
    diagnostics: &mut Diagnostics,
) -> GritResult<()> {
    if options.throw_exception_if_extension_not_found {
        return Err(GritError::ExtensionResolution(message));
    }
    warn!("{}", message);
    diagnostics.add_warning("extension", &message);
    Ok(())
}

fn select_version<'s>(
    serde: &'s dyn ExtensionSerDe,
    options: &ExportOptions,
    diagnostics: &mut Diagnostics,
) -> GritResult<Option<&'s ExtensionVersion>> {
    let name = serde.extension_name();
    if let Some(pinned) = options.extension_versions.get(name) {
        let version = serde.version(pinned).ok_or_else(|| {
            GritError::ExtensionResolution(format!(
                "Unknown version {} for extension {}",
                pinned, name
            ))
        })?;
        if version.supports(options.version) {
            return Ok(Some(version));
        }
        let message = format!(
            "Version {} of extension {} is not compatible with network version {}",
            pinned, name, options.version
        );
        warn!("{}", message);
        diagnostics.add_warning("extension", &message);
    }
    match serde.best_version(options.version) {
        Some(version) => Ok(Some(version)),
        None => {
            let message = format!("Version {} does not support {} extension", options.version, name);
            unresolved(message, options, diagnostics)?;
            Ok(None)
        }
    }
}

/// Checks that no two selected extensions share a namespace URI or prefix,
/// and that none reuses the network's own.
fn check_namespace_collisions(plan: &ExtensionPlan<'_>, root_prefix: &str) -> GritResult<()> {
    let mut uris: HashMap<&str, &str> = HashMap::new();
    let mut prefixes: HashMap<&str, &str> = HashMap::new();
    for (&name, (_, version)) in &plan.selected {
        if version.namespace_prefix == root_prefix {
            return Err(GritError::NamespaceCollision(format!(
                "Extension {} uses the reserved namespace prefix '{}'",
                name, root_prefix
            )));
        }
        if let Some(other) = uris.insert(version.namespace_uri, name) {
            return Err(GritError::NamespaceCollision(format!(
                "Extensions {} and {} have the same namespace URI '{}'",
                other, name, version.namespace_uri
            )));
        }
        if let Some(other) = prefixes.insert(version.namespace_prefix, name) {
            return Err(GritError::NamespaceCollision(format!(
                "Extensions {} and {} have the same namespace prefix '{}'",
                other, name, version.namespace_prefix
            )));
        }
    }
    Ok(())
}

/// Pre-flight of an export: resolves a serializer and a version for every
/// selected extension carried by an element the export writes, then checks
/// namespaces.
pub fn negotiate<'p>(
    network: &Network,
    options: &ExportOptions,
    providers: &'p ExtensionProviders,
    diagnostics: &mut Diagnostics,
) -> GritResult<ExtensionPlan<'p>> {
    let names: BTreeSet<&'static str> = network
        .identifiables()
        .filter(|identifiable| mappings::is_exported(*identifiable, network, options))
        .flat_map(|identifiable| identifiable.data().extensions().iter().map(|e| e.name()))
        .filter(|name| options.is_extension_selected(name))
        .collect();

    let mut plan = ExtensionPlan::default();
    for name in names {
        let Some(serde) = providers.find(name) else {
            unresolved(format!("Serializer for {} not found", name), options, diagnostics)?;
            continue;
        };
        if let Some(version) = select_version(serde, options, diagnostics)? {
            plan.selected.insert(name, (serde, version.clone()));
        }
    }
    check_namespace_collisions(&plan, mappings::NETWORK_PREFIX)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_core::{
        Bus, Container, Generator, Substation, Switch, Terminal, TerminalRef, VoltageLevel,
    };
    use crate::options::TopologyLevel;

    fn network_with(extensions: Vec<Box<dyn Extension>>) -> Network {
        let mut network = Network::new("N", "test");
        network.add(Container::root(), Substation::new("S1")).unwrap();
        network
            .add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))
            .unwrap();
        network.add(Container::voltage_level("VL1"), Bus::new("B1")).unwrap();
        let mut generator = Generator::new("G1", Terminal::new("VL1", "B1"));
        for extension in extensions {
            generator.data.add_extension(extension);
        }
        network.add(Container::voltage_level("VL1"), generator).unwrap();
        network
    }

    #[test]
    fn test_best_version_follows_network_version() {
        let serde = ActivePowerControlSerDe;
        assert_eq!(serde.best_version(SchemaVersion::V1_16).map(|v| v.version), Some("1.1"));
        assert_eq!(serde.best_version(SchemaVersion::V1_5).map(|v| v.version), Some("1.0"));
        let rrpc = RemoteReactivePowerControlSerDe;
        assert!(rrpc.best_version(SchemaVersion::V1_3).is_none());
    }

    #[test]
    fn test_negotiate_pinned_version() {
        let network = network_with(vec![Box::new(ActivePowerControl::new(true, 4.0))]);
        let options = ExportOptions::default().with_extension_version("activePowerControl", "1.0");
        let mut diagnostics = Diagnostics::new();
        let plan = negotiate(&network, &options, &DEFAULT_EXTENSIONS, &mut diagnostics).unwrap();
        assert_eq!(plan.versions().get("activePowerControl").map(String::as_str), Some("1.0"));
        assert_eq!(diagnostics.warning_count(), 0);
    }

    #[test]
    fn test_incompatible_pin_falls_back() {
        let network = network_with(vec![Box::new(ActivePowerControl::new(true, 4.0))]);
        let options = ExportOptions::default()
            .with_version(SchemaVersion::V1_5)
            .with_extension_version("activePowerControl", "1.1");
        let mut diagnostics = Diagnostics::new();
        let plan = negotiate(&network, &options, &DEFAULT_EXTENSIONS, &mut diagnostics).unwrap();
        assert_eq!(plan.versions().get("activePowerControl").map(String::as_str), Some("1.0"));
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_unsupported_network_version_policy() {
        let rrpc = RemoteReactivePowerControl::new(true, 10.0, TerminalRef::new("G1"));
        let network = network_with(vec![Box::new(rrpc)]);

        let lenient = ExportOptions::default().with_version(SchemaVersion::V1_2);
        let mut diagnostics = Diagnostics::new();
        let plan = negotiate(&network, &lenient, &DEFAULT_EXTENSIONS, &mut diagnostics).unwrap();
        assert!(plan.is_empty());
        assert_eq!(diagnostics.warning_count(), 1);

        let strict = lenient.with_throw_exception_if_extension_not_found(true);
        let err = negotiate(&network, &strict, &DEFAULT_EXTENSIONS, &mut Diagnostics::new())
            .unwrap_err();
        assert!(err.to_string().contains("Version 1.2 does not support remoteReactivePowerControl extension"));
    }

    #[test]
    fn test_missing_serializer() {
        let network = network_with(vec![Box::new(ActivePowerControl::new(true, 4.0))]);
        let providers = ExtensionProviders::new();
        let strict = ExportOptions::default().with_throw_exception_if_extension_not_found(true);
        let err = negotiate(&network, &strict, &providers, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(err, GritError::ExtensionResolution(_)));
        assert!(err.to_string().contains("Serializer for activePowerControl not found"));
    }

    #[test]
    fn test_excluded_extension_is_not_negotiated() {
        let network = network_with(vec![Box::new(ActivePowerControl::new(true, 4.0))]);
        let options = ExportOptions::default().without_extension("activePowerControl");
        let plan = negotiate(&network, &options, &DEFAULT_EXTENSIONS, &mut Diagnostics::new()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_unwritten_elements_do_not_negotiate() {
        let mut network = network_with(Vec::new());
        network.add(Container::voltage_level("VL1"), Bus::new("B2")).unwrap();
        let mut switch = Switch::new("SW1", "B1", "B2");
        switch.data.add_extension(Box::new(ActivePowerControl::new(true, 4.0)));
        network.add(Container::voltage_level("VL1"), switch).unwrap();

        let bus_breaker = ExportOptions::default();
        let plan = negotiate(&network, &bus_breaker, &DEFAULT_EXTENSIONS, &mut Diagnostics::new()).unwrap();
        assert!(plan.versions().contains_key("activePowerControl"));

        // bus-branch export writes merged buses and no switch elements
        let bus_branch = bus_breaker.with_topology_level(TopologyLevel::BusBranch);
        let plan = negotiate(&network, &bus_branch, &DEFAULT_EXTENSIONS, &mut Diagnostics::new()).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_array_names_include_core_names() {
        let names = DEFAULT_EXTENSIONS.array_names().unwrap();
        assert_eq!(names.array_name("substation"), Some("substations"));
        assert_eq!(names.single_name("extensions"), Some("extension"));
    }

    #[test]
    fn test_xml_namespaces_cover_all_versions() {
        let namespaces = DEFAULT_EXTENSIONS.xml_namespaces();
        let uri = SchemaVersion::V1_7.namespace_uri(false);
        assert_eq!(namespaces.roots.get(&uri), Some(&("1.7".to_string(), false)));
        assert!(namespaces
            .extensions
            .values()
            .any(|(name, version)| name == "entsoeArea" && version == "1.0"));
    }
}
