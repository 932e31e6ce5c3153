//! The network element: the root network or one of its sub-networks.
//!
//! Content is written in a fixed order: sub-networks, voltage levels
//! without substation, substations, lines, tie lines, HVDC lines, voltage
//! angle limits and finally the extension block of everything exported
//! inside the element. Sub-networks only exist from 1.11; older documents
//! get their content flattened into the root.

use chrono::{DateTime, FixedOffset};
use grit_core::{
    Container, Extension, GritError, GritResult, IdentifiableData, Network, Subnetwork,
    ValidationLevel,
};
use tracing::debug;

use super::branches::{
    HvdcLineSerDe, LineSerDe, TieLineSerDe, HVDC_LINE, LINE, TIE_LINE,
};
use super::substation::{SubstationSerDe, SUBSTATION};
use super::voltage_angle_limit::{
    read_voltage_angle_limit, write_voltage_angle_limit, VOLTAGE_ANGLE_LIMIT,
};
use super::voltage_level::{VoltageLevelSerDe, VOLTAGE_LEVEL};
use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;
use crate::gate::{ErrorMessage, VersionGate};
use crate::template::{
    read_common_sub_element, read_identity, write_aliases_and_properties, write_identity,
    IdentifiableSerDe, SimpleIdentifiableSerDe, ALIAS, PROPERTY,
};
use crate::version::SchemaVersion;

pub const NETWORK: &str = "network";
pub const EXTENSION: &str = "extension";

const CASE_DATE: &str = "caseDate";
const FORECAST_DISTANCE: &str = "forecastDistance";
const SOURCE_FORMAT: &str = "sourceFormat";
const MINIMUM_VALIDATION_LEVEL: &str = "minimumValidationLevel";
const SUBNETWORK: &str = "subnetwork";

/// Objects a network element writes.
#[derive(Debug, Clone, Copy)]
enum Scope<'s> {
    /// The whole network, sub-network content included.
    All,
    /// Objects of the root network only.
    Root,
    Subnetwork(&'s str),
}

impl Scope<'_> {
    fn contains(self, subnetwork: Option<&str>) -> bool {
        match self {
            Scope::All => true,
            Scope::Root => subnetwork.is_none(),
            Scope::Subnetwork(id) => subnetwork == Some(id),
        }
    }
}

// =============================================================================
// Write
// =============================================================================

fn write_element_attributes(
    case_date: &DateTime<FixedOffset>,
    forecast_distance: i32,
    source_format: &str,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    let writer = ctx.writer();
    writer.write_string_attribute(CASE_DATE, Some(&case_date.to_rfc3339()))?;
    writer.write_int_attribute(FORECAST_DISTANCE, forecast_distance)?;
    writer.write_string_attribute(SOURCE_FORMAT, Some(source_format))
}

/// Writes the whole network as the document root.
pub fn write_network(network: &Network, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
    ctx.start_node(NETWORK)?;
    write_identity(&network.data, NETWORK, ctx)?;
    write_element_attributes(
        &network.case_date,
        network.forecast_distance,
        &network.source_format,
        ctx,
    )?;
    if network.validation_level == ValidationLevel::Equipment
        && ctx.check_minimum_version(
            NETWORK,
            MINIMUM_VALIDATION_LEVEL,
            ErrorMessage::NotSupported,
            SchemaVersion::V1_7,
        )?
    {
        ctx.writer()
            .write_enum_attribute(MINIMUM_VALIDATION_LEVEL, network.validation_level.as_str())?;
    }
    write_aliases_and_properties(&network.data, NETWORK, ctx)?;

    let outer = ctx.take_exported();
    ctx.add_exported(&network.data.id);
    let scope = write_subnetworks(network, ctx)?;
    write_content(network, scope, ctx)?;
    write_extensions(network, ctx)?;
    ctx.restore_exported(outer);
    ctx.end_node()
}

/// Writes the sub-network elements and returns the scope left for the root.
fn write_subnetworks<'n>(network: &'n Network, ctx: &mut SerializerContext<'_>) -> GritResult<Scope<'n>> {
    if network.subnetworks().is_empty() {
        return Ok(Scope::Root);
    }
    if ctx.version() < SchemaVersion::V1_11 {
        // lenient policy: the content is kept, the boundaries are lost
        ctx.check_minimum_version(NETWORK, SUBNETWORK, ErrorMessage::NotSupported, SchemaVersion::V1_11)?;
        return Ok(Scope::All);
    }
    ctx.group(|ctx| {
        for subnetwork in ctx.ordered(network.subnetworks()) {
            write_subnetwork(network, subnetwork, ctx)?;
        }
        Ok(())
    })?;
    Ok(Scope::Root)
}

fn write_subnetwork(
    network: &Network,
    subnetwork: &Subnetwork,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    ctx.start_node(NETWORK)?;
    write_identity(&subnetwork.data, NETWORK, ctx)?;
    write_element_attributes(
        &subnetwork.case_date,
        subnetwork.forecast_distance,
        &subnetwork.source_format,
        ctx,
    )?;
    write_aliases_and_properties(&subnetwork.data, NETWORK, ctx)?;

    let outer = ctx.take_exported();
    ctx.add_exported(&subnetwork.data.id);
    write_content(network, Scope::Subnetwork(&subnetwork.data.id), ctx)?;
    write_extensions(network, ctx)?;
    ctx.restore_exported(outer);
    ctx.end_node()
}

fn write_content(network: &Network, scope: Scope<'_>, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
    let voltage_levels: Vec<_> = network
        .voltage_levels()
        .iter()
        .filter(|vl| vl.substation.is_none() && scope.contains(vl.subnetwork.as_deref()))
        .collect();
    if !voltage_levels.is_empty() {
        ctx.assert_minimum_version(NETWORK, VOLTAGE_LEVEL, ErrorMessage::NotSupported, SchemaVersion::V1_6)?;
        ctx.group(|ctx| {
            for vl in ctx.ordered(voltage_levels) {
                VoltageLevelSerDe.write(vl, network, ctx)?;
            }
            Ok(())
        })?;
    }

    let substations: Vec<_> = network
        .substations()
        .iter()
        .filter(|s| scope.contains(s.subnetwork.as_deref()))
        .collect();
    if !substations.is_empty() {
        ctx.group(|ctx| {
            for substation in ctx.ordered(substations) {
                SubstationSerDe.write(substation, network, ctx)?;
            }
            Ok(())
        })?;
    }

    let lines: Vec<_> = network
        .lines()
        .iter()
        .filter(|l| scope.contains(l.subnetwork.as_deref()))
        .collect();
    if !lines.is_empty() {
        ctx.group(|ctx| {
            for line in ctx.ordered(lines) {
                LineSerDe.write(line, network, ctx)?;
            }
            Ok(())
        })?;
    }

    let tie_lines: Vec<_> = network
        .tie_lines()
        .iter()
        .filter(|t| scope.contains(t.subnetwork.as_deref()))
        .collect();
    if !tie_lines.is_empty()
        && ctx.check_minimum_version(NETWORK, TIE_LINE, ErrorMessage::NotSupported, SchemaVersion::V1_10)?
    {
        ctx.group(|ctx| {
            for tie_line in ctx.ordered(tie_lines) {
                TieLineSerDe.write(tie_line, network, ctx)?;
            }
            Ok(())
        })?;
    }

    let hvdc_lines: Vec<_> = network
        .hvdc_lines()
        .iter()
        .filter(|h| scope.contains(h.subnetwork.as_deref()))
        .collect();
    if !hvdc_lines.is_empty() {
        ctx.group(|ctx| {
            for hvdc in ctx.ordered(hvdc_lines) {
                HvdcLineSerDe.write(hvdc, network, ctx)?;
            }
            Ok(())
        })?;
    }

    // limits belong to the root network
    let limits = network.voltage_angle_limits();
    if !matches!(scope, Scope::Subnetwork(_))
        && !limits.is_empty()
        && ctx.check_minimum_version(
            NETWORK,
            VOLTAGE_ANGLE_LIMIT,
            ErrorMessage::NotSupported,
            SchemaVersion::V1_11,
        )?
    {
        let mut limits: Vec<_> = limits.iter().collect();
        if ctx.options().sorted {
            limits.sort_by(|a, b| a.id.cmp(&b.id));
        }
        ctx.group(|ctx| {
            for limit in limits {
                write_voltage_angle_limit(limit, ctx)?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Writes one `extension` node per exported object carrying a planned
/// extension.
fn write_extensions(network: &Network, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
    if ctx.plan().is_empty() {
        return Ok(());
    }
    let exported = ctx.take_exported();
    let mut owners: Vec<(&str, Vec<&dyn Extension>)> = Vec::new();
    for id in &exported {
        let Some(identifiable) = network.identifiable(id) else {
            continue;
        };
        let extensions: Vec<&dyn Extension> = identifiable
            .data()
            .extensions()
            .iter()
            .map(|e| e.as_ref())
            .filter(|e| ctx.plan().get(e.name()).is_some())
            .collect();
        if !extensions.is_empty() {
            owners.push((identifiable.id(), extensions));
        }
    }
    if ctx.options().sorted {
        owners.sort_by(|a, b| a.0.cmp(b.0));
    }
    ctx.restore_exported(exported);
    if owners.is_empty() {
        return Ok(());
    }

    ctx.group(|ctx| {
        for (owner, extensions) in owners {
            ctx.start_node(EXTENSION)?;
            ctx.write_id_attribute("id", owner)?;
            for extension in extensions {
                let Some((serde, version)) = ctx.plan().get(extension.name()) else {
                    continue;
                };
                let version = version.clone();
                ctx.writer()
                    .write_start_node(version.namespace_uri, extension.name())?;
                serde.write(extension, &version, ctx)?;
                ctx.writer().write_end_node()?;
            }
            ctx.end_node()?;
        }
        Ok(())
    })
}

// =============================================================================
// Read
// =============================================================================

struct ElementAttributes {
    case_date: DateTime<FixedOffset>,
    forecast_distance: i32,
    source_format: String,
}

fn read_element_attributes(ctx: &mut DeserializerContext<'_>) -> GritResult<ElementAttributes> {
    let reader = ctx.reader();
    let case_date = reader.read_required_string_attribute(CASE_DATE)?;
    let case_date = DateTime::parse_from_rfc3339(&case_date)
        .map_err(|e| GritError::Parse(format!("Invalid {} '{}': {}", CASE_DATE, case_date, e)))?;
    Ok(ElementAttributes {
        case_date,
        forecast_distance: reader.read_int_attribute_or(FORECAST_DISTANCE, 0)?,
        source_format: reader.read_required_string_attribute(SOURCE_FORMAT)?,
    })
}

/// Reads the root network element the reader is positioned on. `valid` is
/// whether the document uses the validated namespace.
pub fn read_network(valid: bool, ctx: &mut DeserializerContext<'_>) -> GritResult<Network> {
    let mut data = IdentifiableData::default();
    read_identity(&mut data, NETWORK, ctx)?;
    let attributes = read_element_attributes(ctx)?;
    let mut network = Network::new(data.id.clone(), attributes.source_format);
    network.data = data;
    network.case_date = attributes.case_date;
    network.forecast_distance = attributes.forecast_distance;

    // equipment-level networks accept objects a validated one rejects, so
    // the level must be known before any child is read
    let level = ctx
        .reader()
        .read_enum_attribute::<ValidationLevel>(MINIMUM_VALIDATION_LEVEL)?;
    match level {
        Some(level) => {
            ctx.assert_minimum_version(
                NETWORK,
                MINIMUM_VALIDATION_LEVEL,
                ErrorMessage::NotSupported,
                SchemaVersion::V1_7,
            )?;
            network.validation_level = level;
        }
        None if !valid => network.validation_level = ValidationLevel::Equipment,
        None => {}
    }

    read_content(&mut network, None, ctx)?;
    debug!(network = %network.data.id, "network structure read");
    Ok(network)
}

fn read_subnetwork(network: &mut Network, ctx: &mut DeserializerContext<'_>) -> GritResult<()> {
    ctx.assert_minimum_version(NETWORK, SUBNETWORK, ErrorMessage::NotSupported, SchemaVersion::V1_11)?;
    let mut data = IdentifiableData::default();
    read_identity(&mut data, NETWORK, ctx)?;
    let attributes = read_element_attributes(ctx)?;
    let mut subnetwork = Subnetwork::new(data.id.clone(), attributes.source_format);
    subnetwork.data = data;
    subnetwork.case_date = attributes.case_date;
    subnetwork.forecast_distance = attributes.forecast_distance;
    let id = subnetwork.data.id.clone();
    network.add_subnetwork(subnetwork)?;
    read_content(network, Some(&id), ctx)
}

fn read_content(
    network: &mut Network,
    subnetwork: Option<&str>,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<()> {
    let owner = subnetwork.unwrap_or(&network.data.id).to_string();
    let container = || match subnetwork {
        Some(id) => Container::subnetwork(id),
        None => Container::root(),
    };
    ctx.read_child_nodes(|ctx, name| match name {
        ALIAS | PROPERTY => read_common_sub_element(name, &owner, NETWORK, network, ctx).map(|_| ()),
        NETWORK => match subnetwork {
            Some(_) => Err(GritError::Validation(
                "Only one level of subnetworks is currently supported.".into(),
            )),
            None => read_subnetwork(network, ctx),
        },
        VOLTAGE_LEVEL => {
            ctx.assert_minimum_version(NETWORK, VOLTAGE_LEVEL, ErrorMessage::NotSupported, SchemaVersion::V1_6)?;
            VoltageLevelSerDe.read(container(), network, ctx)
        }
        SUBSTATION => SubstationSerDe.read(container(), network, ctx),
        LINE => LineSerDe.read(container(), network, ctx),
        TIE_LINE => {
            ctx.assert_minimum_version(NETWORK, TIE_LINE, ErrorMessage::NotSupported, SchemaVersion::V1_10)?;
            TieLineSerDe.read(container(), network, ctx)
        }
        HVDC_LINE => HvdcLineSerDe.read(container(), network, ctx),
        VOLTAGE_ANGLE_LIMIT => {
            ctx.assert_minimum_version(
                NETWORK,
                VOLTAGE_ANGLE_LIMIT,
                ErrorMessage::NotSupported,
                SchemaVersion::V1_11,
            )?;
            read_voltage_angle_limit(ctx)
        }
        EXTENSION => read_extension(network, subnetwork.is_some(), ctx),
        other => Err(crate::context::unknown_element(other, NETWORK)),
    })
}

fn attach(network: &mut Network, owner: &str, extension: Box<dyn Extension>) -> GritResult<()> {
    let identifiable = network.identifiable_mut(owner).ok_or_else(|| {
        GritError::ReferenceResolution(format!(
            "Owner '{}' of extension {} not found",
            owner,
            extension.name()
        ))
    })?;
    identifiable.data_mut().add_extension(extension);
    Ok(())
}

/// Reads one `extension` node. At the root the structure is complete once
/// the before-extension tasks have run, so extensions attach right away;
/// inside a sub-network the owner may still be pending and attachment is
/// queued behind it.
fn read_extension(
    network: &mut Network,
    in_subnetwork: bool,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<()> {
    let owner = ctx.read_id("id")?;
    if !in_subnetwork {
        ctx.end_tasks.execute(network, Phase::BeforeExtensions)?;
    }
    ctx.read_child_nodes(|ctx, name| {
        if ctx.is_ignored(&owner) || !ctx.options().is_extension_selected(name) {
            return Ok(());
        }
        let Some(serde) = ctx.providers().find(name) else {
            ctx.not_found_extensions.insert(name.to_string());
            return Ok(());
        };
        let version = match ctx.extension_version(name) {
            Some(declared) => serde.version(declared).ok_or_else(|| {
                GritError::ExtensionResolution(format!(
                    "Unknown version {} for extension {}",
                    declared, name
                ))
            })?,
            None => serde.best_version(ctx.version()).ok_or_else(|| {
                GritError::ExtensionResolution(format!(
                    "Version {} does not support {} extension",
                    ctx.version(),
                    name
                ))
            })?,
        };
        let extension = serde.read(&owner, version, ctx)?;
        ctx.imported_extensions.insert(name.to_string());
        ctx.diagnostics
            .add_info_with_entity("extension", &format!("Extension {} imported", name), &owner);
        if in_subnetwork {
            let owner = owner.clone();
            ctx.end_tasks
                .add(Phase::BeforeExtensions, move |network| attach(network, &owner, extension));
            Ok(())
        } else {
            attach(network, &owner, extension)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::IdentityAnonymizer;
    use crate::extensions::{ExtensionPlan, DEFAULT_EXTENSIONS};
    use crate::options::{ExportOptions, IncompatibilityBehavior};
    use crate::tree::json::JsonWriter;
    use grit_core::{Bus, Substation, TieLine, DanglingLine, Terminal, VoltageLevel};
    use std::collections::BTreeMap;

    fn tie_line_network() -> Network {
        let mut network = Network::new("N", "test");
        network.add(Container::root(), Substation::new("S1")).unwrap();
        for vl in ["VL1", "VL2"] {
            network
                .add(Container::substation("S1"), VoltageLevel::new(vl, 400.0))
                .unwrap();
            network.add(Container::voltage_level(vl), Bus::new(format!("{}_B", vl))).unwrap();
        }
        network
            .add(Container::voltage_level("VL1"), DanglingLine::new("DL1", Terminal::new("VL1", "VL1_B")))
            .unwrap();
        network
            .add(Container::voltage_level("VL2"), DanglingLine::new("DL2", Terminal::new("VL2", "VL2_B")))
            .unwrap();
        network.add(Container::root(), TieLine::new("TL", "DL1", "DL2")).unwrap();
        network
    }

    fn write(network: &Network, options: &ExportOptions) -> GritResult<(String, usize)> {
        let mut out = Vec::new();
        let mut ctx = SerializerContext::new(
            Box::new(JsonWriter::new(&mut out, false, DEFAULT_EXTENSIONS.array_names()?)),
            Box::new(IdentityAnonymizer),
            options,
            String::new(),
            ExtensionPlan::default(),
        );
        ctx.writer().set_versions(options.version.as_str(), &BTreeMap::new());
        write_network(network, &mut ctx)?;
        let (mut writer, _, diagnostics) = ctx.finish();
        writer.close()?;
        drop(writer);
        Ok((String::from_utf8(out).unwrap(), diagnostics.warning_count()))
    }

    #[test]
    fn test_tie_lines_need_1_10() {
        let network = tie_line_network();
        let (json, warnings) = write(&network, &ExportOptions::default()).unwrap();
        assert!(json.contains("\"tieLines\""));
        assert_eq!(warnings, 0);

        let strict = ExportOptions::default().with_version(SchemaVersion::V1_9);
        let err = write(&network, &strict).unwrap_err();
        assert!(matches!(err, GritError::VersionIncompatibility(_)));

        let lenient = strict.with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
        let (json, warnings) = write(&network, &lenient).unwrap();
        assert!(!json.contains("tieLines"));
        assert!(json.contains("DL1"));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_voltage_level_without_substation_needs_1_6() {
        let mut network = Network::new("N", "test");
        network.add(Container::root(), VoltageLevel::new("VL1", 225.0)).unwrap();
        let lenient = ExportOptions::default()
            .with_version(SchemaVersion::V1_5)
            .with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
        // no lenient path: the voltage level would be lost with its equipment
        assert!(write(&network, &lenient).is_err());
        let (json, _) = write(&network, &ExportOptions::default().with_version(SchemaVersion::V1_6)).unwrap();
        assert!(json.contains("\"voltageLevels\""));
    }

    #[test]
    fn test_subnetworks_flattened_before_1_11() {
        let mut network = Network::new("N", "test");
        network.add_subnetwork(Subnetwork::new("SUB", "test")).unwrap();
        network.add(Container::subnetwork("SUB"), Substation::new("S1")).unwrap();

        let (json, _) = write(&network, &ExportOptions::default()).unwrap();
        assert!(json.contains("\"subnetworks\""));

        let lenient = ExportOptions::default()
            .with_version(SchemaVersion::V1_10)
            .with_version_incompatibility_behavior(IncompatibilityBehavior::LogError);
        let (json, warnings) = write(&network, &lenient).unwrap();
        assert!(!json.contains("subnetworks"));
        assert!(json.contains("\"S1\""));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_equipment_level_attribute() {
        let mut network = Network::new("N", "test");
        network.validation_level = ValidationLevel::Equipment;
        let (json, _) = write(&network, &ExportOptions::default()).unwrap();
        assert!(json.contains(r#""minimumValidationLevel":"EQUIPMENT""#));
        let old = ExportOptions::default().with_version(SchemaVersion::V1_6);
        assert!(write(&network, &old).is_err());
    }
}
