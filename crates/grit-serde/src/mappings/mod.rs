//! Per-entity mappings onto the document tree.
//!
//! Each identifiable kind has a unit struct implementing
//! [`IdentifiableSerDe`](crate::template::IdentifiableSerDe) and one of the
//! read strategies. The network element itself (root or sub-network) is
//! handled by [`network`].

pub mod branches;
pub mod generator;
pub mod injections;
pub mod network;
pub mod overload_management_system;
pub mod substation;
pub mod topology;
pub mod voltage_angle_limit;
pub mod voltage_level;

use grit_core::{GritError, GritResult, Identifiable, IdentifiableKind, Network, Terminal};

use crate::context::{DeserializerContext, SerializerContext};
use crate::options::{ExportOptions, TopologyLevel};
use crate::version::SchemaVersion;

/// Prefix of the network namespace in markup documents.
pub const NETWORK_PREFIX: &str = "grit";

/// Repeated node names of the network schema and their group names.
pub const ARRAY_NAMES: &[(&str, &str)] = &[
    ("network", "subnetworks"),
    ("substation", "substations"),
    ("voltageLevel", "voltageLevels"),
    ("bus", "buses"),
    ("switch", "switches"),
    ("generator", "generators"),
    ("load", "loads"),
    ("danglingLine", "danglingLines"),
    ("vscConverterStation", "vscConverterStations"),
    ("line", "lines"),
    ("twoWindingsTransformer", "twoWindingsTransformers"),
    ("tieLine", "tieLines"),
    ("hvdcLine", "hvdcLines"),
    ("overloadManagementSystem", "overloadManagementSystems"),
    ("voltageAngleLimit", "voltageAngleLimits"),
    ("alias", "aliases"),
    ("property", "properties"),
    ("extension", "extensions"),
    ("point", "points"),
    ("branchTripping", "branchTrippings"),
    ("switchTripping", "switchTrippings"),
];

/// How a terminal is addressed in its owner's attributes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum TerminalAttributes {
    /// Single-terminal equipment inside its voltage level.
    Injection,
    /// One side of a branch; the voltage level is written too.
    Side(u8),
}

impl TerminalAttributes {
    fn suffix(self) -> String {
        match self {
            TerminalAttributes::Injection => String::new(),
            TerminalAttributes::Side(side) => side.to_string(),
        }
    }
}

/// Whether an export with `options` writes `identifiable` as an element of
/// its own, which is what makes its extensions eligible. Mirrors the skips
/// of the write path: vetoed switches, bus-breaker objects in bus-branch
/// export and kinds the target version cannot carry.
pub(crate) fn is_exported(
    identifiable: &dyn Identifiable,
    network: &Network,
    options: &ExportOptions,
) -> bool {
    let bus_breaker = options.topology_level == TopologyLevel::BusBreaker;
    match identifiable.kind() {
        IdentifiableKind::Bus => bus_breaker,
        IdentifiableKind::Switch => {
            bus_breaker
                && network
                    .switch(identifiable.id())
                    .is_some_and(|switch| !switch.is_self_loop())
        }
        IdentifiableKind::Subnetwork => options.version >= SchemaVersion::V1_11,
        IdentifiableKind::TieLine => options.version >= SchemaVersion::V1_10,
        IdentifiableKind::OverloadManagementSystem => {
            options.with_automation_systems && options.version >= SchemaVersion::V1_12
        }
        _ => true,
    }
}

/// Bus a terminal is written against: the bus-breaker bus, or its merged
/// bus in bus-branch export.
fn exported_bus(
    terminal: &Terminal,
    bus: &str,
    network: &Network,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<String> {
    match ctx.options().topology_level {
        TopologyLevel::BusBreaker => Ok(bus.to_string()),
        TopologyLevel::BusBranch => {
            let vl = network.voltage_level(&terminal.voltage_level).ok_or_else(|| {
                GritError::ReferenceResolution(format!(
                    "Voltage level '{}' not found",
                    terminal.voltage_level
                ))
            })?;
            ctx.merged_bus_id(vl, bus)
        }
    }
}

pub(crate) fn write_terminal(
    terminal: &Terminal,
    attributes: TerminalAttributes,
    network: &Network,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    let suffix = attributes.suffix();
    if let TerminalAttributes::Side(_) = attributes {
        ctx.write_id_attribute(&format!("voltageLevelId{}", suffix), &terminal.voltage_level)?;
    }
    let connectable = exported_bus(terminal, &terminal.connectable_bus, network, ctx)?;
    if terminal.connected {
        ctx.write_id_attribute(&format!("bus{}", suffix), &connectable)?;
    }
    ctx.write_id_attribute(&format!("connectableBus{}", suffix), &connectable)?;
    ctx.writer().write_double_attribute(&format!("p{}", suffix), terminal.p)?;
    ctx.writer().write_double_attribute(&format!("q{}", suffix), terminal.q)
}

pub(crate) fn read_terminal(
    attributes: TerminalAttributes,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<Terminal> {
    let suffix = attributes.suffix();
    let voltage_level = match attributes {
        TerminalAttributes::Injection => String::new(),
        TerminalAttributes::Side(_) => ctx.read_id(&format!("voltageLevelId{}", suffix))?,
    };
    let bus = ctx.read_optional_id(&format!("bus{}", suffix));
    let connectable_bus = match ctx.read_optional_id(&format!("connectableBus{}", suffix)) {
        Some(connectable) => connectable,
        None => bus.clone().ok_or_else(|| {
            GritError::Structural(format!(
                "Attribute 'connectableBus{}' or 'bus{}' is required",
                suffix, suffix
            ))
        })?,
    };
    let mut terminal = Terminal::new(voltage_level, connectable_bus);
    terminal.connected = bus.is_some();
    terminal.p = ctx.reader().read_double_attribute(&format!("p{}", suffix))?;
    terminal.q = ctx.reader().read_double_attribute(&format!("q{}", suffix))?;
    Ok(terminal)
}
