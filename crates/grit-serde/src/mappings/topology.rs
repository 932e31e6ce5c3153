//! Bus-breaker topology of a voltage level: buses and switches.

use grit_core::{Adder, Bus, Container, GritError, GritResult, Network, Switch, SwitchKind, VoltageLevel};
use tracing::warn;

use crate::context::{DeserializerContext, SerializerContext};
use crate::gate::VersionGate;
use crate::options::TopologyLevel;
use crate::template::{IdentifiableSerDe, SimpleIdentifiableSerDe};
use crate::version::SchemaVersion;

pub const BUS_BREAKER_TOPOLOGY: &str = "busBreakerTopology";
const BUS: &str = "bus";
const SWITCH: &str = "switch";

pub struct BusSerDe;

impl IdentifiableSerDe for BusSerDe {
    type Entity = Bus;

    fn root_element_name(&self) -> &'static str {
        BUS
    }

    fn write_root_element_attributes(
        &self,
        bus: &Bus,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.writer().write_double_attribute("v", bus.v)?;
        ctx.writer().write_double_attribute("angle", bus.angle)
    }
}

impl SimpleIdentifiableSerDe for BusSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Bus>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let bus = adder.entity_mut();
        bus.v = ctx.reader().read_double_attribute("v")?;
        bus.angle = ctx.reader().read_double_attribute("angle")?;
        Ok(())
    }
}

pub struct SwitchSerDe;

impl IdentifiableSerDe for SwitchSerDe {
    type Entity = Switch;

    fn root_element_name(&self) -> &'static str {
        SWITCH
    }

    fn is_valid(&self, switch: &Switch, _ctx: &mut SerializerContext<'_>) -> bool {
        !switch.is_self_loop()
    }

    fn write_root_element_attributes(
        &self,
        switch: &Switch,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.writer().write_enum_attribute("kind", switch.kind.as_str())?;
        ctx.writer().write_boolean_attribute("open", switch.open)?;
        ctx.write_id_attribute("bus1", &switch.bus1)?;
        ctx.write_id_attribute("bus2", &switch.bus2)
    }
}

impl SimpleIdentifiableSerDe for SwitchSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Switch>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let kind = ctx
            .reader()
            .read_enum_attribute_or("kind", SwitchKind::default())?;
        let open = ctx.reader().read_boolean_attribute_or("open", false)?;
        let bus1 = ctx.read_id("bus1")?;
        let bus2 = ctx.read_id("bus2")?;
        let switch = adder.entity_mut();
        switch.kind = kind;
        switch.open = open;
        switch.bus1 = bus1;
        switch.bus2 = bus2;
        Ok(())
    }

    fn accept(&self, adder: &Adder<Switch>, ctx: &mut DeserializerContext<'_>) -> GritResult<bool> {
        let switch = adder.entity();
        if !switch.is_self_loop() {
            return Ok(true);
        }
        let message = format!(
            "Switch '{}' has both ends connected to bus '{}'",
            switch.data.id, switch.bus1
        );
        if ctx.version() >= SchemaVersion::V1_8 {
            return Err(GritError::Validation(message));
        }
        warn!("{}, it is ignored", message);
        ctx.diagnostics
            .add_warning_with_entity("import", &message, &switch.data.id);
        Ok(false)
    }
}

/// Writes the `busBreakerTopology` node of a voltage level. In bus-branch
/// export the merged buses replace the modelled ones and no switch is
/// written.
pub fn write_bus_breaker_topology(
    vl: &VoltageLevel,
    network: &Network,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    ctx.start_node(BUS_BREAKER_TOPOLOGY)?;
    match ctx.options().topology_level {
        TopologyLevel::BusBreaker => {
            if !vl.buses().is_empty() {
                ctx.group(|ctx| {
                    for bus in ctx.ordered(vl.buses()) {
                        BusSerDe.write(bus, network, ctx)?;
                    }
                    Ok(())
                })?;
            }
            if !vl.switches().is_empty() {
                ctx.group(|ctx| {
                    for switch in ctx.ordered(vl.switches()) {
                        SwitchSerDe.write(switch, network, ctx)?;
                    }
                    Ok(())
                })?;
            }
        }
        TopologyLevel::BusBranch => {
            let buses = ctx.bus_branch_view(vl).buses().to_vec();
            if !buses.is_empty() {
                ctx.group(|ctx| {
                    for bus in &buses {
                        ctx.start_node(BUS)?;
                        ctx.write_id_attribute("id", &bus.id)?;
                        ctx.writer().write_double_attribute("v", bus.v)?;
                        ctx.writer().write_double_attribute("angle", bus.angle)?;
                        ctx.end_node()?;
                    }
                    Ok(())
                })?;
            }
        }
    }
    ctx.end_node()
}

pub fn read_bus_breaker_topology(
    vl_id: &str,
    network: &mut Network,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<()> {
    ctx.read_child_nodes(|ctx, name| match name {
        BUS => BusSerDe.read(Container::voltage_level(vl_id), network, ctx),
        SWITCH => SwitchSerDe.read(Container::voltage_level(vl_id), network, ctx),
        other => Err(crate::context::unknown_element(other, BUS_BREAKER_TOPOLOGY)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::IdentityAnonymizer;
    use crate::extensions::{ExtensionPlan, DEFAULT_EXTENSIONS};
    use crate::options::{ExportOptions, ImportOptions};
    use crate::tree::json::{JsonReader, JsonWriter};
    use crate::tree::TreeDataReader;
    use std::collections::BTreeMap;

    fn voltage_level() -> Network {
        let mut network = Network::new("N", "test");
        network.validation_level = grit_core::ValidationLevel::Equipment;
        network
            .add(Container::root(), VoltageLevel::new("VL1", 400.0))
            .unwrap();
        for bus in ["B1", "B2", "B3"] {
            network.add(Container::voltage_level("VL1"), Bus::new(bus)).unwrap();
        }
        network
            .add(Container::voltage_level("VL1"), Switch::new("SW1", "B1", "B2"))
            .unwrap();
        network
            .add(Container::voltage_level("VL1"), Switch::new("SW2", "B3", "B3"))
            .unwrap();
        network
    }

    fn write(network: &Network, options: &ExportOptions) -> (String, usize) {
        let names = DEFAULT_EXTENSIONS.array_names().unwrap();
        let mut out = Vec::new();
        let writer = JsonWriter::new(&mut out, false, names);
        let mut ctx = SerializerContext::new(
            Box::new(writer),
            Box::new(IdentityAnonymizer),
            options,
            String::new(),
            ExtensionPlan::default(),
        );
        let vl = network.voltage_level("VL1").unwrap();
        ctx.writer().set_versions("1.16", &BTreeMap::new());
        ctx.start_node("voltageLevel").unwrap();
        write_bus_breaker_topology(vl, network, &mut ctx).unwrap();
        ctx.end_node().unwrap();
        let (mut writer, _, diagnostics) = ctx.finish();
        writer.close().unwrap();
        drop(writer);
        (String::from_utf8(out).unwrap(), diagnostics.warning_count())
    }

    #[test]
    fn test_degenerate_switch_is_skipped_on_write() {
        let (json, warnings) = write(&voltage_level(), &ExportOptions::default());
        assert!(json.contains("SW1"));
        assert!(!json.contains("SW2"));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_bus_branch_topology_merges_buses() {
        let options = ExportOptions::default().with_topology_level(TopologyLevel::BusBranch);
        let (json, _) = write(&voltage_level(), &options);
        assert!(json.contains("VL1_0"));
        assert!(json.contains("VL1_1"));
        assert!(!json.contains("switches"));
    }

    fn read_switch(version: SchemaVersion) -> GritResult<(Network, usize)> {
        let json = r#"{"version":"1.0","switches":[{"id":"SW","kind":"BREAKER","open":false,"bus1":"B1","bus2":"B1"}]}"#;
        let mut reader = JsonReader::new(json.as_bytes(), DEFAULT_EXTENSIONS.array_names()?);
        reader.read_header()?;
        let options = ImportOptions::default();
        let anonymizer = IdentityAnonymizer;
        let mut ctx = DeserializerContext::new(
            Box::new(reader),
            &anonymizer,
            &options,
            &DEFAULT_EXTENSIONS,
            version,
            BTreeMap::new(),
        );
        let mut network = Network::new("N", "test");
        network.add(Container::root(), VoltageLevel::new("VL1", 400.0))?;
        network.add(Container::voltage_level("VL1"), Bus::new("B1"))?;
        read_bus_breaker_topology("VL1", &mut network, &mut ctx)?;
        Ok((network, ctx.diagnostics.warning_count()))
    }

    #[test]
    fn test_degenerate_switch_dropped_before_1_8() {
        let (network, warnings) = read_switch(SchemaVersion::V1_7).unwrap();
        assert!(!network.contains("SW"));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_degenerate_switch_rejected_from_1_8() {
        let err = read_switch(SchemaVersion::V1_8).unwrap_err();
        assert!(matches!(err, GritError::Validation(_)));
    }
}
