use grit_core::{Adder, Container, GritError, GritResult, Identifiable, Network, VoltageLevel};

use super::generator::GeneratorSerDe;
use super::injections::{DanglingLineSerDe, LoadSerDe, VscConverterStationSerDe};
use super::topology::{read_bus_breaker_topology, write_bus_breaker_topology, BUS_BREAKER_TOPOLOGY};
use crate::context::{DeserializerContext, SerializerContext};
use crate::template::{ComplexIdentifiableSerDe, IdentifiableSerDe, SimpleIdentifiableSerDe};

pub const VOLTAGE_LEVEL: &str = "voltageLevel";
const BUS_BREAKER: &str = "BUS_BREAKER";

pub struct VoltageLevelSerDe;

impl VoltageLevelSerDe {
    fn write_group<'e, T, F>(
        items: &'e [T],
        ctx: &mut SerializerContext<'_>,
        mut write: F,
    ) -> GritResult<()>
    where
        T: Identifiable,
        F: FnMut(&'e T, &mut SerializerContext<'_>) -> GritResult<()>,
    {
        if items.is_empty() {
            return Ok(());
        }
        ctx.group(|ctx| {
            for item in ctx.ordered(items) {
                write(item, ctx)?;
            }
            Ok(())
        })
    }
}

impl IdentifiableSerDe for VoltageLevelSerDe {
    type Entity = VoltageLevel;

    fn root_element_name(&self) -> &'static str {
        VOLTAGE_LEVEL
    }

    fn write_root_element_attributes(
        &self,
        vl: &VoltageLevel,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_double_attribute("nominalV", vl.nominal_v)?;
        writer.write_double_attribute("lowVoltageLimit", vl.low_voltage_limit)?;
        writer.write_double_attribute("highVoltageLimit", vl.high_voltage_limit)?;
        writer.write_enum_attribute("topologyKind", BUS_BREAKER)
    }

    fn write_sub_elements(
        &self,
        vl: &VoltageLevel,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        write_bus_breaker_topology(vl, network, ctx)?;
        Self::write_group(vl.generators(), ctx, |g, ctx| GeneratorSerDe.write(g, network, ctx))?;
        Self::write_group(vl.loads(), ctx, |l, ctx| LoadSerDe.write(l, network, ctx))?;
        Self::write_group(vl.dangling_lines(), ctx, |dl, ctx| {
            DanglingLineSerDe.write(dl, network, ctx)
        })?;
        Self::write_group(vl.vsc_converter_stations(), ctx, |s, ctx| {
            VscConverterStationSerDe.write(s, network, ctx)
        })
    }
}

impl SimpleIdentifiableSerDe for VoltageLevelSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<VoltageLevel>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let reader = ctx.reader();
        let topology_kind = reader.read_required_string_attribute("topologyKind")?;
        if topology_kind != BUS_BREAKER {
            return Err(GritError::Validation(format!(
                "Voltage level '{}': topology kind {} is not supported",
                adder.entity().data.id,
                topology_kind
            )));
        }
        let vl = adder.entity_mut();
        vl.nominal_v = reader.read_double_attribute("nominalV")?;
        vl.low_voltage_limit = reader.read_double_attribute("lowVoltageLimit")?;
        vl.high_voltage_limit = reader.read_double_attribute("highVoltageLimit")?;
        Ok(())
    }

    fn read_sub_element(
        &self,
        name: &str,
        id: &str,
        network: &mut Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let container = Container::voltage_level(id);
        match name {
            BUS_BREAKER_TOPOLOGY => read_bus_breaker_topology(id, network, ctx),
            "generator" => GeneratorSerDe.read(container, network, ctx),
            "load" => LoadSerDe.read(container, network, ctx),
            "danglingLine" => DanglingLineSerDe.read(container, network, ctx),
            "vscConverterStation" => VscConverterStationSerDe.read(container, network, ctx),
            other => Err(crate::context::unknown_element(other, VOLTAGE_LEVEL)),
        }
    }
}
