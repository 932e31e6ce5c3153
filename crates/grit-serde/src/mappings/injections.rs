//! Single-terminal equipment built from root attributes alone.

use grit_core::{Adder, DanglingLine, GritResult, Load, LoadType, Network, VscConverterStation};

use super::{read_terminal, write_terminal, TerminalAttributes};
use crate::context::{DeserializerContext, SerializerContext};
use crate::gate::VersionGate;
use crate::template::{IdentifiableSerDe, SimpleIdentifiableSerDe};
use crate::version::SchemaVersion;

const UCTE_XNODE_CODE: &str = "ucteXnodeCode";
const PAIRING_KEY: &str = "pairingKey";

pub struct LoadSerDe;

impl IdentifiableSerDe for LoadSerDe {
    type Entity = Load;

    fn root_element_name(&self) -> &'static str {
        "load"
    }

    fn write_root_element_attributes(
        &self,
        load: &Load,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.writer().write_enum_attribute("loadType", load.load_type.as_str())?;
        ctx.writer().write_double_attribute("p0", load.p0)?;
        ctx.writer().write_double_attribute("q0", load.q0)?;
        write_terminal(&load.terminal, TerminalAttributes::Injection, network, ctx)
    }
}

impl SimpleIdentifiableSerDe for LoadSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Load>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let load_type = ctx
            .reader()
            .read_enum_attribute_or("loadType", LoadType::default())?;
        let p0 = ctx.reader().read_double_attribute("p0")?;
        let q0 = ctx.reader().read_double_attribute("q0")?;
        let terminal = read_terminal(TerminalAttributes::Injection, ctx)?;
        let load = adder.entity_mut();
        load.load_type = load_type;
        load.p0 = p0;
        load.q0 = q0;
        load.terminal = terminal;
        Ok(())
    }
}

pub struct DanglingLineSerDe;

impl IdentifiableSerDe for DanglingLineSerDe {
    type Entity = DanglingLine;

    fn root_element_name(&self) -> &'static str {
        "danglingLine"
    }

    fn write_root_element_attributes(
        &self,
        dl: &DanglingLine,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_double_attribute("p0", dl.p0)?;
        writer.write_double_attribute("q0", dl.q0)?;
        writer.write_double_attribute("r", dl.r)?;
        writer.write_double_attribute("x", dl.x)?;
        writer.write_double_attribute("g", dl.g)?;
        writer.write_double_attribute("b", dl.b)?;
        if let Some(key) = dl.pairing_key.as_deref() {
            ctx.run_until_maximum_version(SchemaVersion::V1_10, |ctx| {
                ctx.writer().write_string_attribute(UCTE_XNODE_CODE, Some(key))
            })?;
            ctx.run_from_minimum_version(SchemaVersion::V1_11, |ctx| {
                ctx.writer().write_string_attribute(PAIRING_KEY, Some(key))
            })?;
        }
        write_terminal(&dl.terminal, TerminalAttributes::Injection, network, ctx)
    }
}

impl SimpleIdentifiableSerDe for DanglingLineSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<DanglingLine>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let reader = ctx.reader();
        let p0 = reader.read_double_attribute("p0")?;
        let q0 = reader.read_double_attribute("q0")?;
        let r = reader.read_double_attribute_or("r", 0.0)?;
        let x = reader.read_double_attribute_or("x", 0.0)?;
        let g = reader.read_double_attribute_or("g", 0.0)?;
        let b = reader.read_double_attribute_or("b", 0.0)?;
        let mut pairing_key = None;
        ctx.run_until_maximum_version(SchemaVersion::V1_10, |ctx| {
            pairing_key = ctx.reader().read_string_attribute(UCTE_XNODE_CODE);
            Ok(())
        })?;
        ctx.run_from_minimum_version(SchemaVersion::V1_11, |ctx| {
            pairing_key = ctx.reader().read_string_attribute(PAIRING_KEY);
            Ok(())
        })?;
        let terminal = read_terminal(TerminalAttributes::Injection, ctx)?;

        let dl = adder.entity_mut();
        dl.p0 = p0;
        dl.q0 = q0;
        dl.r = r;
        dl.x = x;
        dl.g = g;
        dl.b = b;
        dl.pairing_key = pairing_key;
        dl.terminal = terminal;
        Ok(())
    }
}

pub struct VscConverterStationSerDe;

impl IdentifiableSerDe for VscConverterStationSerDe {
    type Entity = VscConverterStation;

    fn root_element_name(&self) -> &'static str {
        "vscConverterStation"
    }

    fn write_root_element_attributes(
        &self,
        station: &VscConverterStation,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_boolean_attribute("voltageRegulatorOn", station.voltage_regulator_on)?;
        writer.write_double_attribute("lossFactor", station.loss_factor)?;
        writer.write_double_attribute("voltageSetpoint", station.voltage_setpoint)?;
        writer.write_double_attribute("reactivePowerSetpoint", station.reactive_power_setpoint)?;
        write_terminal(&station.terminal, TerminalAttributes::Injection, network, ctx)
    }
}

impl SimpleIdentifiableSerDe for VscConverterStationSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<VscConverterStation>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let reader = ctx.reader();
        let voltage_regulator_on = reader.read_boolean_attribute_or("voltageRegulatorOn", false)?;
        let loss_factor = reader.read_double_attribute_or("lossFactor", 0.0)?;
        let voltage_setpoint = reader.read_double_attribute("voltageSetpoint")?;
        let reactive_power_setpoint = reader.read_double_attribute("reactivePowerSetpoint")?;
        let terminal = read_terminal(TerminalAttributes::Injection, ctx)?;

        let station = adder.entity_mut();
        station.voltage_regulator_on = voltage_regulator_on;
        station.loss_factor = loss_factor;
        station.voltage_setpoint = voltage_setpoint;
        station.reactive_power_setpoint = reactive_power_setpoint;
        station.terminal = terminal;
        Ok(())
    }
}
