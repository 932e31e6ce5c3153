//! Lines, transformers, tie lines and HVDC lines.

use grit_core::{
    Adder, ConvertersMode, GritResult, HvdcLine, Line, Network, TieLine, TwoWindingsTransformer,
};

use super::{read_terminal, write_terminal, TerminalAttributes};
use crate::context::{DeserializerContext, SerializerContext};
use crate::gate::ErrorMessage;
use crate::template::{IdentifiableSerDe, SimpleIdentifiableSerDe};
use crate::version::SchemaVersion;

pub const LINE: &str = "line";
pub const TWO_WINDINGS_TRANSFORMER: &str = "twoWindingsTransformer";
pub const TIE_LINE: &str = "tieLine";
pub const HVDC_LINE: &str = "hvdcLine";

pub struct LineSerDe;

impl IdentifiableSerDe for LineSerDe {
    type Entity = Line;

    fn root_element_name(&self) -> &'static str {
        LINE
    }

    fn write_root_element_attributes(
        &self,
        line: &Line,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_double_attribute("r", line.r)?;
        writer.write_double_attribute("x", line.x)?;
        writer.write_double_attribute("g1", line.g1)?;
        writer.write_double_attribute("b1", line.b1)?;
        writer.write_double_attribute("g2", line.g2)?;
        writer.write_double_attribute("b2", line.b2)?;
        write_terminal(&line.terminal1, TerminalAttributes::Side(1), network, ctx)?;
        write_terminal(&line.terminal2, TerminalAttributes::Side(2), network, ctx)
    }
}

impl SimpleIdentifiableSerDe for LineSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Line>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let reader = ctx.reader();
        let r = reader.read_double_attribute_or("r", 0.0)?;
        let x = reader.read_double_attribute_or("x", 0.0)?;
        let g1 = reader.read_double_attribute_or("g1", 0.0)?;
        let b1 = reader.read_double_attribute_or("b1", 0.0)?;
        let g2 = reader.read_double_attribute_or("g2", 0.0)?;
        let b2 = reader.read_double_attribute_or("b2", 0.0)?;
        let terminal1 = read_terminal(TerminalAttributes::Side(1), ctx)?;
        let terminal2 = read_terminal(TerminalAttributes::Side(2), ctx)?;

        let line = adder.entity_mut();
        line.r = r;
        line.x = x;
        line.g1 = g1;
        line.b1 = b1;
        line.g2 = g2;
        line.b2 = b2;
        line.terminal1 = terminal1;
        line.terminal2 = terminal2;
        Ok(())
    }
}

pub struct TwoWindingsTransformerSerDe;

impl IdentifiableSerDe for TwoWindingsTransformerSerDe {
    type Entity = TwoWindingsTransformer;

    fn root_element_name(&self) -> &'static str {
        TWO_WINDINGS_TRANSFORMER
    }

    fn write_root_element_attributes(
        &self,
        twt: &TwoWindingsTransformer,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_double_attribute("r", twt.r)?;
        writer.write_double_attribute("x", twt.x)?;
        writer.write_double_attribute("g", twt.g)?;
        writer.write_double_attribute("b", twt.b)?;
        writer.write_double_attribute("ratedU1", twt.rated_u1)?;
        writer.write_double_attribute("ratedU2", twt.rated_u2)?;
        ctx.write_double_attribute_from_minimum_version(
            TWO_WINDINGS_TRANSFORMER,
            "ratedS",
            twt.rated_s,
            f64::NAN,
            SchemaVersion::V1_2,
        )?;
        write_terminal(&twt.terminal1, TerminalAttributes::Side(1), network, ctx)?;
        write_terminal(&twt.terminal2, TerminalAttributes::Side(2), network, ctx)
    }
}

impl SimpleIdentifiableSerDe for TwoWindingsTransformerSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<TwoWindingsTransformer>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let reader = ctx.reader();
        let r = reader.read_double_attribute_or("r", 0.0)?;
        let x = reader.read_double_attribute_or("x", 0.0)?;
        let g = reader.read_double_attribute_or("g", 0.0)?;
        let b = reader.read_double_attribute_or("b", 0.0)?;
        let rated_u1 = reader.read_double_attribute("ratedU1")?;
        let rated_u2 = reader.read_double_attribute("ratedU2")?;
        let rated_s = reader.read_double_attribute("ratedS")?;
        if !rated_s.is_nan() {
            ctx.assert_minimum_version(
                TWO_WINDINGS_TRANSFORMER,
                "ratedS",
                ErrorMessage::NotDefaultNotSupported,
                SchemaVersion::V1_2,
            )?;
        }
        let terminal1 = read_terminal(TerminalAttributes::Side(1), ctx)?;
        let terminal2 = read_terminal(TerminalAttributes::Side(2), ctx)?;

        let twt = adder.entity_mut();
        twt.r = r;
        twt.x = x;
        twt.g = g;
        twt.b = b;
        twt.rated_u1 = rated_u1;
        twt.rated_u2 = rated_u2;
        twt.rated_s = rated_s;
        twt.terminal1 = terminal1;
        twt.terminal2 = terminal2;
        Ok(())
    }
}

pub struct TieLineSerDe;

impl IdentifiableSerDe for TieLineSerDe {
    type Entity = TieLine;

    fn root_element_name(&self) -> &'static str {
        TIE_LINE
    }

    fn write_root_element_attributes(
        &self,
        tie_line: &TieLine,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.write_id_attribute("danglingLineId1", &tie_line.dangling_line1)?;
        ctx.write_id_attribute("danglingLineId2", &tie_line.dangling_line2)
    }
}

impl SimpleIdentifiableSerDe for TieLineSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<TieLine>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let dangling_line1 = ctx.read_id("danglingLineId1")?;
        let dangling_line2 = ctx.read_id("danglingLineId2")?;
        let tie_line = adder.entity_mut();
        tie_line.dangling_line1 = dangling_line1;
        tie_line.dangling_line2 = dangling_line2;
        Ok(())
    }
}

pub struct HvdcLineSerDe;

impl IdentifiableSerDe for HvdcLineSerDe {
    type Entity = HvdcLine;

    fn root_element_name(&self) -> &'static str {
        HVDC_LINE
    }

    fn write_root_element_attributes(
        &self,
        hvdc: &HvdcLine,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let writer = ctx.writer();
        writer.write_double_attribute("r", hvdc.r)?;
        writer.write_double_attribute("nominalV", hvdc.nominal_v)?;
        writer.write_enum_attribute("convertersMode", hvdc.converters_mode.as_str())?;
        writer.write_double_attribute("activePowerSetpoint", hvdc.active_power_setpoint)?;
        writer.write_double_attribute("maxP", hvdc.max_p)?;
        ctx.write_id_attribute("converterStation1", &hvdc.converter_station1)?;
        ctx.write_id_attribute("converterStation2", &hvdc.converter_station2)
    }
}

impl SimpleIdentifiableSerDe for HvdcLineSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<HvdcLine>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let converters_mode = ctx
            .reader()
            .read_enum_attribute_or("convertersMode", ConvertersMode::default())?;
        let reader = ctx.reader();
        let r = reader.read_double_attribute_or("r", 0.0)?;
        let nominal_v = reader.read_double_attribute("nominalV")?;
        let active_power_setpoint = reader.read_double_attribute_or("activePowerSetpoint", 0.0)?;
        let max_p = reader.read_double_attribute("maxP")?;
        let converter_station1 = ctx.read_id("converterStation1")?;
        let converter_station2 = ctx.read_id("converterStation2")?;

        let hvdc = adder.entity_mut();
        hvdc.r = r;
        hvdc.nominal_v = nominal_v;
        hvdc.converters_mode = converters_mode;
        hvdc.active_power_setpoint = active_power_setpoint;
        hvdc.max_p = max_p;
        hvdc.converter_station1 = converter_station1;
        hvdc.converter_station2 = converter_station2;
        Ok(())
    }
}
