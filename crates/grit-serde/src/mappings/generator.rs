//! Generators.
//!
//! A generator is built from its root attributes, then its reactive limits
//! are applied. The regulating terminal may name equipment written later in
//! the document and is resolved once the structure is complete.

use grit_core::{
    Adder, EnergySource, Generator, GritError, GritResult, Network, ReactiveCapabilityPoint,
    ReactiveLimits, Side, TerminalRef,
};

use super::{read_terminal, write_terminal, TerminalAttributes};
use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;
use crate::gate::ErrorMessage;
use crate::template::{ComplexIdentifiableSerDe, IdentifiableSerDe, Mutation};
use crate::version::SchemaVersion;

const GENERATOR: &str = "generator";
const REGULATING_TERMINAL: &str = "regulatingTerminal";
const MIN_MAX_REACTIVE_LIMITS: &str = "minMaxReactiveLimits";
const REACTIVE_CAPABILITY_CURVE: &str = "reactiveCapabilityCurve";
const POINT: &str = "point";

pub struct GeneratorSerDe;

impl GeneratorSerDe {
    fn write_reactive_limits(limits: &ReactiveLimits, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
        match limits {
            ReactiveLimits::MinMax { min_q, max_q } => {
                if *limits == ReactiveLimits::default() {
                    return Ok(());
                }
                ctx.start_node(MIN_MAX_REACTIVE_LIMITS)?;
                ctx.writer().write_double_attribute("minQ", *min_q)?;
                ctx.writer().write_double_attribute("maxQ", *max_q)?;
                ctx.end_node()
            }
            ReactiveLimits::Curve(points) => {
                ctx.start_node(REACTIVE_CAPABILITY_CURVE)?;
                ctx.group(|ctx| {
                    for point in points {
                        ctx.start_node(POINT)?;
                        ctx.writer().write_double_attribute("p", point.p)?;
                        ctx.writer().write_double_attribute("minQ", point.min_q)?;
                        ctx.writer().write_double_attribute("maxQ", point.max_q)?;
                        ctx.end_node()?;
                    }
                    Ok(())
                })?;
                ctx.end_node()
            }
        }
    }

    fn read_curve(ctx: &mut DeserializerContext<'_>) -> GritResult<Vec<ReactiveCapabilityPoint>> {
        let mut points = Vec::new();
        ctx.read_child_nodes(|ctx, name| match name {
            POINT => {
                let reader = ctx.reader();
                points.push(ReactiveCapabilityPoint {
                    p: reader.read_double_attribute("p")?,
                    min_q: reader.read_double_attribute("minQ")?,
                    max_q: reader.read_double_attribute("maxQ")?,
                });
                Ok(())
            }
            other => Err(crate::context::unknown_element(other, REACTIVE_CAPABILITY_CURVE)),
        })?;
        Ok(points)
    }
}

/// Checks and installs reactive limits on a constructed generator.
fn apply_reactive_limits(generator: &mut Generator, limits: ReactiveLimits) -> GritResult<()> {
    match &limits {
        ReactiveLimits::MinMax { min_q, max_q } if min_q > max_q => {
            return Err(GritError::Validation(format!(
                "Generator '{}': minimum Q {} is greater than maximum Q {}",
                generator.data.id, min_q, max_q
            )))
        }
        ReactiveLimits::Curve(points) if points.len() < 2 => {
            return Err(GritError::Validation(format!(
                "Generator '{}': a reactive capability curve needs at least two points",
                generator.data.id
            )))
        }
        _ => {}
    }
    generator.reactive_limits = limits;
    Ok(())
}

impl IdentifiableSerDe for GeneratorSerDe {
    type Entity = Generator;

    fn root_element_name(&self) -> &'static str {
        GENERATOR
    }

    fn write_root_element_attributes(
        &self,
        generator: &Generator,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.writer()
            .write_enum_attribute("energySource", generator.energy_source.as_str())?;
        ctx.writer()
            .write_double_attribute_with_default("minP", generator.min_p, Generator::DEFAULT_MIN_P)?;
        ctx.writer()
            .write_double_attribute_with_default("maxP", generator.max_p, Generator::DEFAULT_MAX_P)?;
        ctx.write_double_attribute_from_minimum_version(
            GENERATOR,
            "ratedS",
            generator.rated_s,
            f64::NAN,
            SchemaVersion::V1_5,
        )?;
        ctx.writer()
            .write_boolean_attribute("voltageRegulatorOn", generator.voltage_regulator_on)?;
        ctx.writer().write_double_attribute("targetP", generator.target_p)?;
        ctx.writer().write_double_attribute("targetV", generator.target_v)?;
        ctx.writer().write_double_attribute("targetQ", generator.target_q)?;
        ctx.write_boolean_attribute_from_minimum_version(
            GENERATOR,
            "isCondenser",
            generator.condenser,
            false,
            SchemaVersion::V1_13,
        )?;
        write_terminal(&generator.terminal, TerminalAttributes::Injection, network, ctx)
    }

    fn write_sub_elements(
        &self,
        generator: &Generator,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        if let Some(terminal) = &generator.regulating_terminal {
            ctx.start_node(REGULATING_TERMINAL)?;
            ctx.write_id_attribute("id", &terminal.id)?;
            if let Some(side) = terminal.side {
                ctx.writer().write_enum_attribute("side", side.as_str())?;
            }
            ctx.end_node()?;
        }
        Self::write_reactive_limits(&generator.reactive_limits, ctx)
    }
}

impl ComplexIdentifiableSerDe for GeneratorSerDe {
    fn entity_mut<'n>(network: &'n mut Network, id: &str) -> Option<&'n mut Generator> {
        network.generator_mut(id)
    }

    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Generator>,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Vec<Mutation<Generator>>> {
        let energy_source = ctx
            .reader()
            .read_enum_attribute_or("energySource", EnergySource::default())?;
        let reader = ctx.reader();
        let min_p = reader.read_double_attribute_or("minP", Generator::DEFAULT_MIN_P)?;
        let max_p = reader.read_double_attribute_or("maxP", Generator::DEFAULT_MAX_P)?;
        let voltage_regulator_on = reader.read_boolean_attribute_or("voltageRegulatorOn", false)?;
        let target_p = reader.read_double_attribute("targetP")?;
        let target_v = reader.read_double_attribute("targetV")?;
        let target_q = reader.read_double_attribute("targetQ")?;

        let rated_s = match ctx.reader().read_double_attribute("ratedS")? {
            v if v.is_nan() => v,
            v => {
                ctx.assert_minimum_version(
                    GENERATOR,
                    "ratedS",
                    ErrorMessage::NotDefaultNotSupported,
                    SchemaVersion::V1_5,
                )?;
                v
            }
        };
        let condenser = match ctx.reader().read_boolean_attribute("isCondenser")? {
            Some(condenser) => {
                ctx.assert_minimum_version(
                    GENERATOR,
                    "isCondenser",
                    ErrorMessage::NotDefaultNotSupported,
                    SchemaVersion::V1_13,
                )?;
                condenser
            }
            None => false,
        };
        let terminal = read_terminal(TerminalAttributes::Injection, ctx)?;

        let generator = adder.entity_mut();
        generator.energy_source = energy_source;
        generator.min_p = min_p;
        generator.max_p = max_p;
        generator.rated_s = rated_s;
        generator.voltage_regulator_on = voltage_regulator_on;
        generator.target_p = target_p;
        generator.target_v = target_v;
        generator.target_q = target_q;
        generator.condenser = condenser;
        generator.terminal = terminal;
        Ok(Vec::new())
    }

    fn read_sub_element(
        &self,
        name: &str,
        adder: &mut Adder<Generator>,
        mutations: &mut Vec<Mutation<Generator>>,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        match name {
            REGULATING_TERMINAL => {
                let id = ctx.read_id("id")?;
                let side = ctx.reader().read_enum_attribute::<Side>("side")?;
                let generator_id = adder.entity().data.id.clone();
                let reference = TerminalRef { id, side };
                ctx.end_tasks.add(Phase::BeforeExtensions, move |network| {
                    network.set_regulating_terminal(&generator_id, Some(reference))
                });
                Ok(())
            }
            MIN_MAX_REACTIVE_LIMITS => {
                let reader = ctx.reader();
                let limits = ReactiveLimits::MinMax {
                    min_q: reader.read_double_attribute_or("minQ", -f64::MAX)?,
                    max_q: reader.read_double_attribute_or("maxQ", f64::MAX)?,
                };
                mutations.push(Box::new(move |generator: &mut Generator| {
                    apply_reactive_limits(generator, limits)
                }));
                Ok(())
            }
            REACTIVE_CAPABILITY_CURVE => {
                let points = Self::read_curve(ctx)?;
                mutations.push(Box::new(move |generator: &mut Generator| {
                    apply_reactive_limits(generator, ReactiveLimits::Curve(points))
                }));
                Ok(())
            }
            other => Err(crate::context::unknown_element(other, GENERATOR)),
        }
    }
}
