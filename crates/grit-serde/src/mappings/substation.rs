use grit_core::{Adder, Container, GritResult, Network, Substation};

use super::branches::{TwoWindingsTransformerSerDe, TWO_WINDINGS_TRANSFORMER};
use super::overload_management_system::{OverloadManagementSystemSerDe, OVERLOAD_MANAGEMENT_SYSTEM};
use super::voltage_level::{VoltageLevelSerDe, VOLTAGE_LEVEL};
use crate::context::{DeserializerContext, SerializerContext};
use crate::gate::ErrorMessage;
use crate::template::{ComplexIdentifiableSerDe, IdentifiableSerDe, SimpleIdentifiableSerDe};
use crate::version::SchemaVersion;

pub const SUBSTATION: &str = "substation";
const GEOGRAPHICAL_TAGS: &str = "geographicalTags";

pub struct SubstationSerDe;

impl IdentifiableSerDe for SubstationSerDe {
    type Entity = Substation;

    fn root_element_name(&self) -> &'static str {
        SUBSTATION
    }

    fn write_root_element_attributes(
        &self,
        substation: &Substation,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.write_optional_id_attribute("country", substation.country.as_deref())?;
        ctx.write_optional_id_attribute("tso", substation.tso.as_deref())?;
        let tags: Vec<String> = substation
            .geographical_tags
            .iter()
            .map(|tag| ctx.anonymize(tag))
            .collect();
        ctx.writer().write_string_array_attribute(GEOGRAPHICAL_TAGS, &tags)
    }

    fn write_sub_elements(
        &self,
        substation: &Substation,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let voltage_levels: Vec<_> = network.voltage_levels_of(&substation.data.id).collect();
        if !voltage_levels.is_empty() {
            ctx.group(|ctx| {
                for vl in ctx.ordered(voltage_levels) {
                    VoltageLevelSerDe.write(vl, network, ctx)?;
                }
                Ok(())
            })?;
        }
        if !substation.two_windings_transformers().is_empty() {
            ctx.group(|ctx| {
                for twt in ctx.ordered(substation.two_windings_transformers()) {
                    TwoWindingsTransformerSerDe.write(twt, network, ctx)?;
                }
                Ok(())
            })?;
        }
        let systems = substation.overload_management_systems();
        if systems.is_empty() || !ctx.options().with_automation_systems {
            return Ok(());
        }
        if !ctx.check_minimum_version(
            SUBSTATION,
            OVERLOAD_MANAGEMENT_SYSTEM,
            ErrorMessage::NotSupported,
            SchemaVersion::V1_12,
        )? {
            return Ok(());
        }
        ctx.group(|ctx| {
            for system in ctx.ordered(systems) {
                OverloadManagementSystemSerDe.write(system, network, ctx)?;
            }
            Ok(())
        })
    }
}

impl SimpleIdentifiableSerDe for SubstationSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Substation>,
        _network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let country = ctx.read_optional_id("country");
        let tso = ctx.read_optional_id("tso");
        let tokens = ctx.reader().read_string_array_attribute(GEOGRAPHICAL_TAGS);
        let tags: Vec<String> = tokens.iter().map(|tag| ctx.deanonymize(tag)).collect();
        let substation = adder.entity_mut();
        substation.country = country;
        substation.tso = tso;
        substation.geographical_tags = tags;
        Ok(())
    }

    fn read_sub_element(
        &self,
        name: &str,
        id: &str,
        network: &mut Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        match name {
            VOLTAGE_LEVEL => VoltageLevelSerDe.read(Container::substation(id), network, ctx),
            TWO_WINDINGS_TRANSFORMER => {
                TwoWindingsTransformerSerDe.read(Container::substation(id), network, ctx)
            }
            OVERLOAD_MANAGEMENT_SYSTEM => {
                ctx.assert_minimum_version(
                    SUBSTATION,
                    OVERLOAD_MANAGEMENT_SYSTEM,
                    ErrorMessage::NotSupported,
                    SchemaVersion::V1_12,
                )?;
                OverloadManagementSystemSerDe.read(Container::substation(id), network, ctx)
            }
            other => Err(crate::context::unknown_element(other, SUBSTATION)),
        }
    }
}
