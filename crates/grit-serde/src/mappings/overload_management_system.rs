//! Overload management systems.
//!
//! A system monitors a branch and trips branches or switches when its
//! current limit is crossed. Lines are written after the substations that
//! own the systems, so construction is postponed until the whole structure
//! has been read.

use grit_core::{
    Adder, GritResult, Network, OverloadManagementSystem, Side, Tripping, TrippingTarget,
};

use crate::context::{DeserializerContext, SerializerContext};
use crate::template::{ComplexIdentifiableSerDe, IdentifiableSerDe, Mutation};

pub const OVERLOAD_MANAGEMENT_SYSTEM: &str = "overloadManagementSystem";
const BRANCH_TRIPPING: &str = "branchTripping";
const SWITCH_TRIPPING: &str = "switchTripping";

pub struct OverloadManagementSystemSerDe;

impl OverloadManagementSystemSerDe {
    fn write_tripping_common(tripping: &Tripping, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
        ctx.writer().write_string_attribute("key", Some(&tripping.key))?;
        ctx.write_optional_id_attribute("name", tripping.name.as_deref())?;
        ctx.writer().write_double_attribute("currentLimit", tripping.current_limit)?;
        ctx.writer().write_boolean_attribute("openAction", tripping.open_action)
    }

    fn write_trippings(
        system: &OverloadManagementSystem,
        node: &str,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let trippings: Vec<&Tripping> = system
            .trippings
            .iter()
            .filter(|t| match t.target {
                TrippingTarget::Branch { .. } => node == BRANCH_TRIPPING,
                TrippingTarget::Switch { .. } => node == SWITCH_TRIPPING,
            })
            .collect();
        if trippings.is_empty() {
            return Ok(());
        }
        ctx.group(|ctx| {
            for tripping in trippings {
                ctx.start_node(node)?;
                Self::write_tripping_common(tripping, ctx)?;
                match &tripping.target {
                    TrippingTarget::Branch { branch_id, side } => {
                        ctx.write_id_attribute("branchToOperateId", branch_id)?;
                        ctx.writer().write_enum_attribute("side", side.as_str())?;
                    }
                    TrippingTarget::Switch { switch_id } => {
                        ctx.write_id_attribute("switchToOperateId", switch_id)?;
                    }
                }
                ctx.end_node()?;
            }
            Ok(())
        })
    }

    fn read_tripping(target: TrippingTarget, ctx: &mut DeserializerContext<'_>) -> GritResult<Tripping> {
        let reader = ctx.reader();
        let key = reader.read_required_string_attribute("key")?;
        let current_limit = reader.read_double_attribute("currentLimit")?;
        let open_action = reader.read_boolean_attribute_or("openAction", true)?;
        Ok(Tripping {
            key,
            name: ctx.read_optional_id("name"),
            current_limit,
            open_action,
            target,
        })
    }
}

impl IdentifiableSerDe for OverloadManagementSystemSerDe {
    type Entity = OverloadManagementSystem;

    fn root_element_name(&self) -> &'static str {
        OVERLOAD_MANAGEMENT_SYSTEM
    }

    fn write_root_element_attributes(
        &self,
        system: &OverloadManagementSystem,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        ctx.writer().write_boolean_attribute("enabled", system.enabled)?;
        ctx.write_id_attribute("monitoredElementId", &system.monitored_element_id)?;
        ctx.writer()
            .write_enum_attribute("side", system.monitored_side.as_str())
    }

    fn write_sub_elements(
        &self,
        system: &OverloadManagementSystem,
        _network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        Self::write_trippings(system, BRANCH_TRIPPING, ctx)?;
        Self::write_trippings(system, SWITCH_TRIPPING, ctx)
    }
}

impl ComplexIdentifiableSerDe for OverloadManagementSystemSerDe {
    const POSTPONED: bool = true;

    fn entity_mut<'n>(network: &'n mut Network, id: &str) -> Option<&'n mut OverloadManagementSystem> {
        network.overload_management_system_mut(id)
    }

    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<OverloadManagementSystem>,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Vec<Mutation<OverloadManagementSystem>>> {
        let enabled = ctx.reader().read_boolean_attribute_or("enabled", true)?;
        let monitored_element_id = ctx.read_id("monitoredElementId")?;
        let side = ctx.reader().read_enum_attribute_or("side", Side::One)?;
        let system = adder.entity_mut();
        system.enabled = enabled;
        system.monitored_element_id = monitored_element_id;
        system.monitored_side = side;
        Ok(Vec::new())
    }

    fn read_sub_element(
        &self,
        name: &str,
        adder: &mut Adder<OverloadManagementSystem>,
        _mutations: &mut Vec<Mutation<OverloadManagementSystem>>,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let target = match name {
            BRANCH_TRIPPING => TrippingTarget::Branch {
                branch_id: ctx.read_id("branchToOperateId")?,
                side: ctx.reader().read_enum_attribute_or("side", Side::One)?,
            },
            SWITCH_TRIPPING => TrippingTarget::Switch {
                switch_id: ctx.read_id("switchToOperateId")?,
            },
            other => {
                return Err(crate::context::unknown_element(other, OVERLOAD_MANAGEMENT_SYSTEM))
            }
        };
        let tripping = Self::read_tripping(target, ctx)?;
        // trippings are validated when the system is added
        adder.entity_mut().trippings.push(tripping);
        Ok(())
    }
}
