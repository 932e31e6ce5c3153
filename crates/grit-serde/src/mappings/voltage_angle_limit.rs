//! Voltage angle limits between two terminals.
//!
//! Limits are not identifiables: no aliases, properties or extensions. They
//! are added once the structure is complete since both terminals may belong
//! to equipment written anywhere in the document.

use grit_core::{GritError, GritResult, Side, TerminalRef, VoltageAngleLimit};

use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;

pub const VOLTAGE_ANGLE_LIMIT: &str = "voltageAngleLimit";
const FROM: &str = "from";
const TO: &str = "to";

fn write_terminal_ref(node: &str, terminal: &TerminalRef, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
    ctx.start_node(node)?;
    ctx.write_id_attribute("id", &terminal.id)?;
    if let Some(side) = terminal.side {
        ctx.writer().write_enum_attribute("side", side.as_str())?;
    }
    ctx.end_node()
}

pub fn write_voltage_angle_limit(limit: &VoltageAngleLimit, ctx: &mut SerializerContext<'_>) -> GritResult<()> {
    ctx.start_node(VOLTAGE_ANGLE_LIMIT)?;
    ctx.write_id_attribute("id", &limit.id)?;
    ctx.writer().write_double_attribute("lowLimit", limit.low_limit)?;
    ctx.writer().write_double_attribute("highLimit", limit.high_limit)?;
    write_terminal_ref(FROM, &limit.from, ctx)?;
    write_terminal_ref(TO, &limit.to, ctx)?;
    ctx.end_node()
}

/// Reads a limit and queues its addition to the network.
pub fn read_voltage_angle_limit(ctx: &mut DeserializerContext<'_>) -> GritResult<()> {
    let id = ctx.read_id("id")?;
    let low_limit = ctx.reader().read_double_attribute("lowLimit")?;
    let high_limit = ctx.reader().read_double_attribute("highLimit")?;
    let mut from = None;
    let mut to = None;
    ctx.read_child_nodes(|ctx, name| {
        let slot = match name {
            FROM => &mut from,
            TO => &mut to,
            other => return Err(crate::context::unknown_element(other, VOLTAGE_ANGLE_LIMIT)),
        };
        *slot = Some(TerminalRef {
            id: ctx.read_id("id")?,
            side: ctx.reader().read_enum_attribute::<Side>("side")?,
        });
        Ok(())
    })?;
    let missing = |node: &str| {
        GritError::Structural(format!(
            "Voltage angle limit '{}' has no '{}' terminal",
            id, node
        ))
    };
    let mut limit = VoltageAngleLimit::new(
        id.clone(),
        from.ok_or_else(|| missing(FROM))?,
        to.ok_or_else(|| missing(TO))?,
    );
    limit.low_limit = low_limit;
    limit.high_limit = high_limit;
    ctx.end_tasks.add(Phase::BeforeExtensions, move |network| {
        network.add_voltage_angle_limit(limit)
    });
    Ok(())
}
