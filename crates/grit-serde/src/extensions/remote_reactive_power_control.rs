//! `remoteReactivePowerControl`: a generator regulating reactive power at a
//! remote terminal.

use std::any::Any;

use grit_core::{Extension, GritError, GritResult, Side, TerminalRef};

use super::{downcast, ExtensionSerDe, ExtensionVersion};
use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;
use crate::version::SchemaVersion;

pub const NAME: &str = "remoteReactivePowerControl";

const TERMINAL: &str = "terminal";

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReactivePowerControl {
    pub enabled: bool,
    pub target_q: f64,
    pub regulating_terminal: TerminalRef,
}

impl RemoteReactivePowerControl {
    pub fn new(enabled: bool, target_q: f64, regulating_terminal: TerminalRef) -> Self {
        Self {
            enabled,
            target_q,
            regulating_terminal,
        }
    }
}

impl Extension for RemoteReactivePowerControl {
    fn name(&self) -> &'static str {
        NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn Extension> {
        Box::new(self.clone())
    }
}

static VERSIONS: [ExtensionVersion; 1] = [ExtensionVersion::new(
    "1.0",
    "http://www.grit-project.org/schema/grit/ext/remote_reactive_power_control/1_0",
    "rrpc",
)
.with_min_network_version(SchemaVersion::V1_4)];

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteReactivePowerControlSerDe;

impl ExtensionSerDe for RemoteReactivePowerControlSerDe {
    fn extension_name(&self) -> &'static str {
        NAME
    }

    fn versions(&self) -> &[ExtensionVersion] {
        &VERSIONS
    }

    fn write(
        &self,
        extension: &dyn Extension,
        version: &ExtensionVersion,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let control = downcast::<RemoteReactivePowerControl>(extension)?;
        ctx.writer().write_boolean_attribute("enabled", control.enabled)?;
        ctx.writer().write_double_attribute("targetQ", control.target_q)?;
        let terminal = &control.regulating_terminal;
        ctx.writer().write_start_node(version.namespace_uri, TERMINAL)?;
        ctx.write_id_attribute("id", &terminal.id)?;
        if let Some(side) = terminal.side {
            ctx.writer().write_enum_attribute("side", side.as_str())?;
        }
        ctx.writer().write_end_node()
    }

    fn read(
        &self,
        owner_id: &str,
        _version: &ExtensionVersion,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Box<dyn Extension>> {
        let enabled = ctx.reader().read_boolean_attribute_or("enabled", false)?;
        let target_q = ctx.reader().read_double_attribute("targetQ")?;
        let mut terminal = None;
        ctx.read_child_nodes(|ctx, name| match name {
            TERMINAL => {
                let id = ctx.read_id("id")?;
                let side = ctx.reader().read_enum_attribute::<Side>("side")?;
                terminal = Some(TerminalRef { id, side });
                Ok(())
            }
            other => Err(crate::context::unknown_element(other, NAME)),
        })?;
        let terminal = terminal.ok_or_else(|| {
            GritError::Structural(format!(
                "{} of '{}' has no {} element",
                NAME, owner_id, TERMINAL
            ))
        })?;

        // the regulated equipment may come later in the document
        let reference = terminal.clone();
        ctx.end_tasks.add(Phase::AfterExtensions, move |network| {
            network.resolve_terminal(&reference).map(|_| ())
        });
        Ok(Box::new(RemoteReactivePowerControl::new(enabled, target_q, terminal)))
    }
}
