//! `activePowerControl`: participation of a generator in active power balancing.

use std::any::Any;

use grit_core::{Extension, GritResult};

use super::{downcast, ExtensionSerDe, ExtensionVersion};
use crate::context::{DeserializerContext, SerializerContext};
use crate::version::SchemaVersion;

pub const NAME: &str = "activePowerControl";

#[derive(Debug, Clone, PartialEq)]
pub struct ActivePowerControl {
    pub participate: bool,
    pub droop: f64,
    /// From extension version 1.1.
    pub participation_factor: f64,
}

impl ActivePowerControl {
    pub fn new(participate: bool, droop: f64) -> Self {
        Self {
            participate,
            droop,
            participation_factor: f64::NAN,
        }
    }

    pub fn with_participation_factor(mut self, factor: f64) -> Self {
        self.participation_factor = factor;
        self
    }
}

impl Extension for ActivePowerControl {
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

const V1_0: ExtensionVersion = ExtensionVersion::new(
    "1.0",
    "http://www.grit-project.org/schema/grit/ext/active_power_control/1_0",
    "apc",
);

const V1_1: ExtensionVersion = ExtensionVersion::new(
    "1.1",
    "http://www.grit-project.org/schema/grit/ext/active_power_control/1_1",
    "apc",
)
.with_min_network_version(SchemaVersion::V1_6);

static VERSIONS: [ExtensionVersion; 2] = [V1_0, V1_1];

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivePowerControlSerDe;

impl ActivePowerControlSerDe {
    fn has_participation_factor(version: &ExtensionVersion) -> bool {
        version.version != V1_0.version
    }
}

impl ExtensionSerDe for ActivePowerControlSerDe {
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
        let apc = downcast::<ActivePowerControl>(extension)?;
        let writer = ctx.writer();
        writer.write_boolean_attribute("participate", apc.participate)?;
        writer.write_double_attribute("droop", apc.droop)?;
        if Self::has_participation_factor(version) {
            writer.write_double_attribute("participationFactor", apc.participation_factor)?;
        }
        Ok(())
    }

    fn read(
        &self,
        _owner_id: &str,
        version: &ExtensionVersion,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Box<dyn Extension>> {
        let reader = ctx.reader();
        let participate = reader.read_boolean_attribute_or("participate", false)?;
        let droop = reader.read_double_attribute("droop")?;
        let mut apc = ActivePowerControl::new(participate, droop);
        if Self::has_participation_factor(version) {
            apc.participation_factor = reader.read_double_attribute("participationFactor")?;
        }
        Ok(Box::new(apc))
    }
}
