//! `entsoeArea`: the ENTSO-E area code of a substation.

use std::any::Any;

use grit_core::{Extension, GritError, GritResult};

use super::{downcast, ExtensionSerDe, ExtensionVersion};
use crate::context::{DeserializerContext, SerializerContext};

pub const NAME: &str = "entsoeArea";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntsoeArea {
    pub code: String,
}

impl EntsoeArea {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl Extension for EntsoeArea {
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
    "http://www.grit-project.org/schema/grit/ext/entsoe_area/1_0",
    "ea",
)];

#[derive(Debug, Clone, Copy, Default)]
pub struct EntsoeAreaSerDe;

impl ExtensionSerDe for EntsoeAreaSerDe {
    fn extension_name(&self) -> &'static str {
        NAME
    }

    fn versions(&self) -> &[ExtensionVersion] {
        &VERSIONS
    }

    fn write(
        &self,
        extension: &dyn Extension,
        _version: &ExtensionVersion,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let area = downcast::<EntsoeArea>(extension)?;
        ctx.writer().write_node_content(&area.code)
    }

    fn read(
        &self,
        owner_id: &str,
        _version: &ExtensionVersion,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Box<dyn Extension>> {
        let code = ctx.reader().read_content()?;
        let code = code.trim();
        if code.is_empty() {
            return Err(GritError::Structural(format!(
                "Empty {} code on '{}'",
                NAME, owner_id
            )));
        }
        Ok(Box::new(EntsoeArea::new(code)))
    }
}
