//! Identity, aliases, properties and extensions shared by every network object.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a uniquely identified network object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifiableKind {
    Network,
    Subnetwork,
    Substation,
    VoltageLevel,
    Bus,
    Switch,
    Generator,
    Load,
    DanglingLine,
    VscConverterStation,
    Line,
    TwoWindingsTransformer,
    TieLine,
    HvdcLine,
    OverloadManagementSystem,
}

impl IdentifiableKind {
    /// True for kinds that own exactly one terminal.
    pub fn is_injection(self) -> bool {
        matches!(
            self,
            IdentifiableKind::Generator
                | IdentifiableKind::Load
                | IdentifiableKind::DanglingLine
                | IdentifiableKind::VscConverterStation
        )
    }

    /// True for kinds that own two terminals.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            IdentifiableKind::Line | IdentifiableKind::TwoWindingsTransformer
        )
    }
}

impl fmt::Display for IdentifiableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IdentifiableKind::Network => "network",
            IdentifiableKind::Subnetwork => "subnetwork",
            IdentifiableKind::Substation => "substation",
            IdentifiableKind::VoltageLevel => "voltage level",
            IdentifiableKind::Bus => "bus",
            IdentifiableKind::Switch => "switch",
            IdentifiableKind::Generator => "generator",
            IdentifiableKind::Load => "load",
            IdentifiableKind::DanglingLine => "dangling line",
            IdentifiableKind::VscConverterStation => "VSC converter station",
            IdentifiableKind::Line => "line",
            IdentifiableKind::TwoWindingsTransformer => "two windings transformer",
            IdentifiableKind::TieLine => "tie line",
            IdentifiableKind::HvdcLine => "HVDC line",
            IdentifiableKind::OverloadManagementSystem => "overload management system",
        };
        f.write_str(s)
    }
}

/// An optional, independently versioned attachment to a network object.
///
/// Concrete extensions live next to their serializer; the model only needs
/// to store them and hand them back by name or by type.
pub trait Extension: Any + fmt::Debug + Send + Sync {
    /// Unique extension name, used to look up its serializer.
    fn name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn clone_box(&self) -> Box<dyn Extension>;
}

impl Clone for Box<dyn Extension> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Alternative identifier, optionally typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub id: String,
    pub alias_type: Option<String>,
}

/// Data every identifiable object carries.
#[derive(Debug, Clone, Default)]
pub struct IdentifiableData {
    pub id: String,
    pub name: Option<String>,
    pub fictitious: bool,
    aliases: Vec<Alias>,
    properties: BTreeMap<String, String>,
    extensions: Vec<Box<dyn Extension>>,
}

impl IdentifiableData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name if set, id otherwise.
    pub fn name_or_id(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Adds an alias. Returns false when the alias is already present or
    /// another alias already uses the same type.
    pub fn add_alias(&mut self, id: impl Into<String>, alias_type: Option<String>) -> bool {
        let id = id.into();
        let duplicate = self.aliases.iter().any(|a| {
            a.id == id || (alias_type.is_some() && a.alias_type == alias_type)
        });
        if duplicate || id == self.id {
            return false;
        }
        self.aliases.push(Alias { id, alias_type });
        true
    }

    pub fn alias_from_type(&self, alias_type: &str) -> Option<&str> {
        self.aliases
            .iter()
            .find(|a| a.alias_type.as_deref() == Some(alias_type))
            .map(|a| a.id.as_str())
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn extensions(&self) -> &[Box<dyn Extension>] {
        &self.extensions
    }

    pub fn extension_by_name(&self, name: &str) -> Option<&dyn Extension> {
        self.extensions
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_ref())
    }

    pub fn extension<E: Extension>(&self) -> Option<&E> {
        self.extensions
            .iter()
            .find_map(|e| e.as_any().downcast_ref::<E>())
    }

    /// Attaches an extension, replacing any extension with the same name.
    pub fn add_extension(&mut self, extension: Box<dyn Extension>) {
        self.extensions.retain(|e| e.name() != extension.name());
        self.extensions.push(extension);
    }
}

/// A uniquely identified network object.
pub trait Identifiable {
    fn data(&self) -> &IdentifiableData;

    fn data_mut(&mut self) -> &mut IdentifiableData;

    fn kind(&self) -> IdentifiableKind;

    fn id(&self) -> &str {
        &self.data().id
    }
}

/// Implements [`Identifiable`] for a struct holding its data in a `data` field.
macro_rules! impl_identifiable {
    ($ty:ty, $kind:expr) => {
        impl $crate::identifiable::Identifiable for $ty {
            fn data(&self) -> &$crate::identifiable::IdentifiableData {
                &self.data
            }

            fn data_mut(&mut self) -> &mut $crate::identifiable::IdentifiableData {
                &mut self.data
            }

            fn kind(&self) -> $crate::identifiable::IdentifiableKind {
                $kind
            }
        }
    };
}

pub(crate) use impl_identifiable;
