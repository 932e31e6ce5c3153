//! Read/write skeleton shared by every identifiable.
//!
//! The write path is the same for all kinds ([`IdentifiableSerDe::write`]).
//! Reading comes in two strategies, chosen per kind:
//!
//! - [`SimpleIdentifiableSerDe`]: the adder is complete once the root
//!   attributes are read; the object is added immediately and its children
//!   are read against the live network.
//! - [`ComplexIdentifiableSerDe`]: root attributes and children queue
//!   mutations that are applied once the object exists. With
//!   [`POSTPONED`](ComplexIdentifiableSerDe::POSTPONED) the construction
//!   itself becomes a `BeforeExtensions` end task, for objects naming
//!   siblings that may appear later in the document.

use grit_core::{
    Adder, Container, GritError, GritResult, Identifiable, IdentifiableData, Network,
    NetworkElement,
};
use tracing::{debug, warn};

use crate::context::{DeserializerContext, SerializerContext};
use crate::end_tasks::Phase;
use crate::gate::{ErrorMessage, VersionGate};
use crate::version::SchemaVersion;

pub const ALIAS: &str = "alias";
pub const PROPERTY: &str = "property";

const ID: &str = "id";
const NAME: &str = "name";
const FICTITIOUS: &str = "fictitious";
const ALIAS_TYPE: &str = "type";
const PROPERTY_NAME: &str = "name";
const PROPERTY_VALUE: &str = "value";

/// Write side of an identifiable kind.
pub trait IdentifiableSerDe {
    type Entity: NetworkElement + Default + 'static;

    fn root_element_name(&self) -> &'static str;

    /// Vetoes writing a degenerate object. The object is skipped with a
    /// warning, never failed.
    fn is_valid(&self, _entity: &Self::Entity, _ctx: &mut SerializerContext<'_>) -> bool {
        true
    }

    fn write_root_element_attributes(
        &self,
        entity: &Self::Entity,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()>;

    fn write_sub_elements(
        &self,
        _entity: &Self::Entity,
        _network: &Network,
        _ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        Ok(())
    }

    fn write(
        &self,
        entity: &Self::Entity,
        network: &Network,
        ctx: &mut SerializerContext<'_>,
    ) -> GritResult<()> {
        let root = self.root_element_name();
        if !self.is_valid(entity, ctx) {
            let message = format!("{} '{}' is invalid and is not exported", entity.kind(), entity.id());
            warn!("{}", message);
            ctx.diagnostics
                .add_warning_with_entity("export", &message, entity.id());
            return Ok(());
        }
        ctx.start_node(root)?;
        write_identity(entity.data(), root, ctx)?;
        self.write_root_element_attributes(entity, network, ctx)?;
        write_aliases_and_properties(entity.data(), root, ctx)?;
        self.write_sub_elements(entity, network, ctx)?;
        ctx.end_node()?;
        ctx.add_exported(entity.id());
        Ok(())
    }
}

/// Writes id, name and the fictitious flag.
pub fn write_identity(
    data: &IdentifiableData,
    root: &str,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    ctx.write_id_attribute(ID, &data.id)?;
    ctx.write_optional_id_attribute(NAME, data.name.as_deref())?;
    ctx.write_boolean_attribute_from_minimum_version(
        root,
        FICTITIOUS,
        data.fictitious,
        false,
        SchemaVersion::V1_3,
    )
}

/// Writes the `alias` and `property` children.
pub fn write_aliases_and_properties(
    data: &IdentifiableData,
    root: &str,
    ctx: &mut SerializerContext<'_>,
) -> GritResult<()> {
    if !data.aliases().is_empty()
        && ctx.check_minimum_version(root, ALIAS, ErrorMessage::NotSupported, SchemaVersion::V1_3)?
    {
        ctx.group(|ctx| {
            for alias in data.aliases() {
                ctx.start_node(ALIAS)?;
                ctx.write_string_attribute_from_minimum_version(
                    ALIAS,
                    ALIAS_TYPE,
                    alias.alias_type.as_deref(),
                    SchemaVersion::V1_4,
                )?;
                let token = ctx.anonymize(&alias.id);
                ctx.writer().write_node_content(&token)?;
                ctx.end_node()?;
            }
            Ok(())
        })?;
    }
    if !data.properties().is_empty() {
        ctx.group(|ctx| {
            for (name, value) in data.properties() {
                ctx.start_node(PROPERTY)?;
                ctx.writer().write_string_attribute(PROPERTY_NAME, Some(name))?;
                ctx.writer().write_string_attribute(PROPERTY_VALUE, Some(value))?;
                ctx.end_node()?;
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Reads id, name and the fictitious flag into `data`.
pub fn read_identity(
    data: &mut IdentifiableData,
    root: &str,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<()> {
    data.id = ctx.read_id(ID)?;
    data.name = ctx.read_optional_id(NAME);
    if let Some(fictitious) = ctx.reader().read_boolean_attribute(FICTITIOUS)? {
        ctx.assert_minimum_version(root, FICTITIOUS, ErrorMessage::NotSupported, SchemaVersion::V1_3)?;
        data.fictitious = fictitious;
    }
    Ok(())
}

/// Reads an `alias` node: the alias and its optional type.
pub fn read_alias(
    root: &str,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<(String, Option<String>)> {
    ctx.assert_minimum_version(root, ALIAS, ErrorMessage::NotSupported, SchemaVersion::V1_3)?;
    let alias_type = ctx.from_minimum_version(SchemaVersion::V1_4, |ctx| {
        Ok(ctx.reader().read_string_attribute(ALIAS_TYPE))
    })?;
    let token = ctx.reader().read_content()?;
    Ok((ctx.deanonymize(&token), alias_type.flatten()))
}

/// Reads a `property` node.
pub fn read_property(ctx: &mut DeserializerContext<'_>) -> GritResult<(String, String)> {
    let name = ctx.reader().read_required_string_attribute(PROPERTY_NAME)?;
    let value = ctx.reader().read_required_string_attribute(PROPERTY_VALUE)?;
    Ok((name, value))
}

pub fn apply_alias(
    data: &mut IdentifiableData,
    alias: String,
    alias_type: Option<String>,
) -> GritResult<()> {
    if !data.add_alias(alias.clone(), alias_type) {
        return Err(GritError::Validation(format!(
            "Alias '{}' of '{}' is already defined",
            alias, data.id
        )));
    }
    Ok(())
}

fn data_of<'n>(network: &'n mut Network, id: &str) -> GritResult<&'n mut IdentifiableData> {
    network
        .identifiable_mut(id)
        .map(|identifiable| identifiable.data_mut())
        .ok_or_else(|| GritError::ReferenceResolution(format!("Identifiable '{}' not found", id)))
}

/// Reads `alias` and `property` children onto an identifiable of the
/// network. Returns false for any other name.
pub fn read_common_sub_element(
    name: &str,
    id: &str,
    root: &str,
    network: &mut Network,
    ctx: &mut DeserializerContext<'_>,
) -> GritResult<bool> {
    match name {
        ALIAS => {
            let (alias, alias_type) = read_alias(root, ctx)?;
            apply_alias(data_of(network, id)?, alias, alias_type)?;
        }
        PROPERTY => {
            let (key, value) = read_property(ctx)?;
            data_of(network, id)?.set_property(key, value);
        }
        _ => return Ok(false),
    }
    Ok(true)
}

/// Read strategy for kinds whose adder is complete after the root attributes.
pub trait SimpleIdentifiableSerDe: IdentifiableSerDe {
    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Self::Entity>,
        network: &Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()>;

    /// Last chance to drop the object before it is added. Dropped objects
    /// are recorded so their extensions are skipped.
    fn accept(&self, _adder: &Adder<Self::Entity>, _ctx: &mut DeserializerContext<'_>) -> GritResult<bool> {
        Ok(true)
    }

    /// Children other than aliases and properties.
    fn read_sub_element(
        &self,
        name: &str,
        _id: &str,
        _network: &mut Network,
        _ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        Err(crate::context::unknown_element(name, self.root_element_name()))
    }

    fn read(
        &self,
        container: Container,
        network: &mut Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let root = self.root_element_name();
        let mut adder = Adder::new(container, Self::Entity::default());
        read_identity(adder.data_mut(), root, ctx)?;
        self.read_root_element_attributes(&mut adder, network, ctx)?;
        if !self.accept(&adder, ctx)? {
            ctx.ignore(adder.entity().id());
            return Ok(());
        }
        let id = adder.add(network)?;
        debug!(element = root, %id, "imported");
        ctx.read_child_nodes(|ctx, name| {
            if read_common_sub_element(name, &id, root, network, ctx)? {
                return Ok(());
            }
            self.read_sub_element(name, &id, network, ctx)
        })
    }
}

/// Deferred change to an object that does not exist yet.
pub type Mutation<E> = Box<dyn FnOnce(&mut E) -> GritResult<()>>;

/// Read strategy for kinds that need changes applied after construction.
pub trait ComplexIdentifiableSerDe: IdentifiableSerDe {
    /// Defers construction to a `BeforeExtensions` end task.
    const POSTPONED: bool = false;

    /// The object once added to the network.
    fn entity_mut<'n>(network: &'n mut Network, id: &str) -> Option<&'n mut Self::Entity>;

    fn read_root_element_attributes(
        &self,
        adder: &mut Adder<Self::Entity>,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<Vec<Mutation<Self::Entity>>>;

    /// Children other than aliases and properties. Values needed for
    /// validation go on the adder, everything else becomes a mutation.
    fn read_sub_element(
        &self,
        name: &str,
        _adder: &mut Adder<Self::Entity>,
        _mutations: &mut Vec<Mutation<Self::Entity>>,
        _ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        Err(crate::context::unknown_element(name, self.root_element_name()))
    }

    fn read(
        &self,
        container: Container,
        network: &mut Network,
        ctx: &mut DeserializerContext<'_>,
    ) -> GritResult<()> {
        let root = self.root_element_name();
        let mut adder = Adder::new(container, Self::Entity::default());
        read_identity(adder.data_mut(), root, ctx)?;
        let mut mutations = self.read_root_element_attributes(&mut adder, ctx)?;
        ctx.read_child_nodes(|ctx, name| match name {
            ALIAS => {
                let (alias, alias_type) = read_alias(root, ctx)?;
                mutations.push(Box::new(move |entity: &mut Self::Entity| {
                    apply_alias(entity.data_mut(), alias, alias_type)
                }));
                Ok(())
            }
            PROPERTY => {
                let (key, value) = read_property(ctx)?;
                mutations.push(Box::new(move |entity: &mut Self::Entity| {
                    entity.data_mut().set_property(key, value);
                    Ok(())
                }));
                Ok(())
            }
            _ => self.read_sub_element(name, &mut adder, &mut mutations, ctx),
        })?;

        let construct = move |network: &mut Network| -> GritResult<()> {
            let id = adder.add(network)?;
            let entity = Self::entity_mut(network, &id).ok_or_else(|| {
                GritError::ReferenceResolution(format!("'{}' not found after construction", id))
            })?;
            for mutation in mutations {
                mutation(entity)?;
            }
            debug!(element = root, %id, "imported");
            Ok(())
        };
        if Self::POSTPONED {
            ctx.end_tasks.add(Phase::BeforeExtensions, construct);
            Ok(())
        } else {
            construct(network)
        }
    }
}
