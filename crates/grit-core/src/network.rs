//! The network container and its id index.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};

use crate::equipment::*;
use crate::error::{GritError, GritResult};
use crate::identifiable::{Identifiable, IdentifiableData, IdentifiableKind};

/// Where an identifiable lives inside the network's storage.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Location {
    Network,
    Subnetwork(usize),
    Substation(usize),
    VoltageLevel(usize),
    Bus(usize, usize),
    Switch(usize, usize),
    Generator(usize, usize),
    Load(usize, usize),
    DanglingLine(usize, usize),
    VscConverterStation(usize, usize),
    Line(usize),
    TwoWindingsTransformer(usize, usize),
    TieLine(usize),
    HvdcLine(usize),
    OverloadManagementSystem(usize, usize),
}

/// A power-grid network: substations, voltage levels, branches and the
/// equipment connected to them, with at most one level of sub-networks.
///
/// Objects are added through [`Network::add`] (or an [`Adder`](crate::Adder))
/// which validates references before committing.
#[derive(Debug, Clone)]
pub struct Network {
    pub data: IdentifiableData,
    pub case_date: DateTime<FixedOffset>,
    pub forecast_distance: i32,
    pub source_format: String,
    pub validation_level: ValidationLevel,
    pub(crate) subnetworks: Vec<Subnetwork>,
    pub(crate) substations: Vec<Substation>,
    pub(crate) voltage_levels: Vec<VoltageLevel>,
    pub(crate) lines: Vec<Line>,
    pub(crate) tie_lines: Vec<TieLine>,
    pub(crate) hvdc_lines: Vec<HvdcLine>,
    pub(crate) voltage_angle_limits: Vec<VoltageAngleLimit>,
    pub(crate) index: HashMap<String, Location>,
}

impl Network {
    pub fn new(id: impl Into<String>, source_format: impl Into<String>) -> Self {
        let data = IdentifiableData::new(id);
        let mut index = HashMap::new();
        index.insert(data.id.clone(), Location::Network);
        Self {
            data,
            case_date: Utc::now().fixed_offset(),
            forecast_distance: 0,
            source_format: source_format.into(),
            validation_level: ValidationLevel::default(),
            subnetworks: Vec::new(),
            substations: Vec::new(),
            voltage_levels: Vec::new(),
            lines: Vec::new(),
            tie_lines: Vec::new(),
            hvdc_lines: Vec::new(),
            voltage_angle_limits: Vec::new(),
            index,
        }
    }

    pub fn with_case_date(mut self, case_date: DateTime<FixedOffset>) -> Self {
        self.case_date = case_date;
        self
    }

    // =========================================================================
    // Collections
    // =========================================================================

    pub fn subnetworks(&self) -> &[Subnetwork] {
        &self.subnetworks
    }

    pub fn substations(&self) -> &[Substation] {
        &self.substations
    }

    pub fn voltage_levels(&self) -> &[VoltageLevel] {
        &self.voltage_levels
    }

    /// Voltage levels belonging to a substation, in insertion order.
    pub fn voltage_levels_of<'a>(
        &'a self,
        substation_id: &'a str,
    ) -> impl Iterator<Item = &'a VoltageLevel> + 'a {
        self.voltage_levels
            .iter()
            .filter(move |vl| vl.substation.as_deref() == Some(substation_id))
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn tie_lines(&self) -> &[TieLine] {
        &self.tie_lines
    }

    pub fn hvdc_lines(&self) -> &[HvdcLine] {
        &self.hvdc_lines
    }

    pub fn voltage_angle_limits(&self) -> &[VoltageAngleLimit] {
        &self.voltage_angle_limits
    }

    /// Number of identifiables, the network itself included.
    pub fn identifiable_count(&self) -> usize {
        self.index.len()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Every identifiable, the network itself first, in insertion order
    /// within each collection.
    pub fn identifiables(&self) -> impl Iterator<Item = &dyn Identifiable> + '_ {
        let network = std::iter::once(self as &dyn Identifiable);
        let subnetworks = self.subnetworks.iter().map(|s| s as &dyn Identifiable);
        let substations = self.substations.iter().flat_map(|s| {
            std::iter::once(s as &dyn Identifiable)
                .chain(s.two_windings_transformers.iter().map(|t| t as &dyn Identifiable))
                .chain(s.overload_management_systems.iter().map(|o| o as &dyn Identifiable))
        });
        let voltage_levels = self.voltage_levels.iter().flat_map(|vl| {
            std::iter::once(vl as &dyn Identifiable)
                .chain(vl.buses.iter().map(|b| b as &dyn Identifiable))
                .chain(vl.switches.iter().map(|s| s as &dyn Identifiable))
                .chain(vl.generators.iter().map(|g| g as &dyn Identifiable))
                .chain(vl.loads.iter().map(|l| l as &dyn Identifiable))
                .chain(vl.dangling_lines.iter().map(|d| d as &dyn Identifiable))
                .chain(vl.vsc_converter_stations.iter().map(|c| c as &dyn Identifiable))
        });
        let branches = self
            .lines
            .iter()
            .map(|l| l as &dyn Identifiable)
            .chain(self.tie_lines.iter().map(|t| t as &dyn Identifiable))
            .chain(self.hvdc_lines.iter().map(|h| h as &dyn Identifiable));
        network
            .chain(subnetworks)
            .chain(substations)
            .chain(voltage_levels)
            .chain(branches)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn kind_of(&self, id: &str) -> Option<IdentifiableKind> {
        self.identifiable(id).map(|i| i.kind())
    }

    pub fn identifiable(&self, id: &str) -> Option<&dyn Identifiable> {
        let location = *self.index.get(id)?;
        let item: &dyn Identifiable = match location {
            Location::Network => self,
            Location::Subnetwork(i) => &self.subnetworks[i],
            Location::Substation(i) => &self.substations[i],
            Location::VoltageLevel(i) => &self.voltage_levels[i],
            Location::Bus(v, i) => &self.voltage_levels[v].buses[i],
            Location::Switch(v, i) => &self.voltage_levels[v].switches[i],
            Location::Generator(v, i) => &self.voltage_levels[v].generators[i],
            Location::Load(v, i) => &self.voltage_levels[v].loads[i],
            Location::DanglingLine(v, i) => &self.voltage_levels[v].dangling_lines[i],
            Location::VscConverterStation(v, i) => {
                &self.voltage_levels[v].vsc_converter_stations[i]
            }
            Location::Line(i) => &self.lines[i],
            Location::TwoWindingsTransformer(s, i) => {
                &self.substations[s].two_windings_transformers[i]
            }
            Location::TieLine(i) => &self.tie_lines[i],
            Location::HvdcLine(i) => &self.hvdc_lines[i],
            Location::OverloadManagementSystem(s, i) => {
                &self.substations[s].overload_management_systems[i]
            }
        };
        Some(item)
    }

    pub fn identifiable_mut(&mut self, id: &str) -> Option<&mut dyn Identifiable> {
        let location = *self.index.get(id)?;
        let item: &mut dyn Identifiable = match location {
            Location::Network => self,
            Location::Subnetwork(i) => &mut self.subnetworks[i],
            Location::Substation(i) => &mut self.substations[i],
            Location::VoltageLevel(i) => &mut self.voltage_levels[i],
            Location::Bus(v, i) => &mut self.voltage_levels[v].buses[i],
            Location::Switch(v, i) => &mut self.voltage_levels[v].switches[i],
            Location::Generator(v, i) => &mut self.voltage_levels[v].generators[i],
            Location::Load(v, i) => &mut self.voltage_levels[v].loads[i],
            Location::DanglingLine(v, i) => &mut self.voltage_levels[v].dangling_lines[i],
            Location::VscConverterStation(v, i) => {
                &mut self.voltage_levels[v].vsc_converter_stations[i]
            }
            Location::Line(i) => &mut self.lines[i],
            Location::TwoWindingsTransformer(s, i) => {
                &mut self.substations[s].two_windings_transformers[i]
            }
            Location::TieLine(i) => &mut self.tie_lines[i],
            Location::HvdcLine(i) => &mut self.hvdc_lines[i],
            Location::OverloadManagementSystem(s, i) => {
                &mut self.substations[s].overload_management_systems[i]
            }
        };
        Some(item)
    }

    pub fn subnetwork(&self, id: &str) -> Option<&Subnetwork> {
        match self.index.get(id)? {
            Location::Subnetwork(i) => Some(&self.subnetworks[*i]),
            _ => None,
        }
    }

    pub fn substation(&self, id: &str) -> Option<&Substation> {
        match self.index.get(id)? {
            Location::Substation(i) => Some(&self.substations[*i]),
            _ => None,
        }
    }

    pub fn voltage_level(&self, id: &str) -> Option<&VoltageLevel> {
        match self.index.get(id)? {
            Location::VoltageLevel(i) => Some(&self.voltage_levels[*i]),
            _ => None,
        }
    }

    pub fn bus(&self, id: &str) -> Option<&Bus> {
        match self.index.get(id)? {
            Location::Bus(v, i) => Some(&self.voltage_levels[*v].buses[*i]),
            _ => None,
        }
    }

    pub fn switch(&self, id: &str) -> Option<&Switch> {
        match self.index.get(id)? {
            Location::Switch(v, i) => Some(&self.voltage_levels[*v].switches[*i]),
            _ => None,
        }
    }

    pub fn generator(&self, id: &str) -> Option<&Generator> {
        match self.index.get(id)? {
            Location::Generator(v, i) => Some(&self.voltage_levels[*v].generators[*i]),
            _ => None,
        }
    }

    pub fn generator_mut(&mut self, id: &str) -> Option<&mut Generator> {
        match self.index.get(id)? {
            Location::Generator(v, i) => Some(&mut self.voltage_levels[*v].generators[*i]),
            _ => None,
        }
    }

    pub fn overload_management_system_mut(
        &mut self,
        id: &str,
    ) -> Option<&mut OverloadManagementSystem> {
        match self.index.get(id)? {
            Location::OverloadManagementSystem(s, i) => {
                Some(&mut self.substations[*s].overload_management_systems[*i])
            }
            _ => None,
        }
    }

    pub fn load(&self, id: &str) -> Option<&Load> {
        match self.index.get(id)? {
            Location::Load(v, i) => Some(&self.voltage_levels[*v].loads[*i]),
            _ => None,
        }
    }

    pub fn dangling_line(&self, id: &str) -> Option<&DanglingLine> {
        match self.index.get(id)? {
            Location::DanglingLine(v, i) => Some(&self.voltage_levels[*v].dangling_lines[*i]),
            _ => None,
        }
    }

    pub fn vsc_converter_station(&self, id: &str) -> Option<&VscConverterStation> {
        match self.index.get(id)? {
            Location::VscConverterStation(v, i) => {
                Some(&self.voltage_levels[*v].vsc_converter_stations[*i])
            }
            _ => None,
        }
    }

    pub fn line(&self, id: &str) -> Option<&Line> {
        match self.index.get(id)? {
            Location::Line(i) => Some(&self.lines[*i]),
            _ => None,
        }
    }

    pub fn two_windings_transformer(&self, id: &str) -> Option<&TwoWindingsTransformer> {
        match self.index.get(id)? {
            Location::TwoWindingsTransformer(s, i) => {
                Some(&self.substations[*s].two_windings_transformers[*i])
            }
            _ => None,
        }
    }

    pub fn tie_line(&self, id: &str) -> Option<&TieLine> {
        match self.index.get(id)? {
            Location::TieLine(i) => Some(&self.tie_lines[*i]),
            _ => None,
        }
    }

    pub fn hvdc_line(&self, id: &str) -> Option<&HvdcLine> {
        match self.index.get(id)? {
            Location::HvdcLine(i) => Some(&self.hvdc_lines[*i]),
            _ => None,
        }
    }

    pub fn overload_management_system(&self, id: &str) -> Option<&OverloadManagementSystem> {
        match self.index.get(id)? {
            Location::OverloadManagementSystem(s, i) => {
                Some(&self.substations[*s].overload_management_systems[*i])
            }
            _ => None,
        }
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Resolves a terminal reference against the network.
    ///
    /// Injections take no side; branches require one.
    pub fn resolve_terminal(&self, reference: &TerminalRef) -> GritResult<&Terminal> {
        let not_found = || {
            GritError::ReferenceResolution(format!("Terminal '{}' not found", reference))
        };
        let location = *self.index.get(&reference.id).ok_or_else(not_found)?;
        match (location, reference.side) {
            (Location::Generator(v, i), None) => Ok(&self.voltage_levels[v].generators[i].terminal),
            (Location::Load(v, i), None) => Ok(&self.voltage_levels[v].loads[i].terminal),
            (Location::DanglingLine(v, i), None) => {
                Ok(&self.voltage_levels[v].dangling_lines[i].terminal)
            }
            (Location::VscConverterStation(v, i), None) => {
                Ok(&self.voltage_levels[v].vsc_converter_stations[i].terminal)
            }
            (Location::Line(i), Some(side)) => Ok(match side {
                Side::One => &self.lines[i].terminal1,
                Side::Two => &self.lines[i].terminal2,
            }),
            (Location::TwoWindingsTransformer(s, i), Some(side)) => {
                let twt = &self.substations[s].two_windings_transformers[i];
                Ok(match side {
                    Side::One => &twt.terminal1,
                    Side::Two => &twt.terminal2,
                })
            }
            _ => Err(not_found()),
        }
    }

    /// Points a generator's voltage regulation at another terminal.
    pub fn set_regulating_terminal(
        &mut self,
        generator_id: &str,
        terminal: Option<TerminalRef>,
    ) -> GritResult<()> {
        if let Some(reference) = &terminal {
            self.resolve_terminal(reference)?;
        }
        let generator = self.generator_mut(generator_id).ok_or_else(|| {
            GritError::ReferenceResolution(format!("Generator '{}' not found", generator_id))
        })?;
        generator.regulating_terminal = terminal;
        Ok(())
    }

    // =========================================================================
    // Index helpers used by adders
    // =========================================================================

    pub(crate) fn ensure_unique(&self, id: &str) -> GritResult<()> {
        if id.is_empty() {
            return Err(GritError::Validation("Identifier must not be empty".into()));
        }
        if let Some(kind) = self.kind_of(id) {
            return Err(GritError::Validation(format!(
                "The network {} already contains an object '{}' with the id '{}'",
                self.data.id, kind, id
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_subnetwork(&self, subnetwork: Option<&str>) -> GritResult<()> {
        match subnetwork {
            Some(id) if self.subnetwork(id).is_none() => Err(GritError::Validation(format!(
                "Subnetwork '{}' not found",
                id
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn voltage_level_index(&self, id: &str) -> GritResult<usize> {
        match self.index.get(id) {
            Some(Location::VoltageLevel(i)) => Ok(*i),
            _ => Err(GritError::Validation(format!(
                "Voltage level '{}' not found",
                id
            ))),
        }
    }

    pub(crate) fn substation_index(&self, id: &str) -> GritResult<usize> {
        match self.index.get(id) {
            Some(Location::Substation(i)) => Ok(*i),
            _ => Err(GritError::Validation(format!("Substation '{}' not found", id))),
        }
    }

    /// Checks that a terminal points at an existing bus of an existing voltage level.
    pub(crate) fn check_terminal(&self, owner: &str, terminal: &Terminal) -> GritResult<usize> {
        let vl_index = self.voltage_level_index(&terminal.voltage_level)?;
        let vl = &self.voltage_levels[vl_index];
        if vl.bus(&terminal.connectable_bus).is_none() {
            return Err(GritError::Validation(format!(
                "'{}': bus '{}' not found in voltage level '{}'",
                owner, terminal.connectable_bus, vl.data.id
            )));
        }
        Ok(vl_index)
    }

    pub(crate) fn register(&mut self, id: String, location: Location) {
        self.index.insert(id, location);
    }
}

impl Identifiable for Network {
    fn data(&self) -> &IdentifiableData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut IdentifiableData {
        &mut self.data
    }

    fn kind(&self) -> IdentifiableKind {
        IdentifiableKind::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adder::Container;

    fn small_network() -> GritResult<Network> {
        let mut network = Network::new("N", "test");
        network.add(Container::root(), Substation::new("S1"))?;
        network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))?;
        network.add(Container::voltage_level("VL1"), Bus::new("B1"))?;
        network.add(
            Container::voltage_level("VL1"),
            Generator::new("G1", Terminal::new("VL1", "B1")),
        )?;
        network.add(
            Container::voltage_level("VL1"),
            Load::new("L1", Terminal::new("VL1", "B1"), 10.0, 2.0),
        )?;
        Ok(network)
    }

    #[test]
    fn test_lookup_by_kind() {
        let network = small_network().unwrap();
        assert_eq!(network.kind_of("G1"), Some(IdentifiableKind::Generator));
        assert_eq!(network.kind_of("N"), Some(IdentifiableKind::Network));
        assert!(network.generator("L1").is_none());
        assert_eq!(network.load("L1").map(|l| l.p0), Some(10.0));
        assert_eq!(network.identifiable_count(), 6);
        assert_eq!(network.identifiables().count(), 6);
    }

    #[test]
    fn test_resolve_terminal() {
        let network = small_network().unwrap();
        let terminal = network.resolve_terminal(&TerminalRef::new("L1")).unwrap();
        assert_eq!(terminal.connectable_bus, "B1");

        let err = network
            .resolve_terminal(&TerminalRef::new("L1").with_side(Side::One))
            .unwrap_err();
        assert!(matches!(err, GritError::ReferenceResolution(_)));
    }

    #[test]
    fn test_set_regulating_terminal() {
        let mut network = small_network().unwrap();
        network
            .set_regulating_terminal("G1", Some(TerminalRef::new("L1")))
            .unwrap();
        assert_eq!(
            network.generator("G1").unwrap().regulating_terminal,
            Some(TerminalRef::new("L1"))
        );
        assert!(network
            .set_regulating_terminal("G1", Some(TerminalRef::new("MISSING")))
            .is_err());
    }

    #[test]
    fn test_identifiable_mut_properties() {
        let mut network = small_network().unwrap();
        network
            .identifiable_mut("B1")
            .unwrap()
            .data_mut()
            .set_property("owner", "tso");
        assert_eq!(network.bus("B1").unwrap().data.property("owner"), Some("tso"));
    }
}
