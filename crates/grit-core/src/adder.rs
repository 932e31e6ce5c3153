//! Staged construction of network objects.
//!
//! An [`Adder`] pairs an entity with the container it goes into. Nothing is
//! committed until [`Adder::add`] has checked every reference the entity
//! makes (buses, voltage levels, dangling lines, converter stations).

use std::collections::HashSet;

use crate::equipment::*;
use crate::error::{GritError, GritResult};
use crate::identifiable::{Identifiable, IdentifiableData, IdentifiableKind};
use crate::network::{Location, Network};

/// Where a new object is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container {
    /// The root network (`None`) or one of its sub-networks.
    Network(Option<String>),
    Substation(String),
    VoltageLevel(String),
}

impl Container {
    pub fn root() -> Self {
        Container::Network(None)
    }

    pub fn subnetwork(id: impl Into<String>) -> Self {
        Container::Network(Some(id.into()))
    }

    pub fn substation(id: impl Into<String>) -> Self {
        Container::Substation(id.into())
    }

    pub fn voltage_level(id: impl Into<String>) -> Self {
        Container::VoltageLevel(id.into())
    }

    fn wrong_container(&self, kind: IdentifiableKind, id: &str) -> GritError {
        GritError::Validation(format!(
            "{} '{}' cannot be added to {:?}",
            kind, id, self
        ))
    }
}

/// An object that can be committed into a network.
pub trait NetworkElement: Identifiable + Sized {
    /// Validates the object against the network and inserts it.
    fn insert(self, container: &Container, network: &mut Network) -> GritResult<()>;
}

/// An entity waiting to be committed to its container.
#[derive(Debug, Clone)]
pub struct Adder<T> {
    container: Container,
    entity: T,
}

impl<T: NetworkElement> Adder<T> {
    pub fn new(container: Container, entity: T) -> Self {
        Self { container, entity }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut T {
        &mut self.entity
    }

    pub fn data_mut(&mut self) -> &mut IdentifiableData {
        self.entity.data_mut()
    }

    /// Commits the entity and returns its id.
    pub fn add(self, network: &mut Network) -> GritResult<String> {
        let id = self.entity.id().to_string();
        network.ensure_unique(&id)?;
        self.entity.insert(&self.container, network)?;
        Ok(id)
    }
}

impl Network {
    /// Validates and adds an object to the given container.
    pub fn add<T: NetworkElement>(&mut self, container: Container, entity: T) -> GritResult<String> {
        Adder::new(container, entity).add(self)
    }

    pub fn add_subnetwork(&mut self, subnetwork: Subnetwork) -> GritResult<()> {
        self.ensure_unique(&subnetwork.data.id)?;
        let id = subnetwork.data.id.clone();
        self.subnetworks.push(subnetwork);
        self.register(id, Location::Subnetwork(self.subnetworks.len() - 1));
        Ok(())
    }

    pub fn add_voltage_angle_limit(&mut self, limit: VoltageAngleLimit) -> GritResult<()> {
        if self.voltage_angle_limits.iter().any(|l| l.id == limit.id) {
            return Err(GritError::Validation(format!(
                "Voltage angle limit '{}' already exists",
                limit.id
            )));
        }
        self.resolve_terminal(&limit.from)?;
        self.resolve_terminal(&limit.to)?;
        if limit.low_limit > limit.high_limit {
            return Err(GritError::Validation(format!(
                "Voltage angle limit '{}': low limit is greater than high limit",
                limit.id
            )));
        }
        self.voltage_angle_limits.push(limit);
        Ok(())
    }
}

fn target_network<'c>(
    container: &'c Container,
    kind: IdentifiableKind,
    id: &str,
    network: &Network,
) -> GritResult<Option<&'c String>> {
    match container {
        Container::Network(subnetwork) => {
            network.ensure_subnetwork(subnetwork.as_deref())?;
            Ok(subnetwork.as_ref())
        }
        other => Err(other.wrong_container(kind, id)),
    }
}

/// A branch owned by a sub-network may only reach voltage levels of that
/// sub-network. Root branches may join any of them.
fn check_scope(
    kind: IdentifiableKind,
    id: &str,
    subnetwork: Option<&String>,
    vl_index: usize,
    network: &Network,
) -> GritResult<()> {
    let Some(subnetwork) = subnetwork else {
        return Ok(());
    };
    let vl = &network.voltage_levels[vl_index];
    if vl.subnetwork.as_ref() != Some(subnetwork) {
        return Err(GritError::Validation(format!(
            "{} '{}': voltage level '{}' is outside sub-network '{}'",
            kind, id, vl.data.id, subnetwork
        )));
    }
    Ok(())
}

fn target_voltage_level(
    container: &Container,
    kind: IdentifiableKind,
    id: &str,
    network: &Network,
) -> GritResult<usize> {
    match container {
        Container::VoltageLevel(vl) => network.voltage_level_index(vl),
        other => Err(other.wrong_container(kind, id)),
    }
}

/// Validates an injection terminal and returns the voltage level index.
fn attach_injection(
    container: &Container,
    kind: IdentifiableKind,
    id: &str,
    terminal: &mut Terminal,
    network: &Network,
) -> GritResult<usize> {
    let vl_index = target_voltage_level(container, kind, id, network)?;
    let vl_id = &network.voltage_levels[vl_index].data.id;
    if terminal.voltage_level.is_empty() {
        terminal.voltage_level = vl_id.clone();
    } else if &terminal.voltage_level != vl_id {
        return Err(GritError::Validation(format!(
            "{} '{}': terminal voltage level '{}' differs from container '{}'",
            kind, id, terminal.voltage_level, vl_id
        )));
    }
    network.check_terminal(id, terminal)
}

impl NetworkElement for Substation {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        self.subnetwork = target_network(container, self.kind(), self.id(), network)?.cloned();
        let id = self.data.id.clone();
        network.substations.push(self);
        network.register(id, Location::Substation(network.substations.len() - 1));
        Ok(())
    }
}

impl NetworkElement for VoltageLevel {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        if !(self.nominal_v > 0.0) {
            return Err(GritError::Validation(format!(
                "Voltage level '{}': nominal voltage is invalid ({})",
                self.data.id, self.nominal_v
            )));
        }
        if self.low_voltage_limit > self.high_voltage_limit {
            return Err(GritError::Validation(format!(
                "Voltage level '{}': low voltage limit is greater than high voltage limit",
                self.data.id
            )));
        }
        match container {
            Container::Substation(s) => {
                let index = network.substation_index(s)?;
                self.substation = Some(s.clone());
                self.subnetwork = network.substations[index].subnetwork.clone();
            }
            Container::Network(subnetwork) => {
                network.ensure_subnetwork(subnetwork.as_deref())?;
                self.substation = None;
                self.subnetwork = subnetwork.clone();
            }
            other => return Err(other.wrong_container(self.kind(), self.id())),
        }
        let id = self.data.id.clone();
        network.voltage_levels.push(self);
        network.register(id, Location::VoltageLevel(network.voltage_levels.len() - 1));
        Ok(())
    }
}

impl NetworkElement for Bus {
    fn insert(self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = target_voltage_level(container, self.kind(), self.id(), network)?;
        let id = self.data.id.clone();
        let buses = &mut network.voltage_levels[v].buses;
        buses.push(self);
        let location = Location::Bus(v, buses.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for Switch {
    fn insert(self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = target_voltage_level(container, self.kind(), self.id(), network)?;
        let vl = &network.voltage_levels[v];
        for bus in [&self.bus1, &self.bus2] {
            if vl.bus(bus).is_none() {
                return Err(GritError::Validation(format!(
                    "Switch '{}': bus '{}' not found in voltage level '{}'",
                    self.data.id, bus, vl.data.id
                )));
            }
        }
        // tolerated at equipment level
        if self.is_self_loop() && network.validation_level == ValidationLevel::SteadyStateHypothesis {
            return Err(GritError::Validation(format!(
                "Switch '{}': both ends are connected to bus '{}'",
                self.data.id, self.bus1
            )));
        }
        let id = self.data.id.clone();
        let switches = &mut network.voltage_levels[v].switches;
        switches.push(self);
        let location = Location::Switch(v, switches.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for Generator {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = attach_injection(container, self.kind(), &self.data.id, &mut self.terminal, network)?;
        if self.min_p > self.max_p {
            return Err(GritError::Validation(format!(
                "Generator '{}': minimum P {} is greater than maximum P {}",
                self.data.id, self.min_p, self.max_p
            )));
        }
        if let ReactiveLimits::MinMax { min_q, max_q } = self.reactive_limits {
            if min_q > max_q {
                return Err(GritError::Validation(format!(
                    "Generator '{}': minimum Q {} is greater than maximum Q {}",
                    self.data.id, min_q, max_q
                )));
            }
        }
        if network.validation_level == ValidationLevel::SteadyStateHypothesis
            && self.voltage_regulator_on
            && !(self.target_v > 0.0)
        {
            return Err(GritError::Validation(format!(
                "Generator '{}': voltage regulation is on but target V is invalid",
                self.data.id
            )));
        }
        if let Some(reference) = &self.regulating_terminal {
            network.resolve_terminal(reference)?;
        }
        let id = self.data.id.clone();
        let generators = &mut network.voltage_levels[v].generators;
        generators.push(self);
        let location = Location::Generator(v, generators.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for Load {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = attach_injection(container, self.kind(), &self.data.id, &mut self.terminal, network)?;
        let id = self.data.id.clone();
        let loads = &mut network.voltage_levels[v].loads;
        loads.push(self);
        let location = Location::Load(v, loads.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for DanglingLine {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = attach_injection(container, self.kind(), &self.data.id, &mut self.terminal, network)?;
        self.tie_line = None;
        let id = self.data.id.clone();
        let dangling_lines = &mut network.voltage_levels[v].dangling_lines;
        dangling_lines.push(self);
        let location = Location::DanglingLine(v, dangling_lines.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for VscConverterStation {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        let v = attach_injection(container, self.kind(), &self.data.id, &mut self.terminal, network)?;
        if !(0.0..=100.0).contains(&self.loss_factor) {
            return Err(GritError::Validation(format!(
                "VSC converter station '{}': loss factor must be a percentage",
                self.data.id
            )));
        }
        let id = self.data.id.clone();
        let stations = &mut network.voltage_levels[v].vsc_converter_stations;
        stations.push(self);
        let location = Location::VscConverterStation(v, stations.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for Line {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        self.subnetwork = target_network(container, self.kind(), self.id(), network)?.cloned();
        for terminal in [&self.terminal1, &self.terminal2] {
            let v = network.check_terminal(&self.data.id, terminal)?;
            check_scope(self.kind(), &self.data.id, self.subnetwork.as_ref(), v, network)?;
        }
        let id = self.data.id.clone();
        network.lines.push(self);
        network.register(id, Location::Line(network.lines.len() - 1));
        Ok(())
    }
}

impl NetworkElement for TwoWindingsTransformer {
    fn insert(self, container: &Container, network: &mut Network) -> GritResult<()> {
        let substation = match container {
            Container::Substation(s) => s,
            other => return Err(other.wrong_container(self.kind(), self.id())),
        };
        let s = network.substation_index(substation)?;
        for terminal in [&self.terminal1, &self.terminal2] {
            let v = network.check_terminal(&self.data.id, terminal)?;
            if network.voltage_levels[v].substation.as_deref() != Some(substation.as_str()) {
                return Err(GritError::Validation(format!(
                    "Two windings transformer '{}': voltage level '{}' is not in substation '{}'",
                    self.data.id, terminal.voltage_level, substation
                )));
            }
        }
        let id = self.data.id.clone();
        let transformers = &mut network.substations[s].two_windings_transformers;
        transformers.push(self);
        let location = Location::TwoWindingsTransformer(s, transformers.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

impl NetworkElement for TieLine {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        self.subnetwork = target_network(container, self.kind(), self.id(), network)?.cloned();
        if self.dangling_line1 == self.dangling_line2 {
            return Err(GritError::Validation(format!(
                "Tie line '{}': both halves are the same dangling line",
                self.data.id
            )));
        }
        let mut halves = Vec::with_capacity(2);
        for dl_id in [&self.dangling_line1, &self.dangling_line2] {
            match network.index.get(dl_id.as_str()) {
                Some(Location::DanglingLine(v, i)) => {
                    let dl = &network.voltage_levels[*v].dangling_lines[*i];
                    if let Some(other) = &dl.tie_line {
                        return Err(GritError::Validation(format!(
                            "Tie line '{}': dangling line '{}' already paired in '{}'",
                            self.data.id, dl_id, other
                        )));
                    }
                    check_scope(self.kind(), &self.data.id, self.subnetwork.as_ref(), *v, network)?;
                    halves.push((*v, *i));
                }
                _ => {
                    return Err(GritError::Validation(format!(
                        "Tie line '{}': dangling line '{}' not found",
                        self.data.id, dl_id
                    )))
                }
            }
        }
        let id = self.data.id.clone();
        for (v, i) in halves {
            network.voltage_levels[v].dangling_lines[i].tie_line = Some(id.clone());
        }
        network.tie_lines.push(self);
        network.register(id, Location::TieLine(network.tie_lines.len() - 1));
        Ok(())
    }
}

impl NetworkElement for HvdcLine {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        self.subnetwork = target_network(container, self.kind(), self.id(), network)?.cloned();
        for station in [&self.converter_station1, &self.converter_station2] {
            let Some(Location::VscConverterStation(v, _)) = network.index.get(station.as_str()) else {
                return Err(GritError::Validation(format!(
                    "HVDC line '{}': converter station '{}' not found",
                    self.data.id, station
                )));
            };
            check_scope(self.kind(), &self.data.id, self.subnetwork.as_ref(), *v, network)?;
        }
        let id = self.data.id.clone();
        network.hvdc_lines.push(self);
        network.register(id, Location::HvdcLine(network.hvdc_lines.len() - 1));
        Ok(())
    }
}

impl NetworkElement for OverloadManagementSystem {
    fn insert(mut self, container: &Container, network: &mut Network) -> GritResult<()> {
        let substation = match container {
            Container::Substation(s) => s,
            other => return Err(other.wrong_container(self.kind(), self.id())),
        };
        let s = network.substation_index(substation)?;
        let is_branch = |id: &str| network.kind_of(id).is_some_and(IdentifiableKind::is_branch);
        if !is_branch(&self.monitored_element_id) {
            return Err(GritError::Validation(format!(
                "Overload management system '{}': monitored element '{}' not found",
                self.data.id, self.monitored_element_id
            )));
        }
        let mut keys = HashSet::new();
        for tripping in &self.trippings {
            if !keys.insert(tripping.key.as_str()) {
                return Err(GritError::Validation(format!(
                    "Overload management system '{}': duplicate tripping key '{}'",
                    self.data.id, tripping.key
                )));
            }
            let found = match &tripping.target {
                TrippingTarget::Switch { switch_id } => network.switch(switch_id).is_some(),
                TrippingTarget::Branch { branch_id, .. } => is_branch(branch_id),
            };
            if !found {
                return Err(GritError::Validation(format!(
                    "Overload management system '{}': target of tripping '{}' not found",
                    self.data.id, tripping.key
                )));
            }
        }
        self.substation = substation.clone();
        let id = self.data.id.clone();
        let systems = &mut network.substations[s].overload_management_systems;
        systems.push(self);
        let location = Location::OverloadManagementSystem(s, systems.len() - 1);
        network.register(id, location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> GritResult<Network> {
        let mut network = Network::new("N", "test");
        network.add(Container::root(), Substation::new("S1"))?;
        network.add(Container::substation("S1"), VoltageLevel::new("VL1", 400.0))?;
        network.add(Container::substation("S1"), VoltageLevel::new("VL2", 225.0))?;
        for (vl, bus) in [("VL1", "B1"), ("VL1", "B2"), ("VL2", "B3")] {
            network.add(Container::voltage_level(vl), Bus::new(bus))?;
        }
        Ok(network)
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut network = base().unwrap();
        let err = network
            .add(Container::voltage_level("VL1"), Bus::new("B1"))
            .unwrap_err();
        assert!(err.to_string().contains("already contains"));
    }

    #[test]
    fn test_switch_self_loop_rejected() {
        let mut network = base().unwrap();
        let err = network
            .add(Container::voltage_level("VL1"), Switch::new("SW", "B1", "B1"))
            .unwrap_err();
        assert!(matches!(err, GritError::Validation(_)));
        assert!(!network.contains("SW"));

        network.validation_level = ValidationLevel::Equipment;
        network
            .add(Container::voltage_level("VL1"), Switch::new("SW", "B1", "B1"))
            .unwrap();
        assert!(network.switch("SW").unwrap().is_self_loop());
    }

    #[test]
    fn test_injection_bus_must_exist() {
        let mut network = base().unwrap();
        let err = network
            .add(
                Container::voltage_level("VL1"),
                Load::new("L1", Terminal::new("VL1", "B3"), 1.0, 0.0),
            )
            .unwrap_err();
        assert!(err.to_string().contains("bus 'B3' not found"));
    }

    #[test]
    fn test_injection_terminal_voltage_level_filled_in() {
        let mut network = base().unwrap();
        network
            .add(
                Container::voltage_level("VL2"),
                Load::new("L1", Terminal::new("", "B3"), 1.0, 0.0),
            )
            .unwrap();
        assert_eq!(network.load("L1").unwrap().terminal.voltage_level, "VL2");
    }

    #[test]
    fn test_transformer_sides_in_substation() {
        let mut network = base().unwrap();
        network
            .add(
                Container::substation("S1"),
                TwoWindingsTransformer::new("T1", Terminal::new("VL1", "B1"), Terminal::new("VL2", "B3")),
            )
            .unwrap();
        assert_eq!(network.substation("S1").unwrap().two_windings_transformers().len(), 1);
    }

    #[test]
    fn test_tie_line_pairs_dangling_lines_once() {
        let mut network = base().unwrap();
        for (id, vl, bus) in [("DL1", "VL1", "B1"), ("DL2", "VL2", "B3")] {
            network
                .add(Container::voltage_level(vl), DanglingLine::new(id, Terminal::new(vl, bus)))
                .unwrap();
        }
        network
            .add(Container::root(), TieLine::new("TL", "DL1", "DL2"))
            .unwrap();
        assert_eq!(network.dangling_line("DL1").unwrap().tie_line.as_deref(), Some("TL"));

        let err = network
            .add(Container::root(), TieLine::new("TL2", "DL1", "DL2"))
            .unwrap_err();
        assert!(err.to_string().contains("already paired"));
    }

    #[test]
    fn test_overload_management_system_requires_branch() {
        let mut network = base().unwrap();
        let oms = OverloadManagementSystem::new("OMS", "LINE", Side::One);
        assert!(network.add(Container::substation("S1"), oms.clone()).is_err());

        network
            .add(
                Container::root(),
                Line::new("LINE", Terminal::new("VL1", "B1"), Terminal::new("VL2", "B3")),
            )
            .unwrap();
        network.add(Container::substation("S1"), oms).unwrap();
        assert!(network.overload_management_system("OMS").is_some());
    }

    #[test]
    fn test_voltage_level_in_missing_subnetwork() {
        let mut network = base().unwrap();
        let err = network
            .add(Container::subnetwork("SUB"), VoltageLevel::new("VL3", 63.0))
            .unwrap_err();
        assert!(err.to_string().contains("Subnetwork 'SUB' not found"));
    }

    #[test]
    fn test_subnetwork_branch_stays_in_scope() {
        let mut network = base().unwrap();
        network.add_subnetwork(Subnetwork::new("SUB", "test")).unwrap();
        network
            .add(Container::subnetwork("SUB"), VoltageLevel::new("VL3", 400.0))
            .unwrap();
        network.add(Container::voltage_level("VL3"), Bus::new("B4")).unwrap();

        let across = Line::new("L", Terminal::new("VL1", "B1"), Terminal::new("VL3", "B4"));
        let err = network
            .add(Container::subnetwork("SUB"), across.clone())
            .unwrap_err();
        assert!(matches!(err, GritError::Validation(_)));
        assert!(err.to_string().contains("outside sub-network 'SUB'"));
        assert!(network.line("L").is_none());

        network.add(Container::root(), across).unwrap();
        assert_eq!(network.line("L").unwrap().subnetwork, None);
    }
}
