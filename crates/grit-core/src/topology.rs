//! Bus-branch view of a bus-breaker voltage level.
//!
//! Buses joined by closed switches are electrically the same node. The view
//! merges them with a union-find over the switch graph, giving each merged
//! bus the id `<voltage level>_<n>` in first-member order.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;

use crate::equipment::VoltageLevel;

/// A set of bus-breaker buses seen as one node.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedBus {
    pub id: String,
    pub v: f64,
    pub angle: f64,
    /// Ids of the bus-breaker buses merged into this bus.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BusBranchView {
    buses: Vec<MergedBus>,
    mapping: HashMap<String, usize>,
}

impl BusBranchView {
    pub fn buses(&self) -> &[MergedBus] {
        &self.buses
    }

    /// Id of the merged bus a bus-breaker bus belongs to.
    pub fn merged_bus_id(&self, bus: &str) -> Option<&str> {
        self.mapping.get(bus).map(|&i| self.buses[i].id.as_str())
    }
}

/// Computes the bus-branch view of a voltage level.
pub fn bus_branch_view(vl: &VoltageLevel) -> BusBranchView {
    let buses = vl.buses();
    let position: HashMap<&str, usize> = buses
        .iter()
        .enumerate()
        .map(|(i, b)| (b.data.id.as_str(), i))
        .collect();

    let mut sets = UnionFind::<usize>::new(buses.len());
    for switch in vl.switches().iter().filter(|s| !s.open) {
        if let (Some(&a), Some(&b)) = (
            position.get(switch.bus1.as_str()),
            position.get(switch.bus2.as_str()),
        ) {
            sets.union(a, b);
        }
    }

    let mut view = BusBranchView::default();
    let mut by_root: HashMap<usize, usize> = HashMap::new();
    for (i, bus) in buses.iter().enumerate() {
        let root = sets.find(i);
        let merged = *by_root.entry(root).or_insert_with(|| {
            view.buses.push(MergedBus {
                id: format!("{}_{}", vl.data.id, view.buses.len()),
                v: f64::NAN,
                angle: f64::NAN,
                members: Vec::new(),
            });
            view.buses.len() - 1
        });
        let target = &mut view.buses[merged];
        if target.v.is_nan() {
            target.v = bus.v;
        }
        if target.angle.is_nan() {
            target.angle = bus.angle;
        }
        target.members.push(bus.data.id.clone());
        view.mapping.insert(bus.data.id.clone(), merged);
    }
    view
}
