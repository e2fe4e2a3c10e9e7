//! Rooted electrical infrastructure tree: Transformer -> Charging Stations ->
//! Charging Points, with an optional Storage sibling under the Transformer.
//!
//! Nodes live in a single arena (`Vec<Node>`) addressed by `NodeId` so that
//! parent/child references never need `Rc`/`RefCell` cycles.

use std::collections::HashMap;

use crate::battery::StationaryBattery;
use crate::units::floor3;
use crate::vehicle::ConnectedVehicleState;

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodeKind {
    Transformer,
    Station,
    ChargingPoint { connected: Option<ConnectedVehicleState> },
    Storage { battery: StationaryBattery },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
    /// CP leaves beneath this node, precomputed after the tree is built. Excludes Storage.
    pub cp_leaves: Vec<NodeId>,
}

/// Nested scenario-level description used to build the tree.
pub struct ChargingPointSpec {
    pub min_power_kw: f64,
    pub max_power_kw: f64,
}

pub struct StationSpec {
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub charging_points: Vec<ChargingPointSpec>,
}

pub struct StorageSpec {
    pub battery: StationaryBattery,
    pub min_power_kw: f64,
    pub max_power_kw: f64,
}

pub struct TransformerSpec {
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub stations: Vec<StationSpec>,
    pub storage: Option<StorageSpec>,
}

/// An assignment of power to every CP, used while walking parent caps.
pub type CpAssignment = HashMap<NodeId, f64>;

pub struct InfrastructureTree {
    nodes: Vec<Node>,
    pub root: NodeId,
    pub storage: Option<NodeId>,
    /// Every Charging Point leaf, in build order.
    pub charging_points: Vec<NodeId>,
}

impl InfrastructureTree {
    pub fn build(spec: TransformerSpec) -> Self {
        let mut nodes = Vec::new();
        let mut charging_points = Vec::new();

        let root_id = 0;
        nodes.push(Node {
            id: root_id,
            min_power_kw: spec.min_power_kw,
            max_power_kw: spec.max_power_kw,
            parent: None,
            children: Vec::new(),
            kind: NodeKind::Transformer,
            cp_leaves: Vec::new(),
        });

        for station in spec.stations {
            let station_id = nodes.len();
            nodes.push(Node {
                id: station_id,
                min_power_kw: station.min_power_kw,
                max_power_kw: station.max_power_kw,
                parent: Some(root_id),
                children: Vec::new(),
                kind: NodeKind::Station,
                cp_leaves: Vec::new(),
            });
            nodes[root_id].children.push(station_id);

            for cp in station.charging_points {
                let cp_id = nodes.len();
                nodes.push(Node {
                    id: cp_id,
                    min_power_kw: cp.min_power_kw,
                    max_power_kw: cp.max_power_kw,
                    parent: Some(station_id),
                    children: Vec::new(),
                    kind: NodeKind::ChargingPoint { connected: None },
                    cp_leaves: Vec::new(),
                });
                nodes[station_id].children.push(cp_id);
                charging_points.push(cp_id);
            }
        }

        let storage = spec.storage.map(|s| {
            let storage_id = nodes.len();
            nodes.push(Node {
                id: storage_id,
                min_power_kw: s.min_power_kw,
                max_power_kw: s.max_power_kw,
                parent: Some(root_id),
                children: Vec::new(),
                kind: NodeKind::Storage { battery: s.battery },
                cp_leaves: Vec::new(),
            });
            nodes[root_id].children.push(storage_id);
            storage_id
        });

        let mut tree = Self {
            nodes,
            root: root_id,
            storage,
            charging_points,
        };
        tree.cache_leaves();
        tree
    }

    /// Precomputes, for every internal node, the CP leaves beneath it
    /// (excluding Storage).
    fn cache_leaves(&mut self) {
        fn collect(nodes: &[Node], id: NodeId) -> Vec<NodeId> {
            match &nodes[id].kind {
                NodeKind::ChargingPoint { .. } => vec![id],
                NodeKind::Storage { .. } => vec![],
                NodeKind::Transformer | NodeKind::Station => nodes[id]
                    .children
                    .iter()
                    .flat_map(|&c| collect(nodes, c))
                    .collect(),
            }
        }
        let ids: Vec<NodeId> = (0..self.nodes.len()).collect();
        for id in ids {
            self.nodes[id].cp_leaves = collect(&self.nodes, id);
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn connected(&self, cp_id: NodeId) -> Option<&ConnectedVehicleState> {
        match &self.nodes[cp_id].kind {
            NodeKind::ChargingPoint { connected } => connected.as_ref(),
            _ => None,
        }
    }

    pub fn connect(&mut self, cp_id: NodeId, state: ConnectedVehicleState) {
        if let NodeKind::ChargingPoint { connected } = &mut self.nodes[cp_id].kind {
            *connected = Some(state);
        }
    }

    pub fn disconnect(&mut self, cp_id: NodeId) -> Option<ConnectedVehicleState> {
        if let NodeKind::ChargingPoint { connected } = &mut self.nodes[cp_id].kind {
            connected.take()
        } else {
            None
        }
    }

    pub fn storage_battery(&self) -> Option<&StationaryBattery> {
        self.storage.map(|id| match &self.nodes[id].kind {
            NodeKind::Storage { battery } => battery,
            _ => unreachable!(),
        })
    }

    pub fn storage_battery_mut(&mut self) -> Option<&mut StationaryBattery> {
        self.storage.map(move |id| match &mut self.nodes[id].kind {
            NodeKind::Storage { battery } => battery,
            _ => unreachable!(),
        })
    }

    /// `min(cp.max_power, battery's SOC-dependent P_max)`.
    pub fn max_hardware_power_local(&self, cp_id: NodeId, connected: &ConnectedVehicleState, battery: &crate::battery::EvBattery) -> f64 {
        let node = &self.nodes[cp_id];
        node.max_power_kw.min(battery.max_power_at_soc(connected.soc))
    }

    /// `max(cp.min_power, battery.min_charge_power)`.
    pub fn min_hardware_power_local(&self, cp_id: NodeId, battery: &crate::battery::EvBattery) -> f64 {
        let node = &self.nodes[cp_id];
        node.min_power_kw.max(battery.min_charge_power_kw)
    }

    /// `power_to_charge_target = max(0, (soc_target - soc) * capacity / dt)`.
    pub fn power_to_charge_target(connected: &ConnectedVehicleState, capacity_kwh: f64, dt_hours: f64) -> f64 {
        (0.0f64).max((connected.soc_target - connected.soc) * capacity_kwh / dt_hours)
    }

    /// `max(0, node.max_power - preload - sum of assigned CP leaf powers)`.
    /// `preload` should be 0 for every node except the Transformer.
    pub fn residual(&self, node_id: NodeId, assignment: &CpAssignment, preload: f64) -> f64 {
        let node = &self.nodes[node_id];
        let used: f64 = node
            .cp_leaves
            .iter()
            .map(|cp| assignment.get(cp).copied().unwrap_or(0.0))
            .sum();
        floor3((node.max_power_kw - preload - used).max(0.0))
    }

    /// Walks from `cp_id` up to the Transformer, capping available power at
    /// every station by its residual, and at the Transformer by residual
    /// plus available storage discharge.
    pub fn capacity_walk(
        &self,
        cp_id: NodeId,
        connected: &ConnectedVehicleState,
        battery: &crate::battery::EvBattery,
        assignment: &CpAssignment,
        preload: f64,
        storage_used_so_far_kw: f64,
        dt_hours: f64,
    ) -> f64 {
        let mut cap = self.max_hardware_power_local(cp_id, connected, battery);
        let mut parent = self.nodes[cp_id].parent;
        while let Some(pid) = parent {
            let node = &self.nodes[pid];
            match node.kind {
                NodeKind::Transformer => {
                    let r_t = self.residual(pid, assignment, preload);
                    let r_s = self
                        .storage_battery()
                        .map(|b| b.max_discharge_power(storage_used_so_far_kw, dt_hours))
                        .unwrap_or(0.0);
                    cap = cap.min(floor3(r_t + r_s));
                }
                _ => {
                    cap = cap.min(self.residual(pid, assignment, 0.0));
                }
            }
            parent = node.parent;
        }
        cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::EvBattery;

    fn simple_tree(station_max: f64, cp_max: f64) -> InfrastructureTree {
        InfrastructureTree::build(TransformerSpec {
            min_power_kw: 0.0,
            max_power_kw: 1000.0,
            stations: vec![StationSpec {
                min_power_kw: 0.0,
                max_power_kw: station_max,
                charging_points: vec![
                    ChargingPointSpec { min_power_kw: 0.0, max_power_kw: cp_max },
                    ChargingPointSpec { min_power_kw: 0.0, max_power_kw: cp_max },
                ],
            }],
            storage: None,
        })
    }

    #[test]
    fn residual_subtracts_assigned_leaves() {
        let tree = simple_tree(10.0, 10.0);
        let station_id = 1;
        let cp_a = tree.charging_points[0];
        let mut assignment = CpAssignment::new();
        assignment.insert(cp_a, 4.0);
        assert_eq!(tree.residual(station_id, &assignment, 0.0), 6.0);
    }

    #[test]
    fn capacity_walk_caps_at_station_residual() {
        let tree = simple_tree(10.0, 100.0);
        let cp_a = tree.charging_points[0];
        let cp_b = tree.charging_points[1];
        let battery = EvBattery::new(50.0, 50.0, 0.0, 1.0, 1.0, 1.0);
        let connected = ConnectedVehicleState {
            event_id: 1,
            vehicle_type: 0,
            soc: 0.0,
            soc_target: 1.0,
            leaving_time: 100.0,
        };
        let mut assignment = CpAssignment::new();
        assignment.insert(cp_a, 6.0);
        let cap = tree.capacity_walk(cp_b, &connected, &battery, &assignment, 0.0, 0.0, 1.0);
        assert_eq!(cap, 4.0);
    }

    #[test]
    fn cp_leaves_exclude_storage() {
        let battery = StationaryBattery::new(10.0, 5.0, 0.0, 5.0, 1.0, 1.0, 1.0, 0.5, 0.0);
        let tree = InfrastructureTree::build(TransformerSpec {
            min_power_kw: 0.0,
            max_power_kw: 100.0,
            stations: vec![StationSpec {
                min_power_kw: 0.0,
                max_power_kw: 50.0,
                charging_points: vec![ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 20.0 }],
            }],
            storage: Some(StorageSpec { battery, min_power_kw: 0.0, max_power_kw: 5.0 }),
        });
        let root_leaves = &tree.node(tree.root).cp_leaves;
        assert_eq!(root_leaves.len(), 1);
        assert!(tree.storage.is_some());
    }
}
