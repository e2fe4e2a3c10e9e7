//! Scheduling policies: the algorithms that decide, each step, how to split
//! available power across connected vehicles (and the stationary battery, if
//! present) under hardware, SOC and storage constraints.

use std::collections::HashMap;

use crate::battery::EvBattery;
use crate::infrastructure::{CpAssignment, InfrastructureTree, NodeId};
use crate::units::floor3;
use crate::vehicle::{ConnectedVehicleState, VehicleType};

/// Tagged schedule-kind selector, replacing the source's keyword-driven
/// policy lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleKind {
    Uncontrolled,
    Fcfs,
    DiscriminationFree { df_charging_period_seconds: f64 },
    WithStorage,
    Optimized,
}

/// Power assigned to every busy CP plus the signed storage power for this
/// step. Positive storage power charges the storage; negative discharges it.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub cps: CpAssignment,
    pub storage_power_kw: f64,
}

/// Everything a policy needs to read about a single busy CP: its node id,
/// connected state, and the vehicle type's battery.
pub struct BusyCp<'a> {
    pub cp_id: NodeId,
    pub connected: &'a ConnectedVehicleState,
    pub battery: &'a EvBattery,
}

fn power_to_full(connected: &ConnectedVehicleState, battery: &EvBattery, dt_hours: f64) -> f64 {
    (0.0f64).max((connected.soc_target - connected.soc) * battery.capacity_kwh / dt_hours)
}

/// Per-step fairness bookkeeping for the Discrimination-Free policy, keyed by
/// `(cp_id, event_id)`. Lives across steps on the simulator, owned by
/// whichever call site dispatches [`ScheduleKind::DiscriminationFree`].
#[derive(Debug, Clone, Default)]
pub struct DfState {
    times_charged: HashMap<(NodeId, u64), u64>,
}

impl DfState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops counters for CPs no longer present; resets counters for CPs
    /// whose connected event changed; inserts fresh counters for new CPs.
    fn sync(&mut self, busy: &[BusyCp<'_>]) {
        let live: HashMap<NodeId, u64> = busy
            .iter()
            .map(|b| (b.cp_id, b.connected.event_id))
            .collect();
        self.times_charged
            .retain(|(cp_id, event_id), _| live.get(cp_id) == Some(event_id));
        for b in busy {
            self.times_charged
                .entry((b.cp_id, b.connected.event_id))
                .or_insert(0);
        }
    }

    /// `sub = min_tc - (min_tc mod window)`, subtracted from every counter to
    /// prevent unbounded growth without disturbing relative ordering.
    fn rebase(&mut self, window: u64) {
        let Some(&min_tc) = self.times_charged.values().min() else {
            return;
        };
        let sub = min_tc - (min_tc % window);
        if sub == 0 {
            return;
        }
        for v in self.times_charged.values_mut() {
            *v -= sub;
        }
    }

    fn get(&self, cp_id: NodeId, event_id: u64) -> u64 {
        self.times_charged.get(&(cp_id, event_id)).copied().unwrap_or(0)
    }

    fn increment(&mut self, cp_id: NodeId, event_id: u64) {
        *self.times_charged.entry((cp_id, event_id)).or_insert(0) += 1;
    }
}

/// Runs the common capacity walk from `cp_id` up to the Transformer: caps at
/// every station's residual, and at the Transformer by residual plus
/// available storage discharge net of `storage_used_so_far_kw`.
fn capacity_walk(
    tree: &InfrastructureTree,
    busy: &BusyCp<'_>,
    assignment: &CpAssignment,
    preload_kw: f64,
    storage_used_so_far_kw: f64,
    dt_hours: f64,
) -> f64 {
    tree.capacity_walk(
        busy.cp_id,
        busy.connected,
        busy.battery,
        assignment,
        preload_kw,
        storage_used_so_far_kw,
        dt_hours,
    )
}

/// Ignores station/transformer bounds entirely: every busy CP gets
/// `min(P_max(soc), power_to_full, cp.max_power)`. If the unconstrained total
/// would exceed the transformer's `max_power`, the excess is recorded as a
/// storage discharge so load-shedding can still be measured — the storage
/// itself is never consulted for capacity under this policy.
pub fn schedule_uncontrolled(
    tree: &InfrastructureTree,
    busy: &[BusyCp<'_>],
    dt_hours: f64,
) -> Assignment {
    let mut cps = CpAssignment::new();
    let mut total = 0.0;
    for b in busy {
        let hw = tree.max_hardware_power_local(b.cp_id, b.connected, b.battery);
        let full = power_to_full(b.connected, b.battery, dt_hours);
        let cp_max = tree.node(b.cp_id).max_power_kw;
        let p = floor3(hw.min(full).min(cp_max));
        cps.insert(b.cp_id, p);
        total += p;
    }

    let transformer_max = tree.node(tree.root).max_power_kw;
    let overflow = total - transformer_max;
    let storage_power_kw = if overflow > 1e-9 {
        match tree.storage_battery() {
            Some(battery) => {
                let max_discharge = battery.max_discharge_power(0.0, dt_hours);
                -max_discharge.min(overflow)
            }
            None => 0.0,
        }
    } else {
        0.0
    };

    Assignment { cps, storage_power_kw }
}

/// Sorts busy CPs by ascending `leaving_time` and greedily fills each in
/// order, debiting any excess over the transformer's *initial* residual from
/// the storage (recorded as negative storage power).
pub fn schedule_fcfs(
    tree: &InfrastructureTree,
    busy: &[BusyCp<'_>],
    dt_hours: f64,
    preload_kw: f64,
) -> Assignment {
    let mut order: Vec<&BusyCp<'_>> = busy.iter().collect();
    order.sort_by(|a, b| a.connected.leaving_time.partial_cmp(&b.connected.leaving_time).unwrap());
    fill_in_order(tree, &order, dt_hours, preload_kw)
}

fn fill_in_order(
    tree: &InfrastructureTree,
    order: &[&BusyCp<'_>],
    dt_hours: f64,
    preload_kw: f64,
) -> Assignment {
    let mut cps = CpAssignment::new();
    let initial_residual = tree.residual(tree.root, &cps, preload_kw);
    let mut storage_used_so_far = 0.0;
    let mut cumulative = 0.0;

    for b in order {
        let cap = capacity_walk(tree, b, &cps, preload_kw, storage_used_so_far, dt_hours);
        let full = power_to_full(b.connected, b.battery, dt_hours);
        let p = cap.min(floor3(full));
        cps.insert(b.cp_id, p);
        cumulative += p;
        if cumulative > initial_residual {
            storage_used_so_far = (cumulative - initial_residual).max(storage_used_so_far);
        }
    }

    let storage_power_kw = if storage_used_so_far > 1e-9 {
        -storage_used_so_far
    } else {
        0.0
    };

    Assignment { cps, storage_power_kw }
}

/// Discrimination-Free: rotates priority within a `W`-step fairness window so
/// every connected vehicle receives (within integer rounding) the same
/// number of full-charge-attempt steps.
pub fn schedule_discrimination_free(
    tree: &InfrastructureTree,
    busy: &[BusyCp<'_>],
    dt_hours: f64,
    preload_kw: f64,
    df_charging_period_seconds: f64,
    state: &mut DfState,
) -> Assignment {
    let window = ((df_charging_period_seconds / (dt_hours * 3600.0)).max(1.0)).floor() as u64;
    let window = window.max(1);

    state.sync(busy);
    state.rebase(window);

    let mut order: Vec<&BusyCp<'_>> = busy.iter().collect();
    order.sort_by(|a, b| {
        let ta = state.get(a.cp_id, a.connected.event_id) as f64 / window as f64;
        let tb = state.get(b.cp_id, b.connected.event_id) as f64 / window as f64;
        let phase_a = ta.fract();
        let phase_b = tb.fract();
        // (times_charged / W) mod 1 descending, then times_charged / W ascending.
        phase_b
            .partial_cmp(&phase_a)
            .unwrap()
            .then(ta.partial_cmp(&tb).unwrap())
    });

    let mut cps = CpAssignment::new();
    let initial_residual = tree.residual(tree.root, &cps, preload_kw);
    let mut storage_used_so_far = 0.0;
    let mut cumulative = 0.0;

    for b in &order {
        let cap = capacity_walk(tree, b, &cps, preload_kw, storage_used_so_far, dt_hours);
        let full = power_to_full(b.connected, b.battery, dt_hours);
        let p = cap.min(floor3(full));
        cps.insert(b.cp_id, p);
        cumulative += p;
        if cumulative > initial_residual {
            storage_used_so_far = (cumulative - initial_residual).max(storage_used_so_far);
        }

        let hw = tree.max_hardware_power_local(b.cp_id, b.connected, b.battery);
        let car_limited = p >= floor3(full) - 1e-9;
        let hardware_limited = p >= hw - 1e-9;
        if car_limited || hardware_limited {
            state.increment(b.cp_id, b.connected.event_id);
        }
    }

    let storage_power_kw = if storage_used_so_far > 1e-9 {
        -storage_used_so_far
    } else {
        0.0
    };

    Assignment { cps, storage_power_kw }
}

/// Specification-level no-op: assigns zero power everywhere. A later
/// implementation could plug a market-aware or storage-aware optimizer in
/// here without changing the dispatch signature.
pub fn schedule_stub(busy: &[BusyCp<'_>]) -> Assignment {
    let mut cps = CpAssignment::new();
    for b in busy {
        cps.insert(b.cp_id, 0.0);
    }
    Assignment { cps, storage_power_kw: 0.0 }
}

/// Dispatches to the policy named by `kind`.
#[allow(clippy::too_many_arguments)]
pub fn schedule(
    kind: ScheduleKind,
    tree: &InfrastructureTree,
    busy: &[BusyCp<'_>],
    dt_hours: f64,
    preload_kw: f64,
    df_state: &mut DfState,
) -> Assignment {
    match kind {
        ScheduleKind::Uncontrolled => schedule_uncontrolled(tree, busy, dt_hours),
        ScheduleKind::Fcfs => schedule_fcfs(tree, busy, dt_hours, preload_kw),
        ScheduleKind::DiscriminationFree { df_charging_period_seconds } => {
            schedule_discrimination_free(tree, busy, dt_hours, preload_kw, df_charging_period_seconds, df_state)
        }
        ScheduleKind::WithStorage | ScheduleKind::Optimized => schedule_stub(busy),
    }
}

/// Looks up a vehicle type's battery by index, as stored on
/// [`ConnectedVehicleState::vehicle_type`].
pub fn battery_for<'a>(vehicle_types: &'a [VehicleType], index: usize) -> &'a EvBattery {
    &vehicle_types[index].battery
}
