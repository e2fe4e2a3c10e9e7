//! The discrete-event time-stepped simulator loop: queue management,
//! connect/disconnect lifecycle, and per-step invocation of the scheduler.

use std::collections::HashSet;

use tracing::info;

use crate::error::DomainError;
use crate::infrastructure::{InfrastructureTree, NodeId};
use crate::queue::WaitingQueue;
use crate::result::ResultStore;
use crate::schedule::{self, Assignment, BusyCp, DfState, ScheduleKind};
use crate::sim::clock::SimClock;
use crate::units::floor3;
use crate::vehicle::{ChargingEvent, ConnectedVehicleState, VehicleType};

/// Everything the simulator loop owns for one run: the infrastructure tree,
/// the sorted arrival process, the waiting queue, and the result store it
/// writes into.
pub struct Simulator<'a> {
    tree: InfrastructureTree,
    vehicle_types: &'a [VehicleType],
    clock: SimClock,
    events: Vec<ChargingEvent>,
    next_event_idx: usize,
    queue: WaitingQueue,
    disconnect_by_time: bool,
    preload_kw: Vec<f64>,
    schedule_kind: ScheduleKind,
    df_state: DfState,
    result: ResultStore,
}

impl<'a> Simulator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: InfrastructureTree,
        vehicle_types: &'a [VehicleType],
        clock: SimClock,
        mut events: Vec<ChargingEvent>,
        queue_capacity: usize,
        disconnect_by_time: bool,
        preload_kw: Vec<f64>,
        schedule_kind: ScheduleKind,
    ) -> Self {
        events.sort_by(|a, b| a.arrival_time.partial_cmp(&b.arrival_time).unwrap());
        assert_eq!(preload_kw.len(), clock.step_count, "preload must already be aligned to step_count");
        Self {
            tree,
            vehicle_types,
            clock,
            events,
            next_event_idx: 0,
            queue: WaitingQueue::new(queue_capacity),
            disconnect_by_time,
            preload_kw,
            schedule_kind,
            df_state: DfState::new(),
            result: ResultStore::new(0, 0.0),
        }
    }

    fn free_cps(&self) -> Vec<NodeId> {
        self.tree
            .charging_points
            .iter()
            .copied()
            .filter(|&cp| self.tree.connected(cp).is_none())
            .collect()
    }

    fn busy_states(&self) -> Vec<(NodeId, ConnectedVehicleState)> {
        self.tree
            .charging_points
            .iter()
            .copied()
            .filter_map(|cp| self.tree.connected(cp).map(|c| (cp, c.clone())))
            .collect()
    }

    fn battery_for(&self, vehicle_type: usize) -> &crate::battery::EvBattery {
        schedule::battery_for(self.vehicle_types, vehicle_type)
    }

    /// Disconnects every CP whose connected vehicle satisfies the disconnect
    /// condition selected by `disconnect_by_time` (parking-time elapsed when
    /// true, SOC target reached when false), freeing it. If the waiting
    /// queue is non-empty, immediately connects the head event to the
    /// just-freed CP.
    fn run_cp_lifecycle(&mut self, now_seconds: f64) {
        let busy: Vec<NodeId> = self.busy_states().into_iter().map(|(cp, _)| cp).collect();
        for cp in busy {
            let should_disconnect = {
                let state = self.tree.connected(cp).unwrap();
                if self.disconnect_by_time {
                    state.leaving_time <= now_seconds
                } else {
                    round3(state.soc) >= state.soc_target
                }
            };
            if should_disconnect {
                self.tree.disconnect(cp);
                if let Some(event) = self.queue.dequeue() {
                    self.tree.connect(cp, ConnectedVehicleState::from_event(&event));
                }
            }
        }
    }

    /// Connects or enqueues every event whose `arrival_time` matches `T_i`,
    /// counting a rejection when neither is possible.
    fn admit_arrivals(&mut self, now_seconds: f64, site_open: bool) {
        while self.next_event_idx < self.events.len()
            && self.events[self.next_event_idx].arrival_time == now_seconds
        {
            let event = self.events[self.next_event_idx].clone();
            self.next_event_idx += 1;

            let free = self.free_cps();
            if site_open {
                if let Some(&cp) = free.first() {
                    self.tree.connect(cp, ConnectedVehicleState::from_event(&event));
                    continue;
                }
                if self.queue.has_room() {
                    self.queue.enqueue(event);
                    continue;
                }
            }
            self.result.rejections += 1;
        }
    }

    /// Runs the complete simulation and returns the populated result store.
    pub fn run(mut self) -> Result<ResultStore, DomainError> {
        self.result = ResultStore::new(self.clock.step_count, self.clock.resolution_seconds);
        let dt_hours = self.clock.dt_hours();
        let progress_stride = (self.clock.step_count / 20).max(1);

        for step in 0..self.clock.step_count {
            let now_seconds = self.clock.seconds_at(step);
            let preload_kw = self.preload_kw[step];
            let site_open = self.clock.is_open_at(step);

            if !site_open {
                self.queue.empty();
                let busy: Vec<NodeId> = self.busy_states().into_iter().map(|(cp, _)| cp).collect();
                for cp in busy {
                    self.tree.disconnect(cp);
                }
            } else {
                if self.disconnect_by_time && now_seconds >= self.queue.next_leave {
                    self.queue.purge_stale(now_seconds);
                }
                self.run_cp_lifecycle(now_seconds);
            }

            self.admit_arrivals(now_seconds, site_open);

            let busy_states = self.busy_states();
            let busy: Vec<BusyCp<'_>> = busy_states
                .iter()
                .map(|(cp, state)| BusyCp {
                    cp_id: *cp,
                    connected: state,
                    battery: self.battery_for(state.vehicle_type),
                })
                .collect();

            let assignment = schedule::schedule(
                self.schedule_kind,
                &self.tree,
                &busy,
                dt_hours,
                preload_kw,
                &mut self.df_state,
            );

            self.apply_step(step, &busy_states, &assignment, dt_hours, preload_kw)?;

            if step % progress_stride == 0 {
                info!(step, total = self.clock.step_count, "simulation progress");
            }
        }

        Ok(self.result)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_step(
        &mut self,
        step: usize,
        busy_states: &[(NodeId, ConnectedVehicleState)],
        assignment: &Assignment,
        dt_hours: f64,
        preload_kw: f64,
    ) -> Result<(), DomainError> {
        for (cp, state) in busy_states {
            let power = assignment.cps.get(cp).copied().unwrap_or(0.0);
            if !(0.0..=self.tree.node(*cp).max_power_kw + 1e-6).contains(&power) {
                return Err(DomainError::NegativeAssignedPower { cp_id: *cp as u64, power });
            }
            if power > 0.0 {
                self.result.note_charge(state.event_id, step);
            }
        }

        for (cp, state) in busy_states {
            let power = assignment.cps.get(cp).copied().unwrap_or(0.0);
            let battery = self.battery_for(state.vehicle_type);
            if let Some(mut updated) = self.tree.connected(*cp).cloned() {
                updated.apply_charge(power, dt_hours, battery.capacity_kwh);
                self.tree.connect(*cp, updated);
            }
            self.result.record_cp(*cp, step, power);
        }
        let busy_ids: HashSet<NodeId> = busy_states.iter().map(|(cp, _)| *cp).collect();
        for &cp in &self.tree.charging_points {
            if !busy_ids.contains(&cp) {
                self.result.record_cp(cp, step, 0.0);
            }
        }

        if let Some(storage_id) = self.tree.storage {
            if assignment.storage_power_kw < 0.0 {
                let requested = floor3(-assignment.storage_power_kw);
                let battery = self.tree.storage_battery_mut().unwrap();
                let realized = battery.discharge(requested, dt_hours)?;
                self.result.record_storage(storage_id, step, -realized);
            } else {
                let transformer_residual = self.tree.residual(self.tree.root, &assignment.cps, preload_kw);
                let battery = self.tree.storage_battery_mut().unwrap();
                let realized = battery.charge(transformer_residual, dt_hours);
                self.result.record_storage(storage_id, step, realized);
            }
        }

        Ok(())
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::EvBattery;
    use crate::infrastructure::{ChargingPointSpec, StationSpec, TransformerSpec};
    use crate::sim::clock::SimClock;
    use crate::vehicle::VehicleType;

    fn single_cp_tree(cp_max: f64) -> InfrastructureTree {
        InfrastructureTree::build(TransformerSpec {
            min_power_kw: 0.0,
            max_power_kw: 1000.0,
            stations: vec![StationSpec {
                min_power_kw: 0.0,
                max_power_kw: 1000.0,
                charging_points: vec![ChargingPointSpec { min_power_kw: 0.0, max_power_kw: cp_max }],
            }],
            storage: None,
        })
    }

    #[test]
    fn s1_sanity_uncontrolled_single_cp() {
        let tree = single_cp_tree(11.0);
        let vehicle_types = vec![VehicleType::new(
            "Acme",
            "E1",
            EvBattery::new(30.0, 11.0, 0.0, 1.0, 1.0, 1.0),
            1.0,
        )];
        let event = ChargingEvent::new(0, 0.0, 4.0 * 3600.0, 0.5, 1.0, 0);
        let clock = SimClock::new(6, 3600.0, 0.0, None);
        let sim = Simulator::new(
            tree,
            &vehicle_types,
            clock,
            vec![event],
            1,
            true,
            vec![0.0; 6],
            ScheduleKind::Uncontrolled,
        );
        let result = sim.run().unwrap();
        let load = result.aggregated_load_profile();
        // step0 charges at the hardware cap (11kW); step1 is capped by the
        // remaining energy to reach soc_target (4kW), after which the vehicle
        // is already full and disconnects before the next step schedules.
        assert_eq!(load, vec![11.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(result.total_energy_kwh(), 15.0);
    }

    #[test]
    fn rejections_increment_when_queue_and_cps_full() {
        let tree = single_cp_tree(11.0);
        let vehicle_types = vec![VehicleType::new(
            "Acme",
            "E1",
            EvBattery::new(30.0, 11.0, 0.0, 1.0, 1.0, 1.0),
            1.0,
        )];
        let events = vec![
            ChargingEvent::new(0, 0.0, 3600.0, 0.5, 1.0, 0),
            ChargingEvent::new(1, 0.0, 3600.0, 0.5, 1.0, 0),
        ];
        let clock = SimClock::new(2, 3600.0, 0.0, None);
        let sim = Simulator::new(tree, &vehicle_types, clock, events, 0, true, vec![0.0; 2], ScheduleKind::Uncontrolled);
        let result = sim.run().unwrap();
        assert_eq!(result.rejections, 1);
    }
}
