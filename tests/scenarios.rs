//! End-to-end scenario tests exercising the full simulator loop through the
//! public API, independent of any single module's unit tests.

use elvis::battery::{EvBattery, StationaryBattery};
use elvis::infrastructure::{ChargingPointSpec, InfrastructureTree, StationSpec, StorageSpec, TransformerSpec};
use elvis::schedule::ScheduleKind;
use elvis::sim::{SimClock, Simulator};
use elvis::vehicle::{ChargingEvent, VehicleType};

fn single_cp_tree(transformer_max: f64, cp_max: f64) -> InfrastructureTree {
    InfrastructureTree::build(TransformerSpec {
        min_power_kw: 0.0,
        max_power_kw: transformer_max,
        stations: vec![StationSpec {
            min_power_kw: 0.0,
            max_power_kw: transformer_max,
            charging_points: vec![ChargingPointSpec { min_power_kw: 0.0, max_power_kw: cp_max }],
        }],
        storage: None,
    })
}

/// S1: single CP, uncontrolled, 30 kWh / 11 kW EV charging 0.5 -> 1.0 soc over
/// a 6h horizon at 1h resolution. Energy to deliver is 15 kWh; at 11 kW cap
/// that takes just over one step, so the trace is hardware-capped then
/// tapers to the remaining 4 kWh before the vehicle reaches its target and
/// disconnects.
#[test]
fn s1_single_cp_sanity_conserves_energy() {
    let tree = single_cp_tree(1000.0, 11.0);
    let vehicle_types = vec![VehicleType::new("Acme", "E1", EvBattery::new(30.0, 11.0, 0.0, 1.0, 1.0, 1.0), 1.0)];
    let event = ChargingEvent::new(0, 0.0, 4.0 * 3600.0, 0.5, 1.0, 0);
    let clock = SimClock::new(6, 3600.0, 0.0, None);
    let sim = Simulator::new(tree, &vehicle_types, clock, vec![event], 1, true, vec![0.0; 6], ScheduleKind::Uncontrolled);

    let result = sim.run().unwrap();
    let load = result.aggregated_load_profile();
    assert_eq!(load, vec![11.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
    assert_eq!(result.total_energy_kwh(), 15.0);
    assert_eq!(result.rejections, 0);
}

/// S2: two CPs sharing a 10 kW station cap, two identical vehicles arriving
/// together but with different leaving times. FCFS must fill the
/// earlier-leaving vehicle first and never exceed the station cap.
#[test]
fn s2_fcfs_fills_earliest_leaver_first_under_shared_cap() {
    let tree = InfrastructureTree::build(TransformerSpec {
        min_power_kw: 0.0,
        max_power_kw: 1000.0,
        stations: vec![StationSpec {
            min_power_kw: 0.0,
            max_power_kw: 10.0,
            charging_points: vec![
                ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 10.0 },
                ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 10.0 },
            ],
        }],
        storage: None,
    });
    let vehicle_types = vec![VehicleType::new("Acme", "E1", EvBattery::new(40.0, 10.0, 0.0, 1.0, 1.0, 1.0), 1.0)];
    let events = vec![
        ChargingEvent::new(0, 0.0, 2.0 * 3600.0, 0.5, 1.0, 0),
        ChargingEvent::new(1, 0.0, 3.0 * 3600.0, 0.5, 1.0, 0),
    ];
    let clock = SimClock::new(2, 3600.0, 0.0, None);
    let sim = Simulator::new(tree, &vehicle_types, clock, events, 0, true, vec![0.0; 2], ScheduleKind::Fcfs);

    let result = sim.run().unwrap();
    let cp_traces = result.cp_traces_dense();
    assert_eq!(cp_traces.len(), 2);
    for (_, trace) in &cp_traces {
        for step in 0..trace.len() {
            let total_at_step: f64 = cp_traces.iter().map(|(_, t)| t[step]).sum();
            assert!(total_at_step <= 10.0 + 1e-9, "station cap violated at step {step}: {total_at_step}");
        }
    }
    // The earlier-leaving vehicle (A, leaves at 2h) must have received power
    // in the first step, saturating the shared 10 kW cap on its own.
    let step0_total: f64 = cp_traces.iter().map(|(_, t)| t[0]).sum();
    assert_eq!(step0_total, 10.0);
}

/// S3: transformer overflow forces FCFS to debit the stationary battery for
/// the excess over the transformer's residual.
#[test]
fn s3_transformer_overflow_debits_storage() {
    let storage_battery = StationaryBattery::new(30.0, 100.0, 0.0, 15.0, 1.0, 1.0, 1.0, 0.8, 0.0);
    let tree = InfrastructureTree::build(TransformerSpec {
        min_power_kw: 0.0,
        max_power_kw: 10.0,
        stations: vec![StationSpec {
            min_power_kw: 0.0,
            max_power_kw: 100.0,
            charging_points: vec![ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 100.0 }],
        }],
        storage: Some(StorageSpec { battery: storage_battery, min_power_kw: 0.0, max_power_kw: 15.0 }),
    });
    let vehicle_types = vec![VehicleType::new("Acme", "E1", EvBattery::new(100.0, 22.0, 0.0, 1.0, 1.0, 1.0), 1.0)];
    let event = ChargingEvent::new(0, 0.0, 3600.0, 0.0, 1.0, 0);
    let clock = SimClock::new(1, 3600.0, 0.0, None);
    let sim = Simulator::new(tree, &vehicle_types, clock, vec![event], 0, true, vec![0.0; 1], ScheduleKind::Fcfs);

    let result = sim.run().unwrap();
    let cp_traces = result.cp_traces_dense();
    assert_eq!(cp_traces[0].1[0], 22.0);
    let storage_traces = result.storage_traces_dense();
    assert_eq!(storage_traces[0].1[0], -12.0);
}

/// S4: three CPs tied for two full-power slots under Discrimination-Free;
/// over 9 steps with a 1-step fairness window, every CP must accumulate
/// exactly 3 charged steps.
#[test]
fn s4_discrimination_free_splits_evenly_over_nine_steps() {
    let tree = InfrastructureTree::build(TransformerSpec {
        min_power_kw: 0.0,
        max_power_kw: 1000.0,
        stations: vec![StationSpec {
            min_power_kw: 0.0,
            max_power_kw: 22.0,
            charging_points: vec![
                ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 11.0 },
                ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 11.0 },
                ChargingPointSpec { min_power_kw: 0.0, max_power_kw: 11.0 },
            ],
        }],
        storage: None,
    });
    let vehicle_types = vec![VehicleType::new("Acme", "E1", EvBattery::new(1000.0, 11.0, 0.0, 1.0, 1.0, 1.0), 1.0)];
    let events = vec![
        ChargingEvent::new(0, 0.0, 9.0 * 900.0, 0.0, 1.0, 0),
        ChargingEvent::new(1, 0.0, 9.0 * 900.0, 0.0, 1.0, 0),
        ChargingEvent::new(2, 0.0, 9.0 * 900.0, 0.0, 1.0, 0),
    ];
    let clock = SimClock::new(9, 900.0, 0.0, None);
    let sim = Simulator::new(
        tree,
        &vehicle_types,
        clock,
        events,
        0,
        true,
        vec![0.0; 9],
        ScheduleKind::DiscriminationFree { df_charging_period_seconds: 900.0 },
    );

    let result = sim.run().unwrap();
    let cp_traces = result.cp_traces_dense();
    for (cp_id, trace) in &cp_traces {
        let charged_steps = trace.iter().filter(|&&p| p > 0.0).count();
        assert_eq!(charged_steps, 3, "cp {cp_id} expected exactly 3 charged steps, trace was {trace:?}");
    }
}

/// S5: a weekly-marginals distribution with mass only at Monday 00:00 must
/// cluster sampled arrivals sharply at every Monday-00:00 occurrence in the
/// simulation window.
#[test]
fn s5_weekly_marginals_cluster_at_monday_midnight() {
    use elvis::generator::{sample_weekly_marginals, ArrivalShape, WeeklyMarginalsInput};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let vehicle_types = vec![VehicleType::new("Acme", "E1", EvBattery::new(40.0, 11.0, 0.0, 1.0, 1.0, 1.0), 1.0)];
    let mut arrival_distribution = vec![0.0; 168];
    arrival_distribution[0] = 1.0;

    let shape = ArrivalShape {
        mean_park_hours: 2.0,
        std_park_hours: 0.1,
        mean_soc: 0.5,
        std_soc: 0.05,
        max_parking_hours: 24.0,
        vehicle_types: &vehicle_types,
    };
    // Tuesday 00:00 start: 1 day (86_400 s) into the week from Monday 00:00.
    let sim_duration_hours = 14.0 * 24.0;
    let resolution_seconds = 3600.0;
    let step_count = (sim_duration_hours * 3600.0 / resolution_seconds) as usize;
    let steps: Vec<f64> = (0..step_count).map(|i| i as f64 * resolution_seconds).collect();
    let input = WeeklyMarginalsInput {
        arrival_weights: &arrival_distribution,
        mean_events_per_week: 168.0,
        offset_from_monday_seconds: 86_400.0,
        sim_duration_hours,
        shape,
    };

    let mut rng = StdRng::seed_from_u64(7);
    let events = sample_weekly_marginals(&mut rng, &input, &steps).unwrap();

    assert!(!events.is_empty());
    // T0 is Tuesday 00:00 (24h past Monday midnight), so arrival hours-from-T0
    // land near a Monday boundary when their hour-of-week phase is near 0/168.
    let near_boundary = events
        .iter()
        .filter(|e| {
            let phase = (e.arrival_time / 3600.0).rem_euclid(168.0);
            phase < 2.0 || phase > 166.0
        })
        .count();
    let fraction = near_boundary as f64 / events.len() as f64;
    assert!(fraction > 0.9, "expected arrivals clustered at Monday 00:00, got {fraction}");
}

/// S6: serializing a scenario to TOML and back, then simulating with the
/// same seed, must reproduce the exact same per-step traces.
#[test]
fn s6_toml_round_trip_preserves_simulation_output() {
    use elvis::config::ScenarioConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let scenario = ScenarioConfig::fcfs_demo();

    let run_once = |cfg: &ScenarioConfig| {
        let mut rng = StdRng::seed_from_u64(cfg.simulation.seed);
        let built = cfg.build(&mut rng).unwrap();
        let sim = Simulator::new(
            built.tree,
            &built.vehicle_types,
            built.clock,
            built.events,
            built.queue_capacity,
            built.disconnect_by_time,
            built.preload_kw,
            built.schedule_kind,
        );
        sim.run().unwrap().aggregated_load_profile()
    };

    let original_trace = run_once(&scenario);

    let serialized = toml::to_string(&scenario).expect("scenario should serialize to TOML");
    let reloaded = ScenarioConfig::from_toml_str(&serialized).unwrap();
    let reloaded_trace = run_once(&reloaded);

    assert_eq!(original_trace, reloaded_trace);
}
