//! Elvis: an electric-vehicle charging site simulator.
//!
//! Given a fleet arrival process, a tree-shaped electrical infrastructure, a
//! set of vehicle types, an optional stationary battery, and a transformer
//! preload time series, simulates per-time-step power assignments for every
//! charging point and the storage system, from which load profiles,
//! simultaneity factors, energy totals, emissions and cost KPIs are derived.

pub mod battery;
/// TOML scenario configuration and preset definitions.
pub mod config;
pub mod distribution;
/// Config and domain-violation error taxonomy.
pub mod error;
/// Stochastic charging-event generator: weekly-marginals and GMM samplers.
pub mod generator;
/// Rooted electrical infrastructure tree.
pub mod infrastructure;
/// I/O utilities for data export.
pub mod io;
/// Bounded FIFO of charging events awaiting a free charging point.
pub mod queue;
/// Post-hoc KPI computation from a completed run.
pub mod report;
/// Per-CP/per-storage result traces and KPI derivation.
pub mod result;
/// Shared seeded-RNG helpers.
pub mod rng;
/// Scheduling policies: Uncontrolled, FCFS, Discrimination-Free.
pub mod schedule;
/// Simulation engine and wall-clock helpers.
pub mod sim;
/// Dimensioned-scalar and time-series alignment helpers.
pub mod units;
pub mod vehicle;
