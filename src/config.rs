//! TOML-based scenario configuration: infrastructure tree, fleet mix, arrival
//! process, scheduling policy, and preset definitions.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::battery::{EvBattery, StationaryBattery};
use crate::error::ConfigError;
use crate::generator::{self, ArrivalShape, GmmComponent, GmmInput, WeeklyMarginalsInput};
use crate::infrastructure::{ChargingPointSpec, InfrastructureTree, StationSpec, StorageSpec, TransformerSpec};
use crate::schedule::ScheduleKind;
use crate::sim::clock::{OpeningHours, SimClock};
use crate::units::{step_count, RawSeries};
use crate::vehicle::{ChargingEvent, VehicleType};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from TOML
/// with [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::baseline`]
/// for the built-in default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,
    #[serde(default)]
    pub vehicle_types: Vec<VehicleTypeConfig>,
    #[serde(default)]
    pub arrivals: ArrivalConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub preload: SeriesInput,
    #[serde(default)]
    pub emissions: SeriesInput,
    #[serde(default)]
    pub cost: CostConfig,
}

/// Electricity pricing: a flat per-kWh rate, or a length-24 daily curve
/// (wrapping at 24h) interpolated over the simulation clock. An empty
/// `daily_rate_per_kwh` means "use `fixed_rate_per_kwh` for every hour".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostConfig {
    pub fixed_rate_per_kwh: f64,
    pub daily_rate_per_kwh: Vec<f64>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            fixed_rate_per_kwh: 0.0,
            daily_rate_per_kwh: Vec::new(),
        }
    }
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// RFC 3339 timestamp of the first simulation step.
    pub start_date: DateTime<Utc>,
    /// RFC 3339 timestamp of the last simulation step.
    pub end_date: DateTime<Utc>,
    /// Step resolution, in minutes.
    pub resolution_minutes: f64,
    /// Master random seed.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_date: "2024-01-01T00:00:00Z".parse().expect("valid RFC3339 literal"),
            end_date: "2024-01-01T06:00:00Z".parse().expect("valid RFC3339 literal"),
            resolution_minutes: 60.0,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    pub fn resolution_seconds(&self) -> f64 {
        self.resolution_minutes * 60.0
    }

    pub fn total_seconds(&self) -> f64 {
        (self.end_date - self.start_date).num_seconds() as f64
    }

    pub fn step_count(&self) -> usize {
        step_count(self.total_seconds(), self.resolution_seconds())
    }

    /// Seconds from the preceding Monday midnight to `start_date`, used to
    /// align the weekly-marginals distribution.
    pub fn offset_from_monday_seconds(&self) -> f64 {
        let days = self.start_date.weekday().num_days_from_monday() as f64;
        let seconds_of_day = self.start_date.time().num_seconds_from_midnight() as f64;
        days * 86_400.0 + seconds_of_day
    }

    pub fn start_hour_of_day(&self) -> f64 {
        self.start_date.time().num_seconds_from_midnight() as f64 / 3600.0
    }
}

/// Nested description of the electrical infrastructure tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfrastructureConfig {
    pub transformer_min_power_kw: f64,
    pub transformer_max_power_kw: f64,
    pub stations: Vec<StationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            transformer_min_power_kw: 0.0,
            transformer_max_power_kw: 1000.0,
            stations: vec![StationConfig::default()],
            storage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StationConfig {
    pub min_power_kw: f64,
    pub max_power_kw: f64,
    pub charging_points: Vec<ChargingPointConfig>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            min_power_kw: 0.0,
            max_power_kw: 22.0,
            charging_points: vec![ChargingPointConfig::default(), ChargingPointConfig::default()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargingPointConfig {
    pub min_power_kw: f64,
    pub max_power_kw: f64,
}

impl Default for ChargingPointConfig {
    fn default() -> Self {
        Self {
            min_power_kw: 0.0,
            max_power_kw: 11.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub node_min_power_kw: f64,
    pub node_max_power_kw: f64,
    pub capacity_kwh: f64,
    pub max_charge_power_kw: f64,
    pub min_charge_power_kw: f64,
    pub max_discharge_power_kw: f64,
    pub efficiency: f64,
    pub start_power_degradation: f64,
    pub max_degradation_level: f64,
    pub initial_soc: f64,
    pub min_soc: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            node_min_power_kw: 0.0,
            node_max_power_kw: 15.0,
            capacity_kwh: 30.0,
            max_charge_power_kw: 15.0,
            min_charge_power_kw: 0.0,
            max_discharge_power_kw: 15.0,
            efficiency: 0.95,
            start_power_degradation: 0.8,
            max_degradation_level: 0.2,
            initial_soc: 0.5,
            min_soc: 0.1,
        }
    }
}

/// One class of vehicle in the fleet mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleTypeConfig {
    pub brand: String,
    pub model: String,
    pub probability: f64,
    #[serde(default)]
    pub battery: BatteryTypeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryTypeConfig {
    pub capacity_kwh: f64,
    pub max_charge_power_kw: f64,
    pub min_charge_power_kw: f64,
    pub efficiency: f64,
    pub start_power_degradation: f64,
    pub max_degradation_level: f64,
}

impl Default for BatteryTypeConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 60.0,
            max_charge_power_kw: 11.0,
            min_charge_power_kw: 0.0,
            efficiency: 1.0,
            start_power_degradation: 0.8,
            max_degradation_level: 0.2,
        }
    }
}

/// Arrival process: either a weekly-marginals distribution or a 2-D GMM.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArrivalConfig {
    pub sample_method: SampleMethod,
    /// Weekly arrival weights, uniformly spaced over 168 hours.
    pub arrival_distribution: Vec<f64>,
    pub gmm_components: Vec<GmmComponentConfig>,
    /// Mean number of charging events per week.
    pub num_charging_events: f64,
    pub mean_park_hours: f64,
    pub std_deviation_park_hours: f64,
    pub mean_soc: f64,
    pub std_deviation_soc: f64,
    pub max_parking_time_hours: f64,
    /// GMM-only: wrap-around smoothing buffer before each day boundary.
    pub cut_off_hours: f64,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            sample_method: SampleMethod::IndependentNormalDist,
            arrival_distribution: vec![1.0; 168],
            gmm_components: Vec::new(),
            num_charging_events: 20.0,
            mean_park_hours: 4.0,
            std_deviation_park_hours: 1.5,
            mean_soc: 0.4,
            std_deviation_soc: 0.15,
            max_parking_time_hours: 24.0,
            cut_off_hours: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleMethod {
    IndependentNormalDist,
    Gmm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GmmComponentConfig {
    pub weight: f64,
    pub mean_hour_of_week: f64,
    pub mean_parking_hours: f64,
    pub covariance: [[f64; 2]; 2],
}

/// Waiting-queue capacity and opening-hours gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub queue_length: usize,
    pub disconnect_by_time: bool,
    /// `(open_hour, close_hour)`, `0 <= open <= close <= 24`. `None` means
    /// always open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<(f64, f64)>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_length: 0,
            disconnect_by_time: true,
            opening_hours: None,
        }
    }
}

/// Scheduling policy selector and Discrimination-Free's extra parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulingConfig {
    pub policy: SchedulingPolicy,
    pub df_charging_period_minutes: f64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::Uncontrolled,
            df_charging_period_minutes: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SchedulingPolicy {
    Uncontrolled,
    Fcfs,
    DiscriminationFree,
    WithStorage,
    Optimized,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        SchedulingPolicy::Uncontrolled
    }
}

/// A transformer-preload or emissions series: a constant scalar, a list
/// sampled at a given resolution, or a list meant to be tiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeriesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scalar: Option<f64>,
    pub values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_minutes: Option<f64>,
    pub repeat: bool,
}

impl Default for SeriesInput {
    /// A flat zero series: no preload, no emissions factor.
    fn default() -> Self {
        Self {
            scalar: Some(0.0),
            values: Vec::new(),
            resolution_minutes: None,
            repeat: false,
        }
    }
}

impl SeriesInput {
    fn as_values(&self) -> Vec<f64> {
        match self.scalar {
            Some(s) => vec![s],
            None => self.values.clone(),
        }
    }

    /// Aligns this series to exactly `step_count` samples, per §6's
    /// truncate/resample/repeat/reject rules. A bare scalar always tiles.
    pub fn aligned_to(&self, count: usize, target_resolution_seconds: f64) -> Option<Vec<f64>> {
        if count == 0 {
            return Some(Vec::new());
        }
        let values = self.as_values();
        let raw = RawSeries {
            values: &values,
            resolution_seconds: self.resolution_minutes.map(|m| m * 60.0),
            repeat: self.repeat || self.scalar.is_some(),
        };
        raw.aligned_to(count, target_resolution_seconds)
    }
}

/// Everything a [`crate::sim::engine::Simulator`] needs, already validated
/// and resolved from a [`ScenarioConfig`].
pub struct BuiltScenario {
    pub tree: InfrastructureTree,
    pub vehicle_types: Vec<VehicleType>,
    pub clock: SimClock,
    pub events: Vec<ChargingEvent>,
    pub queue_capacity: usize,
    pub disconnect_by_time: bool,
    pub preload_kw: Vec<f64>,
    pub emissions: Vec<f64>,
    pub schedule_kind: ScheduleKind,
    pub cost: CostConfig,
}

impl ScenarioConfig {
    /// Returns the single-CP, uncontrolled-policy baseline scenario.
    pub fn baseline() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            infrastructure: InfrastructureConfig::default(),
            vehicle_types: vec![VehicleTypeConfig {
                brand: "Acme".to_string(),
                model: "Model E".to_string(),
                probability: 1.0,
                battery: BatteryTypeConfig::default(),
            }],
            arrivals: ArrivalConfig::default(),
            queue: QueueConfig::default(),
            scheduling: SchedulingConfig::default(),
            preload: SeriesInput::default(),
            emissions: SeriesInput::default(),
            cost: CostConfig::default(),
        }
    }

    /// Returns the with-storage preset: the baseline infrastructure plus a
    /// stationary battery under the transformer.
    pub fn with_storage() -> Self {
        let mut cfg = Self::baseline();
        cfg.infrastructure.storage = Some(StorageConfig::default());
        cfg
    }

    /// Returns the FCFS-arbitration demo preset: a tight two-CP station that
    /// forces the scheduler to arbitrate.
    pub fn fcfs_demo() -> Self {
        let mut cfg = Self::baseline();
        cfg.infrastructure.stations = vec![StationConfig {
            min_power_kw: 0.0,
            max_power_kw: 10.0,
            charging_points: vec![
                ChargingPointConfig { min_power_kw: 0.0, max_power_kw: 10.0 },
                ChargingPointConfig { min_power_kw: 0.0, max_power_kw: 10.0 },
            ],
        }];
        cfg.scheduling.policy = SchedulingPolicy::Fcfs;
        cfg.queue.queue_length = 2;
        cfg
    }

    pub const PRESETS: &[&str] = &["baseline", "with_storage", "fcfs_demo"];

    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "with_storage" => Ok(Self::with_storage()),
            "fcfs_demo" => Ok(Self::fcfs_demo()),
            _ => Err(ConfigError::new(
                "preset",
                format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            )),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates every field that, left unchecked, would panic deeper in the
    /// battery/vehicle/infrastructure constructors instead of failing fast
    /// here at the scenario boundary.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.simulation.end_date <= self.simulation.start_date {
            errors.push(ConfigError::new("simulation.end_date", "must be after start_date"));
        }
        if self.simulation.resolution_minutes <= 0.0 {
            errors.push(ConfigError::new("simulation.resolution_minutes", "must be positive"));
        }

        if self.infrastructure.stations.is_empty() {
            errors.push(ConfigError::new("infrastructure.stations", "must be non-empty"));
        }
        for (si, station) in self.infrastructure.stations.iter().enumerate() {
            if station.charging_points.is_empty() {
                errors.push(ConfigError::new(
                    format!("infrastructure.stations[{si}].charging_points"),
                    "must be non-empty",
                ));
            }
        }
        if let Some(storage) = &self.infrastructure.storage {
            validate_battery_fields("infrastructure.storage", &mut errors, &BatteryTypeConfig {
                capacity_kwh: storage.capacity_kwh,
                max_charge_power_kw: storage.max_charge_power_kw,
                min_charge_power_kw: storage.min_charge_power_kw,
                efficiency: storage.efficiency,
                start_power_degradation: storage.start_power_degradation,
                max_degradation_level: storage.max_degradation_level,
            });
            if !(0.0..=1.0).contains(&storage.min_soc) {
                errors.push(ConfigError::new("infrastructure.storage.min_soc", "must be in [0, 1]"));
            }
            if !(storage.min_soc..=1.0).contains(&storage.initial_soc) {
                errors.push(ConfigError::new("infrastructure.storage.initial_soc", "must be in [min_soc, 1]"));
            }
        }

        if self.vehicle_types.is_empty() {
            errors.push(ConfigError::new("vehicle_types", "must be non-empty"));
        }
        for (i, vt) in self.vehicle_types.iter().enumerate() {
            if vt.probability <= 0.0 {
                errors.push(ConfigError::new(format!("vehicle_types[{i}].probability"), "must be positive"));
            }
            validate_battery_fields(&format!("vehicle_types[{i}].battery"), &mut errors, &vt.battery);
        }

        match self.arrivals.sample_method {
            SampleMethod::IndependentNormalDist => {
                if self.arrivals.arrival_distribution.is_empty() {
                    errors.push(ConfigError::new("arrivals.arrival_distribution", "must be non-empty"));
                }
            }
            SampleMethod::Gmm => {
                if self.arrivals.gmm_components.is_empty() {
                    errors.push(ConfigError::new("arrivals.gmm_components", "must be non-empty"));
                } else {
                    let total: f64 = self.arrivals.gmm_components.iter().map(|c| c.weight).sum();
                    if (total - 1.0).abs() > 0.01 {
                        errors.push(ConfigError::new(
                            "arrivals.gmm_components",
                            format!("weights must sum to 1 within 1% tolerance, got {total}"),
                        ));
                    }
                }
            }
        }
        if self.arrivals.max_parking_time_hours <= 0.0 {
            errors.push(ConfigError::new("arrivals.max_parking_time_hours", "must be positive"));
        }

        if self.scheduling.policy == SchedulingPolicy::DiscriminationFree
            && self.scheduling.df_charging_period_minutes <= 0.0
        {
            errors.push(ConfigError::new("scheduling.df_charging_period_minutes", "must be positive"));
        }

        if let Some((open, close)) = self.queue.opening_hours {
            if !(0.0..=24.0).contains(&open) || !(0.0..=24.0).contains(&close) || open > close {
                errors.push(ConfigError::new("queue.opening_hours", "must satisfy 0 <= open <= close <= 24"));
            }
        }

        errors
    }

    fn build_tree(&self) -> InfrastructureTree {
        let stations = self
            .infrastructure
            .stations
            .iter()
            .map(|s| StationSpec {
                min_power_kw: s.min_power_kw,
                max_power_kw: s.max_power_kw,
                charging_points: s
                    .charging_points
                    .iter()
                    .map(|cp| ChargingPointSpec { min_power_kw: cp.min_power_kw, max_power_kw: cp.max_power_kw })
                    .collect(),
            })
            .collect();

        let storage = self.infrastructure.storage.as_ref().map(|s| StorageSpec {
            battery: StationaryBattery::new(
                s.capacity_kwh,
                s.max_charge_power_kw,
                s.min_charge_power_kw,
                s.max_discharge_power_kw,
                s.efficiency,
                s.start_power_degradation,
                s.max_degradation_level,
                s.initial_soc,
                s.min_soc,
            ),
            min_power_kw: s.node_min_power_kw,
            max_power_kw: s.node_max_power_kw,
        });

        InfrastructureTree::build(TransformerSpec {
            min_power_kw: self.infrastructure.transformer_min_power_kw,
            max_power_kw: self.infrastructure.transformer_max_power_kw,
            stations,
            storage,
        })
    }

    fn build_vehicle_types(&self) -> Vec<VehicleType> {
        self.vehicle_types
            .iter()
            .map(|vt| {
                VehicleType::new(
                    vt.brand.clone(),
                    vt.model.clone(),
                    EvBattery::new(
                        vt.battery.capacity_kwh,
                        vt.battery.max_charge_power_kw,
                        vt.battery.min_charge_power_kw,
                        vt.battery.efficiency,
                        vt.battery.start_power_degradation,
                        vt.battery.max_degradation_level,
                    ),
                    vt.probability,
                )
            })
            .collect()
    }

    fn schedule_kind(&self) -> ScheduleKind {
        match self.scheduling.policy {
            SchedulingPolicy::Uncontrolled => ScheduleKind::Uncontrolled,
            SchedulingPolicy::Fcfs => ScheduleKind::Fcfs,
            SchedulingPolicy::DiscriminationFree => ScheduleKind::DiscriminationFree {
                df_charging_period_seconds: self.scheduling.df_charging_period_minutes * 60.0,
            },
            SchedulingPolicy::WithStorage => ScheduleKind::WithStorage,
            SchedulingPolicy::Optimized => ScheduleKind::Optimized,
        }
    }

    fn opening_hours(&self) -> Option<OpeningHours> {
        self.queue.opening_hours.map(|(open, close)| OpeningHours::new(open, close))
    }

    /// Validates, builds the infrastructure tree and fleet mix, samples the
    /// arrival process, and aligns the preload/emissions series — everything
    /// [`crate::sim::engine::Simulator::new`] needs for one run.
    pub fn build(&self, rng: &mut StdRng) -> Result<BuiltScenario, ConfigError> {
        let errors = self.validate();
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        let step_count = self.simulation.step_count();
        let resolution_seconds = self.simulation.resolution_seconds();
        let dt_hours = resolution_seconds / 3600.0;
        let sim_duration_hours = step_count as f64 * dt_hours;

        let tree = self.build_tree();
        let vehicle_types = self.build_vehicle_types();

        let shape = ArrivalShape {
            mean_park_hours: self.arrivals.mean_park_hours,
            std_park_hours: self.arrivals.std_deviation_park_hours,
            mean_soc: self.arrivals.mean_soc,
            std_soc: self.arrivals.std_deviation_soc,
            max_parking_hours: self.arrivals.max_parking_time_hours,
            vehicle_types: &vehicle_types,
        };

        let events = match self.arrivals.sample_method {
            SampleMethod::IndependentNormalDist => {
                let steps: Vec<f64> = (0..step_count).map(|i| i as f64 * resolution_seconds).collect();
                let input = WeeklyMarginalsInput {
                    arrival_weights: &self.arrivals.arrival_distribution,
                    mean_events_per_week: self.arrivals.num_charging_events,
                    offset_from_monday_seconds: self.simulation.offset_from_monday_seconds(),
                    sim_duration_hours,
                    shape,
                };
                generator::sample_weekly_marginals(rng, &input, &steps)?
            }
            SampleMethod::Gmm => {
                let components: Vec<GmmComponent> = self
                    .arrivals
                    .gmm_components
                    .iter()
                    .map(|c| GmmComponent {
                        weight: c.weight,
                        mean: (c.mean_hour_of_week, c.mean_parking_hours),
                        covariance: c.covariance,
                    })
                    .collect();
                let input = GmmInput {
                    components: &components,
                    num_charging_events_per_week: self.arrivals.num_charging_events.round() as usize,
                    first_step_hours: self.simulation.offset_from_monday_seconds() / 3600.0,
                    sim_duration_hours,
                    resolution_hours: dt_hours,
                    cut_off_hours: self.arrivals.cut_off_hours,
                    shape,
                };
                generator::sample_gmm(rng, &input)?
            }
        };

        let preload_kw = self.preload.aligned_to(step_count, resolution_seconds).ok_or_else(|| {
            ConfigError::new("preload", "series too short and no resolution_minutes/repeat given")
        })?;

        let emissions = self.emissions.aligned_to(step_count, resolution_seconds).unwrap_or_else(|| {
            tracing::warn!("emissions series could not be aligned to the simulation horizon; using empty series");
            Vec::new()
        });

        let clock = SimClock::new(step_count, resolution_seconds, self.simulation.start_hour_of_day(), self.opening_hours());

        Ok(BuiltScenario {
            tree,
            vehicle_types,
            clock,
            events,
            queue_capacity: self.queue.queue_length,
            disconnect_by_time: self.queue.disconnect_by_time,
            preload_kw,
            emissions,
            schedule_kind: self.schedule_kind(),
            cost: self.cost.clone(),
        })
    }
}

fn validate_battery_fields(field_prefix: &str, errors: &mut Vec<ConfigError>, battery: &BatteryTypeConfig) {
    if battery.capacity_kwh <= 0.0 {
        errors.push(ConfigError::new(format!("{field_prefix}.capacity_kwh"), "must be positive"));
    }
    if battery.min_charge_power_kw < 0.0 {
        errors.push(ConfigError::new(format!("{field_prefix}.min_charge_power_kw"), "must be non-negative"));
    }
    if !(0.0..=1.0).contains(&battery.efficiency) {
        errors.push(ConfigError::new(format!("{field_prefix}.efficiency"), "must be in [0, 1]"));
    }
    if !(0.0..=1.0).contains(&battery.start_power_degradation) {
        errors.push(ConfigError::new(format!("{field_prefix}.start_power_degradation"), "must be in [0, 1]"));
    }
    if !(0.0..=1.0).contains(&battery.max_degradation_level) {
        errors.push(ConfigError::new(format!("{field_prefix}.max_degradation_level"), "must be in [0, 1]"));
    }
    if battery.max_degradation_level * battery.max_charge_power_kw < battery.min_charge_power_kw {
        errors.push(ConfigError::new(
            format!("{field_prefix}.max_degradation_level"),
            "max_degradation_level * max_charge_power_kw must be >= min_charge_power_kw",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn baseline_preset_is_valid() {
        let cfg = ScenarioConfig::baseline();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn all_presets_are_valid_and_buildable() {
        for name in ScenarioConfig::PRESETS {
            let cfg = ScenarioConfig::from_preset(name).unwrap();
            assert!(cfg.validate().is_empty(), "preset {name} should validate");
            let mut rng = StdRng::seed_from_u64(cfg.simulation.seed);
            assert!(cfg.build(&mut rng).is_ok(), "preset {name} should build");
        }
    }

    #[test]
    fn from_preset_rejects_unknown_name() {
        let err = ScenarioConfig::from_preset("nonexistent").unwrap_err();
        assert!(err.message.contains("unknown preset"));
    }

    #[test]
    fn validation_catches_empty_vehicle_types() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.vehicle_types.clear();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "vehicle_types"));
    }

    #[test]
    fn validation_catches_backwards_time_window() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.simulation.end_date = cfg.simulation.start_date;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "simulation.end_date"));
    }

    #[test]
    fn gmm_requires_components_when_selected() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.arrivals.sample_method = SampleMethod::Gmm;
        cfg.arrivals.gmm_components.clear();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "arrivals.gmm_components"));
    }

    #[test]
    fn toml_round_trips_scheduler_affecting_fields() {
        let toml = r#"
[simulation]
start_date = "2024-03-04T00:00:00Z"
end_date = "2024-03-04T06:00:00Z"
resolution_minutes = 60.0
seed = 7

[infrastructure]
transformer_min_power_kw = 0.0
transformer_max_power_kw = 100.0

[[infrastructure.stations]]
min_power_kw = 0.0
max_power_kw = 22.0

[[infrastructure.stations.charging_points]]
min_power_kw = 0.0
max_power_kw = 11.0

[[vehicle_types]]
brand = "Acme"
model = "E1"
probability = 1.0

[vehicle_types.battery]
capacity_kwh = 40.0
max_charge_power_kw = 11.0

[scheduling]
policy = "Fcfs"
"#;
        let cfg = ScenarioConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.simulation.seed, 7);
        assert_eq!(cfg.infrastructure.stations.len(), 1);
        assert_eq!(cfg.infrastructure.stations[0].charging_points.len(), 1);
        assert_eq!(cfg.scheduling.policy, SchedulingPolicy::Fcfs);
        assert!(cfg.validate().is_empty());
    }
}
