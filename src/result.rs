//! Result store and KPI derivation: sparse per-CP/per-storage power traces
//! (delta-encoded) plus the load-profile, simultaneity, emissions, cost and
//! charging-time metrics derived from them.

use std::collections::HashMap;

use crate::infrastructure::NodeId;

/// A single node's power trace, stored delta-encoded: a new entry is written
/// only if the value changed since the last recorded step, except that the
/// final step is always written.
#[derive(Debug, Clone, Default)]
pub struct SparseTrace {
    /// `(step_index, power_kw)` pairs in ascending step order.
    entries: Vec<(usize, f64)>,
}

impl SparseTrace {
    pub fn record(&mut self, step: usize, power_kw: f64, is_final_step: bool) {
        let changed = match self.entries.last() {
            Some(&(_, last_power)) => (last_power - power_kw).abs() > 1e-9,
            None => true,
        };
        if changed || is_final_step {
            self.entries.push((step, power_kw));
        }
    }

    /// Reconstructs the dense per-step value at every step, holding the last
    /// recorded value between entries.
    pub fn dense_indexed(&self, step_count: usize) -> Vec<f64> {
        let mut out = vec![0.0; step_count];
        let mut idx = 0;
        let mut current = 0.0;
        for (i, slot) in out.iter_mut().enumerate() {
            while idx < self.entries.len() && self.entries[idx].0 <= i {
                current = self.entries[idx].1;
                idx += 1;
            }
            *slot = current;
        }
        out
    }
}

/// Per-charging-event bookkeeping: the step an event first received power
/// and the last step it was charged, used for average-charging-time and
/// charging-time-histogram KPIs.
#[derive(Debug, Clone, Copy)]
pub struct ChargingPeriod {
    pub arrival_step: usize,
    pub last_charged_step: usize,
}

/// Owns every CP's and every Storage's power trace plus the admission
/// rejection counter and per-event charging-period bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    pub step_count: usize,
    pub resolution_seconds: f64,
    cp_traces: HashMap<NodeId, SparseTrace>,
    storage_traces: HashMap<NodeId, SparseTrace>,
    pub charging_periods: HashMap<u64, ChargingPeriod>,
    pub rejections: u64,
}

impl ResultStore {
    pub fn new(step_count: usize, resolution_seconds: f64) -> Self {
        Self {
            step_count,
            resolution_seconds,
            ..Default::default()
        }
    }

    pub fn record_cp(&mut self, cp_id: NodeId, step: usize, power_kw: f64) {
        let is_final = step + 1 == self.step_count;
        self.cp_traces.entry(cp_id).or_default().record(step, power_kw, is_final);
    }

    pub fn record_storage(&mut self, storage_id: NodeId, step: usize, power_kw: f64) {
        let is_final = step + 1 == self.step_count;
        self.storage_traces
            .entry(storage_id)
            .or_default()
            .record(step, power_kw, is_final);
    }

    pub fn note_charge(&mut self, event_id: u64, step: usize) {
        self.charging_periods
            .entry(event_id)
            .and_modify(|p| p.last_charged_step = step)
            .or_insert(ChargingPeriod { arrival_step: step, last_charged_step: step });
    }

    /// Length-`step_count` aggregate load profile: sum over CPs of the
    /// latest-known assigned power at each step.
    pub fn aggregated_load_profile(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.step_count];
        for trace in self.cp_traces.values() {
            for (i, v) in trace.dense_indexed(self.step_count).into_iter().enumerate() {
                total[i] += v;
            }
        }
        total
    }

    /// Length-`step_count` aggregate storage profile, analogous to
    /// [`Self::aggregated_load_profile`].
    pub fn storage_profile(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.step_count];
        for trace in self.storage_traces.values() {
            for (i, v) in trace.dense_indexed(self.step_count).into_iter().enumerate() {
                total[i] += v;
            }
        }
        total
    }

    /// Every recorded CP's dense per-step power trace, in ascending node-id
    /// order (stable iteration order for CSV export).
    pub fn cp_traces_dense(&self) -> Vec<(NodeId, Vec<f64>)> {
        let mut ids: Vec<NodeId> = self.cp_traces.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| (id, self.cp_traces[&id].dense_indexed(self.step_count)))
            .collect()
    }

    /// Every recorded Storage's dense per-step power trace, analogous to
    /// [`Self::cp_traces_dense`].
    pub fn storage_traces_dense(&self) -> Vec<(NodeId, Vec<f64>)> {
        let mut ids: Vec<NodeId> = self.storage_traces.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| (id, self.storage_traces[&id].dense_indexed(self.step_count)))
            .collect()
    }

    pub fn dt_hours(&self) -> f64 {
        self.resolution_seconds / 3600.0
    }

    /// `(sum of load) * dt / 3600` — kWh when powers are in kW and
    /// `resolution_seconds` already folds `/3600` via [`Self::dt_hours`].
    pub fn total_energy_kwh(&self) -> f64 {
        let load = self.aggregated_load_profile();
        load.iter().sum::<f64>() * self.dt_hours()
    }

    pub fn max_load_kw(&self) -> f64 {
        self.aggregated_load_profile().into_iter().fold(0.0, f64::max)
    }

    /// `load[i] / installed_capacity_kw` at every step.
    pub fn simultaneity_series(&self, installed_capacity_kw: f64) -> Vec<f64> {
        if installed_capacity_kw <= 0.0 {
            return vec![0.0; self.step_count];
        }
        self.aggregated_load_profile()
            .into_iter()
            .map(|l| l / installed_capacity_kw)
            .collect()
    }

    pub fn simultaneity_max(&self, installed_capacity_kw: f64) -> f64 {
        self.simultaneity_series(installed_capacity_kw)
            .into_iter()
            .fold(0.0, f64::max)
    }

    /// `q`-quantile (`0.0..=1.0`) of the simultaneity-factor series, using
    /// linear interpolation between closest ranks (the common "numpy
    /// default" convention).
    pub fn simultaneity_quantile(&self, installed_capacity_kw: f64, q: f64) -> f64 {
        let mut series = self.simultaneity_series(installed_capacity_kw);
        if series.is_empty() {
            return 0.0;
        }
        series.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q = q.clamp(0.0, 1.0);
        let pos = q * (series.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        if lo == hi {
            series[lo]
        } else {
            let frac = pos - lo as f64;
            series[lo] * (1.0 - frac) + series[hi] * frac
        }
    }

    /// Histogram of the simultaneity-factor series into `bin_count` equal
    /// bins spanning `[0, 1]`. Returns per-bin counts.
    pub fn simultaneity_bins(&self, installed_capacity_kw: f64, bin_count: usize) -> Vec<usize> {
        let series = self.simultaneity_series(installed_capacity_kw);
        histogram(&series, 0.0, 1.0, bin_count)
    }

    /// `sum(load[i] * emissions[i])`; `emissions` must already be aligned to
    /// `step_count` at the simulation's resolution.
    pub fn total_emissions(&self, emissions: &[f64]) -> f64 {
        self.aggregated_load_profile()
            .iter()
            .zip(emissions.iter())
            .map(|(l, e)| l * e)
            .sum()
    }

    pub fn electricity_cost_fixed(&self, rate_per_kwh: f64) -> f64 {
        self.total_energy_kwh() * rate_per_kwh
    }

    /// Piecewise-linear-interpolates a length-24 daily rate curve (wrapping
    /// at 24h) over the simulation clock and sums `load[i] * rate(clock(i))`.
    pub fn electricity_cost_variable(&self, daily_rate_per_kwh: &[f64], step_zero_hour_of_day: f64) -> f64 {
        if daily_rate_per_kwh.is_empty() {
            return 0.0;
        }
        let load = self.aggregated_load_profile();
        let dt_hours = self.dt_hours();
        let mut cost = 0.0;
        for (i, &l) in load.iter().enumerate() {
            let hour = (step_zero_hour_of_day + i as f64 * dt_hours).rem_euclid(24.0);
            let rate = interpolate_daily(daily_rate_per_kwh, hour);
            cost += l * rate * dt_hours;
        }
        cost
    }

    /// Mean `(last_charged - arrival)` in seconds over all recorded charging
    /// periods. Requires at least one charging period; returns `None`
    /// otherwise (per §7, this is the one KPI that doesn't default to zero).
    pub fn average_charging_time_seconds(&self) -> Option<f64> {
        if self.charging_periods.is_empty() {
            return None;
        }
        let total: f64 = self
            .charging_periods
            .values()
            .map(|p| (p.last_charged_step - p.arrival_step) as f64 * self.resolution_seconds)
            .sum();
        Some(total / self.charging_periods.len() as f64)
    }

    /// Histogram of charging-period durations, in minutes.
    pub fn charging_time_histogram_minutes(&self, bin_count: usize, max_minutes: f64) -> Vec<usize> {
        let durations: Vec<f64> = self
            .charging_periods
            .values()
            .map(|p| (p.last_charged_step - p.arrival_step) as f64 * self.resolution_seconds / 60.0)
            .collect();
        histogram(&durations, 0.0, max_minutes, bin_count)
    }
}

fn interpolate_daily(curve: &[f64], hour: f64) -> f64 {
    let n = curve.len();
    if n == 1 {
        return curve[0];
    }
    let step = 24.0 / n as f64;
    let pos = hour / step;
    let lo = pos.floor() as usize % n;
    let hi = (lo + 1) % n;
    let frac = pos - pos.floor();
    curve[lo] * (1.0 - frac) + curve[hi] * frac
}

fn histogram(values: &[f64], min: f64, max: f64, bin_count: usize) -> Vec<usize> {
    let mut bins = vec![0usize; bin_count.max(1)];
    if max <= min {
        return bins;
    }
    let width = (max - min) / bin_count as f64;
    for &v in values {
        let idx = (((v - min) / width) as isize).clamp(0, bin_count as isize - 1) as usize;
        bins[idx] += 1;
    }
    bins
}
