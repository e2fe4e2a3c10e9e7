//! Post-hoc KPI computation from a completed simulation run.
//!
//! Computed from the [`ResultStore`] plus the scenario's installed CP
//! capacity and optional emissions/cost series.

use std::fmt;

use crate::infrastructure::InfrastructureTree;
use crate::result::ResultStore;

/// Aggregate key performance indicators derived from a complete simulation run.
#[derive(Debug, Clone)]
pub struct KpiReport {
    pub total_energy_kwh: f64,
    pub max_load_kw: f64,
    pub installed_capacity_kw: f64,
    pub simultaneity_max: f64,
    pub total_emissions: f64,
    pub electricity_cost_fixed: f64,
    pub electricity_cost_variable: f64,
    pub average_charging_time_minutes: Option<f64>,
    pub rejections: u64,
}

impl KpiReport {
    /// Computes every §4.7 KPI from a finished run.
    ///
    /// `emissions` and `daily_rate_per_kwh` must already be aligned to the
    /// simulation's step count / wrap at 24h respectively, as produced by
    /// [`crate::config::ScenarioConfig::build`].
    pub fn from_result(
        result: &ResultStore,
        tree: &InfrastructureTree,
        emissions: &[f64],
        fixed_rate_per_kwh: f64,
        daily_rate_per_kwh: &[f64],
        start_hour_of_day: f64,
    ) -> Self {
        let installed_capacity_kw: f64 = tree
            .charging_points
            .iter()
            .map(|&cp| tree.node(cp).max_power_kw)
            .sum();

        Self {
            total_energy_kwh: result.total_energy_kwh(),
            max_load_kw: result.max_load_kw(),
            installed_capacity_kw,
            simultaneity_max: result.simultaneity_max(installed_capacity_kw),
            total_emissions: result.total_emissions(emissions),
            electricity_cost_fixed: result.electricity_cost_fixed(fixed_rate_per_kwh),
            electricity_cost_variable: result.electricity_cost_variable(daily_rate_per_kwh, start_hour_of_day),
            average_charging_time_minutes: result
                .average_charging_time_seconds()
                .map(|s| s / 60.0),
            rejections: result.rejections,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Total energy delivered:  {:.2} kWh", self.total_energy_kwh)?;
        writeln!(f, "Max load:                {:.2} kW", self.max_load_kw)?;
        writeln!(f, "Installed CP capacity:   {:.2} kW", self.installed_capacity_kw)?;
        writeln!(f, "Max simultaneity factor: {:.3}", self.simultaneity_max)?;
        writeln!(f, "Total emissions:         {:.3}", self.total_emissions)?;
        writeln!(f, "Electricity cost (fixed):    {:.4}", self.electricity_cost_fixed)?;
        writeln!(f, "Electricity cost (variable): {:.4}", self.electricity_cost_variable)?;
        match self.average_charging_time_minutes {
            Some(m) => writeln!(f, "Average charging time:   {m:.1} min")?,
            None => writeln!(f, "Average charging time:   n/a (no completed charging periods)")?,
        }
        write!(f, "Admission rejections:   {}", self.rejections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{ChargingPointSpec, StationSpec, TransformerSpec};

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
    fn empty_result_kpis_default_to_zero_except_average_charging_time() {
        let tree = single_cp_tree(11.0);
        let result = ResultStore::new(4, 3600.0);
        let kpi = KpiReport::from_result(&result, &tree, &[], 0.3, &[], 0.0);
        assert_eq!(kpi.total_energy_kwh, 0.0);
        assert_eq!(kpi.max_load_kw, 0.0);
        assert_eq!(kpi.electricity_cost_fixed, 0.0);
        assert_eq!(kpi.average_charging_time_minutes, None);
        assert_eq!(kpi.installed_capacity_kw, 11.0);
    }

    #[test]
    fn fixed_cost_scales_with_energy_and_rate() {
        let tree = single_cp_tree(11.0);
        let mut result = ResultStore::new(2, 3600.0);
        let cp = tree.charging_points[0];
        result.record_cp(cp, 0, 10.0);
        result.record_cp(cp, 1, 10.0);
        let kpi = KpiReport::from_result(&result, &tree, &[], 0.25, &[], 0.0);
        assert!((kpi.electricity_cost_fixed - 5.0).abs() < 1e-9);
    }
}
