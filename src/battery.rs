//! EV battery (SOC-dependent derated max charge power) and stationary
//! battery (mutable SOC, charge/discharge accounting) models.

use crate::error::DomainError;
use crate::units::floor3;

/// Battery parameters shared by vehicle batteries and the stationary
/// storage battery: capacity, charge-power envelope, and the SOC-dependent
/// power-degradation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvBattery {
    pub capacity_kwh: f64,
    pub max_charge_power_kw: f64,
    pub min_charge_power_kw: f64,
    pub efficiency: f64,
    pub start_power_degradation: f64,
    pub max_degradation_level: f64,
}

impl EvBattery {
    pub fn new(
        capacity_kwh: f64,
        max_charge_power_kw: f64,
        min_charge_power_kw: f64,
        efficiency: f64,
        start_power_degradation: f64,
        max_degradation_level: f64,
    ) -> Self {
        assert!(capacity_kwh > 0.0, "battery capacity must be positive");
        assert!(min_charge_power_kw >= 0.0, "min_charge_power must be non-negative");
        assert!(
            (0.0..=1.0).contains(&efficiency),
            "efficiency must be in [0, 1]"
        );
        assert!(
            (0.0..=1.0).contains(&start_power_degradation),
            "start_power_degradation must be in [0, 1]"
        );
        assert!(
            (0.0..=1.0).contains(&max_degradation_level),
            "max_degradation_level must be in [0, 1]"
        );
        assert!(
            max_degradation_level * max_charge_power_kw >= min_charge_power_kw,
            "max_degradation_level * max_charge_power must be >= min_charge_power"
        );
        Self {
            capacity_kwh,
            max_charge_power_kw,
            min_charge_power_kw,
            efficiency,
            start_power_degradation,
            max_degradation_level,
        }
    }

    /// SOC-dependent derated max charge power. Flat until
    /// `start_power_degradation`, then linearly ramps down to
    /// `max_charge_power * max_degradation_level` at `soc = 1`.
    pub fn max_power_at_soc(&self, soc: f64) -> f64 {
        if soc <= self.start_power_degradation {
            return self.max_charge_power_kw;
        }
        let span = 1.0 - self.start_power_degradation;
        let frac = (soc - self.start_power_degradation) / span;
        self.max_charge_power_kw
            - frac * self.max_charge_power_kw * (1.0 - self.max_degradation_level)
    }
}

/// Stationary storage battery: a flat charge-power envelope (no SOC
/// derating curve, unlike [`EvBattery`]) plus mutable SOC tracking and an
/// independent discharge-power limit. `efficiency`, `start_power_degradation`
/// and `max_degradation_level` are retained for config-schema parity with
/// [`EvBattery`] but are not consulted by `charge`/`discharge`, matching the
/// specification's literal storage formulas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationaryBattery {
    pub capacity_kwh: f64,
    pub max_charge_power_kw: f64,
    pub min_charge_power_kw: f64,
    pub max_discharge_power_kw: f64,
    pub efficiency: f64,
    pub start_power_degradation: f64,
    pub max_degradation_level: f64,
    pub soc: f64,
    pub min_soc: f64,
}

impl StationaryBattery {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capacity_kwh: f64,
        max_charge_power_kw: f64,
        min_charge_power_kw: f64,
        max_discharge_power_kw: f64,
        efficiency: f64,
        start_power_degradation: f64,
        max_degradation_level: f64,
        soc: f64,
        min_soc: f64,
    ) -> Self {
        assert!(capacity_kwh > 0.0, "storage capacity must be positive");
        assert!(
            (0.0..=1.0).contains(&min_soc),
            "min_soc must be in [0, 1]"
        );
        assert!(
            (min_soc..=1.0).contains(&soc),
            "initial soc must be within [min_soc, 1]"
        );
        Self {
            capacity_kwh,
            max_charge_power_kw,
            min_charge_power_kw,
            max_discharge_power_kw,
            efficiency,
            start_power_degradation,
            max_degradation_level,
            soc,
            min_soc,
        }
    }

    /// Max power that can still be drawn out of storage right now, given
    /// `used_so_far` kW already committed to discharge this step.
    pub fn max_discharge_power(&self, used_so_far_kw: f64, dt_hours: f64) -> f64 {
        let by_limit = (self.max_discharge_power_kw - used_so_far_kw).max(0.0);
        let by_energy = ((self.soc - self.min_soc) * self.capacity_kwh / dt_hours).max(0.0);
        floor3(by_limit.min(by_energy))
    }

    /// Charges at up to `min(max_charge_power, headroom-to-full, available)`.
    /// Returns the realized (non-negative) power and updates `soc`.
    pub fn charge(&mut self, available_kw: f64, dt_hours: f64) -> f64 {
        let by_headroom = ((1.0 - self.soc) * self.capacity_kwh / dt_hours).max(0.0);
        let realized = floor3(available_kw.max(0.0).min(self.max_charge_power_kw).min(by_headroom));
        self.soc = (self.soc + realized * dt_hours / self.capacity_kwh).min(1.0);
        realized
    }

    /// Discharges `requested_kw`. Fails with [`DomainError::StorageOverdischarge`]
    /// if `requested_kw` exceeds [`Self::max_discharge_power`] at the current SOC.
    pub fn discharge(&mut self, requested_kw: f64, dt_hours: f64) -> Result<f64, DomainError> {
        let max = self.max_discharge_power(0.0, dt_hours);
        if requested_kw > max + 1e-9 {
            return Err(DomainError::StorageOverdischarge {
                requested: requested_kw,
                max,
            });
        }
        let realized = floor3(requested_kw.max(0.0));
        self.soc -= realized * dt_hours / self.capacity_kwh;
        self.check_soc()?;
        Ok(realized)
    }

    /// Validates `min_soc <= soc <= 1`.
    pub fn check_soc(&self) -> Result<(), DomainError> {
        if self.soc < self.min_soc - 1e-9 || self.soc > 1.0 + 1e-9 {
            return Err(DomainError::SocOutOfBounds {
                soc: self.soc,
                min: self.min_soc,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derated_power_is_flat_before_threshold() {
        let b = EvBattery::new(30.0, 11.0, 0.0, 1.0, 0.8, 0.2);
        assert_eq!(b.max_power_at_soc(0.0), 11.0);
        assert_eq!(b.max_power_at_soc(0.8), 11.0);
    }

    #[test]
    fn derated_power_ramps_down_to_floor_at_full_soc() {
        let b = EvBattery::new(30.0, 11.0, 0.0, 1.0, 0.8, 0.2);
        let at_full = b.max_power_at_soc(1.0);
        assert!((at_full - 11.0 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn storage_charge_clamps_to_headroom() {
        let mut s = StationaryBattery::new(30.0, 100.0, 0.0, 100.0, 1.0, 1.0, 1.0, 0.9, 0.1);
        let realized = s.charge(50.0, 1.0);
        assert!((realized - 3.0).abs() < 1e-6, "got {realized}");
        assert!((s.soc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn storage_discharge_respects_limit() {
        let mut s = StationaryBattery::new(30.0, 10.0, 0.0, 15.0, 1.0, 1.0, 1.0, 0.8, 0.0);
        let err = s.discharge(20.0, 1.0).unwrap_err();
        assert!(matches!(err, DomainError::StorageOverdischarge { .. }));
        let ok = s.discharge(12.0, 1.0).unwrap();
        assert!((ok - 12.0).abs() < 1e-6);
    }
}
