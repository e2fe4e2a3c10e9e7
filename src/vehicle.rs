//! Vehicle types, charging events, and the mutable state a charging point
//! keeps about whichever event currently occupies it.

use crate::battery::EvBattery;

/// A class of vehicle: its battery envelope and the alias-sampler weight
/// used to pick it among the fleet mix.
#[derive(Debug, Clone)]
pub struct VehicleType {
    pub brand: String,
    pub model: String,
    pub battery: EvBattery,
    pub probability: f64,
}

impl VehicleType {
    pub fn new(brand: impl Into<String>, model: impl Into<String>, battery: EvBattery, probability: f64) -> Self {
        assert!(probability > 0.0, "vehicle type probability must be positive");
        Self {
            brand: brand.into(),
            model: model.into(),
            battery,
            probability,
        }
    }
}

/// An immutable arrival: when the vehicle shows up, how long it parks, and
/// what state of charge it arrives/wants to leave with.
#[derive(Debug, Clone)]
pub struct ChargingEvent {
    pub id: u64,
    /// Seconds since the simulation start.
    pub arrival_time: f64,
    /// Seconds.
    pub parking_time: f64,
    pub soc: f64,
    pub soc_target: f64,
    pub vehicle_type: usize,
}

impl ChargingEvent {
    pub fn new(
        id: u64,
        arrival_time: f64,
        parking_time: f64,
        soc: f64,
        soc_target: f64,
        vehicle_type: usize,
    ) -> Self {
        assert!(parking_time > 0.0, "parking_time must be positive");
        assert!((0.0..=1.0).contains(&soc), "soc must be in [0, 1]");
        assert!((0.0..=1.0).contains(&soc_target), "soc_target must be in [0, 1]");
        Self {
            id,
            arrival_time,
            parking_time,
            soc,
            soc_target,
            vehicle_type,
        }
    }

    pub fn leaving_time(&self) -> f64 {
        self.arrival_time + self.parking_time
    }
}

/// Mutable state living on a charging point while a vehicle is connected —
/// the only fields the scheduler needs to read or update per step.
#[derive(Debug, Clone)]
pub struct ConnectedVehicleState {
    pub event_id: u64,
    pub vehicle_type: usize,
    pub soc: f64,
    pub soc_target: f64,
    pub leaving_time: f64,
}

impl ConnectedVehicleState {
    pub fn from_event(event: &ChargingEvent) -> Self {
        Self {
            event_id: event.id,
            vehicle_type: event.vehicle_type,
            soc: event.soc,
            soc_target: event.soc_target,
            leaving_time: event.leaving_time(),
        }
    }

    /// `soc <- min(1, soc + P * dt_hours / capacity)`.
    pub fn apply_charge(&mut self, power_kw: f64, dt_hours: f64, capacity_kwh: f64) {
        self.soc = (self.soc + power_kw * dt_hours / capacity_kwh).min(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaving_time_is_arrival_plus_parking() {
        let e = ChargingEvent::new(1, 100.0, 50.0, 0.5, 1.0, 0);
        assert_eq!(e.leaving_time(), 150.0);
    }

    #[test]
    fn apply_charge_clamps_at_full() {
        let mut s = ConnectedVehicleState {
            event_id: 1,
            vehicle_type: 0,
            soc: 0.95,
            soc_target: 1.0,
            leaving_time: 10.0,
        };
        s.apply_charge(100.0, 1.0, 10.0);
        assert_eq!(s.soc, 1.0);
    }
}
