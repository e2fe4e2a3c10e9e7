//! Stochastic charging-event generator: the weekly independent-marginals
//! sampler and the 2-D Gaussian-Mixture sampler, sharing a common
//! post-processing step that attaches parking time, arrival SOC, and
//! vehicle type.

use rand::Rng;
use rand::rngs::StdRng;

use crate::distribution::{AliasSampler, InterpolatedDistribution};
use crate::error::ConfigError;
use crate::rng::gaussian;
use crate::vehicle::{ChargingEvent, VehicleType};

const HOURS_PER_WEEK: f64 = 168.0;

/// Parameters shared by both samplers for the parking-time / SOC /
/// vehicle-type post-processing step.
pub struct ArrivalShape<'a> {
    pub mean_park_hours: f64,
    pub std_park_hours: f64,
    pub mean_soc: f64,
    pub std_soc: f64,
    pub max_parking_hours: f64,
    pub vehicle_types: &'a [VehicleType],
}

impl<'a> ArrivalShape<'a> {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.vehicle_types.is_empty() {
            return Err(ConfigError::new("vehicle_types", "must be non-empty"));
        }
        if self.max_parking_hours <= 0.0 {
            return Err(ConfigError::new("max_parking_time", "must be positive"));
        }
        Ok(())
    }

    fn vehicle_type_sampler(&self) -> AliasSampler<usize> {
        let keys: Vec<usize> = (0..self.vehicle_types.len()).collect();
        let weights: Vec<f64> = self.vehicle_types.iter().map(|v| v.probability).collect();
        AliasSampler::new(keys, weights)
    }

    /// Draws parking time, SOC and vehicle type for one arrival, clamped per
    /// §4.4 step 8 / GMM step 4.
    fn draw_post_fields(&self, rng: &mut StdRng, sampler: &AliasSampler<usize>) -> (f64, f64, usize) {
        let parking = gaussian(rng, self.mean_park_hours, self.std_park_hours)
            .clamp(0.0, self.max_parking_hours);
        let soc = gaussian(rng, self.mean_soc, self.std_soc).clamp(0.0, 1.0);
        let vehicle_type = sampler.sample(rng);
        (parking, soc, vehicle_type)
    }
}

/// Inputs to the weekly independent-marginals sampler (§4.4).
pub struct WeeklyMarginalsInput<'a> {
    /// Arrival weights over one week, uniformly spaced (length `L`).
    pub arrival_weights: &'a [f64],
    /// Desired mean number of events per week.
    pub mean_events_per_week: f64,
    /// Seconds from the simulation's `start_date` to the preceding Monday
    /// midnight (`offset_seconds` in §4.4 step 1).
    pub offset_from_monday_seconds: f64,
    /// Total simulated duration, in hours.
    pub sim_duration_hours: f64,
    pub shape: ArrivalShape<'a>,
}

/// Builds the week-aligned [`InterpolatedDistribution`] used by the weekly
/// marginals sampler: rotates the weekly weights by the starting offset,
/// replicates across the simulation horizon, and places x-coordinates in
/// hours from `T0`.
///
/// Returns `(distribution, delta_hours)` where `delta_hours` is the
/// fractional leftover `δ` from §4.4 step 1.
fn align_distribution(
    arrival_weights: &[f64],
    offset_from_monday_seconds: f64,
    sim_duration_hours: f64,
) -> (InterpolatedDistribution, f64) {
    let l = arrival_weights.len();
    let step_hours = HOURS_PER_WEEK / l as f64;
    let step_seconds = step_hours * 3600.0;

    let k = (offset_from_monday_seconds / step_seconds).floor() as usize;
    let k_mod = k % l;
    let delta_hours = (offset_from_monday_seconds - k as f64 * step_seconds) / 3600.0;

    let reps = ((sim_duration_hours + delta_hours) / HOURS_PER_WEEK).ceil().max(1.0) as usize + 1;
    let mut lifted = Vec::with_capacity(l * reps);
    for _ in 0..reps {
        lifted.extend_from_slice(&arrival_weights[k_mod..]);
        lifted.extend_from_slice(&arrival_weights[..k_mod]);
    }

    let points: Vec<(f64, f64)> = lifted
        .iter()
        .enumerate()
        .map(|(i, &y)| (i as f64 * step_hours - delta_hours, y))
        .collect();
    (InterpolatedDistribution::new(points), delta_hours)
}

/// Runs the weekly independent-marginals sampler: aligns the weekly
/// distribution to `sim_steps` (wall-clock seconds from `T0`), draws arrival
/// step-indices proportional to the resulting probability vector, then
/// attaches parking time / SOC / vehicle type to each draw.
///
/// `sim_steps` must be sorted ascending and non-empty.
pub fn sample_weekly_marginals(
    rng: &mut StdRng,
    input: &WeeklyMarginalsInput<'_>,
    sim_steps_seconds: &[f64],
) -> Result<Vec<ChargingEvent>, ConfigError> {
    input.shape.validate()?;
    if input.arrival_weights.is_empty() {
        return Err(ConfigError::new("arrival_distribution", "must be non-empty"));
    }
    if sim_steps_seconds.is_empty() {
        return Err(ConfigError::new("steps", "simulation must have at least one step"));
    }

    let (dist, _delta_hours) = align_distribution(
        input.arrival_weights,
        input.offset_from_monday_seconds,
        input.sim_duration_hours,
    );

    let mut probabilities: Vec<f64> = sim_steps_seconds
        .iter()
        .map(|&t_seconds| dist.at(t_seconds / 3600.0))
        .collect();
    let total: f64 = probabilities.iter().sum();
    if total <= 0.0 {
        probabilities = vec![1.0 / sim_steps_seconds.len() as f64; sim_steps_seconds.len()];
    } else {
        for p in &mut probabilities {
            *p /= total;
        }
    }

    let weeks = (input.sim_duration_hours / HOURS_PER_WEEK).max(1.0 / HOURS_PER_WEEK);
    let n = (input.mean_events_per_week * weeks).ceil() as usize;

    let step_sampler = AliasSampler::new((0..sim_steps_seconds.len()).collect(), probabilities);
    let vehicle_sampler = input.shape.vehicle_type_sampler();

    let mut arrivals: Vec<f64> = step_sampler
        .sample_many(rng, n)
        .into_iter()
        .map(|idx| sim_steps_seconds[idx])
        .collect();
    arrivals.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut events = Vec::with_capacity(n);
    let mut next_id = 0u64;
    for arrival_seconds in arrivals {
        let (parking_hours, soc, vehicle_type) =
            input.shape.draw_post_fields(rng, &vehicle_sampler);
        let parking_seconds = (parking_hours.max(1.0 / 60.0)) * 3600.0;
        events.push(ChargingEvent::new(
            next_id,
            arrival_seconds,
            parking_seconds,
            soc,
            1.0,
            vehicle_type,
        ));
        next_id += 1;
    }
    Ok(events)
}

/// A single Gaussian-mixture component over (arrival-hour-of-week,
/// parking-hours).
#[derive(Debug, Clone)]
pub struct GmmComponent {
    pub weight: f64,
    pub mean: (f64, f64),
    /// Row-major 2x2 covariance.
    pub covariance: [[f64; 2]; 2],
}

/// Inputs to the 2-D Gaussian-Mixture sampler (§4.4).
pub struct GmmInput<'a> {
    pub components: &'a [GmmComponent],
    pub num_charging_events_per_week: usize,
    /// Hours-from-`T0` of the simulation's first step.
    pub first_step_hours: f64,
    pub sim_duration_hours: f64,
    pub resolution_hours: f64,
    /// Wrap-around buffer width before each day boundary, in hours.
    pub cut_off_hours: f64,
    pub shape: ArrivalShape<'a>,
}

const MIN_PARKING_HOURS: f64 = 1.0 / 60.0;

fn sample_gmm_point(rng: &mut StdRng, components: &[GmmComponent], component_sampler: &AliasSampler<usize>) -> (f64, f64) {
    let idx = component_sampler.sample(rng);
    let c = &components[idx];
    sample_2d_gaussian(rng, c.mean, c.covariance)
}

/// Samples from a 2-D Gaussian via its Cholesky factor (valid for the
/// symmetric positive semi-definite covariances the GMM spec requires).
fn sample_2d_gaussian(rng: &mut StdRng, mean: (f64, f64), cov: [[f64; 2]; 2]) -> (f64, f64) {
    let z0 = gaussian(rng, 0.0, 1.0);
    let z1 = gaussian(rng, 0.0, 1.0);

    let var_x = cov[0][0].max(0.0);
    let l00 = var_x.sqrt();
    let l10 = if l00 > 1e-12 { cov[1][0] / l00 } else { 0.0 };
    let remaining = (cov[1][1] - l10 * l10).max(0.0);
    let l11 = remaining.sqrt();

    let x = mean.0 + l00 * z0;
    let y = mean.1 + l10 * z0 + l11 * z1;
    (x, y)
}

/// Shifts a sample whose arrival hour-of-week falls in the wrap-around
/// buffer `(24k - cut_off, 24k)` for `k in 1..=7` by `-(24 - cut_off)`,
/// folding it to just past the following midnight, mirroring the source's
/// day-boundary smoothing.
fn shift_wraparound(arrival_hour_of_week: f64, cut_off_hours: f64) -> f64 {
    let shift = 24.0 - cut_off_hours;
    for k in 1..=7 {
        let boundary = 24.0 * k as f64;
        if arrival_hour_of_week > boundary - cut_off_hours && arrival_hour_of_week < boundary {
            return arrival_hour_of_week - shift;
        }
    }
    arrival_hour_of_week
}

fn validate_gmm(components: &[GmmComponent]) -> Result<(), ConfigError> {
    if components.is_empty() {
        return Err(ConfigError::new("gmm_means", "must be non-empty"));
    }
    let total_weight: f64 = components.iter().map(|c| c.weight).sum();
    if (total_weight - 1.0).abs() > 0.01 {
        return Err(ConfigError::new(
            "gmm_weights",
            format!("must sum to 1 within 1% tolerance, got {total_weight}"),
        ));
    }
    Ok(())
}

/// Runs the 2-D Gaussian-Mixture sampler: draws `num_charging_events` points
/// per week from the mixture, smooths day-boundary wraparound, replicates
/// across successive weeks to cover the horizon, rounds arrivals up to the
/// step grid, and drops samples outside the simulation window.
pub fn sample_gmm(rng: &mut StdRng, input: &GmmInput<'_>) -> Result<Vec<ChargingEvent>, ConfigError> {
    input.shape.validate()?;
    validate_gmm(input.components)?;

    let component_weights: Vec<f64> = input.components.iter().map(|c| c.weight).collect();
    let component_sampler = AliasSampler::new((0..input.components.len()).collect(), component_weights);
    let vehicle_sampler = input.shape.vehicle_type_sampler();

    let weeks_needed = ((input.sim_duration_hours + input.first_step_hours) / HOURS_PER_WEEK)
        .ceil()
        .max(1.0) as usize;

    let mut pool: Vec<(f64, f64)> = Vec::new();
    let mut refill_pool = |rng: &mut StdRng, pool: &mut Vec<(f64, f64)>| {
        for _ in 0..input.num_charging_events_per_week.max(1) {
            let sample = sample_gmm_point(rng, input.components, &component_sampler);
            if sample.1 >= MIN_PARKING_HOURS {
                pool.push(sample);
            }
        }
    };

    let mut events = Vec::new();
    let mut next_id = 0u64;
    let window_end_hours = input.first_step_hours + input.sim_duration_hours;

    for week in 0..weeks_needed {
        for _ in 0..input.num_charging_events_per_week {
            let mut sample = sample_gmm_point(rng, input.components, &component_sampler);
            while sample.1 < MIN_PARKING_HOURS {
                if pool.is_empty() {
                    refill_pool(rng, &mut pool);
                }
                sample = pool.pop().unwrap_or((sample.0, MIN_PARKING_HOURS));
            }

            let (arrival_hour_of_week, parking_hours) = sample;
            let smoothed = shift_wraparound(arrival_hour_of_week, input.cut_off_hours);
            let mut arrival_hours = smoothed + HOURS_PER_WEEK * week as f64;
            arrival_hours = (arrival_hours / input.resolution_hours).ceil() * input.resolution_hours;

            if arrival_hours < input.first_step_hours || arrival_hours >= window_end_hours {
                continue;
            }

            let parking_clamped = parking_hours.clamp(MIN_PARKING_HOURS, input.shape.max_parking_hours);
            let soc = gaussian(rng, input.shape.mean_soc, input.shape.std_soc).clamp(0.0, 1.0);
            let vehicle_type = vehicle_sampler.sample(rng);

            events.push(ChargingEvent::new(
                next_id,
                (arrival_hours - input.first_step_hours) * 3600.0,
                parking_clamped * 3600.0,
                soc,
                1.0,
                vehicle_type,
            ));
            next_id += 1;
        }
    }

    events.sort_by(|a, b| a.arrival_time.partial_cmp(&b.arrival_time).unwrap());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::EvBattery;
    use rand::SeedableRng;

    fn one_vehicle_type() -> Vec<VehicleType> {
        vec![VehicleType::new(
            "Acme",
            "Model E",
            EvBattery::new(40.0, 11.0, 0.0, 1.0, 1.0, 1.0),
            1.0,
        )]
    }

    #[test]
    fn weekly_marginals_clusters_at_monday_midnight() {
        let mut weights = vec![0.0; 168];
        weights[0] = 1.0;
        let vehicle_types = one_vehicle_type();
        let shape = ArrivalShape {
            mean_park_hours: 2.0,
            std_park_hours: 0.1,
            mean_soc: 0.5,
            std_soc: 0.05,
            max_parking_hours: 24.0,
            vehicle_types: &vehicle_types,
        };
        let input = WeeklyMarginalsInput {
            arrival_weights: &weights,
            mean_events_per_week: 168.0,
            // start on a Tuesday 00:00 => 24h past Monday midnight
            offset_from_monday_seconds: 24.0 * 3600.0,
            sim_duration_hours: 14.0 * 24.0,
            shape,
        };
        let steps: Vec<f64> = (0..14 * 24).map(|i| i as f64 * 3600.0).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let events = sample_weekly_marginals(&mut rng, &input, &steps).unwrap();
        assert!(!events.is_empty());
        // Every arrival should land near an hour-of-week==0 (a Monday) boundary:
        // hours-from-T0 mod 168 should be near 0 or 167 given T0 is Tuesday 00:00.
        let mut near_boundary = 0;
        for e in &events {
            let hours = e.arrival_time / 3600.0;
            let phase = hours.rem_euclid(168.0);
            if phase < 2.0 || phase > 166.0 {
                near_boundary += 1;
            }
        }
        let fraction = near_boundary as f64 / events.len() as f64;
        assert!(fraction > 0.9, "fraction near boundary was {fraction}");
    }

    #[test]
    fn gmm_rejects_bad_weights() {
        let vehicle_types = one_vehicle_type();
        let shape = ArrivalShape {
            mean_park_hours: 2.0,
            std_park_hours: 0.5,
            mean_soc: 0.5,
            std_soc: 0.1,
            max_parking_hours: 24.0,
            vehicle_types: &vehicle_types,
        };
        let components = vec![GmmComponent {
            weight: 0.5,
            mean: (10.0, 2.0),
            covariance: [[1.0, 0.0], [0.0, 1.0]],
        }];
        let input = GmmInput {
            components: &components,
            num_charging_events_per_week: 10,
            first_step_hours: 0.0,
            sim_duration_hours: 168.0,
            resolution_hours: 1.0,
            cut_off_hours: 5.0,
            shape,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let result = sample_gmm(&mut rng, &input);
        assert!(result.is_err());
    }

    #[test]
    fn gmm_produces_events_within_window() {
        let vehicle_types = one_vehicle_type();
        let shape = ArrivalShape {
            mean_park_hours: 2.0,
            std_park_hours: 0.5,
            mean_soc: 0.5,
            std_soc: 0.1,
            max_parking_hours: 24.0,
            vehicle_types: &vehicle_types,
        };
        let components = vec![GmmComponent {
            weight: 1.0,
            mean: (10.0, 2.0),
            covariance: [[4.0, 0.0], [0.0, 0.5]],
        }];
        let input = GmmInput {
            components: &components,
            num_charging_events_per_week: 50,
            first_step_hours: 0.0,
            sim_duration_hours: 168.0,
            resolution_hours: 1.0,
            cut_off_hours: 5.0,
            shape,
        };
        let mut rng = StdRng::seed_from_u64(7);
        let events = sample_gmm(&mut rng, &input).unwrap();
        assert!(!events.is_empty());
        for e in &events {
            assert!(e.arrival_time >= 0.0);
            assert!(e.arrival_time < 168.0 * 3600.0);
            assert!(e.parking_time > 0.0);
        }
    }
}
