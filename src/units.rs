//! Dimensioned scalars and the time/resolution helpers shared by the config
//! loader, the event generator and the result store.
//!
//! Power and energy are plain `f64` (kW / kWh); durations are expressed in
//! seconds. Keeping them as newtypes would ripple through every arithmetic
//! site in the scheduler without buying much — the crate instead relies on
//! consistent naming (`_kw`, `_kwh`, `_seconds`) and the [`floor3`] helper to
//! keep floating point noise from accumulating into overallocation.

/// Floors `value` to 3 decimal places. Used everywhere a power or residual
/// capacity is computed, so that tiny FP overshoot never lets a scheduler
/// assign a hair more than a parent node can actually supply.
pub fn floor3(value: f64) -> f64 {
    (value * 1000.0).floor() / 1000.0
}

/// Number of simulation steps covering `[start, end]` inclusive at the given
/// resolution: `floor((end - start) / resolution) + 1`.
pub fn step_count(total_seconds: f64, resolution_seconds: f64) -> usize {
    ((total_seconds / resolution_seconds).floor() as i64 + 1).max(0) as usize
}

/// A time series that may need truncating, upsampling/downsampling, or
/// tiling to exactly cover `step_count` simulation steps.
///
/// Mirrors the preload/emissions alignment rules: truncate if long enough;
/// else piecewise-linear resample if a source resolution is given; else tile
/// if `repeat` is requested; else the scenario is rejected.
pub struct RawSeries<'a> {
    pub values: &'a [f64],
    /// Resolution the raw values were sampled at, in seconds, if known.
    pub resolution_seconds: Option<f64>,
    pub repeat: bool,
}

impl<'a> RawSeries<'a> {
    /// Aligns this series to exactly `step_count` samples at `target_resolution_seconds`.
    ///
    /// Returns `None` if the series is too short and neither `resolution_seconds`
    /// nor `repeat` was supplied — the caller should reject the scenario.
    pub fn aligned_to(&self, step_count: usize, target_resolution_seconds: f64) -> Option<Vec<f64>> {
        if self.values.is_empty() {
            return None;
        }
        if self.values.len() >= step_count {
            return Some(self.values[..step_count].to_vec());
        }
        if let Some(src_res) = self.resolution_seconds {
            return Some(resample_linear(
                self.values,
                src_res,
                target_resolution_seconds,
                step_count,
            ));
        }
        if self.repeat {
            return Some(repeat_to_length(self.values, step_count));
        }
        None
    }
}

/// Piecewise-linear resampling of a series sampled at `src_resolution_seconds`
/// onto `step_count` points at `dst_resolution_seconds`, clamping at the edges.
fn resample_linear(
    values: &[f64],
    src_resolution_seconds: f64,
    dst_resolution_seconds: f64,
    step_count: usize,
) -> Vec<f64> {
    let n = values.len();
    let mut out = Vec::with_capacity(step_count);
    for i in 0..step_count {
        let t = i as f64 * dst_resolution_seconds / src_resolution_seconds;
        let lo = t.floor() as usize;
        if lo >= n - 1 {
            out.push(values[n - 1]);
            continue;
        }
        let frac = t - lo as f64;
        out.push(values[lo] * (1.0 - frac) + values[lo + 1] * frac);
    }
    out
}

/// Tiles `values` to exactly `step_count` entries, copying a partial tail
/// from the beginning of the pattern when `step_count` isn't a multiple of
/// `values.len()`.
fn repeat_to_length(values: &[f64], step_count: usize) -> Vec<f64> {
    let n = values.len();
    (0..step_count).map(|i| values[i % n]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor3_truncates_noise() {
        assert_eq!(floor3(1.23456), 1.234);
        assert_eq!(floor3(0.9999999), 0.999);
        assert_eq!(floor3(-0.0001), -0.001);
    }

    #[test]
    fn step_count_matches_formula() {
        assert_eq!(step_count(6.0 * 3600.0, 3600.0), 7);
        assert_eq!(step_count(0.0, 3600.0), 1);
    }

    #[test]
    fn aligned_to_truncates_when_long_enough() {
        let raw = RawSeries {
            values: &[1.0, 2.0, 3.0, 4.0],
            resolution_seconds: None,
            repeat: false,
        };
        assert_eq!(raw.aligned_to(2, 3600.0), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn aligned_to_repeats_when_requested() {
        let raw = RawSeries {
            values: &[1.0, 2.0],
            resolution_seconds: None,
            repeat: true,
        };
        assert_eq!(raw.aligned_to(5, 3600.0), Some(vec![1.0, 2.0, 1.0, 2.0, 1.0]));
    }

    #[test]
    fn aligned_to_rejects_when_too_short_and_no_strategy() {
        let raw = RawSeries {
            values: &[1.0, 2.0],
            resolution_seconds: None,
            repeat: false,
        };
        assert_eq!(raw.aligned_to(5, 3600.0), None);
    }

    #[test]
    fn aligned_to_resamples_with_source_resolution() {
        let raw = RawSeries {
            values: &[0.0, 10.0],
            resolution_seconds: Some(7200.0),
            repeat: false,
        };
        let out = raw.aligned_to(3, 3600.0).unwrap();
        assert_eq!(out, vec![0.0, 5.0, 10.0]);
    }
}
