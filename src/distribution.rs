//! Piecewise-linear interpolated distributions and the Walker alias sampler.

use rand::Rng;
use rand::rngs::StdRng;

/// Immutable ordered sequence of `(x, y)` points. `at(x)` linearly
/// interpolates between the bracketing points and clamps to the boundary `y`
/// outside `[x_min, x_max]`.
#[derive(Debug, Clone)]
pub struct InterpolatedDistribution {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl InterpolatedDistribution {
    /// `points` must be sorted ascending by `x` and non-empty.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        assert!(!points.is_empty(), "distribution must have at least one point");
        let xs = points.iter().map(|p| p.0).collect();
        let ys = points.iter().map(|p| p.1).collect();
        Self { xs, ys }
    }

    pub fn at(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        // Linear scan for the bracketing segment; callers needing O(1) lookup
        // on a uniform grid should use `EquallySpacedInterpolatedDistribution`.
        let i = match self.xs.binary_search_by(|probe| probe.partial_cmp(&x).unwrap()) {
            Ok(idx) => return self.ys[idx],
            Err(idx) => idx - 1,
        };
        let frac = (x - self.xs[i]) / (self.xs[i + 1] - self.xs[i]);
        self.ys[i] + frac * (self.ys[i + 1] - self.ys[i])
    }
}

/// Equally-spaced variant that locates the bracket in O(1) via
/// `ceil((x - x0) / step) - 1`.
#[derive(Debug, Clone)]
pub struct EquallySpacedInterpolatedDistribution {
    x0: f64,
    step: f64,
    ys: Vec<f64>,
}

impl EquallySpacedInterpolatedDistribution {
    pub fn new(x0: f64, step: f64, ys: Vec<f64>) -> Self {
        assert!(step > 0.0, "step must be positive");
        assert!(!ys.is_empty(), "distribution must have at least one point");
        Self { x0, step, ys }
    }

    pub fn at(&self, x: f64) -> f64 {
        let n = self.ys.len();
        let x_max = self.x0 + self.step * (n - 1) as f64;
        if x <= self.x0 {
            return self.ys[0];
        }
        if x >= x_max {
            return self.ys[n - 1];
        }
        let raw = (x - self.x0) / self.step;
        let i = (raw.ceil() as isize - 1).clamp(0, n as isize - 2) as usize;
        let frac = raw - i as f64;
        self.ys[i] + frac * (self.ys[i + 1] - self.ys[i])
    }
}

/// Walker's alias method: O(n) table construction, O(1) sampling of a key
/// from a discrete weighted distribution.
pub struct AliasSampler<K: Clone> {
    keys: Vec<K>,
    prob: Vec<f64>,
    alias: Vec<usize>,
}

impl<K: Clone> AliasSampler<K> {
    /// `weights` must be non-negative and `keys.len() == weights.len() > 0`;
    /// normalisation is performed internally.
    pub fn new(keys: Vec<K>, weights: Vec<f64>) -> Self {
        let n = keys.len();
        assert_eq!(n, weights.len());
        assert!(n > 0, "alias sampler needs at least one entry");
        let total: f64 = weights.iter().sum();
        assert!(total > 0.0, "alias sampler weights must sum to a positive value");

        let scaled: Vec<f64> = weights.iter().map(|w| w / total * n as f64).collect();
        let mut prob = vec![0.0; n];
        let mut alias = vec![0usize; n];

        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        let mut scaled = scaled;
        for (i, &s) in scaled.iter().enumerate() {
            if s < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        while let (Some(s), Some(l)) = (small.pop(), large.pop()) {
            prob[s] = scaled[s];
            alias[s] = l;
            scaled[l] = scaled[l] + scaled[s] - 1.0;
            if scaled[l] < 1.0 {
                small.push(l);
            } else {
                large.push(l);
            }
        }
        for i in large {
            prob[i] = 1.0;
        }
        for i in small {
            prob[i] = 1.0;
        }

        Self { keys, prob, alias }
    }

    pub fn sample(&self, rng: &mut StdRng) -> K {
        let n = self.keys.len();
        let j = rng.random_range(0..n);
        let u: f64 = rng.random();
        if u <= self.prob[j] {
            self.keys[j].clone()
        } else {
            self.keys[self.alias[j]].clone()
        }
    }

    /// Draws `k` keys, with replacement.
    pub fn sample_many(&self, rng: &mut StdRng, k: usize) -> Vec<K> {
        (0..k).map(|_| self.sample(rng)).collect()
    }
}
