//! Shared random-number helpers. One seeded `StdRng` is threaded through the
//! event generator and alias sampler per run so that, given the same seed,
//! the entire sequence of draws is reproducible.

use rand::Rng;
use rand::rngs::StdRng;

/// Box-Muller sample from a Gaussian with the given mean and standard
/// deviation. Returns `mean` unperturbed when `std_dev <= 0.0`.
pub fn gaussian(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return mean;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + z0 * std_dev
}
