use std::f64::consts::PI;

use rand::Rng;

const JITTER_MIN_SCALE: f64 = 0.5;
const JITTER_MAX_SCALE: f64 = 1.5;

/// Poisson variate by multiplying uniforms until the product drops below `exp(-lambda)`.
///
/// Exact for the small rates used for goals, corners and bookings. Non-positive
/// (or NaN) rates always yield 0.
pub fn sample_poisson(rng: &mut impl Rng, lambda: f64) -> u32 {
    if !(lambda > 0.0) {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut k = 0u32;
    let mut product: f64 = rng.r#gen();
    while product > limit {
        k += 1;
        product *= rng.r#gen::<f64>();
    }
    k
}

/// Box-Muller normal variate. Exact-zero uniforms are redrawn so `ln` stays finite.
pub fn sample_normal(rng: &mut impl Rng, mean: f64, stddev: f64) -> f64 {
    let u1 = loop {
        let u: f64 = rng.r#gen();
        if u > 0.0 {
            break u;
        }
    };
    let u2: f64 = rng.r#gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    mean + stddev * z
}

/// Multiplicative noise applied to one side's scoring rate for a single trial.
pub fn rate_jitter(rng: &mut impl Rng, stddev: f64) -> f64 {
    if stddev <= 0.0 {
        return 1.0;
    }
    (1.0 + sample_normal(rng, 0.0, stddev)).clamp(JITTER_MIN_SCALE, JITTER_MAX_SCALE)
}
