//! Probability densities used by the spectrum models.

use std::f64::consts::PI;

use statrs::function::gamma::ln_gamma;

/// Normalized Gaussian density. Returns NaN for a non-positive width so that
/// the solver rejects such trial points instead of fitting a delta spike.
pub fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    if !(sigma > 0.0) {
        return f64::NAN;
    }
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

/// Generalized Poisson probability of `n` photoelectrons:
///
/// `P(n) = μ (μ + nλ)^(n-1) e^{-(μ + nλ)} / n!`
///
/// with `μ` the mean number of primary photoelectrons and `λ` the crosstalk
/// probability. Evaluated in log space.
pub fn generalized_poisson(n: u32, mu: f64, mu_xt: f64) -> f64 {
    if mu == 0.0 {
        return if n == 0 { 1.0 } else { 0.0 };
    }
    if !(mu > 0.0) || !mu_xt.is_finite() {
        return f64::NAN;
    }
    let n_f = f64::from(n);
    let rate = mu + n_f * mu_xt;
    if !(rate > 0.0) {
        return 0.0;
    }
    let ln_p = mu.ln() + (n_f - 1.0) * rate.ln() - rate - ln_factorial(n);
    ln_p.exp()
}

/// `ln n!`.
pub fn ln_factorial(n: u32) -> f64 {
    if n < 2 {
        0.0
    } else {
        ln_gamma(f64::from(n) + 1.0)
    }
}
