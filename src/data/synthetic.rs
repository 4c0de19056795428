//! Synthetic per-channel histograms from known model parameters.
//!
//! Counts are either the model's expected value at each bin center or a
//! Poisson draw around it. A seeded `StdRng` keeps every run reproducible.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::domain::Histogram;
use crate::error::AppError;
use crate::models::CalibrationModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CountNoise {
    /// Expected counts, no sampling.
    Expected,
    /// Poisson-distributed counts.
    Poisson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub bin_centers: Vec<f64>,
    pub n_channels: usize,
    pub noise: CountNoise,
    pub seed: u64,
    /// Standard deviation of a per-channel shift applied to `baseline`.
    pub baseline_jitter: f64,
}

/// Generated histogram plus the parameters each channel was drawn from.
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    pub histogram: Histogram,
    pub truth: Vec<Vec<f64>>,
}

pub fn generate<M>(model: &M, params: &[f64], spec: &SyntheticSpec) -> Result<SyntheticRun, AppError>
where
    M: CalibrationModel + ?Sized,
{
    if params.len() != model.n_params() {
        return Err(AppError::invalid_input(format!(
            "{} takes {} parameters, got {}.",
            model.kind(),
            model.n_params(),
            params.len()
        )));
    }
    if spec.n_channels == 0 {
        return Err(AppError::invalid_input("Channel count must be > 0."));
    }
    if !(spec.baseline_jitter.is_finite() && spec.baseline_jitter >= 0.0) {
        return Err(AppError::invalid_input("Baseline jitter must be finite and >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let jitter = Normal::new(0.0, spec.baseline_jitter)
        .map_err(|e| AppError::invalid_input(format!("Jitter distribution error: {e}")))?;
    let baseline = model.parameter_names().iter().position(|n| n == "baseline");

    let mut truth = Vec::with_capacity(spec.n_channels);
    let mut counts = Vec::with_capacity(spec.n_channels);
    for _ in 0..spec.n_channels {
        let mut p = params.to_vec();
        if let Some(i) = baseline {
            if spec.baseline_jitter > 0.0 {
                p[i] += jitter.sample(&mut rng);
            }
        }

        let expected = model.evaluate(&p, &spec.bin_centers);
        let row = match spec.noise {
            CountNoise::Expected => expected.into_iter().map(|v| v.max(0.0)).collect(),
            CountNoise::Poisson => expected
                .into_iter()
                .map(|lambda| sample_poisson(&mut rng, lambda))
                .collect::<Result<Vec<f64>, AppError>>()?,
        };
        counts.push(row);
        truth.push(p);
    }

    let histogram = Histogram::new(spec.bin_centers.clone(), counts)?;
    log::debug!(
        "generated {} {} channels over {} bins",
        histogram.n_channels(),
        model.kind(),
        histogram.n_bins()
    );
    Ok(SyntheticRun { histogram, truth })
}

/// Expected counts below this are drawn as zero; the Poisson sampler is not
/// reliable for vanishing rates.
const MIN_POISSON_RATE: f64 = 1e-9;

fn sample_poisson(rng: &mut StdRng, lambda: f64) -> Result<f64, AppError> {
    if !lambda.is_finite() {
        return Err(AppError::invalid_input("Model produced a non-finite expected count."));
    }
    if lambda < MIN_POISSON_RATE {
        return Ok(0.0);
    }
    let dist = Poisson::new(lambda)
        .map_err(|e| AppError::invalid_input(format!("Poisson distribution error: {e}")))?;
    let count: f64 = dist.sample(rng);
    if !(count.is_finite() && count >= 0.0) {
        return Err(AppError::invalid_input(format!(
            "Poisson draw for rate {lambda} gave {count}."
        )));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HvOffModel;

    fn spec(noise: CountNoise, seed: u64) -> SyntheticSpec {
        SyntheticSpec {
            bin_centers: (1950..=2050).map(f64::from).collect(),
            n_channels: 4,
            noise,
            seed,
            baseline_jitter: 2.0,
        }
    }

    #[test]
    fn same_seed_same_histogram() {
        let model = HvOffModel::default();
        let params = [5000.0, 2000.0, 1.5];
        let a = generate(&model, &params, &spec(CountNoise::Poisson, 7)).unwrap();
        let b = generate(&model, &params, &spec(CountNoise::Poisson, 7)).unwrap();
        assert_eq!(a.histogram, b.histogram);
        assert_eq!(a.truth, b.truth);

        let c = generate(&model, &params, &spec(CountNoise::Poisson, 8)).unwrap();
        assert_ne!(a.histogram, c.histogram);
    }

    #[test]
    fn poisson_counts_are_whole_numbers() {
        let model = HvOffModel::default();
        let run = generate(&model, &[5000.0, 2000.0, 1.5], &spec(CountNoise::Poisson, 1)).unwrap();
        for row in run.histogram.all_counts() {
            assert!(row.iter().all(|c| c.fract() == 0.0 && *c >= 0.0));
        }
    }

    #[test]
    fn poisson_over_full_adc_range() {
        // Far tails of the pedestal span every magnitude down to underflow.
        let model = HvOffModel::default();
        let spec = SyntheticSpec {
            bin_centers: (0..=4095).map(f64::from).collect(),
            n_channels: 3,
            noise: CountNoise::Poisson,
            seed: 42,
            baseline_jitter: 5.0,
        };
        let run = generate(&model, &[20_000.0, 2000.0, 12.0], &spec).unwrap();

        assert_eq!(run.histogram.n_bins(), 4096);
        for row in run.histogram.all_counts() {
            assert!(row.iter().all(|c| c.is_finite() && c.fract() == 0.0 && *c >= 0.0));
            assert!(row.iter().sum::<f64>() > 19_000.0);
        }
    }

    #[test]
    fn vanishing_rates_draw_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        for lambda in [1e-300, 1e-100, 1e-30, 1e-10, 0.0] {
            assert_eq!(sample_poisson(&mut rng, lambda).unwrap(), 0.0);
        }
        assert!(sample_poisson(&mut rng, f64::NAN).is_err());
        assert!(sample_poisson(&mut rng, 25.0).unwrap() >= 0.0);
    }

    #[test]
    fn jitter_moves_only_the_baseline() {
        let model = HvOffModel::default();
        let run = generate(&model, &[5000.0, 2000.0, 1.5], &spec(CountNoise::Expected, 3)).unwrap();
        for p in &run.truth {
            assert_eq!(p[0], 5000.0);
            assert_eq!(p[2], 1.5);
            assert!((p[1] - 2000.0).abs() < 20.0);
        }
        assert!(run.truth.iter().any(|p| p[1] != 2000.0));
    }

    #[test]
    fn wrong_parameter_count_is_rejected() {
        let model = HvOffModel::default();
        assert!(generate(&model, &[1.0, 2.0], &spec(CountNoise::Expected, 0)).is_err());
    }
}
