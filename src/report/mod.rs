//! Reporting utilities: per-parameter summaries of a fit-result store.

pub mod format;

pub use format::*;

use crate::domain::{FitFailure, FitResults};
use crate::math::{weighted_mean, weighted_std};

/// Distribution of one parameter over the fitted channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

/// Whole-store summary.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub model: String,
    pub n_channels: usize,
    pub fitted: usize,
    /// Failure reasons with their channel counts, most frequent first.
    pub failures: Vec<(String, usize)>,
    pub parameters: Vec<ParameterSummary>,
}

pub fn summarize(results: &FitResults) -> StageSummary {
    let parameters = results
        .parameter_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let values: Vec<f64> = (0..results.n_channels())
                .filter_map(|ch| results.value(ch, j))
                .filter(|v| v.is_finite())
                .collect();
            summarize_values(name, &values)
        })
        .collect();

    StageSummary {
        model: results.model.to_string(),
        n_channels: results.n_channels(),
        fitted: results.fitted_count(),
        failures: count_failures(results.rows().iter().filter_map(|r| r.failure())),
        parameters,
    }
}

fn summarize_values(name: &str, values: &[f64]) -> ParameterSummary {
    let ones = vec![1.0; values.len()];
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    ParameterSummary {
        name: name.to_string(),
        count: values.len(),
        mean: weighted_mean(values, &ones).unwrap_or(f64::NAN),
        std: weighted_std(values, &ones).unwrap_or(f64::NAN),
        min: if values.is_empty() { f64::NAN } else { min },
        max: if values.is_empty() { f64::NAN } else { max },
    }
}

fn count_failures<'a>(reasons: impl Iterator<Item = &'a FitFailure>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for reason in reasons {
        let key = failure_label(reason);
        match counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

fn failure_label(reason: &FitFailure) -> &'static str {
    match reason {
        FitFailure::InsufficientData => "insufficient data",
        FitFailure::UndefinedGuess => "undefined guess",
        FitFailure::InvalidBounds => "invalid bounds",
        FitFailure::TooFewDegreesOfFreedom { .. } => "too few degrees of freedom",
        FitFailure::NonFiniteCost => "non-finite cost",
        FitFailure::IterationLimit { .. } => "iteration limit",
        FitFailure::SingularCovariance => "singular covariance",
        FitFailure::NonFiniteEstimate => "non-finite estimate",
    }
}
