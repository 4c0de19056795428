//! Per-channel fit loop.
//!
//! Each channel runs `ROI → guess → bounds → fit` in order and stops at the
//! first degenerate step. Channels share nothing but read access to the prior
//! store, so they are fanned out with rayon; rows come back in channel order.

use rayon::prelude::*;

use crate::domain::{ChannelFit, ChannelHistogram, Estimate, FitFailure, FitResults, Histogram, PriorFit};
use crate::error::AppError;
use crate::fit::{SolverOptions, fit_curve};
use crate::models::CalibrationModel;

/// Fit one channel.
pub fn fit_channel<M>(
    model: &M,
    hist: ChannelHistogram<'_>,
    prior: Option<PriorFit<'_>>,
    opts: &SolverOptions,
) -> ChannelFit
where
    M: CalibrationModel + ?Sized,
{
    let roi = model.select_roi(hist, prior);
    if roi.is_degenerate() {
        return ChannelFit::failed(FitFailure::InsufficientData);
    }

    let guess = model.estimate_guess(hist, &roi, prior);
    if guess.resolved().is_none() {
        return ChannelFit::failed(FitFailure::UndefinedGuess);
    }

    let bounds = model.compute_bounds(prior);
    let x = roi.slice(hist.bin_centers);
    let y = roi.slice(hist.counts);

    match fit_curve(|p: &[f64], x: &[f64]| model.evaluate(p, x), &x, &y, &guess, &bounds, opts) {
        Ok(outcome) => ChannelFit::Fitted {
            estimates: outcome
                .values
                .iter()
                .zip(&outcome.errors)
                .map(|(&value, &error)| Estimate { value, error })
                .collect(),
            iterations: outcome.iterations,
            cost: outcome.cost,
        },
        Err(reason) => ChannelFit::failed(reason),
    }
}

/// Fit every channel of `histogram` with `model`.
///
/// `prior` is the store of an earlier stage; it must cover the same channels.
pub fn fit_histogram<M>(
    model: &M,
    histogram: &Histogram,
    prior: Option<&FitResults>,
    opts: &SolverOptions,
) -> Result<FitResults, AppError>
where
    M: CalibrationModel + ?Sized,
{
    if let Some(prior) = prior {
        if prior.n_channels() != histogram.n_channels() {
            return Err(AppError::invalid_input(format!(
                "Prior {} results cover {} channels, histogram has {}.",
                prior.model,
                prior.n_channels(),
                histogram.n_channels()
            )));
        }
    }

    let rows: Vec<ChannelFit> = (0..histogram.n_channels())
        .into_par_iter()
        .map(|ch| {
            let Some(hist) = histogram.channel(ch) else {
                return ChannelFit::failed(FitFailure::InsufficientData);
            };
            let row_prior = prior.and_then(|p| p.prior(ch));
            let row = fit_channel(model, hist, row_prior, opts);
            if let Some(reason) = row.failure() {
                log::debug!("{} channel {ch}: {reason}", model.kind());
            }
            row
        })
        .collect();

    let results = FitResults::new(model.kind(), model.parameter_names(), rows);
    log::info!(
        "{}: fitted {} of {} channels ({} failed)",
        model.kind(),
        results.fitted_count(),
        results.n_channels(),
        results.failed_count()
    );
    Ok(results)
}
