//! Bounded nonlinear least squares for a single channel.
//!
//! Given:
//! - the sliced bin centers `x_i` and counts `y_i`
//! - a model evaluator `f(p; x)`
//! - an initial guess and box bounds
//!
//! we minimize `Σ (y_i - f(p; x_i))²` with a projected Levenberg–Marquardt
//! iteration and report standard errors from `(JᵀJ)⁻¹ · SSE / (n - p)`.
//!
//! Parameters sitting on a bound whose gradient points out of the box are
//! frozen for that step (active set); the others take a damped Gauss–Newton
//! step that is then projected back into the box.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{Bounds, FitFailure, ParameterVector};

/// Damping never drops below this.
const LAMBDA_MIN: f64 = 1e-15;
/// Beyond this damping no step can lower the cost: treat as stationary.
const LAMBDA_MAX: f64 = 1e16;
/// Floor for the Marquardt scaling of a (near) zero Jacobian column.
const DIAG_FLOOR: f64 = 1e-12;

/// Convergence controls. Every channel gets the same budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Maximum number of trial steps (accepted or rejected).
    pub max_iterations: usize,
    /// Relative cost decrease below which an accepted step ends the fit.
    pub ftol: f64,
    /// Relative step size below which the fit ends.
    pub xtol: f64,
    /// Scaled gradient below which the fit ends.
    pub gtol: f64,
    /// Starting Marquardt damping.
    pub initial_lambda: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

/// Converged parameters of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
    pub iterations: usize,
    pub cost: f64,
}

/// Fit `evaluate(params, x)` to `y`.
///
/// Returns immediately, without touching the model, when the guess has an
/// undefined entry, the data has fewer than two points, or the bounds do not
/// match the parameter vector.
pub fn fit_curve<F>(
    evaluate: F,
    x: &[f64],
    y: &[f64],
    guess: &ParameterVector,
    bounds: &Bounds,
    opts: &SolverOptions,
) -> Result<FitOutcome, FitFailure>
where
    F: Fn(&[f64], &[f64]) -> Vec<f64>,
{
    let Some(mut params) = guess.resolved() else {
        return Err(FitFailure::UndefinedGuess);
    };
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(FitFailure::InsufficientData);
    }
    let (x, y) = (&x[..n], &y[..n]);
    let p = params.len();
    if !bounds.is_consistent(p) {
        return Err(FitFailure::InvalidBounds);
    }
    if n <= p {
        return Err(FitFailure::TooFewDegreesOfFreedom {
            points: n,
            params: p,
        });
    }

    bounds.clamp(&mut params);
    let Some(mut cost) = sum_of_squares(&evaluate(&params, x), y) else {
        return Err(FitFailure::NonFiniteCost);
    };

    let mut lambda = opts.initial_lambda.max(LAMBDA_MIN);
    let mut iterations = 0usize;
    let mut linearization: Option<Linearization> = None;

    loop {
        let lin = match linearization.take() {
            Some(lin) => lin,
            None => {
                let lin = linearize(&evaluate, x, y, &params, bounds);
                if gradient_converged(&lin, cost, opts.gtol) {
                    break;
                }
                lin
            }
        };

        if iterations >= opts.max_iterations {
            return Err(FitFailure::IterationLimit { iterations });
        }
        iterations += 1;

        let Some(delta) = damped_step(&lin, lambda) else {
            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                break;
            }
            linearization = Some(lin);
            continue;
        };

        let mut trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
        bounds.clamp(&mut trial);

        let step_norm = norm(trial.iter().zip(&params).map(|(t, c)| t - c));
        let param_norm = norm(params.iter().copied());
        if step_norm <= opts.xtol * (param_norm + opts.xtol) {
            break;
        }

        match sum_of_squares(&evaluate(&trial, x), y) {
            Some(trial_cost) if trial_cost < cost => {
                let relative = (cost - trial_cost) / cost.max(f64::MIN_POSITIVE);
                params = trial;
                cost = trial_cost;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if relative <= opts.ftol {
                    break;
                }
            }
            _ => {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    break;
                }
                linearization = Some(lin);
            }
        }
    }

    let errors = standard_errors(&evaluate, x, y, &params, bounds, cost)?;
    if params.iter().chain(&errors).any(|v| !v.is_finite()) {
        return Err(FitFailure::NonFiniteEstimate);
    }

    Ok(FitOutcome {
        values: params,
        errors,
        iterations,
        cost,
    })
}

/// Jacobian-derived quantities at the current point.
struct Linearization {
    /// `JᵀJ`
    jtj: DMatrix<f64>,
    /// `Jᵀ(y - f)`
    gradient: DVector<f64>,
    /// Parameters pinned on a bound this step.
    frozen: Vec<bool>,
}

fn linearize<F>(evaluate: &F, x: &[f64], y: &[f64], params: &[f64], bounds: &Bounds) -> Linearization
where
    F: Fn(&[f64], &[f64]) -> Vec<f64>,
{
    let model = evaluate(params, x);
    let jac = jacobian(evaluate, x, params, &model, bounds);
    let residual = DVector::from_iterator(y.len(), y.iter().zip(&model).map(|(yi, fi)| yi - fi));
    let jtj = jac.transpose() * &jac;
    let gradient = jac.transpose() * residual;

    let frozen = (0..params.len())
        .map(|j| {
            if bounds.is_fixed(j) {
                return true;
            }
            let at_lower = params[j] <= bounds.lower[j] && gradient[j] < 0.0;
            let at_upper = params[j] >= bounds.upper[j] && gradient[j] > 0.0;
            at_lower || at_upper
        })
        .collect();

    Linearization {
        jtj,
        gradient,
        frozen,
    }
}

/// Forward-difference Jacobian of the model values. The step is flipped when
/// it would leave the box.
fn jacobian<F>(evaluate: &F, x: &[f64], params: &[f64], model: &[f64], bounds: &Bounds) -> DMatrix<f64>
where
    F: Fn(&[f64], &[f64]) -> Vec<f64>,
{
    let n = x.len();
    let mut jac = DMatrix::<f64>::zeros(n, params.len());
    let mut shifted = params.to_vec();

    for j in 0..params.len() {
        let base = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
        for h in [base, -base] {
            if params[j] + h > bounds.upper[j] || params[j] + h < bounds.lower[j] {
                continue;
            }
            shifted[j] = params[j] + h;
            let moved = evaluate(&shifted, x);
            shifted[j] = params[j];

            let column: Vec<f64> = moved.iter().zip(model).map(|(m, f)| (m - f) / h).collect();
            if column.len() == n && column.iter().all(|v| v.is_finite()) {
                jac.set_column(j, &DVector::from_vec(column));
                break;
            }
        }
    }
    jac
}

fn damped_step(lin: &Linearization, lambda: f64) -> Option<DVector<f64>> {
    let p = lin.gradient.len();
    let mut system = lin.jtj.clone();
    let mut rhs = lin.gradient.clone();

    for j in 0..p {
        if lin.frozen[j] {
            system.row_mut(j).fill(0.0);
            system.column_mut(j).fill(0.0);
            system[(j, j)] = 1.0;
            rhs[j] = 0.0;
        } else {
            system[(j, j)] += lambda * lin.jtj[(j, j)].max(DIAG_FLOOR);
        }
    }

    let delta = system.cholesky()?.solve(&rhs);
    delta.iter().all(|v| v.is_finite()).then_some(delta)
}

fn gradient_converged(lin: &Linearization, cost: f64, gtol: f64) -> bool {
    if cost <= 0.0 {
        return true;
    }
    let scale = cost.sqrt();
    lin.gradient
        .iter()
        .enumerate()
        .filter(|(j, _)| !lin.frozen[*j])
        .all(|(j, g)| {
            let col = lin.jtj[(j, j)].sqrt();
            col == 0.0 || (g.abs() / (col * scale)) <= gtol
        })
}

fn standard_errors<F>(
    evaluate: &F,
    x: &[f64],
    y: &[f64],
    params: &[f64],
    bounds: &Bounds,
    cost: f64,
) -> Result<Vec<f64>, FitFailure>
where
    F: Fn(&[f64], &[f64]) -> Vec<f64>,
{
    let n = y.len();
    let p = params.len();
    let model = evaluate(params, x);
    let jac = jacobian(evaluate, x, params, &model, bounds);
    let jtj = jac.transpose() * &jac;

    // Parameters pinned by collapsed bounds carry no uncertainty and stay out
    // of the covariance.
    let free: Vec<usize> = (0..p).filter(|&j| !bounds.is_fixed(j)).collect();
    let mut errors = vec![0.0; p];
    if free.is_empty() {
        return Ok(errors);
    }
    let reduced = DMatrix::from_fn(free.len(), free.len(), |a, b| jtj[(free[a], free[b])]);
    let inverse = reduced
        .cholesky()
        .map(|c| c.inverse())
        .ok_or(FitFailure::SingularCovariance)?;
    let variance = cost / (n - p) as f64;

    for (a, &j) in free.iter().enumerate() {
        let d = inverse[(a, a)];
        if !(d.is_finite() && d >= 0.0) {
            return Err(FitFailure::SingularCovariance);
        }
        errors[j] = (d * variance).sqrt();
    }
    Ok(errors)
}

fn sum_of_squares(model: &[f64], y: &[f64]) -> Option<f64> {
    if model.len() != y.len() {
        return None;
    }
    let cost: f64 = model.iter().zip(y).map(|(f, yi)| (yi - f) * (yi - f)).sum();
    cost.is_finite().then_some(cost)
}

fn norm(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::gaussian;
    use approx::assert_relative_eq;

    fn gauss_model(p: &[f64], x: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| p[0] * gaussian(xi, p[1], p[2])).collect()
    }

    fn grid(lo: f64, hi: f64) -> Vec<f64> {
        let n = (hi - lo) as usize + 1;
        (0..n).map(|i| lo + i as f64).collect()
    }

    #[test]
    fn recovers_gaussian_pedestal() {
        let x = grid(1980.0, 2020.0);
        let truth = [5000.0, 2001.3, 1.7];
        let y = gauss_model(&truth, &x);

        let guess = ParameterVector::from_values(&[4000.0, 2000.0, 2.5]);
        let mut bounds = Bounds::with_capacity(3);
        bounds.push(0.0, f64::INFINITY);
        bounds.push(f64::NEG_INFINITY, f64::INFINITY);
        bounds.push(1e-3, f64::INFINITY);

        let fit = fit_curve(gauss_model, &x, &y, &guess, &bounds, &SolverOptions::default()).unwrap();
        for (got, want) in fit.values.iter().zip(truth) {
            assert_relative_eq!(*got, want, max_relative = 1e-6);
        }
        assert!(fit.errors.iter().all(|e| e.is_finite() && *e >= 0.0));
        assert!(fit.cost < 1e-6);
    }

    #[test]
    fn respects_bounds() {
        let x = grid(0.0, 20.0);
        let y = gauss_model(&[100.0, 10.0, 2.0], &x);
        let guess = ParameterVector::from_values(&[50.0, 9.0, 1.5]);
        let mut bounds = Bounds::with_capacity(3);
        bounds.push(0.0, 80.0);
        bounds.push(0.0, 20.0);
        bounds.push(0.1, 10.0);

        let fit = fit_curve(gauss_model, &x, &y, &guess, &bounds, &SolverOptions::default()).unwrap();
        assert!(fit.values[0] <= 80.0);
        assert!(fit.values[0] > 70.0);
        for ((v, lo), hi) in fit.values.iter().zip(&bounds.lower).zip(&bounds.upper) {
            assert!(v >= lo && v <= hi);
        }
    }

    #[test]
    fn undefined_guess_skips_the_solver() {
        let calls = std::cell::Cell::new(0usize);
        let model = |p: &[f64], x: &[f64]| {
            calls.set(calls.get() + 1);
            gauss_model(p, x)
        };
        let x = grid(0.0, 10.0);
        let y = vec![1.0; x.len()];
        let guess = ParameterVector::undefined(3);
        let err = fit_curve(model, &x, &y, &guess, &Bounds::unbounded(3), &SolverOptions::default())
            .unwrap_err();
        assert_eq!(err, FitFailure::UndefinedGuess);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn iteration_budget_is_enforced() {
        let x = grid(1980.0, 2020.0);
        let y = gauss_model(&[5000.0, 2001.3, 1.7], &x);
        let guess = ParameterVector::from_values(&[100.0, 1995.0, 4.0]);
        let opts = SolverOptions {
            max_iterations: 2,
            ..SolverOptions::default()
        };
        let err = fit_curve(gauss_model, &x, &y, &guess, &Bounds::unbounded(3), &opts).unwrap_err();
        assert_eq!(err, FitFailure::IterationLimit { iterations: 2 });
    }

    #[test]
    fn degenerate_model_has_singular_covariance() {
        // The second parameter never enters the model.
        let model = |p: &[f64], x: &[f64]| x.iter().map(|xi| p[0] * xi).collect::<Vec<f64>>();
        let x = grid(0.0, 10.0);
        let y: Vec<f64> = x.iter().map(|xi| 2.0 * xi + 0.1 * (xi * 7.0).sin()).collect();
        let guess = ParameterVector::from_values(&[1.0, 1.0]);
        let err = fit_curve(model, &x, &y, &guess, &Bounds::unbounded(2), &SolverOptions::default())
            .unwrap_err();
        assert_eq!(err, FitFailure::SingularCovariance);
    }

    #[test]
    fn collapsed_bound_pins_parameter() {
        let x = grid(1980.0, 2020.0);
        let truth = [5000.0, 2001.3, 1.7];
        let y = gauss_model(&truth, &x);

        let guess = ParameterVector::from_values(&[4000.0, 2000.0, 1.7]);
        let mut bounds = Bounds::with_capacity(3);
        bounds.push(0.0, f64::INFINITY);
        bounds.push(f64::NEG_INFINITY, f64::INFINITY);
        bounds.push(1.7, 1.7);
        assert!(bounds.is_fixed(2));

        let fit = fit_curve(gauss_model, &x, &y, &guess, &bounds, &SolverOptions::default()).unwrap();
        assert_eq!(fit.values[2], 1.7);
        assert_eq!(fit.errors[2], 0.0);
        assert_relative_eq!(fit.values[0], truth[0], max_relative = 1e-6);
        assert_relative_eq!(fit.values[1], truth[1], max_relative = 1e-6);
    }

    #[test]
    fn too_few_points_for_parameters() {
        let x = [0.0, 1.0, 2.0];
        let y = [1.0, 2.0, 3.0];
        let guess = ParameterVector::from_values(&[1.0, 1.0, 1.0]);
        let err = fit_curve(gauss_model, &x, &y, &guess, &Bounds::unbounded(3), &SolverOptions::default())
            .unwrap_err();
        assert_eq!(err, FitFailure::TooFewDegreesOfFreedom { points: 3, params: 3 });
    }
}
