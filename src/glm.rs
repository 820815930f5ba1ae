//! Regularized Poisson regression for single-neuron encoding models.
//!
//! One independent fit per neuron: the penalized Poisson log-likelihood of
//! the spike counts given the spline design matrix is maximized with BFGS
//! using the analytic gradient. The intercept is excluded from the L2
//! penalty.

use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsError};

use crate::probability::{EPS, clamp_rate, ln_gamma};
use crate::types::GlmConfig;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error(
        "Design matrix has {design_rows} rows but spikes has {spikes} and weights has {weights}; all three must match."
    )]
    ShapeMismatch {
        design_rows: usize,
        spikes: usize,
        weights: usize,
    },

    #[error("Design matrix must have at least one column.")]
    EmptyDesign,

    #[error("BFGS optimization failed: {0}")]
    Optimization(String),
}

/// Result of one neuron's regression fit.
///
/// A non-converged fit still carries the best coefficients found; callers
/// decide whether to surface the flag diagnostically.
#[derive(Debug, Clone)]
pub struct PoissonFit {
    pub coefficients: Array1<f64>,
    pub converged: bool,
    pub iterations: usize,
}

/// Fits a length-K coefficient vector maximizing the weighted, L2-penalized
/// Poisson log-likelihood of `spikes` under the design matrix.
///
/// The intercept starts at the log of the weighted mean spike count (floored
/// so an all-silent neuron still fits) and all other coefficients at zero.
pub fn fit_poisson_regression(
    design: ArrayView2<'_, f64>,
    spikes: ArrayView1<'_, f64>,
    weights: ArrayView1<'_, f64>,
    config: &GlmConfig,
) -> Result<PoissonFit, SolverError> {
    let t = design.nrows();
    let k = design.ncols();
    if spikes.len() != t || weights.len() != t {
        return Err(SolverError::ShapeMismatch {
            design_rows: t,
            spikes: spikes.len(),
            weights: weights.len(),
        });
    }
    if k == 0 {
        return Err(SolverError::EmptyDesign);
    }

    // Constant in the coefficients; precomputed once per neuron.
    let log_count_factorial: Array1<f64> = spikes.mapv(|s| ln_gamma(s + 1.0));
    let l2_penalty = config.l2_penalty;

    let weight_total: f64 = weights.sum();
    let weighted_mean = if weight_total > 0.0 {
        weights.dot(&spikes) / weight_total
    } else {
        0.0
    };
    let mut initial = Array1::<f64>::zeros(k);
    initial[0] = weighted_mean.max(EPS).ln();

    let objective = |beta: &Array1<f64>| -> (f64, Array1<f64>) {
        let eta = design.dot(beta);
        let mut cost = 0.0;
        let mut residual = Array1::<f64>::zeros(t);
        for i in 0..t {
            let rate = clamp_rate(eta[i].exp());
            cost -= weights[i] * (spikes[i] * rate.ln() - rate - log_count_factorial[i]);
            // Gradient is zero through the clipped region.
            if rate > EPS {
                residual[i] = weights[i] * (spikes[i] - rate);
            }
        }
        cost /= t as f64;

        let mut grad = design.t().dot(&residual);
        grad.mapv_inplace(|g| -g / t as f64);
        for j in 1..k {
            cost += l2_penalty * beta[j] * beta[j];
            grad[j] += 2.0 * l2_penalty * beta[j];
        }
        (cost, grad)
    };

    let mut solver = Bfgs::new(initial, objective)
        .with_tolerance(config.tolerance)
        .with_max_iterations(config.max_iterations);

    let (solution, converged) = match solver.run() {
        Ok(solution) => (solution, true),
        Err(BfgsError::LineSearchFailed { last_solution, .. }) => {
            log::warn!("Poisson fit line search stopped early; using best-so-far coefficients.");
            (*last_solution, false)
        }
        Err(BfgsError::MaxIterationsReached { last_solution }) => {
            log::warn!(
                "Poisson fit hit the iteration cap ({}); using best-so-far coefficients.",
                config.max_iterations
            );
            (*last_solution, false)
        }
        Err(e) => return Err(SolverError::Optimization(format!("{e:?}"))),
    };

    Ok(PoissonFit {
        coefficients: solution.final_point,
        converged,
        iterations: solution.iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Poisson};

    #[test]
    fn recovers_a_constant_rate_through_the_intercept() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = 4000;
        let true_rate = 3.0_f64;
        let sampler = Poisson::new(true_rate).expect("valid rate");
        let spikes = Array1::from_iter((0..t).map(|_| sampler.sample(&mut rng)));

        // Intercept plus one centered covariate that carries no signal.
        let mut design = Array2::<f64>::ones((t, 2));
        for i in 0..t {
            design[[i, 1]] = if i % 2 == 0 { 0.5 } else { -0.5 };
        }
        let weights = Array1::ones(t);

        let fit = fit_poisson_regression(
            design.view(),
            spikes.view(),
            weights.view(),
            &GlmConfig::default(),
        )
        .expect("fit succeeds");

        assert!(fit.converged);
        assert_abs_diff_eq!(fit.coefficients[0], true_rate.ln(), epsilon = 0.05);
        assert_abs_diff_eq!(fit.coefficients[1], 0.0, epsilon = 0.05);
    }

    #[test]
    fn silent_neuron_fits_to_a_very_low_rate() {
        let t = 500;
        let spikes = Array1::<f64>::zeros(t);
        let design = Array2::<f64>::ones((t, 1));
        let weights = Array1::ones(t);

        let fit = fit_poisson_regression(
            design.view(),
            spikes.view(),
            weights.view(),
            &GlmConfig::default(),
        )
        .expect("silent neuron must still fit");
        let rate = fit.coefficients[0].exp();
        assert!(rate <= 1e-10, "baseline rate should be near zero, got {rate}");
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let design = Array2::<f64>::ones((10, 2));
        let spikes = Array1::<f64>::zeros(9);
        let weights = Array1::<f64>::ones(10);
        let result = fit_poisson_regression(
            design.view(),
            spikes.view(),
            weights.view(),
            &GlmConfig::default(),
        );
        assert!(matches!(result, Err(SolverError::ShapeMismatch { .. })));
    }
}
