use serde::{Deserialize, Serialize};

/// Evaluation mode for a fitted encoding model.
///
/// `Local` evaluates each neuron's rate at the supplied position trajectory
/// and returns one log-likelihood per time step. `NonLocal` evaluates the
/// precomputed place fields at every spatial bin and returns a full
/// log-likelihood surface per time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMode {
    Local,
    NonLocal,
}

/// Kernel bandwidth specification for the KDE backend.
///
/// A scalar bandwidth is broadcast to every position dimension; a
/// per-dimension bandwidth must match the dimensionality of the data it is
/// resolved against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bandwidth {
    Scalar(f64),
    PerDimension(Vec<f64>),
}

impl Default for Bandwidth {
    fn default() -> Self {
        Bandwidth::Scalar(5.0)
    }
}

/// Hyperparameters for the spline-GLM encoding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlmConfig {
    /// Spacing between interior spline knots, in position units.
    pub knot_spacing: f64,
    /// L2 penalty applied to all non-intercept coefficients.
    pub l2_penalty: f64,
    /// Operational cap on BFGS iterations per neuron. Hitting the cap is
    /// surfaced as a non-converged fit, not an error.
    pub max_iterations: usize,
    /// Gradient-norm tolerance for BFGS convergence.
    pub tolerance: f64,
}

impl Default for GlmConfig {
    fn default() -> Self {
        Self {
            knot_spacing: 10.0,
            l2_penalty: 1e-3,
            max_iterations: 200,
            tolerance: 1e-6,
        }
    }
}

/// Hyperparameters for the KDE encoding backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdeConfig {
    /// Gaussian kernel bandwidth over position.
    pub bandwidth: Bandwidth,
    /// Number of evaluation points per density block. `None` evaluates all
    /// points in a single block.
    pub block_size: Option<usize>,
}

impl Default for KdeConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::default(),
            block_size: Some(100),
        }
    }
}
