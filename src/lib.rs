//! # Neural encoding models and point-process log-likelihoods
//!
//! Two pluggable likelihood backends for decoding an animal's position from
//! sorted spike trains:
//!
//! 1. A Poisson GLM over a tensor-product natural cubic spline basis of
//!    position, fitted per neuron by penalized maximum likelihood (BFGS with
//!    the analytic gradient).
//! 2. A kernel density place-field estimator: a shared occupancy density and
//!    one marginal density per neuron, evaluated in fixed-size blocks.
//!
//! Both backends share the same contract: `fit` turns training position,
//! spike counts, and precomputed track geometry into an immutable per-neuron
//! model bundle; `predict` turns a bundle plus new data into a log-likelihood
//! array, either at the supplied trajectory (local mode, `[T×1]`) or across
//! all spatial bins (non-local mode, `[T×B]`). The outer decoder that
//! consumes those arrays, and the environment that constructs the geometry,
//! live elsewhere.

#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod encode;
pub mod geometry;
pub mod glm;
pub mod kde;
pub mod likelihood;
pub mod probability;
pub mod types;

pub use basis::{BasisError, SplineDesign};
pub use encode::{
    EncodingError, GlmEncodingModel, KdeEncodingModel, fit_glm_encoding_model,
    fit_kde_encoding_model,
};
pub use geometry::{GeometryError, TrackGeometry};
pub use glm::{PoissonFit, SolverError, fit_poisson_regression};
pub use kde::{KdeError, KdeModel, block_kde, kde};
pub use likelihood::{
    EncodingModel, PredictionError, predict_glm_log_likelihood, predict_kde_log_likelihood,
};
pub use probability::EPS;
pub use types::{Bandwidth, GlmConfig, KdeConfig, PredictionMode};
