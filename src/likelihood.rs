//! Log-likelihood prediction from fitted encoding models.
//!
//! Local mode evaluates each neuron's rate at the supplied position
//! trajectory and returns one value per time step; non-local mode evaluates
//! the precomputed place fields at every spatial bin and returns a full
//! surface. Per-neuron contributions accumulate additively in log space.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

use crate::basis::BasisError;
use crate::encode::{GlmEncodingModel, KdeEncodingModel};
use crate::kde::KdeError;
use crate::probability::{EPS, clamp_rate, ln_gamma, poisson_log_pmf, xlogy};
use crate::types::PredictionMode;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Spikes has {spikes} neurons but the fitted model has {model}.")]
    NeuronCountMismatch { spikes: usize, model: usize },

    #[error("Position has {position} time samples but spikes has {spikes}.")]
    TimeLengthMismatch { position: usize, spikes: usize },

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Kde(#[from] KdeError),
}

/// A fitted encoding model of either backend.
///
/// The tagged variants keep a bundle and its predictor paired by
/// construction; a KDE bundle cannot reach the GLM prediction path.
#[derive(Debug, Clone)]
pub enum EncodingModel {
    Glm(GlmEncodingModel),
    Kde(KdeEncodingModel),
}

impl EncodingModel {
    /// Log-likelihood of the observed spikes given hypothesized position:
    /// shape `[T×1]` in local mode, `[T×B]` in non-local mode.
    pub fn predict(
        &self,
        position: ArrayView2<'_, f64>,
        spikes: ArrayView2<'_, f64>,
        mode: PredictionMode,
    ) -> Result<Array2<f64>, PredictionError> {
        match self {
            EncodingModel::Glm(model) => predict_glm_log_likelihood(model, position, spikes, mode),
            EncodingModel::Kde(model) => predict_kde_log_likelihood(model, position, spikes, mode),
        }
    }

    pub fn n_neurons(&self) -> usize {
        match self {
            EncodingModel::Glm(model) => model.n_neurons(),
            EncodingModel::Kde(model) => model.n_neurons(),
        }
    }
}

fn check_neurons(spikes: ArrayView2<'_, f64>, model_neurons: usize) -> Result<(), PredictionError> {
    if spikes.ncols() != model_neurons {
        return Err(PredictionError::NeuronCountMismatch {
            spikes: spikes.ncols(),
            model: model_neurons,
        });
    }
    Ok(())
}

fn check_time(
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
) -> Result<(), PredictionError> {
    if position.nrows() != spikes.nrows() {
        return Err(PredictionError::TimeLengthMismatch {
            position: position.nrows(),
            spikes: spikes.nrows(),
        });
    }
    Ok(())
}

/// Non-local accumulation shared by both backends: per-bin log place-field
/// contributions summed over neurons.
fn accumulate_place_field_terms(
    spikes: ArrayView2<'_, f64>,
    place_fields: &Array2<f64>,
    full_pmf: bool,
) -> Array2<f64> {
    let n_time = spikes.nrows();
    let n_bins = place_fields.ncols();
    let mut log_likelihood = Array2::<f64>::zeros((n_time, n_bins));
    for neuron in 0..place_fields.nrows() {
        let field = place_fields.row(neuron);
        let log_field: Array1<f64> = field.mapv(f64::ln);
        for t in 0..n_time {
            let count = spikes[[t, neuron]];
            let offset = if full_pmf { ln_gamma(count + 1.0) } else { 0.0 };
            let mut row = log_likelihood.row_mut(t);
            for bin in 0..n_bins {
                let term = if full_pmf {
                    count * log_field[bin] - field[bin] - offset
                } else {
                    xlogy(count, field[bin])
                };
                row[bin] += term;
            }
        }
    }
    log_likelihood
}

/// GLM backend prediction.
///
/// Local mode rebuilds the design matrix at the supplied trajectory, so
/// missing position rows propagate to NaN log-likelihoods. Non-local mode
/// marks bins outside the track interior as NaN.
pub fn predict_glm_log_likelihood(
    model: &GlmEncodingModel,
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
    mode: PredictionMode,
) -> Result<Array2<f64>, PredictionError> {
    check_neurons(spikes, model.n_neurons())?;
    let n_time = spikes.nrows();

    match mode {
        PredictionMode::Local => {
            check_time(position, spikes)?;
            let predict_matrix = model.design.transform(position)?;
            let mut log_likelihood = Array1::<f64>::zeros(n_time);
            for neuron in 0..model.n_neurons() {
                let eta = predict_matrix.dot(&model.coefficients.row(neuron));
                for t in 0..n_time {
                    let rate = clamp_rate(eta[t].exp());
                    log_likelihood[t] += poisson_log_pmf(spikes[[t, neuron]], rate);
                }
            }
            Ok(log_likelihood.insert_axis(Axis(1)))
        }
        PredictionMode::NonLocal => {
            let mut log_likelihood =
                accumulate_place_field_terms(spikes, &model.place_fields, true);
            for (bin, &interior) in model.is_track_interior.iter().enumerate() {
                if !interior {
                    log_likelihood.column_mut(bin).fill(f64::NAN);
                }
            }
            Ok(log_likelihood)
        }
    }
}

/// KDE backend prediction.
///
/// Local mode re-evaluates occupancy and each neuron's marginal density at
/// the supplied trajectory and accumulates the Poisson log-likelihood in
/// rate form. Non-local mode subtracts the precomputed no-spike term once
/// per bin and forces exterior bins to `ln(EPS)`.
pub fn predict_kde_log_likelihood(
    model: &KdeEncodingModel,
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
    mode: PredictionMode,
) -> Result<Array2<f64>, PredictionError> {
    check_neurons(spikes, model.n_neurons())?;
    let n_time = spikes.nrows();

    match mode {
        PredictionMode::Local => {
            check_time(position, spikes)?;
            let occupancy = model.occupancy_model.density(position)?;
            let mut log_likelihood = Array1::<f64>::zeros(n_time);
            for (neuron, marginal_model) in model.marginal_models.iter().enumerate() {
                let marginal_density = marginal_model.density(position)?;
                let mean_rate = model.mean_rates[neuron];
                for t in 0..n_time {
                    let ratio = if occupancy[t] > 0.0 {
                        marginal_density[t] / occupancy[t]
                    } else {
                        EPS
                    };
                    let local_rate = clamp_rate(mean_rate * ratio);
                    log_likelihood[t] += xlogy(spikes[[t, neuron]], local_rate) - local_rate;
                }
            }
            Ok(log_likelihood.insert_axis(Axis(1)))
        }
        PredictionMode::NonLocal => {
            let mut log_likelihood =
                accumulate_place_field_terms(spikes, &model.place_fields, false);
            for t in 0..n_time {
                let mut row = log_likelihood.row_mut(t);
                row -= &model.no_spike_part_log_likelihood;
            }
            let invalid = EPS.ln();
            for (bin, &interior) in model.is_track_interior.iter().enumerate() {
                if !interior {
                    log_likelihood.column_mut(bin).fill(invalid);
                }
            }
            Ok(log_likelihood)
        }
    }
}
