//! Encoding-model fitters: training position + spike counts + track
//! geometry in, an immutable per-neuron model bundle out.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use thiserror::Error;

use crate::basis::{BasisError, SplineDesign};
use crate::geometry::{GeometryError, TrackGeometry, position_matches};
use crate::glm::{PoissonFit, SolverError, fit_poisson_regression};
use crate::kde::{KdeError, KdeModel};
use crate::probability::{EPS, clamp_rate};
use crate::types::{GlmConfig, KdeConfig};

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Position has {position} time samples but spikes has {spikes}.")]
    TimeLengthMismatch { position: usize, spikes: usize },

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error(transparent)]
    Kde(#[from] KdeError),
}

/// Fitted spline-GLM encoding model: per-neuron coefficients, the reusable
/// design transform, and place fields over all spatial bins.
#[derive(Debug, Clone)]
pub struct GlmEncodingModel {
    /// One coefficient row per neuron, width equal to the design transform.
    pub coefficients: Array2<f64>,
    /// The fitted spline transform, reapplied to new positions at predict
    /// time.
    pub design: SplineDesign,
    /// Per-neuron firing-rate estimates at each bin center, floored at EPS
    /// and forced to EPS outside the track interior.
    pub place_fields: Array2<f64>,
    pub is_track_interior: Array1<bool>,
    /// Per-neuron optimizer convergence flags, for diagnostic surfacing.
    pub converged: Vec<bool>,
}

impl GlmEncodingModel {
    pub fn n_neurons(&self) -> usize {
        self.coefficients.nrows()
    }
}

/// Fitted KDE encoding model: per-neuron marginal densities, the shared
/// occupancy density, and the derived place fields plus the precomputed
/// no-spike correction term.
#[derive(Debug, Clone)]
pub struct KdeEncodingModel {
    pub marginal_models: Vec<KdeModel>,
    pub occupancy_model: KdeModel,
    /// Occupancy density at interior bin centers, in interior order.
    pub occupancy: Array1<f64>,
    pub mean_rates: Array1<f64>,
    /// Per-neuron firing-rate estimates at each bin center, floored at EPS.
    pub place_fields: Array2<f64>,
    /// Per-bin sum of place fields over neurons: the closed-form "no spike"
    /// term subtracted once per bin during non-local prediction.
    pub no_spike_part_log_likelihood: Array1<f64>,
    pub is_track_interior: Array1<bool>,
}

impl KdeEncodingModel {
    pub fn n_neurons(&self) -> usize {
        self.marginal_models.len()
    }
}

fn check_shapes(
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
    geometry: &TrackGeometry,
) -> Result<(), EncodingError> {
    if position.nrows() != spikes.nrows() {
        return Err(EncodingError::TimeLengthMismatch {
            position: position.nrows(),
            spikes: spikes.nrows(),
        });
    }
    position_matches(position, geometry.ndim())?;
    Ok(())
}

/// Fits the spline-GLM encoding model.
///
/// The training design matrix is built once and shared across neurons;
/// per-neuron regressions are independent and run as a parallel map writing
/// disjoint coefficient rows. Rows with a missing position coordinate are
/// excluded from every fit by zero weight.
pub fn fit_glm_encoding_model(
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
    geometry: &TrackGeometry,
    config: &GlmConfig,
) -> Result<GlmEncodingModel, EncodingError> {
    check_shapes(position, spikes, geometry)?;
    let n_time = position.nrows();
    let n_neurons = spikes.ncols();
    log::debug!(
        "Fitting GLM encoding model: {n_time} samples, {n_neurons} neurons, {} bins",
        geometry.n_bins()
    );

    let (design, mut train_matrix) =
        SplineDesign::fit(position, &geometry.place_bin_edges, config.knot_spacing)?;
    let predict_matrix = design.transform(geometry.place_bin_centers.view())?;

    // Missing-position rows are NaN in the design matrix; excluding them by
    // zero weight keeps time alignment with the spike trains.
    let mut weights = Array1::<f64>::ones(n_time);
    for (i, mut row) in train_matrix.rows_mut().into_iter().enumerate() {
        if row.iter().any(|v| v.is_nan()) {
            row.fill(0.0);
            weights[i] = 0.0;
        }
    }
    let n_missing = weights.iter().filter(|&&w| w == 0.0).count();
    if n_missing > 0 {
        log::debug!("Excluding {n_missing} missing-position samples from the GLM fit");
    }

    let fits: Vec<PoissonFit> = (0..n_neurons)
        .into_par_iter()
        .map(|neuron| {
            fit_poisson_regression(
                train_matrix.view(),
                spikes.column(neuron),
                weights.view(),
                config,
            )
        })
        .collect::<Result<_, _>>()?;

    let n_features = design.n_features();
    let n_bins = geometry.n_bins();
    let mut coefficients = Array2::<f64>::zeros((n_neurons, n_features));
    let mut place_fields = Array2::<f64>::zeros((n_neurons, n_bins));
    let mut converged = Vec::with_capacity(n_neurons);
    for (neuron, fit) in fits.into_iter().enumerate() {
        if !fit.converged {
            log::warn!("GLM fit for neuron {neuron} did not converge");
        }
        converged.push(fit.converged);

        let rate = predict_matrix.dot(&fit.coefficients);
        for (bin, &r) in rate.iter().enumerate() {
            place_fields[[neuron, bin]] = if geometry.is_track_interior[bin] {
                clamp_rate(r.exp())
            } else {
                EPS
            };
        }
        coefficients.row_mut(neuron).assign(&fit.coefficients);
    }

    Ok(GlmEncodingModel {
        coefficients,
        design,
        place_fields,
        is_track_interior: geometry.is_track_interior.clone(),
        converged,
    })
}

/// Stacks the rows of `position` selected by `keep` into a dense matrix.
fn select_rows(position: ArrayView2<'_, f64>, keep: &[usize]) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((keep.len(), position.ncols()));
    for (r, &i) in keep.iter().enumerate() {
        out.row_mut(r).assign(&position.row(i));
    }
    out
}

/// Fits the KDE encoding model.
///
/// One shared occupancy density over all (finite) training positions, one
/// marginal density per neuron over the positions where that neuron spiked
/// (boolean indicator; a point-process approximation that ignores counts
/// above one). Densities are evaluated only at interior bin centers.
pub fn fit_kde_encoding_model(
    position: ArrayView2<'_, f64>,
    spikes: ArrayView2<'_, f64>,
    geometry: &TrackGeometry,
    config: &KdeConfig,
) -> Result<KdeEncodingModel, EncodingError> {
    check_shapes(position, spikes, geometry)?;
    let n_time = position.nrows();
    let n_neurons = spikes.ncols();
    log::debug!(
        "Fitting KDE encoding model: {n_time} samples, {n_neurons} neurons, {} bins",
        geometry.n_bins()
    );

    let finite_rows: Vec<usize> = (0..n_time)
        .filter(|&i| position.row(i).iter().all(|v| v.is_finite()))
        .collect();
    if finite_rows.len() < n_time {
        log::debug!(
            "Excluding {} missing-position samples from the KDE fit",
            n_time - finite_rows.len()
        );
    }

    let occupancy_model = KdeModel::fit(
        select_rows(position, &finite_rows),
        &config.bandwidth,
        config.block_size,
    )?;
    let interior_centers = geometry.interior_centers();
    let occupancy = occupancy_model.density(interior_centers.view())?;
    let interior_indices = geometry.interior_indices();

    let mean_rates: Array1<f64> = spikes
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(n_neurons));

    let n_bins = geometry.n_bins();
    let mut marginal_models = Vec::with_capacity(n_neurons);
    let mut place_fields = Array2::<f64>::from_elem((n_neurons, n_bins), EPS);
    for neuron in 0..n_neurons {
        let spiking_rows: Vec<usize> = finite_rows
            .iter()
            .copied()
            .filter(|&i| spikes[[i, neuron]] > 0.0)
            .collect();
        let marginal_model = KdeModel::fit(
            select_rows(position, &spiking_rows),
            &config.bandwidth,
            config.block_size,
        )?;
        let marginal_density = marginal_model.density(interior_centers.view())?;
        log::debug!(
            "Neuron {neuron}: marginal density from {} spike-coincident samples",
            marginal_model.n_samples()
        );

        for (k, &bin) in interior_indices.iter().enumerate() {
            let ratio = if occupancy[k] > 0.0 {
                marginal_density[k] / occupancy[k]
            } else {
                EPS
            };
            place_fields[[neuron, bin]] = clamp_rate(mean_rates[neuron] * ratio);
        }
        marginal_models.push(marginal_model);
    }

    let no_spike_part_log_likelihood = place_fields.sum_axis(Axis(0));

    Ok(KdeEncodingModel {
        marginal_models,
        occupancy_model,
        occupancy,
        mean_rates,
        place_fields,
        no_spike_part_log_likelihood,
        is_track_interior: geometry.is_track_interior.clone(),
    })
}
