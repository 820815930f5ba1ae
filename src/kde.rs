//! Product-of-Gaussians kernel density estimation, evaluated in fixed-size
//! blocks to bound the peak size of the samples × evaluation-points kernel
//! matrix.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::probability::gaussian_pdf;
use crate::types::Bandwidth;

#[derive(Error, Debug)]
pub enum KdeError {
    #[error("Kernel bandwidth must be positive and finite, but was {0}.")]
    InvalidBandwidth(f64),

    #[error(
        "Per-dimension bandwidth has {found} entries but the data has {expected} dimensions."
    )]
    BandwidthDimensionMismatch { expected: usize, found: usize },

    #[error("Sample points have {samples} dimensions but evaluation points have {eval_points}.")]
    DimensionMismatch { samples: usize, eval_points: usize },
}

impl Bandwidth {
    /// Resolves the bandwidth against a data dimensionality, broadcasting a
    /// scalar bandwidth to every dimension.
    pub fn resolve(&self, ndim: usize) -> Result<Array1<f64>, KdeError> {
        let values = match self {
            Bandwidth::Scalar(sigma) => vec![*sigma; ndim],
            Bandwidth::PerDimension(sigmas) => {
                if sigmas.len() != ndim {
                    return Err(KdeError::BandwidthDimensionMismatch {
                        expected: ndim,
                        found: sigmas.len(),
                    });
                }
                sigmas.clone()
            }
        };
        if let Some(&bad) = values.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(KdeError::InvalidBandwidth(bad));
        }
        Ok(Array1::from_vec(values))
    }
}

/// Density estimate at each evaluation point: the mean over samples of the
/// per-dimension Gaussian kernel product.
///
/// An empty sample set yields an all-zero density; the epsilon flooring for
/// that degenerate case belongs to the encoding-model fitter.
pub fn kde(
    eval_points: ArrayView2<'_, f64>,
    samples: ArrayView2<'_, f64>,
    bandwidths: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let n = samples.nrows();
    let m = eval_points.nrows();
    if n == 0 {
        return Array1::zeros(m);
    }

    let mut kernel = Array2::<f64>::ones((n, m));
    for (dim, &sigma) in bandwidths.iter().enumerate() {
        let sample_col = samples.column(dim);
        let eval_col = eval_points.column(dim);
        for (mut row, &center) in kernel.rows_mut().into_iter().zip(sample_col.iter()) {
            for (k, &point) in row.iter_mut().zip(eval_col.iter()) {
                *k *= gaussian_pdf(point, center, sigma);
            }
        }
    }

    let mut density = Array1::<f64>::zeros(m);
    for row in kernel.rows() {
        density += &row;
    }
    density / n as f64
}

/// Blocked [`kde`]: evaluation points are processed in contiguous chunks of
/// `block_size`, each chunk writing its own slice of the output.
///
/// Purely a memory/throughput optimization: results are identical to the
/// unblocked computation, including a final partial chunk.
pub fn block_kde(
    eval_points: ArrayView2<'_, f64>,
    samples: ArrayView2<'_, f64>,
    bandwidths: ArrayView1<'_, f64>,
    block_size: usize,
) -> Array1<f64> {
    let m = eval_points.nrows();
    let block = block_size.max(1);
    let mut density = Array1::<f64>::zeros(m);
    density
        .axis_chunks_iter_mut(Axis(0), block)
        .into_par_iter()
        .zip(eval_points.axis_chunks_iter(Axis(0), block).into_par_iter())
        .for_each(|(mut out, points)| {
            out.assign(&kde(points, samples, bandwidths));
        });
    density
}

/// An immutable kernel density model: the stored fit samples plus the
/// per-dimension bandwidths. One instance per neuron (marginal density) and
/// one shared instance for occupancy.
#[derive(Debug, Clone)]
pub struct KdeModel {
    samples: Array2<f64>,
    bandwidths: Array1<f64>,
    block_size: Option<usize>,
}

impl KdeModel {
    pub fn fit(
        samples: Array2<f64>,
        bandwidth: &Bandwidth,
        block_size: Option<usize>,
    ) -> Result<Self, KdeError> {
        let bandwidths = bandwidth.resolve(samples.ncols())?;
        Ok(Self {
            samples,
            bandwidths,
            block_size,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn ndim(&self) -> usize {
        self.samples.ncols()
    }

    /// Density estimate at the given evaluation points.
    pub fn density(&self, eval_points: ArrayView2<'_, f64>) -> Result<Array1<f64>, KdeError> {
        if eval_points.ncols() != self.samples.ncols() {
            return Err(KdeError::DimensionMismatch {
                samples: self.samples.ncols(),
                eval_points: eval_points.ncols(),
            });
        }
        let block = self.block_size.unwrap_or_else(|| eval_points.nrows().max(1));
        Ok(block_kde(
            eval_points,
            self.samples.view(),
            self.bandwidths.view(),
            block,
        ))
    }
}
