use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error(
        "Bin centers ({centers}) and track masks (interior {interior}, boundary {boundary}) must have matching lengths."
    )]
    MaskLengthMismatch {
        centers: usize,
        interior: usize,
        boundary: usize,
    },

    #[error(
        "Bin centers have {center_dims} dimensions but {edge_dims} edge vectors were provided."
    )]
    DimensionMismatch {
        center_dims: usize,
        edge_dims: usize,
    },

    #[error("Dimension {dim} needs at least 2 bin edges, but {found} were provided.")]
    TooFewEdges { dim: usize, found: usize },

    #[error("Bin edges for dimension {dim} must be finite and non-decreasing.")]
    InvalidEdges { dim: usize },

    #[error("Bin center {bin} contains a non-finite coordinate.")]
    NonFiniteCenter { bin: usize },

    #[error("Position has {found} dimensions but the track geometry has {expected}.")]
    PositionDimensionMismatch { expected: usize, found: usize },
}

/// Externally-constructed track geometry: spatial bin centers and edges plus
/// the validity masks over bins.
///
/// The environment that builds these (track graph, bin size selection,
/// interior inference) is not part of this crate; geometry arrives here as
/// precomputed input and is only validated for internal consistency.
#[derive(Debug, Clone)]
pub struct TrackGeometry {
    pub place_bin_centers: Array2<f64>,
    pub place_bin_edges: Vec<Array1<f64>>,
    pub is_track_interior: Array1<bool>,
    pub is_track_boundary: Array1<bool>,
}

impl TrackGeometry {
    pub fn new(
        place_bin_centers: Array2<f64>,
        place_bin_edges: Vec<Array1<f64>>,
        is_track_interior: Array1<bool>,
        is_track_boundary: Array1<bool>,
    ) -> Result<Self, GeometryError> {
        let n_bins = place_bin_centers.nrows();
        if is_track_interior.len() != n_bins || is_track_boundary.len() != n_bins {
            return Err(GeometryError::MaskLengthMismatch {
                centers: n_bins,
                interior: is_track_interior.len(),
                boundary: is_track_boundary.len(),
            });
        }
        if place_bin_centers.ncols() != place_bin_edges.len() {
            return Err(GeometryError::DimensionMismatch {
                center_dims: place_bin_centers.ncols(),
                edge_dims: place_bin_edges.len(),
            });
        }
        for (dim, edges) in place_bin_edges.iter().enumerate() {
            if edges.len() < 2 {
                return Err(GeometryError::TooFewEdges {
                    dim,
                    found: edges.len(),
                });
            }
            let monotone = edges.windows(2).into_iter().all(|w| w[0] <= w[1]);
            if !monotone || edges.iter().any(|e| !e.is_finite()) {
                return Err(GeometryError::InvalidEdges { dim });
            }
        }
        for (bin, center) in place_bin_centers.rows().into_iter().enumerate() {
            if center.iter().any(|c| !c.is_finite()) {
                return Err(GeometryError::NonFiniteCenter { bin });
            }
        }

        Ok(Self {
            place_bin_centers,
            place_bin_edges,
            is_track_interior,
            is_track_boundary,
        })
    }

    pub fn ndim(&self) -> usize {
        self.place_bin_centers.ncols()
    }

    pub fn n_bins(&self) -> usize {
        self.place_bin_centers.nrows()
    }

    /// Indices of bins inside the valid track area.
    pub fn interior_indices(&self) -> Vec<usize> {
        self.is_track_interior
            .iter()
            .enumerate()
            .filter_map(|(i, &inside)| inside.then_some(i))
            .collect()
    }

    /// Bin centers restricted to the interior mask, as a dense matrix.
    pub fn interior_centers(&self) -> Array2<f64> {
        let rows: Vec<_> = self
            .interior_indices()
            .into_iter()
            .map(|i| self.place_bin_centers.row(i))
            .collect();
        if rows.is_empty() {
            Array2::zeros((0, self.ndim()))
        } else {
            ndarray::stack(Axis(0), &rows).expect("interior rows share the geometry's width")
        }
    }
}

/// Checks that a position matrix matches the geometry's dimensionality.
pub(crate) fn position_matches(
    position: ArrayView2<'_, f64>,
    ndim: usize,
) -> Result<(), GeometryError> {
    if position.ncols() != ndim {
        return Err(GeometryError::PositionDimensionMismatch {
            expected: ndim,
            found: position.ncols(),
        });
    }
    Ok(())
}
