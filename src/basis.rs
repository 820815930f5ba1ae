//! Spline design matrices over multi-dimensional position.
//!
//! The design is an intercept plus a tensor-product interaction of
//! per-dimension natural cubic regression spline bases, with a sum-to-zero
//! (centering) constraint absorbing the redundant degree of freedom the
//! intercept introduces. Knots are derived from the track geometry's bin
//! edges and restricted to the observed position range, so the fitted
//! transform can be reapplied verbatim to any future position sample.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BasisError {
    #[error("Knot spacing must be a positive finite number, but was {0}.")]
    InvalidKnotSpacing(f64),

    #[error(
        "Position has {position_dims} dimensions but {edge_dims} bin-edge vectors were provided."
    )]
    DimensionMismatch {
        position_dims: usize,
        edge_dims: usize,
    },

    #[error(
        "Dimension {dim} has too few usable knots ({found}; at least 3 are required). The observed position range may be too narrow for the configured knot spacing."
    )]
    DegenerateKnots { dim: usize, found: usize },

    #[error("Position contains no rows with all coordinates finite.")]
    NoFiniteSamples,

    #[error(
        "Centering constraint could not be absorbed: the tensor basis has {found} columns, at least 2 are required."
    )]
    InsufficientColumnsForConstraint { found: usize },
}

/// A fitted spline transform: per-dimension knot vectors plus the centering
/// transform, reusable on any new position sample.
///
/// Rows with a missing (non-finite) coordinate are evaluated on a
/// placeholder and then overwritten entirely with NaN, so missing-in means
/// missing-out without disturbing matrix construction.
#[derive(Debug, Clone)]
pub struct SplineDesign {
    knots: Vec<Array1<f64>>,
    centering: Array2<f64>,
}

impl SplineDesign {
    /// Fits the transform to training positions and returns it together with
    /// the training design matrix.
    ///
    /// Knot placement per dimension: evenly spaced candidates across the bin
    /// edge range at the configured spacing, boundary candidates dropped,
    /// survivors restricted strictly inside the observed position range, and
    /// the observed min/max appended as boundary knots.
    pub fn fit(
        position: ArrayView2<'_, f64>,
        bin_edges: &[Array1<f64>],
        knot_spacing: f64,
    ) -> Result<(Self, Array2<f64>), BasisError> {
        if !(knot_spacing.is_finite() && knot_spacing > 0.0) {
            return Err(BasisError::InvalidKnotSpacing(knot_spacing));
        }
        if position.ncols() != bin_edges.len() || bin_edges.is_empty() {
            return Err(BasisError::DimensionMismatch {
                position_dims: position.ncols(),
                edge_dims: bin_edges.len(),
            });
        }

        let finite_rows: Vec<usize> = (0..position.nrows())
            .filter(|&i| position.row(i).iter().all(|v| v.is_finite()))
            .collect();
        if finite_rows.is_empty() {
            return Err(BasisError::NoFiniteSamples);
        }

        let mut knots = Vec::with_capacity(bin_edges.len());
        for (dim, edges) in bin_edges.iter().enumerate() {
            let observed = finite_rows.iter().map(|&i| position[[i, dim]]);
            knots.push(select_knots(dim, observed, edges.view(), knot_spacing)?);
        }

        // The centering constraint is the column-total vector of the tensor
        // basis over the usable (fully finite) training rows.
        let mut finite = Array2::<f64>::zeros((finite_rows.len(), position.ncols()));
        for (r, &i) in finite_rows.iter().enumerate() {
            finite.row_mut(r).assign(&position.row(i));
        }
        let marginals: Vec<Array2<f64>> = knots
            .iter()
            .enumerate()
            .map(|(dim, k)| cubic_spline_basis(finite.column(dim), k.view()))
            .collect();
        let constraint = row_tensor_product(&marginals).sum_axis(Axis(0));
        let centering = sum_to_zero_nullspace(constraint.view())?;

        let design = Self { knots, centering };
        let matrix = design.transform(position)?;
        Ok((design, matrix))
    }

    /// Number of columns the transform produces (intercept included).
    pub fn n_features(&self) -> usize {
        1 + self.centering.ncols()
    }

    /// Reapplies the fitted transform to new position samples.
    pub fn transform(&self, position: ArrayView2<'_, f64>) -> Result<Array2<f64>, BasisError> {
        if position.ncols() != self.knots.len() {
            return Err(BasisError::DimensionMismatch {
                position_dims: position.ncols(),
                edge_dims: self.knots.len(),
            });
        }

        let n = position.nrows();
        let missing: Vec<bool> = (0..n)
            .map(|i| position.row(i).iter().any(|v| !v.is_finite()))
            .collect();

        // Evaluate missing rows on a placeholder value; their output rows are
        // overwritten below.
        let mut cleaned = position.to_owned();
        for (i, &gone) in missing.iter().enumerate() {
            if gone {
                cleaned.row_mut(i).fill(0.0);
            }
        }

        let marginals: Vec<Array2<f64>> = self
            .knots
            .iter()
            .enumerate()
            .map(|(dim, knots)| cubic_spline_basis(cleaned.column(dim), knots.view()))
            .collect();
        let tensor = row_tensor_product(&marginals);
        let centered = tensor.dot(&self.centering);

        let mut out = Array2::<f64>::zeros((n, self.n_features()));
        out.column_mut(0).fill(1.0);
        out.slice_mut(s![.., 1..]).assign(&centered);
        for (i, &gone) in missing.iter().enumerate() {
            if gone {
                out.row_mut(i).fill(f64::NAN);
            }
        }
        Ok(out)
    }
}

/// Full knot vector for one dimension: observed boundary knots plus the
/// interior candidates that survive range restriction.
fn select_knots(
    dim: usize,
    observed: impl Iterator<Item = f64>,
    edges: ArrayView1<'_, f64>,
    knot_spacing: f64,
) -> Result<Array1<f64>, BasisError> {
    let (obs_min, obs_max) = observed.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let (edge_min, edge_max) = edges
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let span = edge_max - edge_min;
    let n_candidates = (span / knot_spacing).ceil() as usize;

    let mut knots = vec![obs_min];
    if n_candidates >= 3 {
        let candidates = Array1::linspace(edge_min, edge_max, n_candidates);
        knots.extend(
            candidates
                .slice(s![1..n_candidates - 1])
                .iter()
                .copied()
                .filter(|&k| k > obs_min && k < obs_max),
        );
    }
    knots.push(obs_max);
    knots.sort_by(|a, b| a.total_cmp(b));
    knots.dedup();

    if knots.len() < 3 {
        return Err(BasisError::DegenerateKnots {
            dim,
            found: knots.len(),
        });
    }
    Ok(Array1::from_vec(knots))
}

/// Maps spline values at the knots to second derivatives at the knots for a
/// natural cubic spline (zero curvature at both boundary knots).
///
/// Rows 0 and q-1 are zero; interior rows are `B⁻¹ D` where `D` is the
/// second-difference operator and `B` the tridiagonal Gram matrix of the
/// knot spacings, solved with the Thomas algorithm.
fn natural_spline_curvature_map(knots: ArrayView1<'_, f64>) -> Array2<f64> {
    let q = knots.len();
    let m = q - 2;
    let h: Vec<f64> = (0..q - 1).map(|i| knots[i + 1] - knots[i]).collect();

    let mut d = Array2::<f64>::zeros((m, q));
    for i in 0..m {
        d[[i, i]] = 1.0 / h[i];
        d[[i, i + 2]] = 1.0 / h[i + 1];
        d[[i, i + 1]] = -d[[i, i]] - d[[i, i + 2]];
    }

    let mut diag: Vec<f64> = (0..m).map(|i| (h[i] + h[i + 1]) / 3.0).collect();
    let off: Vec<f64> = (0..m.saturating_sub(1)).map(|i| h[i + 1] / 6.0).collect();

    // Thomas forward sweep; B is symmetric positive definite, no pivoting
    // required.
    for i in 1..m {
        let w = off[i - 1] / diag[i - 1];
        diag[i] -= w * off[i - 1];
        let (top, mut bottom) = d.view_mut().split_at(Axis(0), i);
        let prev = top.row(i - 1);
        let mut cur = bottom.row_mut(0);
        cur.iter_mut().zip(prev.iter()).for_each(|(c, &p)| *c -= w * p);
    }
    let mut solved = Array2::<f64>::zeros((m, q));
    {
        let last = m - 1;
        let row = d.row(last).mapv(|v| v / diag[last]);
        solved.row_mut(last).assign(&row);
    }
    for i in (0..m.saturating_sub(1)).rev() {
        let upper = solved.row(i + 1).to_owned();
        let mut row = d.row(i).to_owned();
        row.iter_mut()
            .zip(upper.iter())
            .for_each(|(r, &u)| *r = (*r - off[i] * u) / diag[i]);
        solved.row_mut(i).assign(&row);
    }

    let mut full = Array2::<f64>::zeros((q, q));
    full.slice_mut(s![1..q - 1, ..]).assign(&solved);
    full
}

/// Natural cubic regression spline basis: one column per knot, evaluated at
/// each point of `x`.
///
/// Points outside the knot range fall back to the edge interval with the
/// cubic terms dropped, which yields the natural spline's linear
/// extrapolation.
fn cubic_spline_basis(x: ArrayView1<'_, f64>, knots: ArrayView1<'_, f64>) -> Array2<f64> {
    let q = knots.len();
    let curvature = natural_spline_curvature_map(knots);
    let lo = knots[0];
    let hi = knots[q - 1];

    let mut basis = Array2::<f64>::zeros((x.len(), q));
    for (i, &xi) in x.iter().enumerate() {
        let j = knots
            .iter()
            .filter(|&&k| k < xi)
            .count()
            .saturating_sub(1)
            .min(q - 2);
        let h = knots[j + 1] - knots[j];
        let below = knots[j + 1] - xi;
        let above = xi - knots[j];

        let a_minus = below / h;
        let a_plus = above / h;
        let cubic_minus = if xi > hi { 0.0 } else { below * below * below / (6.0 * h) };
        let c_minus = cubic_minus - h * below / 6.0;
        let cubic_plus = if xi < lo { 0.0 } else { above * above * above / (6.0 * h) };
        let c_plus = cubic_plus - h * above / 6.0;

        let mut row = basis.row_mut(i);
        row[j] += a_minus;
        row[j + 1] += a_plus;
        row.iter_mut()
            .zip(curvature.row(j).iter().zip(curvature.row(j + 1).iter()))
            .for_each(|(out, (&fj, &fj1))| *out += c_minus * fj + c_plus * fj1);
    }
    basis
}

/// Row-wise tensor (Kronecker) product of marginal basis matrices.
fn row_tensor_product(marginals: &[Array2<f64>]) -> Array2<f64> {
    let n = marginals[0].nrows();
    let mut out = Array2::<f64>::ones((n, 1));
    for marginal in marginals {
        let (p, q) = (out.ncols(), marginal.ncols());
        let mut next = Array2::<f64>::zeros((n, p * q));
        for i in 0..n {
            for a in 0..p {
                let left = out[[i, a]];
                for b in 0..q {
                    next[[i, a * q + b]] = left * marginal[[i, b]];
                }
            }
        }
        out = next;
    }
    out
}

/// Orthonormal basis for the nullspace of a single constraint vector, via
/// one Householder reflector mapping the constraint onto the first axis.
fn sum_to_zero_nullspace(constraint: ArrayView1<'_, f64>) -> Result<Array2<f64>, BasisError> {
    let k = constraint.len();
    if k < 2 {
        return Err(BasisError::InsufficientColumnsForConstraint { found: k });
    }

    let norm = constraint.dot(&constraint).sqrt();
    let mut v = constraint.to_owned();
    if norm > f64::EPSILON {
        let sign = if constraint[0] >= 0.0 { 1.0 } else { -1.0 };
        v[0] += sign * norm;
    } else {
        // Vacuous constraint: reflect about the first axis so exactly one
        // column is still dropped and the design width stays fixed.
        v.fill(0.0);
        v[0] = 1.0;
    }
    let vtv = v.dot(&v);

    let mut z = Array2::<f64>::zeros((k, k - 1));
    for j in 1..k {
        for i in 0..k {
            let identity = if i == j { 1.0 } else { 0.0 };
            z[[i, j - 1]] = identity - 2.0 * v[i] * v[j] / vtv;
        }
    }
    Ok(z)
}
