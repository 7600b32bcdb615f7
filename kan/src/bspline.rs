//! B-spline bases over per-input knot grids.
//!
//! Grids are stored one row per input dimension, already extended by `k`
//! knots on each side so that every point of the original range is covered by
//! `k + 1` basis functions.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip, s};
use nn::{NnErr, Result};

/// Returns `num + 1` evenly spaced knots covering `range`.
pub fn uniform_grid(range: [f32; 2], num: usize) -> Array1<f32> {
    Array1::linspace(range[0], range[1], num + 1)
}

/// Pads a grid with `k` knots on each side, keeping the average spacing.
pub fn extend_grid(grid: ArrayView1<f32>, k: usize) -> Array1<f32> {
    let n = grid.len();
    let (first, last) = (grid[0], grid[n - 1]);
    let h = (last - first) / (n.max(2) - 1) as f32;

    let mut extended = Array1::zeros(n + 2 * k);
    for i in 0..k {
        extended[i] = first - (k - i) as f32 * h;
        extended[n + k + i] = last + (i + 1) as f32 * h;
    }
    extended.slice_mut(s![k..n + k]).assign(&grid);

    extended
}

/// Evaluates every order `k` basis function of `grid` at `x` using the
/// Cox-de Boor recursion.
///
/// Intervals are half-open, so points outside the grid get an all zero basis.
/// On return `buf` holds `grid.len() - 1 - k` values.
pub fn basis_into(x: f32, grid: ArrayView1<f32>, k: usize, buf: &mut Vec<f32>) {
    let g = grid.len();

    buf.clear();
    buf.extend((0..g - 1).map(|i| (x >= grid[i] && x < grid[i + 1]) as u8 as f32));

    for p in 1..=k {
        for i in 0..g - 1 - p {
            let left_den = grid[i + p] - grid[i];
            let right_den = grid[i + p + 1] - grid[i + 1];

            let left = if left_den != 0. {
                (x - grid[i]) / left_den * buf[i]
            } else {
                0.
            };
            let right = if right_den != 0. {
                (grid[i + p + 1] - x) / right_den * buf[i + 1]
            } else {
                0.
            };

            buf[i] = left + right;
        }

        buf.truncate(g - 1 - p);
    }
}

/// Evaluates the splines of every `(input, output)` edge for a single sample.
///
/// # Arguments
/// * `x` - The sample, one value per input.
/// * `grid` - The `[in, G]` extended grids.
/// * `coef` - The `[in, out, G - 1 - k]` spline coefficients.
/// * `k` - The spline order.
/// * `out` - The `[in, out]` destination.
pub(crate) fn eval_sample(
    x: ArrayView1<f32>,
    grid: ArrayView2<f32>,
    coef: ArrayView3<f32>,
    k: usize,
    mut out: ArrayViewMut2<f32>,
) {
    let mut buf = Vec::with_capacity(grid.ncols());

    for (i, &xi) in x.iter().enumerate() {
        basis_into(xi, grid.row(i), k, &mut buf);
        let coef = coef.index_axis(Axis(0), i);

        for (j, c) in coef.outer_iter().enumerate() {
            out[[i, j]] = c.iter().zip(&buf).map(|(c, b)| c * b).sum();
        }
    }
}

/// Evaluates the splines of every edge for a batch of samples.
///
/// # Returns
/// A `[batch, in, out]` array.
pub fn eval_curves(
    x: ArrayView2<f32>,
    grid: ArrayView2<f32>,
    coef: ArrayView3<f32>,
    k: usize,
) -> Array3<f32> {
    let (batch, in_dim) = x.dim();
    let out_dim = coef.dim().1;
    let mut y = Array3::zeros((batch, in_dim, out_dim));

    Zip::from(y.outer_iter_mut())
        .and(x.outer_iter())
        .par_for_each(|y, x| eval_sample(x, grid, coef, k, y));

    y
}

/// Fits spline coefficients to sampled curves in the least squares sense.
///
/// # Arguments
/// * `x` - The `[batch, in]` sample points.
/// * `y` - The `[batch, in, out]` curve values at those points.
/// * `grid` - The `[in, G]` extended grids.
/// * `k` - The spline order.
///
/// # Returns
/// The `[in, out, G - 1 - k]` coefficients or an error if the shapes disagree.
pub fn fit_coef(
    x: ArrayView2<f32>,
    y: ArrayView3<f32>,
    grid: ArrayView2<f32>,
    k: usize,
) -> Result<Array3<f32>> {
    let (batch, in_dim) = x.dim();
    let (y_batch, y_in, out_dim) = y.dim();

    if (y_batch, y_in) != (batch, in_dim) || grid.nrows() != in_dim {
        return Err(NnErr::SizeMismatch {
            what: "spline fitting samples",
            got: y_batch * y_in,
            expected: batch * in_dim,
        });
    }

    let nbasis = grid
        .ncols()
        .checked_sub(k + 1)
        .filter(|&n| n > 0)
        .ok_or_else(|| NnErr::InvalidConfig(format!("grid too short for order {k} splines")))?;

    let mut coef = Array3::zeros((in_dim, out_dim, nbasis));

    Zip::from(coef.outer_iter_mut())
        .and(x.axis_iter(Axis(1)))
        .and(y.axis_iter(Axis(1)))
        .and(grid.outer_iter())
        .par_for_each(|mut coef, x, y, grid| {
            let mut basis = Array2::zeros((batch, nbasis));
            let mut buf = Vec::with_capacity(grid.len());

            for (mut row, &xb) in basis.outer_iter_mut().zip(x.iter()) {
                basis_into(xb, grid, k, &mut buf);
                row.iter_mut().zip(&buf).for_each(|(r, &b)| *r = b);
            }

            coef.assign(&lstsq(basis.view(), y).t());
        });

    Ok(coef)
}

/// Solves `a · x ≈ b` in the least squares sense, picking the minimum norm
/// solution when the system is underdetermined.
///
/// A tiny ridge keeps rank deficient systems solvable.
fn lstsq(a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
    let a = a.mapv(f64::from);
    let b = b.mapv(f64::from);

    let x = if a.nrows() >= a.ncols() {
        cholesky_solve(a.t().dot(&a), a.t().dot(&b))
    } else {
        a.t().dot(&cholesky_solve(a.dot(&a.t()), b))
    };

    x.mapv(|v| v as f32)
}

/// Solves `(m + λI) · x = rhs` for a symmetric positive semi-definite `m`.
fn cholesky_solve(mut m: Array2<f64>, mut rhs: Array2<f64>) -> Array2<f64> {
    let n = m.nrows();
    let trace = m.diag().sum();
    let ridge = 1e-10 * (trace / n as f64).max(1.0);
    m.diag_mut().mapv_inplace(|d| d + ridge);

    // lower triangular factor, stored in place
    for j in 0..n {
        let d = m[[j, j]] - (0..j).map(|p| m[[j, p]].powi(2)).sum::<f64>();
        m[[j, j]] = d.max(ridge).sqrt();

        for i in j + 1..n {
            let dot = (0..j).map(|p| m[[i, p]] * m[[j, p]]).sum::<f64>();
            m[[i, j]] = (m[[i, j]] - dot) / m[[j, j]];
        }
    }

    for mut col in rhs.columns_mut() {
        for i in 0..n {
            let dot = (0..i).map(|p| m[[i, p]] * col[p]).sum::<f64>();
            col[i] = (col[i] - dot) / m[[i, i]];
        }

        for i in (0..n).rev() {
            let dot = (i + 1..n).map(|p| m[[p, i]] * col[p]).sum::<f64>();
            col[i] = (col[i] - dot) / m[[i, i]];
        }
    }

    rhs
}
