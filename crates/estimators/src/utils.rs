//! Shared numerical helpers.

use crate::estimator::ExecMode;
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

pub fn squared_euclidean(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Squared distances between every row of `lhs` and every row of `rhs`.
pub fn pairwise_sq_distances(
    mode: ExecMode,
    lhs: ArrayView2<'_, f32>,
    rhs: ArrayView2<'_, f32>,
) -> Array2<f32> {
    let rows = mode.map_indices(lhs.nrows(), |i| {
        let row = lhs.row(i);
        rhs.outer_iter()
            .map(|other| squared_euclidean(row, other))
            .collect::<Vec<f32>>()
    });
    let n = rhs.nrows();
    Array2::from_shape_fn((lhs.nrows(), n), |(i, j)| rows[i][j])
}

/// Indices and squared distances of the `k` nearest rows of `reference` to
/// `query_row`, nearest first. `skip` excludes one index (the query itself).
pub fn nearest_rows(
    query_row: ArrayView1<'_, f32>,
    reference: ArrayView2<'_, f32>,
    k: usize,
    skip: Option<usize>,
) -> Vec<(usize, f32)> {
    let mut candidates: Vec<(usize, f32)> = reference
        .outer_iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != skip)
        .map(|(idx, row)| (idx, squared_euclidean(query_row, row)))
        .collect();
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, |a, b| a.1.total_cmp(&b.1));
        candidates.truncate(k);
    }
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    candidates
}

pub fn column_means(data: ArrayView2<'_, f32>) -> Array1<f64> {
    let n = data.nrows().max(1) as f64;
    data.axis_iter(Axis(1))
        .map(|col| col.iter().map(|&v| v as f64).sum::<f64>() / n)
        .collect()
}

/// `XᵀX` (optionally of column-centred data) in f64, one output column per task.
pub fn gram_matrix(mode: ExecMode, data: ArrayView2<'_, f32>, means: Option<&Array1<f64>>) -> Array2<f64> {
    let d = data.ncols();
    let columns = mode.map_indices(d, |j| {
        let mj = means.map_or(0.0, |m| m[j]);
        (0..d)
            .map(|i| {
                let mi = means.map_or(0.0, |m| m[i]);
                data.outer_iter()
                    .map(|row| (row[i] as f64 - mi) * (row[j] as f64 - mj))
                    .sum::<f64>()
            })
            .collect::<Vec<f64>>()
    });
    Array2::from_shape_fn((d, d), |(i, j)| columns[j][i])
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear_system(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    ensure!(a.ncols() == n && b.len() == n, "linear system must be square");

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[(i, col)].abs().total_cmp(&a[(j, col)].abs()))
            .unwrap_or(col);
        if a[(pivot, col)].abs() < 1e-12 {
            bail!("singular matrix encountered while solving normal equations");
        }
        if pivot != col {
            for k in 0..n {
                a.swap((pivot, k), (col, k));
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[(row, col)] / a[(col, col)];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[(row, k)] -= factor * a[(col, k)];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[(row, k)] * x[k]).sum();
        x[row] = (b[row] - tail) / a[(row, row)];
    }
    Ok(x)
}

/// Leading eigenpairs of a symmetric positive semi-definite matrix via
/// power iteration with deflation. Eigenvectors are returned as rows.
pub fn top_eigenpairs(matrix: &Array2<f64>, k: usize, max_iter: usize) -> (Array1<f64>, Array2<f64>) {
    let d = matrix.nrows();
    let mut deflated = matrix.clone();
    let mut values = Array1::zeros(k);
    let mut vectors = Array2::zeros((k, d));

    for comp in 0..k {
        // Deterministic, non-degenerate start vector.
        let mut v = Array1::from_shape_fn(d, |i| 1.0 + ((i * 7 + comp * 13) % 11) as f64 * 0.1);
        normalize(&mut v);
        let mut eigenvalue = 0.0;
        for _ in 0..max_iter {
            let mut next = deflated.dot(&v);
            let norm = next.dot(&next).sqrt();
            if norm < 1e-300 {
                break;
            }
            next /= norm;
            let delta = (&next - &v).mapv(f64::abs).sum();
            v = next;
            eigenvalue = norm;
            if delta < 1e-10 {
                break;
            }
        }
        // Sign convention: largest-magnitude coordinate positive.
        let pivot = v
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(1.0);
        if pivot < 0.0 {
            v.mapv_inplace(|x| -x);
        }
        values[comp] = eigenvalue;
        vectors.row_mut(comp).assign(&v);

        let outer = outer_product(&v, &v) * eigenvalue;
        deflated -= &outer;
    }

    (values, vectors)
}

fn normalize(v: &mut Array1<f64>) {
    let norm = v.dot(v).sqrt();
    if norm > 0.0 {
        *v /= norm;
    }
}

fn outer_product(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}
