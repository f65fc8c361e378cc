//! Quality metrics used to compare backends.

use crate::data::Labels;
use crate::estimator::ExecMode;
use crate::utils::pairwise_sq_distances;
use anyhow::{ensure, Result};
use ndarray::ArrayView2;
use std::collections::HashMap;

fn ensure_paired(expected: &Labels, predicted: &Labels) -> Result<()> {
    ensure!(
        expected.len() == predicted.len(),
        "label count mismatch: {} expected vs {} predicted",
        expected.len(),
        predicted.len()
    );
    ensure!(!expected.is_empty(), "cannot score empty label sets");
    Ok(())
}

/// Fraction of exactly matching class labels.
pub fn accuracy_score(expected: &Labels, predicted: &Labels) -> Result<f64> {
    ensure_paired(expected, predicted)?;
    let expected = expected.to_classes()?;
    let predicted = predicted.to_classes()?;
    let hits = expected
        .iter()
        .zip(predicted.iter())
        .filter(|(a, b)| a == b)
        .count();
    Ok(hits as f64 / expected.len() as f64)
}

/// Coefficient of determination. A constant target scores 1.0 when matched
/// exactly and 0.0 otherwise.
pub fn r2_score(expected: &Labels, predicted: &Labels) -> Result<f64> {
    ensure_paired(expected, predicted)?;
    let y = expected.to_f32();
    let y_hat = predicted.to_f32();
    let mean = y.iter().map(|&v| v as f64).sum::<f64>() / y.len() as f64;
    let residual: f64 = y
        .iter()
        .zip(y_hat.iter())
        .map(|(&a, &b)| (a as f64 - b as f64).powi(2))
        .sum();
    let total: f64 = y.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
    if total == 0.0 {
        return Ok(if residual == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - residual / total)
}

fn entropy<'a>(counts: impl Iterator<Item = &'a usize>, n: f64) -> f64 {
    counts
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}

/// Homogeneity of a clustering against ground-truth classes: 1.0 when every
/// cluster contains members of a single class.
pub fn homogeneity_score(expected: &Labels, predicted: &Labels) -> Result<f64> {
    ensure_paired(expected, predicted)?;
    let classes = expected.to_classes()?;
    let clusters = predicted.to_classes()?;
    let n = classes.len() as f64;

    let mut class_counts: HashMap<i32, usize> = HashMap::new();
    let mut cluster_counts: HashMap<i32, usize> = HashMap::new();
    let mut joint: HashMap<(i32, i32), usize> = HashMap::new();
    for (&c, &k) in classes.iter().zip(clusters.iter()) {
        *class_counts.entry(c).or_default() += 1;
        *cluster_counts.entry(k).or_default() += 1;
        *joint.entry((c, k)).or_default() += 1;
    }

    let h_class = entropy(class_counts.values(), n);
    if h_class == 0.0 {
        return Ok(1.0);
    }
    // H(C|K) = -sum n_ck/n * ln(n_ck / n_k)
    let h_conditional: f64 = joint
        .iter()
        .map(|(&(_, k), &n_ck)| {
            let n_k = cluster_counts[&k] as f64;
            -(n_ck as f64 / n) * (n_ck as f64 / n_k).ln()
        })
        .sum();
    Ok(1.0 - h_conditional / h_class)
}

fn neighbor_ranks(mode: ExecMode, data: ArrayView2<'_, f32>) -> Vec<Vec<usize>> {
    let distances = pairwise_sq_distances(mode, data, data);
    mode.map_indices(data.nrows(), |i| {
        let mut order: Vec<usize> = (0..data.nrows()).filter(|&j| j != i).collect();
        order.sort_by(|&a, &b| distances[(i, a)].total_cmp(&distances[(i, b)]).then(a.cmp(&b)));
        order
    })
}

/// How well an embedding preserves local neighborhoods, in `[0, 1]`.
///
/// Penalizes points that are among the `k` nearest neighbors in the
/// embedding but not in the original space, weighted by their original rank.
pub fn trustworthiness(original: ArrayView2<'_, f32>, embedded: ArrayView2<'_, f32>, n_neighbors: usize) -> Result<f64> {
    let n = original.nrows();
    ensure!(
        n == embedded.nrows(),
        "trustworthiness: {} original rows vs {} embedded rows",
        n,
        embedded.nrows()
    );
    ensure!(
        n_neighbors >= 1 && 2 * n_neighbors < n,
        "trustworthiness: n_neighbors={n_neighbors} must be below n_samples / 2 (n_samples={n})"
    );

    let mode = ExecMode::Parallel;
    let original_order = neighbor_ranks(mode, original);
    let embedded_order = neighbor_ranks(mode, embedded);

    let penalties = mode.map_indices(n, |i| {
        let mut rank = vec![0usize; n];
        for (r, &j) in original_order[i].iter().enumerate() {
            rank[j] = r + 1;
        }
        embedded_order[i][..n_neighbors]
            .iter()
            .map(|&j| rank[j].saturating_sub(n_neighbors) as f64)
            .sum::<f64>()
    });
    let total: f64 = penalties.iter().sum();
    let k = n_neighbors as f64;
    let n = n as f64;
    Ok(1.0 - total * 2.0 / (n * k * (2.0 * n - 3.0 * k - 1.0)))
}

/// Neighborhood size used when scoring embeddings through the registry.
pub const TRUSTWORTHINESS_NEIGHBORS: usize = 5;

/// Embedding accuracy function: trustworthiness with the default neighborhood.
pub fn embedding_trustworthiness(original: ArrayView2<'_, f32>, embedded: ArrayView2<'_, f32>) -> Result<f64> {
    trustworthiness(original, embedded, TRUSTWORTHINESS_NEIGHBORS)
}

/// Accuracy of probability outputs from a forest inference engine, with
/// outputs above 0.5 treated as the positive class.
pub fn tree_inference_accuracy(expected: &Labels, predicted: &Labels) -> Result<f64> {
    ensure_paired(expected, predicted)?;
    let thresholded = Labels::Int(predicted.to_f32().mapv(|p| i32::from(p > 0.5)));
    accuracy_score(expected, &thresholded)
}
