//! Uniform manifold approximation and projection.
//!
//! Builds a fuzzy k-nearest-neighbor graph, then lays it out with
//! stochastic gradient descent on the cross-entropy between the graph and a
//! low-dimensional similarity curve. Each epoch computes one delta per
//! vertex from the current layout and applies them together, so vertices
//! can be processed in any order.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::Params;
use crate::utils::nearest_rows;
use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView2};
use std::any::Any;
use std::collections::BTreeMap;
use tracing::{debug, warn};

const SIGMA_STEPS: usize = 64;
const SIGMA_TOLERANCE: f64 = 1e-5;
const GRADIENT_CLIP: f64 = 4.0;
const CURVE_SAMPLES: usize = 300;

#[derive(Debug, Clone)]
pub struct Umap {
    mode: ExecMode,
    n_neighbors: usize,
    n_components: usize,
    n_epochs: usize,
    min_dist: f64,
    spread: f64,
    learning_rate: f64,
    negative_sample_rate: usize,
    seed: u64,
    embedding: Option<Array2<f32>>,
}

const UMAP_OPTIONS: &[&str] = &[
    "n_neighbors",
    "n_components",
    "n_epochs",
    "min_dist",
    "spread",
    "learning_rate",
    "negative_sample_rate",
    "init",
    "random_state",
];

/// Directed fuzzy edge `source -> target` with membership strength.
#[derive(Debug, Clone, Copy)]
struct Edge {
    target: usize,
    weight: f64,
}

impl Umap {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("UMAP", UMAP_OPTIONS)?;
        params.get_choice("init", "random", &["random"])?;
        let n_neighbors = params.get_usize("n_neighbors", 15)?;
        ensure!(n_neighbors >= 2, "UMAP: n_neighbors must be at least 2");
        let min_dist = params.get_f64("min_dist", 0.1)?;
        let spread = params.get_f64("spread", 1.0)?;
        ensure!(
            min_dist >= 0.0 && min_dist <= spread,
            "UMAP: min_dist must be in [0, spread]"
        );
        Ok(Self {
            mode,
            n_neighbors,
            n_components: params.get_usize("n_components", 2)?,
            n_epochs: params.get_usize("n_epochs", 200)?,
            min_dist,
            spread,
            learning_rate: params.get_f64("learning_rate", 1.0)?,
            negative_sample_rate: params.get_usize("negative_sample_rate", 5)?,
            seed: params.get_seed("random_state", 0)?,
            embedding: None,
        })
    }

    /// Symmetrized fuzzy simplicial set as per-vertex adjacency lists.
    fn fuzzy_graph(&self, data: ArrayView2<'_, f32>, k: usize) -> Vec<Vec<Edge>> {
        let n = data.nrows();
        let target = (k as f64).log2();
        let directed = self.mode.map_indices(n, |i| {
            let knn: Vec<(usize, f64)> = nearest_rows(data.row(i), data, k, Some(i))
                .into_iter()
                .map(|(j, d)| (j, (d as f64).sqrt()))
                .collect();
            let rho = knn.iter().map(|&(_, d)| d).find(|&d| d > 0.0).unwrap_or(0.0);

            let (mut lo, mut hi, mut sigma) = (0.0f64, f64::INFINITY, 1.0f64);
            for _ in 0..SIGMA_STEPS {
                let total: f64 = knn
                    .iter()
                    .map(|&(_, d)| (-(d - rho).max(0.0) / sigma).exp())
                    .sum();
                if (total - target).abs() < SIGMA_TOLERANCE {
                    break;
                }
                if total > target {
                    hi = sigma;
                    sigma = (lo + hi) / 2.0;
                } else {
                    lo = sigma;
                    sigma = if hi.is_infinite() { sigma * 2.0 } else { (lo + hi) / 2.0 };
                }
            }
            knn.into_iter()
                .map(|(j, d)| (j, (-(d - rho).max(0.0) / sigma).exp()))
                .collect::<Vec<(usize, f64)>>()
        });

        let mut strengths: Vec<BTreeMap<usize, (f64, f64)>> = vec![BTreeMap::new(); n];
        for (i, row) in directed.iter().enumerate() {
            for &(j, w) in row {
                strengths[i].entry(j).or_insert((0.0, 0.0)).0 = w;
                strengths[j].entry(i).or_insert((0.0, 0.0)).1 = w;
            }
        }
        strengths
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(target, (a, b))| Edge {
                        target,
                        weight: a + b - a * b,
                    })
                    .collect()
            })
            .collect()
    }

    /// Fit `1 / (1 + a d^{2b})` to the offset-exponential target curve.
    fn curve_parameters(&self) -> (f64, f64) {
        let xs: Vec<f64> = (1..=CURVE_SAMPLES)
            .map(|s| s as f64 * 3.0 * self.spread / CURVE_SAMPLES as f64)
            .collect();
        let ys: Vec<f64> = xs
            .iter()
            .map(|&x| {
                if x < self.min_dist {
                    1.0
                } else {
                    (-(x - self.min_dist) / self.spread).exp()
                }
            })
            .collect();
        let error = |a: f64, b: f64| -> f64 {
            xs.iter()
                .zip(&ys)
                .map(|(&x, &y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
                .sum()
        };

        let (mut best_a, mut best_b, mut best) = (1.0, 1.0, f64::INFINITY);
        for ai in 1..=100 {
            for bi in 1..=60 {
                let (a, b) = (ai as f64 * 0.05, 0.2 + bi as f64 * 0.025);
                let e = error(a, b);
                if e < best {
                    (best_a, best_b, best) = (a, b, e);
                }
            }
        }
        (best_a, best_b)
    }
}

impl Estimator for Umap {
    fn name(&self) -> &'static str {
        "UMAP"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.embedding.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        let n = data.nrows();
        ensure!(n >= 2, "UMAP: need at least two samples, got {n}");
        let k = self.n_neighbors.min(n - 1);
        if k < self.n_neighbors {
            warn!(requested = self.n_neighbors, available = n - 1, "clamping UMAP n_neighbors");
        }

        let graph = self.fuzzy_graph(data, k);
        let max_weight = graph
            .iter()
            .flatten()
            .map(|e| e.weight)
            .fold(0.0f64, f64::max)
            .max(f64::MIN_POSITIVE);
        let epochs = self.n_epochs.max(1) as f64;
        // Edges too weak to be sampled even once are dropped.
        let graph: Vec<Vec<Edge>> = graph
            .into_iter()
            .map(|edges| {
                edges
                    .into_iter()
                    .filter(|e| e.weight >= max_weight / epochs)
                    .collect()
            })
            .collect();
        let (a, b) = self.curve_parameters();
        debug!(n_samples = n, k, a, b, "UMAP graph built");

        let dims = self.n_components;
        let mut init = fastrand::Rng::with_seed(self.seed);
        let mut layout = Array2::from_shape_simple_fn((n, dims), || init.f64() * 20.0 - 10.0);

        for epoch in 0..self.n_epochs {
            let alpha = self.learning_rate * (1.0 - epoch as f64 / epochs);
            let current = &layout;
            let deltas = self.mode.map_indices(n, |i| {
                let mut rng = fastrand::Rng::with_seed(
                    self.seed ^ ((epoch as u64) << 32) ^ (i as u64).wrapping_mul(0x9E37_79B9),
                );
                let mut delta = vec![0.0f64; dims];
                for edge in &graph[i] {
                    // Sample each edge in proportion to its weight.
                    let rate = edge.weight / max_weight;
                    if ((epoch + 1) as f64 * rate).floor() <= (epoch as f64 * rate).floor() {
                        continue;
                    }
                    let j = edge.target;
                    let d2: f64 = (0..dims).map(|c| (current[(i, c)] - current[(j, c)]).powi(2)).sum();
                    if d2 > 0.0 {
                        let coeff = -2.0 * a * b * d2.powf(b - 1.0) / (1.0 + a * d2.powf(b));
                        for c in 0..dims {
                            let g = (coeff * (current[(i, c)] - current[(j, c)])).clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
                            delta[c] += g * alpha;
                        }
                    }
                    for _ in 0..self.negative_sample_rate {
                        let other = rng.usize(..n);
                        if other == i {
                            continue;
                        }
                        let d2: f64 = (0..dims)
                            .map(|c| (current[(i, c)] - current[(other, c)]).powi(2))
                            .sum();
                        let coeff = 2.0 * b / ((0.001 + d2) * (1.0 + a * d2.powf(b)));
                        for c in 0..dims {
                            let g = (coeff * (current[(i, c)] - current[(other, c)])).clamp(-GRADIENT_CLIP, GRADIENT_CLIP);
                            delta[c] += g * alpha;
                        }
                    }
                }
                delta
            });
            for (i, delta) in deltas.iter().enumerate() {
                for (c, d) in delta.iter().enumerate() {
                    layout[(i, c)] += d;
                }
            }
        }

        self.embedding = Some(layout.mapv(|v| v as f32));
        Ok(())
    }

    fn fit_transform(&mut self, features: &Features, labels: Option<&Labels>) -> Result<Array2<f32>> {
        self.fit(features, labels)?;
        self.embedding
            .clone()
            .ok_or_else(|| not_fitted(self.name()))
    }

    fn embedding(&self) -> Option<ArrayView2<'_, f32>> {
        self.embedding.as_ref().map(|e| e.view())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::trustworthiness;
    use approx::assert_abs_diff_eq;

    fn clusters() -> Array2<f32> {
        Array2::from_shape_fn((40, 3), |(i, j)| {
            let centre = (i / 10) as f32 * 8.0;
            centre + ((i * 5 + j * 11) % 7) as f32 * 0.15
        })
    }

    #[test]
    fn curve_fit_matches_reference_values() {
        // min_dist=0.1, spread=1.0 yields a ~= 1.58, b ~= 0.90.
        let umap = Umap::from_params(ExecMode::Sequential, &Params::new()).unwrap();
        let (a, b) = umap.curve_parameters();
        assert_abs_diff_eq!(a, 1.58, epsilon = 0.15);
        assert_abs_diff_eq!(b, 0.9, epsilon = 0.05);
    }

    #[test]
    fn layout_preserves_neighborhoods() {
        let params = Params::new().with("n_neighbors", 5).with("n_epochs", 200);
        let mut umap = Umap::from_params(ExecMode::Parallel, &params).unwrap();
        let data = clusters();
        let embedding = umap.fit_transform(&Features::Dense(data.clone()), None).unwrap();
        assert_eq!(embedding.dim(), (40, 2));
        assert!(trustworthiness(data.view(), embedding.view(), 5).unwrap() > 0.75);
    }

    #[test]
    fn modes_produce_the_same_layout() {
        let params = Params::new().with("n_neighbors", 4).with("n_epochs", 20);
        let data = Features::Dense(clusters());
        let mut seq = Umap::from_params(ExecMode::Sequential, &params).unwrap();
        let mut par = Umap::from_params(ExecMode::Parallel, &params).unwrap();
        assert_eq!(
            seq.fit_transform(&data, None).unwrap(),
            par.fit_transform(&data, None).unwrap()
        );
    }

    #[test]
    fn neighbors_are_clamped_to_sample_count() {
        let params = Params::new().with("n_neighbors", 50).with("n_epochs", 5);
        let mut umap = Umap::from_params(ExecMode::Sequential, &params).unwrap();
        let data = Features::Dense(clusters());
        assert!(umap.fit(&data, None).is_ok());
    }
}
