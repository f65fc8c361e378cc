//! Exact t-distributed stochastic neighbor embedding.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::Params;
use crate::random_projection::standard_normal;
use crate::utils::pairwise_sq_distances;
use anyhow::{bail, ensure, Result};
use ndarray::{Array2, ArrayView2};
use std::any::Any;
use tracing::debug;

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const EXAGGERATION_ITERS: usize = 250;
const MIN_GAIN: f64 = 0.01;
const P_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct Tsne {
    mode: ExecMode,
    n_components: usize,
    perplexity: f64,
    learning_rate: f64,
    n_iter: usize,
    early_exaggeration: f64,
    seed: u64,
    embedding: Option<Array2<f32>>,
    kl_divergence: Option<f64>,
}

const TSNE_OPTIONS: &[&str] = &[
    "n_components",
    "perplexity",
    "learning_rate",
    "n_iter",
    "early_exaggeration",
    "method",
    "random_state",
];

impl Tsne {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("TSNE", TSNE_OPTIONS)?;
        params.get_choice("method", "exact", &["exact", "barnes_hut"])?;
        let perplexity = params.get_f64("perplexity", 30.0)?;
        ensure!(perplexity > 0.0, "TSNE: perplexity must be positive");
        let n_components = params.get_usize("n_components", 2)?;
        ensure!(n_components > 0, "TSNE: n_components must be positive");
        Ok(Self {
            mode,
            n_components,
            perplexity,
            learning_rate: params.get_f64("learning_rate", 200.0)?,
            n_iter: params.get_usize("n_iter", 1000)?,
            early_exaggeration: params.get_f64("early_exaggeration", 12.0)?,
            seed: params.get_seed("random_state", 0)?,
            embedding: None,
            kl_divergence: None,
        })
    }

    pub fn kl_divergence(&self) -> Option<f64> {
        self.kl_divergence
    }

    /// Conditional probabilities `p_{j|i}` whose entropy matches the target
    /// perplexity, found by bisection on the Gaussian precision.
    fn conditional_probabilities(&self, data: ArrayView2<'_, f32>) -> Array2<f64> {
        let n = data.nrows();
        let distances = pairwise_sq_distances(self.mode, data, data);
        let target_entropy = self.perplexity.ln();
        let rows = self.mode.map_indices(n, |i| {
            let mut beta = 1.0f64;
            let (mut lo, mut hi) = (f64::NEG_INFINITY, f64::INFINITY);
            let mut row = vec![0.0f64; n];
            for _ in 0..PERPLEXITY_STEPS {
                let mut sum = 0.0;
                for j in 0..n {
                    row[j] = if j == i {
                        0.0
                    } else {
                        (-(distances[(i, j)] as f64) * beta).exp()
                    };
                    sum += row[j];
                }
                let sum = sum.max(f64::MIN_POSITIVE);
                let mut weighted = 0.0;
                for j in 0..n {
                    row[j] /= sum;
                    weighted += row[j] * distances[(i, j)] as f64;
                }
                let entropy = sum.ln() + beta * weighted;
                let diff = entropy - target_entropy;
                if diff.abs() < PERPLEXITY_TOLERANCE {
                    break;
                }
                if diff > 0.0 {
                    lo = beta;
                    beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
                } else {
                    hi = beta;
                    beta = if lo.is_infinite() { beta / 2.0 } else { (beta + lo) / 2.0 };
                }
            }
            row
        });
        Array2::from_shape_fn((n, n), |(i, j)| rows[i][j])
    }

    fn gradient(&self, p: &Array2<f64>, y: &Array2<f64>, exaggeration: f64) -> (Array2<f64>, f64) {
        let n = y.nrows();
        let dims = y.ncols();
        let kernel_rows = self.mode.map_indices(n, |i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        0.0
                    } else {
                        let d: f64 = (0..dims).map(|c| (y[(i, c)] - y[(j, c)]).powi(2)).sum();
                        1.0 / (1.0 + d)
                    }
                })
                .collect::<Vec<f64>>()
        });
        let normalizer: f64 = kernel_rows.iter().flatten().sum::<f64>().max(f64::MIN_POSITIVE);

        let grads = self.mode.map_indices(n, |i| {
            let mut grad = vec![0.0f64; dims];
            let mut kl = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                let q = (kernel_rows[i][j] / normalizer).max(P_FLOOR);
                let pij = p[(i, j)];
                kl += pij * (pij / q).ln();
                let coeff = 4.0 * (exaggeration * pij - q) * kernel_rows[i][j];
                for c in 0..dims {
                    grad[c] += coeff * (y[(i, c)] - y[(j, c)]);
                }
            }
            (grad, kl)
        });
        let kl = grads.iter().map(|(_, k)| k).sum();
        (Array2::from_shape_fn((n, dims), |(i, c)| grads[i].0[c]), kl)
    }
}

impl Estimator for Tsne {
    fn name(&self) -> &'static str {
        "TSNE"
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
        ensure!(
            self.perplexity < n as f64,
            "TSNE: perplexity ({}) must be less than n_samples ({n})",
            self.perplexity
        );

        let conditional = self.conditional_probabilities(data);
        let p = Array2::from_shape_fn((n, n), |(i, j)| {
            ((conditional[(i, j)] + conditional[(j, i)]) / (2.0 * n as f64)).max(P_FLOOR)
        });

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let mut y = Array2::from_shape_simple_fn((n, self.n_components), || {
            1e-4 * standard_normal(&mut rng) as f64
        });
        let mut update = Array2::<f64>::zeros(y.raw_dim());
        let mut gains = Array2::<f64>::ones(y.raw_dim());
        let exaggeration_iters = EXAGGERATION_ITERS.min(self.n_iter / 4);
        let mut kl = 0.0;

        for iter in 0..self.n_iter {
            let exaggerating = iter < exaggeration_iters;
            let exaggeration = if exaggerating { self.early_exaggeration } else { 1.0 };
            let momentum = if exaggerating { 0.5 } else { 0.8 };
            let (grad, divergence) = self.gradient(&p, &y, exaggeration);
            kl = divergence;
            for ((g, u), gain) in grad.iter().zip(update.iter_mut()).zip(gains.iter_mut()) {
                *gain = if g.signum() != u.signum() { *gain + 0.2 } else { *gain * 0.8 };
                *gain = gain.max(MIN_GAIN);
                *u = momentum * *u - self.learning_rate * *gain * g;
            }
            y += &update;
            if !y.iter().all(|v| v.is_finite()) {
                bail!("TSNE diverged at iteration {iter}; lower the learning rate");
            }
        }
        debug!(n_samples = n, kl_divergence = kl, "t-SNE optimization finished");

        self.kl_divergence = Some(kl);
        self.embedding = Some(y.mapv(|v| v as f32));
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
