//! Clustering estimators: k-means and DBSCAN.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::Params;
use crate::utils::squared_euclidean;
use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, ArrayView2};
use std::any::Any;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KMeansInit {
    Random,
    KMeansPlusPlus,
}

#[derive(Debug, Clone)]
pub struct KMeans {
    mode: ExecMode,
    n_clusters: usize,
    max_iter: usize,
    tol: f64,
    init: KMeansInit,
    seed: u64,
    centroids: Option<Array2<f32>>,
    labels: Option<Array1<i32>>,
    inertia: f64,
    n_iter: usize,
}

const KMEANS_OPTIONS: &[&str] = &["n_clusters", "max_iter", "tol", "init", "random_state"];

impl KMeans {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("KMeans", KMEANS_OPTIONS)?;
        let init = match params.get_choice("init", "k-means++", &["random", "k-means++", "scalable-k-means++"])? {
            "random" => KMeansInit::Random,
            _ => KMeansInit::KMeansPlusPlus,
        };
        let n_clusters = params.get_usize("n_clusters", 8)?;
        ensure!(n_clusters > 0, "KMeans n_clusters must be positive");
        Ok(Self {
            mode,
            n_clusters,
            max_iter: params.get_usize("max_iter", 300)?.max(1),
            tol: params.get_f64("tol", 1e-4)?,
            init,
            seed: params.get_seed("random_state", 0)?,
            centroids: None,
            labels: None,
            inertia: 0.0,
            n_iter: 0,
        })
    }

    pub fn centroids(&self) -> Option<&Array2<f32>> {
        self.centroids.as_ref()
    }

    pub fn labels(&self) -> Option<&Array1<i32>> {
        self.labels.as_ref()
    }

    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn initial_centroids(&self, data: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut rng = fastrand::Rng::with_seed(self.seed);
        let n = data.nrows();
        let mut chosen: Vec<usize> = Vec::with_capacity(self.n_clusters);

        match self.init {
            KMeansInit::Random => {
                let mut order: Vec<usize> = (0..n).collect();
                rng.shuffle(&mut order);
                chosen.extend(order.into_iter().take(self.n_clusters));
            }
            KMeansInit::KMeansPlusPlus => {
                chosen.push(rng.usize(..n));
                let mut closest: Vec<f32> = data
                    .outer_iter()
                    .map(|row| squared_euclidean(row, data.row(chosen[0])))
                    .collect();
                while chosen.len() < self.n_clusters {
                    let total: f32 = closest.iter().sum();
                    let next = if total <= 0.0 {
                        (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
                    } else {
                        let mut target = rng.f32() * total;
                        let mut pick = n - 1;
                        for (idx, weight) in closest.iter().enumerate() {
                            if target < *weight {
                                pick = idx;
                                break;
                            }
                            target -= weight;
                        }
                        pick
                    };
                    chosen.push(next);
                    for (idx, row) in data.outer_iter().enumerate() {
                        closest[idx] = closest[idx].min(squared_euclidean(row, data.row(next)));
                    }
                }
            }
        }

        let mut centroids = Array2::zeros((self.n_clusters, data.ncols()));
        for (c, &idx) in chosen.iter().enumerate() {
            centroids.row_mut(c).assign(&data.row(idx));
        }
        centroids
    }

    fn assign(&self, data: ArrayView2<'_, f32>, centroids: &Array2<f32>) -> Vec<(usize, f32)> {
        self.mode
            .map_indices(data.nrows(), |i| nearest_centroid(data.row(i), centroids.view()))
    }
}

fn nearest_centroid(row: ndarray::ArrayView1<'_, f32>, centroids: ArrayView2<'_, f32>) -> (usize, f32) {
    centroids
        .outer_iter()
        .enumerate()
        .map(|(c, centroid)| (c, squared_euclidean(row, centroid)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, f32::INFINITY))
}

impl Estimator for KMeans {
    fn name(&self) -> &'static str {
        "KMeans"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.centroids.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        ensure!(
            data.nrows() >= self.n_clusters,
            "KMeans: n_samples={} should be >= n_clusters={}",
            data.nrows(),
            self.n_clusters
        );

        let mut centroids = self.initial_centroids(data);
        let mut assignment = self.assign(data, &centroids);
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;
            let mut sums = Array2::<f64>::zeros(centroids.dim());
            let mut counts = vec![0usize; self.n_clusters];
            for (row, (cluster, _)) in data.outer_iter().zip(assignment.iter()) {
                counts[*cluster] += 1;
                let mut target = sums.row_mut(*cluster);
                for (acc, value) in target.iter_mut().zip(row.iter()) {
                    *acc += *value as f64;
                }
            }

            let mut shift = 0.0f64;
            for c in 0..self.n_clusters {
                // Empty clusters keep their previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                for j in 0..centroids.ncols() {
                    let updated = (sums[(c, j)] / counts[c] as f64) as f32;
                    shift += ((updated - centroids[(c, j)]) as f64).powi(2);
                    centroids[(c, j)] = updated;
                }
            }

            assignment = self.assign(data, &centroids);
            if shift <= self.tol {
                break;
            }
        }

        self.inertia = assignment.iter().map(|(_, d)| *d as f64).sum();
        self.labels = Some(assignment.iter().map(|(c, _)| *c as i32).collect());
        self.centroids = Some(centroids);
        self.n_iter = iterations;
        debug!(n_iter = iterations, inertia = self.inertia, "kmeans converged");
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let centroids = self.centroids.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let data = features.dense()?;
        ensure!(
            data.ncols() == centroids.ncols(),
            "KMeans: expected {} features, got {}",
            centroids.ncols(),
            data.ncols()
        );
        let labels = self
            .assign(data, centroids)
            .into_iter()
            .map(|(c, _)| c as i32)
            .collect();
        Ok(Labels::Int(labels))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub const NOISE: i32 = -1;

#[derive(Debug, Clone)]
pub struct Dbscan {
    mode: ExecMode,
    eps: f32,
    min_samples: usize,
    labels: Option<Array1<i32>>,
    core_samples: Vec<usize>,
}

const DBSCAN_OPTIONS: &[&str] = &["eps", "min_samples"];
const DBSCAN_REFERENCE_OPTIONS: &[&str] = &["eps", "min_samples", "algorithm", "n_jobs"];

impl Dbscan {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        match mode {
            ExecMode::Sequential => {
                params.ensure_known("DBSCAN", DBSCAN_REFERENCE_OPTIONS)?;
                // Only exhaustive neighborhood search is implemented.
                params.get_choice("algorithm", "brute", &["brute", "auto"])?;
            }
            ExecMode::Parallel => params.ensure_known("DBSCAN", DBSCAN_OPTIONS)?,
        }
        let eps = params.get_f64("eps", 0.5)?;
        ensure!(eps > 0.0, "DBSCAN eps must be positive");
        Ok(Self {
            mode,
            eps: eps as f32,
            min_samples: params.get_usize("min_samples", 5)?.max(1),
            labels: None,
            core_samples: Vec::new(),
        })
    }

    pub fn labels(&self) -> Option<&Array1<i32>> {
        self.labels.as_ref()
    }

    pub fn core_sample_indices(&self) -> &[usize] {
        &self.core_samples
    }
}

impl Estimator for Dbscan {
    fn name(&self) -> &'static str {
        "DBSCAN"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.labels.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        let eps_sq = self.eps * self.eps;
        let neighborhoods: Vec<Vec<usize>> = self.mode.map_indices(data.nrows(), |i| {
            let row = data.row(i);
            data.outer_iter()
                .enumerate()
                .filter(|(_, other)| squared_euclidean(row, *other) <= eps_sq)
                .map(|(j, _)| j)
                .collect()
        });

        // Neighborhoods include the point itself.
        let is_core: Vec<bool> = neighborhoods
            .iter()
            .map(|n| n.len() >= self.min_samples)
            .collect();

        let mut labels = vec![NOISE; data.nrows()];
        let mut cluster = 0;
        let mut queue = VecDeque::new();
        for start in 0..data.nrows() {
            if labels[start] != NOISE || !is_core[start] {
                continue;
            }
            labels[start] = cluster;
            queue.push_back(start);
            while let Some(point) = queue.pop_front() {
                if !is_core[point] {
                    continue;
                }
                for &neighbor in &neighborhoods[point] {
                    if labels[neighbor] == NOISE {
                        labels[neighbor] = cluster;
                        queue.push_back(neighbor);
                    }
                }
            }
            cluster += 1;
        }

        self.core_samples = is_core
            .iter()
            .enumerate()
            .filter_map(|(i, core)| core.then_some(i))
            .collect();
        self.labels = Some(Array1::from(labels));
        debug!(clusters = cluster, "dbscan finished");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f32> {
        array![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [0.1, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1],
            [5.1, 5.1],
        ]
    }

    #[test]
    fn kmeans_separates_blobs() {
        let params = Params::new().with("n_clusters", 2).with("init", "random");
        let mut kmeans = KMeans::from_params(ExecMode::Parallel, &params).expect("params");
        kmeans
            .fit(&Features::Dense(two_blobs()), None)
            .expect("fit");
        let labels = kmeans.labels().expect("labels");
        assert_eq!(labels[0], labels[3]);
        assert_eq!(labels[4], labels[7]);
        assert_ne!(labels[0], labels[4]);
    }

    #[test]
    fn kmeans_modes_agree() {
        let params = Params::new().with("n_clusters", 2).with("random_state", 3);
        let data = Features::Dense(two_blobs());
        let mut seq = KMeans::from_params(ExecMode::Sequential, &params).unwrap();
        let mut par = KMeans::from_params(ExecMode::Parallel, &params).unwrap();
        seq.fit(&data, None).unwrap();
        par.fit(&data, None).unwrap();
        assert_eq!(seq.labels(), par.labels());
    }

    #[test]
    fn kmeans_rejects_too_few_samples() {
        let params = Params::new().with("n_clusters", 9);
        let mut kmeans = KMeans::from_params(ExecMode::Sequential, &params).unwrap();
        assert!(kmeans.fit(&Features::Dense(two_blobs()), None).is_err());
    }

    #[test]
    fn dbscan_marks_outlier_as_noise() {
        let mut data = two_blobs();
        data.push_row(ndarray::aview1(&[20.0f32, -20.0])).unwrap();
        let params = Params::new().with("eps", 0.5).with("min_samples", 2);
        let mut dbscan = Dbscan::from_params(ExecMode::Sequential, &params).unwrap();
        dbscan.fit(&Features::Dense(data), None).unwrap();
        let labels = dbscan.labels().unwrap();
        assert_eq!(labels[8], NOISE);
        assert_eq!(labels[0], 0);
        assert_eq!(labels[4], 1);
    }

    #[test]
    fn dbscan_reference_only_options() {
        let params = Params::new().with("algorithm", "brute");
        assert!(Dbscan::from_params(ExecMode::Sequential, &params).is_ok());
        assert!(Dbscan::from_params(ExecMode::Parallel, &params).is_err());
    }
}
