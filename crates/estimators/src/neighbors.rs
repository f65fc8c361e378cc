//! Brute-force nearest-neighbor search.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode, Neighbors};
use crate::params::Params;
use crate::utils::nearest_rows;
use anyhow::{ensure, Result};
use ndarray::Array2;
use std::any::Any;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct NearestNeighbors {
    mode: ExecMode,
    n_neighbors: usize,
    index: Option<Array2<f32>>,
}

const NN_OPTIONS: &[&str] = &["n_neighbors"];
const NN_REFERENCE_OPTIONS: &[&str] = &["n_neighbors", "algorithm", "n_jobs", "metric"];

impl NearestNeighbors {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        match mode {
            ExecMode::Sequential => {
                params.ensure_known("NearestNeighbors", NN_REFERENCE_OPTIONS)?;
                params.get_choice("algorithm", "brute", &["brute", "auto"])?;
                params.get_choice("metric", "euclidean", &["euclidean"])?;
                // n_jobs is accepted for compatibility; the reference backend is sequential.
                params.get_i64("n_jobs", 1)?;
            }
            ExecMode::Parallel => params.ensure_known("NearestNeighbors", NN_OPTIONS)?,
        }
        let n_neighbors = params.get_usize("n_neighbors", 5)?;
        ensure!(n_neighbors > 0, "NearestNeighbors: n_neighbors must be positive");
        Ok(Self {
            mode,
            n_neighbors,
            index: None,
        })
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }
}

impl Estimator for NearestNeighbors {
    fn name(&self) -> &'static str {
        "NearestNeighbors"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.index.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        ensure!(data.nrows() > 0, "NearestNeighbors: cannot fit on an empty dataset");
        self.index = Some(data.to_owned());
        Ok(())
    }

    fn kneighbors(&self, features: &Features, n_neighbors: Option<usize>) -> Result<Neighbors> {
        let index = self.index.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let queries = features.dense()?;
        ensure!(
            queries.ncols() == index.ncols(),
            "NearestNeighbors: expected {} features, got {}",
            index.ncols(),
            queries.ncols()
        );

        let requested = n_neighbors.unwrap_or(self.n_neighbors);
        let k = requested.min(index.nrows());
        if k < requested {
            warn!(requested, available = index.nrows(), "clamping n_neighbors to index size");
        }

        let results = self.mode.map_indices(queries.nrows(), |i| {
            nearest_rows(queries.row(i), index.view(), k, None)
        });
        let distances = Array2::from_shape_fn((queries.nrows(), k), |(i, j)| results[i][j].1.sqrt());
        let indices = Array2::from_shape_fn((queries.nrows(), k), |(i, j)| results[i][j].0);
        Ok(Neighbors { distances, indices })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn query_returns_self_first() {
        let data = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 2.0], [5.0, 5.0]];
        let params = Params::new().with("n_neighbors", 2);
        let mut nn = NearestNeighbors::from_params(ExecMode::Parallel, &params).unwrap();
        let features = Features::Dense(data);
        nn.fit(&features, None).unwrap();
        let result = nn.kneighbors(&features, None).unwrap();
        assert_eq!(result.indices.column(0).to_vec(), vec![0, 1, 2, 3]);
        assert_eq!(result.indices[(0, 1)], 1);
        assert_abs_diff_eq!(result.distances[(0, 1)], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn oversized_k_is_clamped() {
        let data = Features::Dense(array![[0.0f32], [1.0], [2.0]]);
        let params = Params::new().with("n_neighbors", 1024);
        let mut nn = NearestNeighbors::from_params(ExecMode::Sequential, &params).unwrap();
        nn.fit(&data, None).unwrap();
        let result = nn.kneighbors(&data, None).unwrap();
        assert_eq!(result.indices.dim(), (3, 3));
    }

    #[test]
    fn reference_accepts_brute_and_jobs() {
        let params = Params::new().with("algorithm", "brute").with("n_jobs", -1);
        assert!(NearestNeighbors::from_params(ExecMode::Sequential, &params).is_ok());
        assert!(NearestNeighbors::from_params(ExecMode::Parallel, &params).is_err());
    }
}
