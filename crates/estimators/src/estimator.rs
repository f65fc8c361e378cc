//! The estimator contract every backend implements.

use crate::data::{Features, Labels};
use crate::ensemble::TreeModel;
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// How an estimator runs its hot loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecMode {
    /// Single-threaded; used by the reference backends.
    Sequential,
    /// Work-stealing over the rayon pool; used by the accelerated backends.
    Parallel,
}

impl ExecMode {
    /// Evaluate `f` for every index in `0..n`, preserving order.
    pub fn map_indices<T, F>(self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            ExecMode::Sequential => (0..n).map(f).collect(),
            ExecMode::Parallel => (0..n).into_par_iter().map(f).collect(),
        }
    }

    pub fn is_parallel(self) -> bool {
        matches!(self, ExecMode::Parallel)
    }
}

/// Result of a k-neighbors query: one row per query sample, columns sorted
/// by increasing distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub distances: Array2<f32>,
    pub indices: Array2<usize>,
}

pub trait Estimator: Send + Any {
    fn name(&self) -> &'static str;

    fn mode(&self) -> ExecMode;

    fn is_fitted(&self) -> bool;

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()>;

    fn predict(&self, _features: &Features) -> Result<Labels> {
        bail!("{} does not support predict", self.name())
    }

    fn transform(&self, _features: &Features) -> Result<Array2<f32>> {
        bail!("{} does not support transform", self.name())
    }

    fn fit_transform(&mut self, features: &Features, labels: Option<&Labels>) -> Result<Array2<f32>> {
        self.fit(features, labels)?;
        self.transform(features)
    }

    fn kneighbors(&self, _features: &Features, _n_neighbors: Option<usize>) -> Result<Neighbors> {
        bail!("{} does not support kneighbors", self.name())
    }

    /// Training-set embedding for estimators that cannot transform unseen
    /// data (t-SNE, UMAP).
    fn embedding(&self) -> Option<ArrayView2<'_, f32>> {
        None
    }

    /// Install a pre-trained tree ensemble (inference-only estimators).
    fn load_model(&mut self, _model: TreeModel) -> Result<()> {
        bail!("{} cannot load a tree model", self.name())
    }

    fn as_any(&self) -> &dyn Any;
}

pub type BoxedEstimator = Box<dyn Estimator>;

pub(crate) fn require_labels<'a>(name: &str, labels: Option<&'a Labels>) -> Result<&'a Labels> {
    match labels {
        Some(labels) => Ok(labels),
        None => bail!("{name} requires labels for fit"),
    }
}

pub(crate) fn ensure_same_rows(name: &str, features: &Features, labels: &Labels) -> Result<()> {
    if features.nrows() != labels.len() {
        bail!(
            "{name}: features have {} rows but labels have {} entries",
            features.nrows(),
            labels.len()
        );
    }
    Ok(())
}

pub(crate) fn not_fitted(name: &str) -> anyhow::Error {
    anyhow::anyhow!("{name} is not fitted yet; call fit first")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_agree_on_order() {
        let seq = ExecMode::Sequential.map_indices(100, |i| i * i);
        let par = ExecMode::Parallel.map_indices(100, |i| i * i);
        assert_eq!(seq, par);
    }
}
