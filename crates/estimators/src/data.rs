//! Input data representations shared by every estimator.

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2};

/// Batch layout consumed by the tree-inference runtime: contiguous
/// row-major values with explicit dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBatch {
    values: Vec<f32>,
    num_row: usize,
    num_col: usize,
}

impl TreeBatch {
    pub fn from_dense(dense: ArrayView2<'_, f32>) -> Self {
        let (num_row, num_col) = dense.dim();
        Self {
            values: dense.iter().copied().collect(),
            num_row,
            num_col,
        }
    }

    pub fn num_row(&self) -> usize {
        self.num_row
    }

    pub fn num_col(&self) -> usize {
        self.num_col
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.num_col;
        &self.values[start..start + self.num_col]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    Dense(Array2<f32>),
    Batch(TreeBatch),
}

impl Features {
    pub fn dense(&self) -> Result<ArrayView2<'_, f32>> {
        match self {
            Features::Dense(array) => Ok(array.view()),
            Features::Batch(_) => bail!("estimator requires a dense feature matrix, got a tree batch"),
        }
    }

    pub fn nrows(&self) -> usize {
        match self {
            Features::Dense(array) => array.nrows(),
            Features::Batch(batch) => batch.num_row(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Features::Dense(array) => array.ncols(),
            Features::Batch(batch) => batch.num_col(),
        }
    }
}

impl From<Array2<f32>> for Features {
    fn from(value: Array2<f32>) -> Self {
        Features::Dense(value)
    }
}

/// Target vector. Classifiers and clusterers emit `Int`, regressors `Float`.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Float(Array1<f32>),
    Int(Array1<i32>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Float(values) => values.len(),
            Labels::Int(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f32(&self) -> Array1<f32> {
        match self {
            Labels::Float(values) => values.clone(),
            Labels::Int(values) => values.mapv(|v| v as f32),
        }
    }

    /// Truncating cast to `i32`, the label dtype expected by the forest
    /// estimators.
    pub fn to_i32(&self) -> Array1<i32> {
        match self {
            Labels::Float(values) => values.mapv(|v| v as i32),
            Labels::Int(values) => values.clone(),
        }
    }

    /// Class labels for classifiers. Float labels are accepted only when
    /// every value is integral.
    pub fn to_classes(&self) -> Result<Array1<i32>> {
        match self {
            Labels::Int(values) => Ok(values.clone()),
            Labels::Float(values) => {
                if let Some(bad) = values.iter().find(|v| v.fract() != 0.0 || !v.is_finite()) {
                    bail!("unknown label type: continuous target (found {bad})");
                }
                Ok(values.mapv(|v| v as i32))
            }
        }
    }
}

/// The `(features, labels)` pair handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Features,
    pub labels: Option<Labels>,
}

impl Dataset {
    pub fn new(features: Features, labels: Option<Labels>) -> Self {
        Self { features, labels }
    }

    pub fn unlabeled(features: Array2<f32>) -> Self {
        Self::new(Features::Dense(features), None)
    }

    pub fn labeled(features: Array2<f32>, labels: Labels) -> Self {
        Self::new(Features::Dense(features), Some(labels))
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }
}

/// Sorted distinct class values and the index of each sample's class.
pub fn encode_classes(labels: &Array1<i32>) -> (Vec<i32>, Vec<usize>) {
    let mut classes: Vec<i32> = labels.iter().copied().collect();
    classes.sort_unstable();
    classes.dedup();
    let encoded = labels
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or(0))
        .collect();
    (classes, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn tree_batch_preserves_row_major_layout() {
        let dense = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let batch = TreeBatch::from_dense(dense.view());
        assert_eq!(batch.num_row(), 2);
        assert_eq!(batch.num_col(), 3);
        assert_eq!(batch.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn continuous_labels_are_not_classes() {
        let labels = Labels::Float(array![0.0, 1.5, 2.0]);
        assert!(labels.to_classes().is_err());
        let labels = Labels::Float(array![0.0, 1.0, 2.0]);
        assert_eq!(labels.to_classes().unwrap(), array![0, 1, 2]);
    }

    #[test]
    fn batch_features_refuse_dense_view() {
        let features = Features::Batch(TreeBatch::from_dense(Array2::zeros((2, 2)).view()));
        assert!(features.dense().is_err());
        assert_eq!(features.nrows(), 2);
    }

    #[test]
    fn encode_classes_sorts_and_indexes() {
        let (classes, encoded) = encode_classes(&array![7, 3, 7, 5]);
        assert_eq!(classes, vec![3, 5, 7]);
        assert_eq!(encoded, vec![2, 0, 2, 1]);
    }
}
