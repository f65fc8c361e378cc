//! Deterministic synthetic datasets for benchmark runs.

use anyhow::{ensure, Result};
use ndarray::{Array1, Array2};
use pairbench_estimators::random_projection::standard_normal;
use pairbench_estimators::{Dataset, Labels};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BLOB_CENTERS: usize = 8;
const CENTER_BOX: f32 = 10.0;
const NOISE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Isotropic Gaussian clusters labelled by cluster index.
    Blobs,
    /// Linear target with Gaussian noise.
    Regression,
    /// Two classes split by a random hyperplane.
    Classification,
}

impl DatasetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Blobs => "blobs",
            DatasetKind::Regression => "regression",
            DatasetKind::Classification => "classification",
        }
    }

    /// Dataset matching what an accuracy function scores.
    pub fn for_accuracy(accuracy: Option<&str>) -> Self {
        match accuracy {
            Some("r2_score") => DatasetKind::Regression,
            Some("accuracy_score") | Some("tree_inference_accuracy") => DatasetKind::Classification,
            _ => DatasetKind::Blobs,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "blobs" => Ok(DatasetKind::Blobs),
            "regression" => Ok(DatasetKind::Regression),
            "classification" => Ok(DatasetKind::Classification),
            other => anyhow::bail!("unknown dataset {other:?} (expected blobs, regression or classification)"),
        }
    }
}

pub fn generate(kind: DatasetKind, n_rows: usize, n_cols: usize, seed: u64) -> Result<Dataset> {
    ensure!(n_rows > 0 && n_cols > 0, "dataset must have at least one row and one column");
    let mut rng = fastrand::Rng::with_seed(seed);
    let data = match kind {
        DatasetKind::Blobs => blobs(&mut rng, n_rows, n_cols),
        DatasetKind::Regression => regression(&mut rng, n_rows, n_cols),
        DatasetKind::Classification => classification(&mut rng, n_rows, n_cols),
    };
    Ok(data)
}

fn blobs(rng: &mut fastrand::Rng, n_rows: usize, n_cols: usize) -> Dataset {
    let centers = Array2::from_shape_simple_fn((BLOB_CENTERS, n_cols), || {
        (rng.f32() * 2.0 - 1.0) * CENTER_BOX
    });
    let assignment: Array1<i32> = (0..n_rows).map(|i| (i % BLOB_CENTERS) as i32).collect();
    let features = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| {
        centers[(assignment[i] as usize, j)] + standard_normal(rng)
    });
    Dataset::labeled(features, Labels::Int(assignment))
}

fn regression(rng: &mut fastrand::Rng, n_rows: usize, n_cols: usize) -> Dataset {
    let features = Array2::from_shape_simple_fn((n_rows, n_cols), || standard_normal(rng));
    let coef: Array1<f32> = (0..n_cols).map(|_| rng.f32() * 100.0).collect();
    let mut target = features.dot(&coef);
    target.mapv_inplace(|v| v + NOISE * standard_normal(rng));
    Dataset::labeled(features, Labels::Float(target))
}

fn classification(rng: &mut fastrand::Rng, n_rows: usize, n_cols: usize) -> Dataset {
    let features = Array2::from_shape_simple_fn((n_rows, n_cols), || standard_normal(rng));
    let normal: Array1<f32> = (0..n_cols).map(|_| standard_normal(rng)).collect();
    let labels = features.dot(&normal).mapv(|v| i32::from(v > 0.0));
    Dataset::labeled(features, Labels::Int(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() {
        let a = generate(DatasetKind::Regression, 40, 5, 7).unwrap();
        let b = generate(DatasetKind::Regression, 40, 5, 7).unwrap();
        let c = generate(DatasetKind::Regression, 40, 5, 8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn blobs_cycle_through_centers() {
        let data = generate(DatasetKind::Blobs, 20, 3, 0).unwrap();
        assert_eq!(data.n_samples(), 20);
        assert_eq!(data.n_features(), 3);
        match data.labels {
            Some(Labels::Int(labels)) => {
                assert_eq!(labels[0], 0);
                assert_eq!(labels[9], 1);
                assert!(labels.iter().all(|&l| (0..BLOB_CENTERS as i32).contains(&l)));
            }
            other => panic!("unexpected labels {other:?}"),
        }
    }

    #[test]
    fn classification_is_binary() {
        let data = generate(DatasetKind::Classification, 200, 4, 3).unwrap();
        let labels = data.labels.unwrap().to_i32();
        assert!(labels.iter().all(|&l| l == 0 || l == 1));
        assert!(labels.iter().any(|&l| l == 1));
        assert!(labels.iter().any(|&l| l == 0));
    }

    #[test]
    fn kind_follows_accuracy_function() {
        assert_eq!(DatasetKind::for_accuracy(Some("r2_score")), DatasetKind::Regression);
        assert_eq!(DatasetKind::for_accuracy(Some("accuracy_score")), DatasetKind::Classification);
        assert_eq!(DatasetKind::for_accuracy(None), DatasetKind::Blobs);
        assert_eq!("Blobs".parse::<DatasetKind>().unwrap(), DatasetKind::Blobs);
        assert!("moons".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn empty_shape_is_rejected() {
        assert!(generate(DatasetKind::Blobs, 0, 3, 0).is_err());
    }
}
