//! Inference-only engines for pre-trained tree ensembles.
//!
//! Neither engine trains: the model is produced by [`train_classifier_model`]
//! during benchmark setup and installed with [`Estimator::load_model`].

use crate::data::{Dataset, Features, Labels};
use crate::ensemble::{ForestConfig, TreeModel, TreeParams, TreeTask};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::Params;
use crate::utils::argmax;
use anyhow::{anyhow, bail, ensure, Result};
use ndarray::Array1;
use std::any::Any;
use tracing::debug;

/// Rows scored together by the batched tree-major traversal.
const BATCH_ROWS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilAlgo {
    Auto,
    Naive,
    TreeReorg,
    BatchTreeReorg,
}

impl FilAlgo {
    fn parse(raw: &str) -> Result<Self> {
        Ok(match raw.to_ascii_uppercase().as_str() {
            "AUTO" => FilAlgo::Auto,
            "NAIVE" => FilAlgo::Naive,
            "TREE_REORG" => FilAlgo::TreeReorg,
            "BATCH_TREE_REORG" => FilAlgo::BatchTreeReorg,
            other => bail!("ForestInference: unknown fil_algo {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Auto,
    Dense,
    Sparse,
}

impl StorageType {
    fn parse(raw: &str) -> Result<Self> {
        Ok(match raw.to_ascii_uppercase().as_str() {
            "AUTO" => StorageType::Auto,
            "DENSE" => StorageType::Dense,
            "SPARSE" => StorageType::Sparse,
            other => bail!("ForestInference: unknown storage_type {other}"),
        })
    }
}

#[cfg(feature = "tree-runtime")]
const TRAINING_OPTIONS: &[&str] = &["num_rounds", "max_depth", "random_state"];
const FIL_OPTIONS: &[&str] = &[
    "num_rounds",
    "max_depth",
    "random_state",
    "fil_algo",
    "output_class",
    "threshold",
    "storage_type",
];

/// Train the binary or multi-class forest that both inference engines load.
///
/// `num_rounds` trees of depth at most `max_depth` are grown on the labelled
/// dataset.
pub fn train_classifier_model(dataset: &Dataset, params: &Params) -> Result<TreeModel> {
    let labels = dataset
        .labels
        .as_ref()
        .ok_or_else(|| anyhow!("tree model training requires labels"))?;
    let data = dataset.features.dense()?;
    ensure!(
        data.nrows() == labels.len(),
        "tree model training: {} rows but {} labels",
        data.nrows(),
        labels.len()
    );
    let num_rounds = params.get_usize("num_rounds", 10)?;
    ensure!(num_rounds > 0, "num_rounds must be positive");

    let config = ForestConfig {
        n_estimators: num_rounds,
        bootstrap: true,
        tree: TreeParams {
            max_depth: params.get_usize("max_depth", 10)?,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
        },
        seed: params.get_seed("random_state", 0)?,
    };
    let (classes, encoded) = crate::data::encode_classes(&labels.to_classes()?);
    let targets: Vec<f32> = encoded.iter().map(|&c| c as f32).collect();
    let task = TreeTask::Classification {
        n_classes: classes.len(),
    };
    let trees = config.grow_forest(ExecMode::Parallel, data, &targets, task);
    debug!(trees = trees.len(), classes = classes.len(), "trained tree model for inference");
    Ok(TreeModel {
        task,
        n_features: data.ncols(),
        classes,
        trees,
    })
}

/// Positive-class probability for binary models, the raw value for
/// regression models.
fn probability(model: &TreeModel, scores: &[f32]) -> Result<f32> {
    match model.task {
        TreeTask::Regression => Ok(scores[0]),
        TreeTask::Classification { n_classes: 2 } => Ok(scores[1]),
        TreeTask::Classification { n_classes: 1 } => Ok(0.0),
        TreeTask::Classification { n_classes } => {
            bail!("probability output needs a binary model, this one has {n_classes} classes")
        }
    }
}

/// Accelerated forest inference.
#[derive(Debug, Clone)]
pub struct ForestInference {
    algo: FilAlgo,
    storage: StorageType,
    output_class: bool,
    threshold: f32,
    model: Option<TreeModel>,
}

impl ForestInference {
    pub fn from_params(params: &Params) -> Result<Self> {
        params.ensure_known("ForestInference", FIL_OPTIONS)?;
        let threshold = params.get_f64("threshold", 0.5)? as f32;
        ensure!(
            (0.0..=1.0).contains(&threshold),
            "ForestInference: threshold must be in [0, 1]"
        );
        Ok(Self {
            algo: FilAlgo::parse(params.get_str("fil_algo", "AUTO")?)?,
            storage: StorageType::parse(params.get_str("storage_type", "AUTO")?)?,
            output_class: params.get_bool("output_class", false)?,
            threshold,
            model: None,
        })
    }

    pub fn algo(&self) -> FilAlgo {
        self.algo
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage
    }

    fn rows<'a>(&self, features: &'a Features) -> Result<Vec<&'a [f32]>> {
        match features {
            Features::Batch(batch) => Ok((0..batch.num_row()).map(|i| batch.row(i)).collect()),
            Features::Dense(dense) => dense
                .as_slice()
                .map(|values| values.chunks(dense.ncols().max(1)).collect())
                .ok_or_else(|| anyhow!("ForestInference expects row-major contiguous features")),
        }
    }

    /// Tree-major traversal over blocks of rows; identical results to the
    /// row-major path.
    fn score_batched(model: &TreeModel, rows: &[&[f32]]) -> Vec<Vec<f32>> {
        let chunks: Vec<&[&[f32]]> = rows.chunks(BATCH_ROWS).collect();
        let blocks = ExecMode::Parallel.map_indices(chunks.len(), |c| {
            let block = chunks[c];
            let width = match model.task {
                TreeTask::Classification { n_classes } => n_classes,
                TreeTask::Regression => 1,
            };
            let mut acc = vec![vec![0.0f32; width]; block.len()];
            for tree in &model.trees {
                for (row, out) in block.iter().zip(acc.iter_mut()) {
                    for (a, v) in out.iter_mut().zip(tree.leaf_for(row)) {
                        *a += v;
                    }
                }
            }
            let count = model.trees.len().max(1) as f32;
            acc.iter_mut()
                .for_each(|out| out.iter_mut().for_each(|a| *a /= count));
            acc
        });
        blocks.into_iter().flatten().collect()
    }
}

impl Estimator for ForestInference {
    fn name(&self) -> &'static str {
        "ForestInference"
    }

    fn mode(&self) -> ExecMode {
        ExecMode::Parallel
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn fit(&mut self, _features: &Features, _labels: Option<&Labels>) -> Result<()> {
        bail!("ForestInference does not train; load a model built during setup")
    }

    fn load_model(&mut self, model: TreeModel) -> Result<()> {
        debug!(trees = model.trees.len(), algo = ?self.algo, "ForestInference model loaded");
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let model = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        ensure!(
            features.ncols() == model.n_features,
            "ForestInference: model expects {} features, got {}",
            model.n_features,
            features.ncols()
        );
        let rows = self.rows(features)?;
        let scores = match self.algo {
            FilAlgo::Naive | FilAlgo::Auto => {
                ExecMode::Parallel.map_indices(rows.len(), |i| model.score_row(rows[i]))
            }
            FilAlgo::TreeReorg | FilAlgo::BatchTreeReorg => Self::score_batched(model, &rows),
        };

        if self.output_class {
            if let TreeTask::Classification { n_classes } = model.task {
                let predicted = scores
                    .iter()
                    .map(|s| {
                        if n_classes == 2 {
                            model.classes[usize::from(s[1] > self.threshold)]
                        } else {
                            model.classes[argmax(s)]
                        }
                    })
                    .collect::<Array1<i32>>();
                return Ok(Labels::Int(predicted));
            }
        }
        let values = scores
            .iter()
            .map(|s| probability(model, s))
            .collect::<Result<Array1<f32>>>()?;
        Ok(Labels::Float(values))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sequential runtime that scores [`crate::data::TreeBatch`] inputs and
/// returns positive-class probabilities.
#[cfg(feature = "tree-runtime")]
#[derive(Debug, Clone, Default)]
pub struct TreeRuntimePredictor {
    model: Option<TreeModel>,
}

#[cfg(feature = "tree-runtime")]
impl TreeRuntimePredictor {
    pub fn from_params(params: &Params) -> Result<Self> {
        params.ensure_known("TreeRuntimePredictor", TRAINING_OPTIONS)?;
        Ok(Self::default())
    }
}

#[cfg(feature = "tree-runtime")]
impl Estimator for TreeRuntimePredictor {
    fn name(&self) -> &'static str {
        "TreeRuntimePredictor"
    }

    fn mode(&self) -> ExecMode {
        ExecMode::Sequential
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn fit(&mut self, _features: &Features, _labels: Option<&Labels>) -> Result<()> {
        bail!("TreeRuntimePredictor does not train; load a model built during setup")
    }

    fn load_model(&mut self, model: TreeModel) -> Result<()> {
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let model = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let Features::Batch(batch) = features else {
            bail!("TreeRuntimePredictor expects a tree batch; convert dense features first");
        };
        ensure!(
            batch.num_col() == model.n_features,
            "TreeRuntimePredictor: model expects {} features, got {}",
            model.n_features,
            batch.num_col()
        );
        let values = (0..batch.num_row())
            .map(|i| probability(model, &model.score_row(batch.row(i))))
            .collect::<Result<Array1<f32>>>()?;
        Ok(Labels::Float(values))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
