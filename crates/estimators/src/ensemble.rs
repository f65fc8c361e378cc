//! Random forests built from CART trees.
//!
//! Trees are grown independently from bootstrap samples, one rayon task per
//! tree in the accelerated backend. A trained forest can be exported as a
//! [`TreeModel`], the node-array format consumed by the forest inference
//! engines.

use crate::data::{encode_classes, Features, Labels};
use crate::estimator::{ensure_same_rows, not_fitted, require_labels, Estimator, ExecMode};
use crate::params::{ParamValue, Params};
use crate::utils::argmax;
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    /// Class distribution for classifiers, a single mean for regressors.
    Leaf { value: Vec<f32> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    pub fn leaf_for(&self, row: &[f32]) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[TreeNode], index: usize) -> usize {
            match &nodes[index] {
                TreeNode::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                TreeNode::Leaf { .. } => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeTask {
    Classification { n_classes: usize },
    Regression,
}

/// Trained tree ensemble, independent of the estimator that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeModel {
    pub task: TreeTask,
    pub n_features: usize,
    pub classes: Vec<i32>,
    pub trees: Vec<Tree>,
}

impl TreeModel {
    /// Averaged leaf values for one row.
    pub fn score_row(&self, row: &[f32]) -> Vec<f32> {
        let width = match self.task {
            TreeTask::Classification { n_classes } => n_classes,
            TreeTask::Regression => 1,
        };
        let mut acc = vec![0.0f32; width];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.leaf_for(row)) {
                *a += v;
            }
        }
        let count = self.trees.len().max(1) as f32;
        acc.iter_mut().for_each(|a| *a /= count);
        acc
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features considered at every split.
    pub max_features: f64,
}

struct TreeBuilder<'a> {
    data: ArrayView2<'a, f32>,
    task: TreeTask,
    /// Encoded class index (classification) or target value (regression).
    targets: &'a [f32],
    params: TreeParams,
    rng: fastrand::Rng,
    nodes: Vec<TreeNode>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_value(&self, samples: &[usize]) -> Vec<f32> {
        match self.task {
            TreeTask::Classification { n_classes } => {
                let mut counts = vec![0.0f32; n_classes];
                for &s in samples {
                    counts[self.targets[s] as usize] += 1.0;
                }
                let total = samples.len().max(1) as f32;
                counts.iter_mut().for_each(|c| *c /= total);
                counts
            }
            TreeTask::Regression => {
                let sum: f32 = samples.iter().map(|&s| self.targets[s]).sum();
                vec![sum / samples.len().max(1) as f32]
            }
        }
    }

    fn impurity_stats(&self) -> ImpurityStats {
        match self.task {
            TreeTask::Classification { n_classes } => ImpurityStats::Gini(vec![0.0; n_classes]),
            TreeTask::Regression => ImpurityStats::Variance { sum: 0.0, sum_sq: 0.0 },
        }
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<(usize, f32, f64)> {
        let n_features = self.data.ncols();
        let n_try = ((self.params.max_features * n_features as f64).ceil() as usize).clamp(1, n_features);
        let mut features: Vec<usize> = (0..n_features).collect();
        self.rng.shuffle(&mut features);
        features.truncate(n_try);

        let mut total = self.impurity_stats();
        for &s in samples {
            total.add(self.targets[s]);
        }
        let parent = total.impurity(samples.len());

        let mut best: Option<(usize, f32, f64)> = None;
        let mut order = samples.to_vec();
        for &feature in &features {
            order.sort_by(|&a, &b| self.data[(a, feature)].total_cmp(&self.data[(b, feature)]));
            let mut left = self.impurity_stats();
            let mut right = total.clone();
            for split in 1..order.len() {
                let moved = self.targets[order[split - 1]];
                left.add(moved);
                right.remove(moved);
                let lo = self.data[(order[split - 1], feature)];
                let hi = self.data[(order[split], feature)];
                if lo == hi
                    || split < self.params.min_samples_leaf
                    || order.len() - split < self.params.min_samples_leaf
                {
                    continue;
                }
                let n = order.len() as f64;
                let weighted = (split as f64 / n) * left.impurity(split)
                    + ((order.len() - split) as f64 / n) * right.impurity(order.len() - split);
                let gain = parent - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, lo + (hi - lo) / 2.0, gain));
                }
            }
        }
        best
    }

    fn grow(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: Vec::new() });

        let split = if depth < self.params.max_depth && samples.len() >= self.params.min_samples_split {
            self.best_split(&samples)
        } else {
            None
        };

        match split {
            Some((feature, threshold, _)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = samples
                    .iter()
                    .partition(|&&s| self.data[(s, feature)] <= threshold);
                let left_index = self.grow(left, depth + 1);
                let right_index = self.grow(right, depth + 1);
                self.nodes[index] = TreeNode::Split {
                    feature,
                    threshold,
                    left: left_index,
                    right: right_index,
                };
            }
            None => {
                self.nodes[index] = TreeNode::Leaf {
                    value: self.leaf_value(&samples),
                };
            }
        }
        index
    }
}

#[derive(Debug, Clone)]
enum ImpurityStats {
    Gini(Vec<f64>),
    Variance { sum: f64, sum_sq: f64 },
}

impl ImpurityStats {
    fn add(&mut self, target: f32) {
        match self {
            ImpurityStats::Gini(counts) => counts[target as usize] += 1.0,
            ImpurityStats::Variance { sum, sum_sq } => {
                *sum += target as f64;
                *sum_sq += (target as f64).powi(2);
            }
        }
    }

    fn remove(&mut self, target: f32) {
        match self {
            ImpurityStats::Gini(counts) => counts[target as usize] -= 1.0,
            ImpurityStats::Variance { sum, sum_sq } => {
                *sum -= target as f64;
                *sum_sq -= (target as f64).powi(2);
            }
        }
    }

    fn impurity(&self, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        match self {
            ImpurityStats::Gini(counts) => 1.0 - counts.iter().map(|c| (c / n).powi(2)).sum::<f64>(),
            ImpurityStats::Variance { sum, sum_sq } => (sum_sq / n - (sum / n).powi(2)).max(0.0),
        }
    }
}

/// Options shared by both forest flavours.
#[derive(Debug, Clone, Copy)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub bootstrap: bool,
    pub tree: TreeParams,
    pub seed: u64,
}

const FOREST_OPTIONS: &[&str] = &[
    "n_estimators",
    "max_depth",
    "max_features",
    "min_samples_split",
    "min_samples_leaf",
    "bootstrap",
    "random_state",
];

impl ForestConfig {
    pub fn from_params(name: &str, params: &Params) -> Result<Self> {
        params.ensure_known(name, FOREST_OPTIONS)?;
        let max_features = match params.get("max_features") {
            None => 1.0,
            Some(ParamValue::Float(f)) if *f > 0.0 && *f <= 1.0 => *f,
            Some(ParamValue::Int(1)) => 1.0,
            Some(ParamValue::Str(s)) if s == "sqrt" => -1.0,
            Some(other) => bail!("{name}: unsupported max_features {other:?}"),
        };
        let n_estimators = params.get_usize("n_estimators", 100)?;
        ensure!(n_estimators > 0, "{name}: n_estimators must be positive");
        Ok(Self {
            n_estimators,
            bootstrap: params.get_bool("bootstrap", true)?,
            tree: TreeParams {
                max_depth: params.get_usize("max_depth", 16)?,
                min_samples_split: params.get_usize("min_samples_split", 2)?.max(2),
                min_samples_leaf: params.get_usize("min_samples_leaf", 1)?.max(1),
                max_features,
            },
            seed: params.get_seed("random_state", 0)?,
        })
    }

    /// Grow `n_estimators` trees over `data`.
    pub fn grow_forest<'a>(&self, mode: ExecMode, data: ArrayView2<'a, f32>, targets: &'a [f32], task: TreeTask) -> Vec<Tree> {
        let n = data.nrows();
        let mut tree_params = self.tree;
        if tree_params.max_features < 0.0 {
            tree_params.max_features = (data.ncols() as f64).sqrt() / data.ncols().max(1) as f64;
        }
        mode.map_indices(self.n_estimators, |t| {
            let mut rng = fastrand::Rng::with_seed(self.seed.wrapping_mul(31).wrapping_add(t as u64));
            let samples: Vec<usize> = if self.bootstrap {
                (0..n).map(|_| rng.usize(..n)).collect()
            } else {
                (0..n).collect()
            };
            let mut builder = TreeBuilder {
                data,
                task,
                targets,
                params: tree_params,
                rng,
                nodes: Vec::new(),
            };
            builder.grow(samples, 0);
            Tree { nodes: builder.nodes }
        })
    }
}

fn score_rows(mode: ExecMode, model: &TreeModel, data: ArrayView2<'_, f32>) -> Result<Vec<Vec<f32>>> {
    ensure!(
        data.ncols() == model.n_features,
        "forest expects {} features, got {}",
        model.n_features,
        data.ncols()
    );
    Ok(mode.map_indices(data.nrows(), |i| model.score_row(&data.row(i).to_vec())))
}

#[derive(Debug, Clone)]
pub struct RandomForestClassifier {
    mode: ExecMode,
    config: ForestConfig,
    model: Option<TreeModel>,
}

impl RandomForestClassifier {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        Ok(Self {
            mode,
            config: ForestConfig::from_params("RandomForestClassifier", params)?,
            model: None,
        })
    }

    pub fn model(&self) -> Option<&TreeModel> {
        self.model.as_ref()
    }

    pub fn into_model(self) -> Option<TreeModel> {
        self.model
    }
}

impl Estimator for RandomForestClassifier {
    fn name(&self) -> &'static str {
        "RandomForestClassifier"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let labels = require_labels(self.name(), labels)?;
        ensure_same_rows(self.name(), features, labels)?;
        if matches!(labels, Labels::Float(_)) {
            bail!("RandomForestClassifier expects integer class labels; convert them before fitting");
        }
        let data = features.dense()?;
        ensure!(data.nrows() > 0, "RandomForestClassifier: cannot fit on an empty dataset");
        let (classes, encoded) = encode_classes(&labels.to_classes()?);
        let targets: Vec<f32> = encoded.iter().map(|&c| c as f32).collect();
        let task = TreeTask::Classification {
            n_classes: classes.len(),
        };
        let trees = self.config.grow_forest(self.mode, data, &targets, task);
        debug!(trees = trees.len(), classes = classes.len(), "random forest classifier grown");
        self.model = Some(TreeModel {
            task,
            n_features: data.ncols(),
            classes,
            trees,
        });
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let model = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let scores = score_rows(self.mode, model, features.dense()?)?;
        Ok(Labels::Int(
            scores.iter().map(|s| model.classes[argmax(s)]).collect(),
        ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    mode: ExecMode,
    config: ForestConfig,
    model: Option<TreeModel>,
}

impl RandomForestRegressor {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        Ok(Self {
            mode,
            config: ForestConfig::from_params("RandomForestRegressor", params)?,
            model: None,
        })
    }

    pub fn model(&self) -> Option<&TreeModel> {
        self.model.as_ref()
    }
}

impl Estimator for RandomForestRegressor {
    fn name(&self) -> &'static str {
        "RandomForestRegressor"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let labels = require_labels(self.name(), labels)?;
        ensure_same_rows(self.name(), features, labels)?;
        let data = features.dense()?;
        ensure!(data.nrows() > 0, "RandomForestRegressor: cannot fit on an empty dataset");
        let targets = labels.to_f32().to_vec();
        let trees = self
            .config
            .grow_forest(self.mode, data, &targets, TreeTask::Regression);
        self.model = Some(TreeModel {
            task: TreeTask::Regression,
            n_features: data.ncols(),
            classes: Vec::new(),
            trees,
        });
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let model = self.model.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let scores = score_rows(self.mode, model, features.dense()?)?;
        Ok(Labels::Float(scores.iter().map(|s| s[0]).collect::<Array1<f32>>()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
