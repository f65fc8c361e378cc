//! Linear models: least squares, ridge, elastic net / lasso, logistic
//! regression and mini-batch SGD classification.

use crate::data::{encode_classes, Features, Labels};
use crate::estimator::{ensure_same_rows, not_fitted, require_labels, Estimator, ExecMode};
use crate::params::Params;
use crate::utils::{argmax, column_means, gram_matrix, solve_linear_system};
use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, ArrayView2};
use std::any::Any;
use tracing::debug;

/// Coefficients of a fitted linear predictor `x · coef + intercept`.
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub coef: Array1<f64>,
    pub intercept: f64,
}

impl LinearFit {
    fn predict(&self, mode: ExecMode, data: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
        ensure!(
            data.ncols() == self.coef.len(),
            "expected {} features, got {}",
            self.coef.len(),
            data.ncols()
        );
        let values = mode.map_indices(data.nrows(), |i| {
            let dot: f64 = data
                .row(i)
                .iter()
                .zip(self.coef.iter())
                .map(|(&x, &w)| x as f64 * w)
                .sum();
            (dot + self.intercept) as f32
        });
        Ok(Array1::from(values))
    }
}

fn regression_target(name: &str, features: &Features, labels: Option<&Labels>) -> Result<Array1<f64>> {
    let labels = require_labels(name, labels)?;
    ensure_same_rows(name, features, labels)?;
    Ok(labels.to_f32().mapv(|v| v as f64))
}

/// Closed-form least squares with optional L2 penalty on the coefficients.
fn solve_normal_equations(
    mode: ExecMode,
    data: ArrayView2<'_, f32>,
    target: &Array1<f64>,
    alpha: f64,
    fit_intercept: bool,
) -> Result<LinearFit> {
    let x_mean = fit_intercept.then(|| column_means(data));
    let y_mean = if fit_intercept {
        target.mean().unwrap_or(0.0)
    } else {
        0.0
    };

    let mut gram = gram_matrix(mode, data, x_mean.as_ref());
    for i in 0..gram.nrows() {
        gram[(i, i)] += alpha;
    }
    let xty = Array1::from(mode.map_indices(data.ncols(), |j| {
        let mj = x_mean.as_ref().map_or(0.0, |m| m[j]);
        data.column(j)
            .iter()
            .zip(target.iter())
            .map(|(&x, &y)| (x as f64 - mj) * (y - y_mean))
            .sum::<f64>()
    }));

    let coef = solve_linear_system(gram, xty)?;
    let intercept = match &x_mean {
        Some(means) => y_mean - means.dot(&coef),
        None => 0.0,
    };
    Ok(LinearFit { coef, intercept })
}

#[derive(Debug, Clone)]
pub struct LinearRegression {
    mode: ExecMode,
    fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl LinearRegression {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("LinearRegression", &["fit_intercept"])?;
        Ok(Self {
            mode,
            fit_intercept: params.get_bool("fit_intercept", true)?,
            fitted: None,
        })
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

impl Estimator for LinearRegression {
    fn name(&self) -> &'static str {
        "LinearRegression"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let target = regression_target(self.name(), features, labels)?;
        self.fitted = Some(solve_normal_equations(
            self.mode,
            features.dense()?,
            &target,
            0.0,
            self.fit_intercept,
        )?);
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(Labels::Float(fitted.predict(self.mode, features.dense()?)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct Ridge {
    mode: ExecMode,
    alpha: f64,
    fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Ridge {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("Ridge", &["alpha", "fit_intercept", "solver"])?;
        params.get_choice("solver", "auto", &["auto", "cholesky", "eig"])?;
        let alpha = params.get_f64("alpha", 1.0)?;
        ensure!(alpha >= 0.0, "Ridge: alpha must be non-negative");
        Ok(Self {
            mode,
            alpha,
            fit_intercept: params.get_bool("fit_intercept", true)?,
            fitted: None,
        })
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }
}

impl Estimator for Ridge {
    fn name(&self) -> &'static str {
        "Ridge"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let target = regression_target(self.name(), features, labels)?;
        self.fitted = Some(solve_normal_equations(
            self.mode,
            features.dense()?,
            &target,
            self.alpha,
            self.fit_intercept,
        )?);
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(Labels::Float(fitted.predict(self.mode, features.dense()?)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Elastic-net regression by cyclic coordinate descent. `Lasso` is the
/// same model with `l1_ratio` pinned to one.
#[derive(Debug, Clone)]
pub struct ElasticNet {
    mode: ExecMode,
    name: &'static str,
    alpha: f64,
    l1_ratio: f64,
    max_iter: usize,
    tol: f64,
    fit_intercept: bool,
    fitted: Option<LinearFit>,
    n_iter: usize,
}

impl ElasticNet {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known(
            "ElasticNet",
            &["alpha", "l1_ratio", "max_iter", "tol", "fit_intercept", "selection"],
        )?;
        let l1_ratio = params.get_f64("l1_ratio", 0.5)?;
        Self::build(mode, "ElasticNet", params, l1_ratio)
    }

    pub fn lasso_from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("Lasso", &["alpha", "max_iter", "tol", "fit_intercept", "selection"])?;
        Self::build(mode, "Lasso", params, 1.0)
    }

    fn build(mode: ExecMode, name: &'static str, params: &Params, l1_ratio: f64) -> Result<Self> {
        params.get_choice("selection", "cyclic", &["cyclic"])?;
        let alpha = params.get_f64("alpha", 1.0)?;
        ensure!(alpha >= 0.0, "{name}: alpha must be non-negative");
        ensure!((0.0..=1.0).contains(&l1_ratio), "{name}: l1_ratio must be in [0, 1]");
        Ok(Self {
            mode,
            name,
            alpha,
            l1_ratio,
            max_iter: params.get_usize("max_iter", 1000)?.max(1),
            tol: params.get_f64("tol", 1e-4)?,
            fit_intercept: params.get_bool("fit_intercept", true)?,
            fitted: None,
            n_iter: 0,
        })
    }

    pub fn coefficients(&self) -> Option<&LinearFit> {
        self.fitted.as_ref()
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

impl Estimator for ElasticNet {
    fn name(&self) -> &'static str {
        self.name
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let target = regression_target(self.name, features, labels)?;
        let data = features.dense()?;
        let n = data.nrows() as f64;
        ensure!(data.nrows() > 0, "{}: cannot fit on an empty dataset", self.name);

        let x_mean = self.fit_intercept.then(|| column_means(data));
        let y_mean = if self.fit_intercept {
            target.mean().unwrap_or(0.0)
        } else {
            0.0
        };
        let columns: Vec<Vec<f64>> = self.mode.map_indices(data.ncols(), |j| {
            let mj = x_mean.as_ref().map_or(0.0, |m| m[j]);
            data.column(j).iter().map(|&x| x as f64 - mj).collect()
        });
        let norms: Vec<f64> = self
            .mode
            .map_indices(columns.len(), |j| columns[j].iter().map(|x| x * x).sum::<f64>() / n);

        let l1 = self.alpha * self.l1_ratio;
        let l2 = self.alpha * (1.0 - self.l1_ratio);
        let mut coef = vec![0.0f64; columns.len()];
        let mut residual: Vec<f64> = target.iter().map(|y| y - y_mean).collect();

        self.n_iter = self.max_iter;
        for iter in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            let mut max_coef = 0.0f64;
            for (j, column) in columns.iter().enumerate() {
                if norms[j] == 0.0 {
                    continue;
                }
                let old = coef[j];
                let rho = column
                    .iter()
                    .zip(residual.iter())
                    .map(|(x, r)| x * (r + x * old))
                    .sum::<f64>()
                    / n;
                let updated = soft_threshold(rho, l1) / (norms[j] + l2);
                if updated != old {
                    let delta = updated - old;
                    for (r, x) in residual.iter_mut().zip(column.iter()) {
                        *r -= x * delta;
                    }
                    coef[j] = updated;
                }
                max_delta = max_delta.max((updated - old).abs());
                max_coef = max_coef.max(updated.abs());
            }
            if max_delta <= self.tol * max_coef.max(1e-12) || max_delta == 0.0 {
                self.n_iter = iter + 1;
                break;
            }
        }

        let coef = Array1::from(coef);
        let intercept = match &x_mean {
            Some(means) => y_mean - means.dot(&coef),
            None => 0.0,
        };
        debug!(model = self.name, n_iter = self.n_iter, "coordinate descent finished");
        self.fitted = Some(LinearFit { coef, intercept });
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name))?;
        Ok(Labels::Float(fitted.predict(self.mode, features.dense()?)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Multinomial logistic regression with an L2 penalty of strength `1 / C`,
/// trained by full-batch gradient descent with a Lipschitz step size.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    mode: ExecMode,
    c: f64,
    max_iter: usize,
    tol: f64,
    fit_intercept: bool,
    classes: Vec<i32>,
    weights: Option<Array2<f64>>,
    bias: Array1<f64>,
}

impl LogisticRegression {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known(
            "LogisticRegression",
            &["solver", "C", "max_iter", "tol", "fit_intercept", "penalty"],
        )?;
        params.get_choice("solver", "lbfgs", &["lbfgs", "qn"])?;
        params.get_choice("penalty", "l2", &["l2"])?;
        let c = params.get_f64("C", 1.0)?;
        ensure!(c > 0.0, "LogisticRegression: C must be positive");
        Ok(Self {
            mode,
            c,
            max_iter: params.get_usize("max_iter", 100)?.max(1),
            tol: params.get_f64("tol", 1e-4)?,
            fit_intercept: params.get_bool("fit_intercept", true)?,
            classes: Vec::new(),
            weights: None,
            bias: Array1::zeros(0),
        })
    }

    pub fn classes(&self) -> &[i32] {
        &self.classes
    }

    /// Per-class probabilities, one row per sample.
    pub fn predict_proba(&self, features: &Features) -> Result<Array2<f32>> {
        let weights = self.weights.as_ref().ok_or_else(|| not_fitted("LogisticRegression"))?;
        let data = features.dense()?;
        ensure!(
            data.ncols() == weights.ncols(),
            "LogisticRegression: expected {} features, got {}",
            weights.ncols(),
            data.ncols()
        );
        let probs = softmax_rows(self.mode, data, weights, &self.bias);
        let k = weights.nrows();
        Ok(Array2::from_shape_fn((data.nrows(), k), |(i, c)| probs[i][c] as f32))
    }
}

fn softmax_rows(mode: ExecMode, data: ArrayView2<'_, f32>, weights: &Array2<f64>, bias: &Array1<f64>) -> Vec<Vec<f64>> {
    mode.map_indices(data.nrows(), |i| {
        let row = data.row(i);
        let logits: Vec<f64> = weights
            .outer_iter()
            .zip(bias.iter())
            .map(|(w, b)| row.iter().zip(w.iter()).map(|(&x, w)| x as f64 * w).sum::<f64>() + b)
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|z| (z - max).exp()).collect();
        let sum: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / sum).collect()
    })
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &'static str {
        "LogisticRegression"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let labels = require_labels(self.name(), labels)?;
        ensure_same_rows(self.name(), features, labels)?;
        let data = features.dense()?;
        let (classes, encoded) = encode_classes(&labels.to_classes()?);
        ensure!(
            classes.len() >= 2,
            "LogisticRegression needs samples of at least 2 classes, got {}",
            classes.len()
        );

        let (n, d, k) = (data.nrows(), data.ncols(), classes.len());
        let lambda = 1.0 / (self.c * n as f64);
        let max_sq_norm = data
            .outer_iter()
            .map(|row| row.iter().map(|&x| (x as f64).powi(2)).sum::<f64>())
            .fold(0.0, f64::max);
        let intercept_term = if self.fit_intercept { 1.0 } else { 0.0 };
        let step = 1.0 / (0.5 * (max_sq_norm + intercept_term) + lambda);

        let mut weights = Array2::<f64>::zeros((k, d));
        let mut bias = Array1::<f64>::zeros(k);
        let mut n_iter = self.max_iter;

        for iter in 0..self.max_iter {
            let probs = softmax_rows(self.mode, data, &weights, &bias);
            let gradients = self.mode.map_indices(k, |c| {
                let mut grad_w = vec![0.0f64; d];
                let mut grad_b = 0.0f64;
                for (i, row) in data.outer_iter().enumerate() {
                    let residual = probs[i][c] - if encoded[i] == c { 1.0 } else { 0.0 };
                    for (g, &x) in grad_w.iter_mut().zip(row.iter()) {
                        *g += residual * x as f64;
                    }
                    grad_b += residual;
                }
                for (g, w) in grad_w.iter_mut().zip(weights.row(c).iter()) {
                    *g = *g / n as f64 + lambda * w;
                }
                (grad_w, grad_b / n as f64)
            });

            let mut max_grad = 0.0f64;
            for (c, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                for (j, g) in grad_w.into_iter().enumerate() {
                    weights[(c, j)] -= step * g;
                    max_grad = max_grad.max(g.abs());
                }
                if self.fit_intercept {
                    bias[c] -= step * grad_b;
                    max_grad = max_grad.max(grad_b.abs());
                }
            }
            if max_grad < self.tol {
                n_iter = iter + 1;
                break;
            }
        }

        debug!(n_iter, classes = k, "logistic regression finished");
        self.classes = classes;
        self.weights = Some(weights);
        self.bias = bias;
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let probs = self.predict_proba(features)?;
        let labels = probs
            .outer_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect();
        Ok(Labels::Int(labels))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgdLoss {
    Hinge,
    Log,
    Squared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SgdPenalty {
    None,
    L1,
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningRate {
    Constant,
    InvScaling,
}

/// Binary linear classifier trained with mini-batch stochastic gradient
/// descent. Only an accelerated implementation exists.
#[derive(Debug, Clone)]
pub struct MbsgdClassifier {
    mode: ExecMode,
    loss: SgdLoss,
    penalty: SgdPenalty,
    alpha: f64,
    eta0: f64,
    power_t: f64,
    learning_rate: LearningRate,
    epochs: usize,
    batch_size: usize,
    fit_intercept: bool,
    shuffle: bool,
    tol: f64,
    n_iter_no_change: usize,
    seed: u64,
    classes: Vec<i32>,
    coef: Option<Array1<f64>>,
    intercept: f64,
    epochs_run: usize,
}

const MBSGD_OPTIONS: &[&str] = &[
    "loss",
    "penalty",
    "alpha",
    "eta0",
    "power_t",
    "learning_rate",
    "epochs",
    "batch_size",
    "fit_intercept",
    "shuffle",
    "tol",
    "n_iter_no_change",
    "random_state",
];

impl MbsgdClassifier {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("MBSGDClassifier", MBSGD_OPTIONS)?;
        let loss = match params.get_choice("loss", "hinge", &["hinge", "log", "squared_loss"])? {
            "hinge" => SgdLoss::Hinge,
            "log" => SgdLoss::Log,
            _ => SgdLoss::Squared,
        };
        let penalty = match params.get_choice("penalty", "l2", &["none", "l1", "l2"])? {
            "none" => SgdPenalty::None,
            "l1" => SgdPenalty::L1,
            _ => SgdPenalty::L2,
        };
        let learning_rate = match params.get_choice("learning_rate", "constant", &["constant", "invscaling"])? {
            "constant" => LearningRate::Constant,
            _ => LearningRate::InvScaling,
        };
        let eta0 = params.get_f64("eta0", 0.001)?;
        ensure!(eta0 > 0.0, "MBSGDClassifier: eta0 must be positive");
        Ok(Self {
            mode,
            loss,
            penalty,
            alpha: params.get_f64("alpha", 1e-4)?,
            eta0,
            power_t: params.get_f64("power_t", 0.5)?,
            learning_rate,
            epochs: params.get_usize("epochs", 1000)?.max(1),
            batch_size: params.get_usize("batch_size", 32)?.max(1),
            fit_intercept: params.get_bool("fit_intercept", true)?,
            shuffle: params.get_bool("shuffle", true)?,
            tol: params.get_f64("tol", 1e-3)?,
            n_iter_no_change: params.get_usize("n_iter_no_change", 5)?.max(1),
            seed: params.get_seed("random_state", 0)?,
            classes: Vec::new(),
            coef: None,
            intercept: 0.0,
            epochs_run: 0,
        })
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    /// d(loss)/d(score) and the loss value for one sample.
    fn loss_gradient(&self, score: f64, y: f64) -> (f64, f64) {
        match self.loss {
            SgdLoss::Hinge => {
                let margin = y * score;
                if margin < 1.0 {
                    (-y, 1.0 - margin)
                } else {
                    (0.0, 0.0)
                }
            }
            SgdLoss::Log => {
                let margin = y * score;
                (-y / (1.0 + margin.exp()), (1.0 + (-margin).exp()).ln())
            }
            SgdLoss::Squared => (score - y, 0.5 * (score - y).powi(2)),
        }
    }
}

impl Estimator for MbsgdClassifier {
    fn name(&self) -> &'static str {
        "MBSGDClassifier"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.coef.is_some()
    }

    fn fit(&mut self, features: &Features, labels: Option<&Labels>) -> Result<()> {
        let labels = require_labels(self.name(), labels)?;
        ensure_same_rows(self.name(), features, labels)?;
        let data = features.dense()?;
        let (classes, encoded) = encode_classes(&labels.to_classes()?);
        ensure!(
            classes.len() == 2,
            "MBSGDClassifier supports binary targets only, got {} classes",
            classes.len()
        );
        let targets: Vec<f64> = encoded.iter().map(|&c| if c == 1 { 1.0 } else { -1.0 }).collect();

        let d = data.ncols();
        let mut coef = vec![0.0f64; d];
        let mut intercept = 0.0f64;
        let mut order: Vec<usize> = (0..data.nrows()).collect();
        let mut rng = fastrand::Rng::with_seed(self.seed);
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;
        let mut step_count = 0usize;
        self.epochs_run = self.epochs;

        for epoch in 0..self.epochs {
            if self.shuffle {
                rng.shuffle(&mut order);
            }
            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.batch_size) {
                step_count += 1;
                let eta = match self.learning_rate {
                    LearningRate::Constant => self.eta0,
                    LearningRate::InvScaling => self.eta0 / (step_count as f64).powf(self.power_t),
                };
                let contributions = self.mode.map_indices(batch.len(), |b| {
                    let i = batch[b];
                    let row = data.row(i);
                    let score = row
                        .iter()
                        .zip(coef.iter())
                        .map(|(&x, w)| x as f64 * w)
                        .sum::<f64>()
                        + intercept;
                    self.loss_gradient(score, targets[i])
                });

                let mut grad = vec![0.0f64; d];
                let mut grad_b = 0.0;
                for (b, (dloss, loss)) in contributions.iter().enumerate() {
                    epoch_loss += loss;
                    if *dloss == 0.0 {
                        continue;
                    }
                    for (g, &x) in grad.iter_mut().zip(data.row(batch[b]).iter()) {
                        *g += dloss * x as f64;
                    }
                    grad_b += dloss;
                }
                let scale = 1.0 / batch.len() as f64;
                for (w, g) in coef.iter_mut().zip(grad.iter()) {
                    let reg = match self.penalty {
                        SgdPenalty::None => 0.0,
                        SgdPenalty::L2 => self.alpha * *w,
                        SgdPenalty::L1 => self.alpha * w.signum(),
                    };
                    *w -= eta * (g * scale + reg);
                }
                if self.fit_intercept {
                    intercept -= eta * grad_b * scale;
                }
            }

            let mean_loss = epoch_loss / data.nrows().max(1) as f64;
            if mean_loss > best_loss - self.tol {
                stale_epochs += 1;
                if stale_epochs >= self.n_iter_no_change {
                    self.epochs_run = epoch + 1;
                    break;
                }
            } else {
                stale_epochs = 0;
            }
            best_loss = best_loss.min(mean_loss);
        }

        debug!(epochs = self.epochs_run, "mbsgd finished");
        self.classes = classes;
        self.coef = Some(Array1::from(coef));
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, features: &Features) -> Result<Labels> {
        let coef = self.coef.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let fit = LinearFit {
            coef: coef.clone(),
            intercept: self.intercept,
        };
        let scores = fit.predict(self.mode, features.dense()?)?;
        let labels = scores
            .iter()
            .map(|&s| if s > 0.0 { self.classes[1] } else { self.classes[0] })
            .collect();
        Ok(Labels::Int(labels))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::accuracy_score;
    use approx::assert_abs_diff_eq;

    fn linear_data() -> (Features, Labels) {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 13) % 17) as f32 / 4.0);
        let y = x
            .outer_iter()
            .map(|row| 2.0 * row[0] - 1.0 * row[1] + 0.5 * row[2] + 3.0)
            .collect();
        (Features::Dense(x), Labels::Float(y))
    }

    fn separable_data() -> (Features, Labels) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            let base = if i < 20 { -2.0 } else { 2.0 };
            base + ((i * 3 + j * 5) % 7) as f32 * 0.1
        });
        let y = (0..40).map(|i| if i < 20 { 0 } else { 1 }).collect();
        (Features::Dense(x), Labels::Int(y))
    }

    #[test]
    fn least_squares_recovers_exact_coefficients() {
        let (x, y) = linear_data();
        let mut model = LinearRegression::from_params(ExecMode::Parallel, &Params::new()).unwrap();
        model.fit(&x, Some(&y)).unwrap();
        let fit = model.coefficients().unwrap();
        assert_abs_diff_eq!(fit.coef[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.coef[1], -1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.intercept, 3.0, epsilon = 1e-3);
    }

    #[test]
    fn ridge_shrinks_towards_zero() {
        let (x, y) = linear_data();
        let mut ols = LinearRegression::from_params(ExecMode::Sequential, &Params::new()).unwrap();
        let mut ridge =
            Ridge::from_params(ExecMode::Sequential, &Params::new().with("alpha", 100.0)).unwrap();
        ols.fit(&x, Some(&y)).unwrap();
        ridge.fit(&x, Some(&y)).unwrap();
        let ols_norm = ols.coefficients().unwrap().coef.mapv(f64::abs).sum();
        let ridge_norm = ridge.coefficients().unwrap().coef.mapv(f64::abs).sum();
        assert!(ridge_norm < ols_norm);
    }

    #[test]
    fn lasso_zeroes_coefficients_under_strong_penalty() {
        let (x, y) = linear_data();
        let params = Params::new().with("alpha", 100.0);
        let mut lasso = ElasticNet::lasso_from_params(ExecMode::Parallel, &params).unwrap();
        lasso.fit(&x, Some(&y)).unwrap();
        assert!(lasso.coefficients().unwrap().coef.iter().all(|c| *c == 0.0));
        assert_eq!(lasso.name(), "Lasso");
    }

    #[test]
    fn lasso_rejects_l1_ratio() {
        let params = Params::new().with("l1_ratio", 0.3);
        assert!(ElasticNet::lasso_from_params(ExecMode::Parallel, &params).is_err());
        assert!(ElasticNet::from_params(ExecMode::Parallel, &params).is_ok());
    }

    #[test]
    fn elastic_net_fits_with_small_penalty() {
        let (x, y) = linear_data();
        let params = Params::new().with("alpha", 0.001).with("l1_ratio", 0.5);
        let mut model = ElasticNet::from_params(ExecMode::Sequential, &params).unwrap();
        model.fit(&x, Some(&y)).unwrap();
        let predictions = model.predict(&x).unwrap().to_f32();
        let truth = y.to_f32();
        let max_err = predictions
            .iter()
            .zip(truth.iter())
            .map(|(p, t)| (p - t).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 0.1, "max error {max_err}");
    }

    #[test]
    fn logistic_regression_separates_classes() {
        let (x, y) = separable_data();
        let mut model =
            LogisticRegression::from_params(ExecMode::Parallel, &Params::new().with("solver", "lbfgs"))
                .unwrap();
        model.fit(&x, Some(&y)).unwrap();
        let predictions = model.predict(&x).unwrap();
        assert_eq!(accuracy_score(&y, &predictions).unwrap(), 1.0);
    }

    #[test]
    fn logistic_regression_rejects_continuous_targets() {
        let (x, y) = linear_data();
        let mut model = LogisticRegression::from_params(ExecMode::Parallel, &Params::new()).unwrap();
        assert!(model.fit(&x, Some(&y)).is_err());
    }

    #[test]
    fn mbsgd_learns_separable_problem() {
        let (x, y) = separable_data();
        let params = Params::new().with("eta0", 0.005).with("epochs", 100);
        let mut model = MbsgdClassifier::from_params(ExecMode::Parallel, &params).unwrap();
        model.fit(&x, Some(&y)).unwrap();
        let predictions = model.predict(&x).unwrap();
        assert!(accuracy_score(&y, &predictions).unwrap() >= 0.95);
    }

    #[test]
    fn fit_without_labels_fails() {
        let (x, _) = linear_data();
        let mut model = Ridge::from_params(ExecMode::Parallel, &Params::new()).unwrap();
        assert!(model.fit(&x, None).is_err());
    }
}
