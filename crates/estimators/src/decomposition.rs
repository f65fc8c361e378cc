//! Linear dimensionality reduction: PCA and truncated SVD.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::Params;
use crate::utils::{column_means, gram_matrix, top_eigenpairs};
use anyhow::{ensure, Result};
use ndarray::{Array1, Array2, Axis};
use std::any::Any;

const POWER_ITERATIONS: usize = 500;

/// Fitted projection shared by both decompositions.
#[derive(Debug, Clone)]
struct Projection {
    mean: Option<Array1<f64>>,
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

impl Projection {
    fn fit(mode: ExecMode, data: ndarray::ArrayView2<'_, f32>, n_components: usize, center: bool) -> Self {
        let mean = center.then(|| column_means(data));
        let gram = gram_matrix(mode, data, mean.as_ref());
        let (eigenvalues, components) = top_eigenpairs(&gram, n_components, POWER_ITERATIONS);
        let dof = (data.nrows().saturating_sub(1)).max(1) as f64;
        Self {
            mean,
            components,
            explained_variance: eigenvalues / dof,
        }
    }

    fn apply(&self, mode: ExecMode, data: ndarray::ArrayView2<'_, f32>) -> Array2<f32> {
        let k = self.components.nrows();
        let rows = mode.map_indices(data.nrows(), |i| {
            let row = data.row(i);
            (0..k)
                .map(|c| {
                    row.iter()
                        .enumerate()
                        .map(|(j, &v)| {
                            let centered = v as f64 - self.mean.as_ref().map_or(0.0, |m| m[j]);
                            centered * self.components[(c, j)]
                        })
                        .sum::<f64>() as f32
                })
                .collect::<Vec<f32>>()
        });
        Array2::from_shape_fn((data.nrows(), k), |(i, c)| rows[i][c])
    }
}

#[derive(Debug, Clone)]
pub struct Pca {
    mode: ExecMode,
    n_components: Option<usize>,
    whiten: bool,
    projection: Option<Projection>,
}

const PCA_OPTIONS: &[&str] = &["n_components", "whiten", "random_state"];

impl Pca {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("PCA", PCA_OPTIONS)?;
        Ok(Self {
            mode,
            n_components: params.get_opt_usize("n_components")?,
            whiten: params.get_bool("whiten", false)?,
            projection: None,
        })
    }

    pub fn components(&self) -> Option<Array2<f32>> {
        self.projection
            .as_ref()
            .map(|p| p.components.mapv(|v| v as f32))
    }

    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.projection.as_ref().map(|p| &p.explained_variance)
    }
}

impl Estimator for Pca {
    fn name(&self) -> &'static str {
        "PCA"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.projection.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        let limit = data.nrows().min(data.ncols());
        let n_components = self.n_components.unwrap_or(limit);
        ensure!(
            n_components >= 1 && n_components <= limit,
            "PCA: n_components={n_components} must be between 1 and min(n_samples, n_features)={limit}"
        );
        self.projection = Some(Projection::fit(self.mode, data, n_components, true));
        Ok(())
    }

    fn transform(&self, features: &Features) -> Result<Array2<f32>> {
        let projection = self.projection.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let mut projected = projection.apply(self.mode, features.dense()?);
        if self.whiten {
            for (mut column, variance) in projected
                .axis_iter_mut(Axis(1))
                .zip(projection.explained_variance.iter())
            {
                let scale = variance.sqrt().max(f64::EPSILON) as f32;
                column.mapv_inplace(|v| v / scale);
            }
        }
        Ok(projected)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    mode: ExecMode,
    n_components: usize,
    projection: Option<Projection>,
}

const TSVD_OPTIONS: &[&str] = &["n_components", "algorithm", "n_iter", "random_state"];

impl TruncatedSvd {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("TruncatedSVD", TSVD_OPTIONS)?;
        Ok(Self {
            mode,
            n_components: params.get_usize("n_components", 2)?,
            projection: None,
        })
    }

    /// Squared singular values divided by `n_samples - 1`.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.projection.as_ref().map(|p| &p.explained_variance)
    }
}

impl Estimator for TruncatedSvd {
    fn name(&self) -> &'static str {
        "TruncatedSVD"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.projection.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let data = features.dense()?;
        ensure!(
            self.n_components >= 1 && self.n_components <= data.ncols(),
            "TruncatedSVD: n_components={} must be between 1 and n_features={}",
            self.n_components,
            data.ncols()
        );
        self.projection = Some(Projection::fit(self.mode, data, self.n_components, false));
        Ok(())
    }

    fn transform(&self, features: &Features) -> Result<Array2<f32>> {
        let projection = self.projection.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(projection.apply(self.mode, features.dense()?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn line_data() -> Array2<f32> {
        // Points spread along (1, 1) with a little orthogonal noise.
        Array2::from_shape_fn((20, 2), |(i, j)| {
            let t = i as f32 - 10.0;
            let wobble = if i % 2 == 0 { 0.05 } else { -0.05 };
            if j == 0 {
                t + wobble
            } else {
                t - wobble
            }
        })
    }

    #[test]
    fn pca_finds_diagonal_direction() {
        let params = Params::new().with("n_components", 1);
        let mut pca = Pca::from_params(ExecMode::Parallel, &params).unwrap();
        pca.fit(&Features::Dense(line_data()), None).unwrap();
        let components = pca.components().unwrap();
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(components[(0, 0)].abs(), expected, epsilon = 1e-3);
        assert_abs_diff_eq!(components[(0, 1)].abs(), expected, epsilon = 1e-3);
    }

    #[test]
    fn pca_modes_agree() {
        let params = Params::new().with("n_components", 2);
        let data = Features::Dense(line_data());
        let mut seq = Pca::from_params(ExecMode::Sequential, &params).unwrap();
        let mut par = Pca::from_params(ExecMode::Parallel, &params).unwrap();
        let a = seq.fit_transform(&data, None).unwrap();
        let b = par.fit_transform(&data, None).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn pca_rejects_too_many_components() {
        let params = Params::new().with("n_components", 10);
        let mut pca = Pca::from_params(ExecMode::Sequential, &params).unwrap();
        assert!(pca.fit(&Features::Dense(line_data()), None).is_err());
    }

    #[test]
    fn tsvd_projects_to_requested_width() {
        let params = Params::new().with("n_components", 1);
        let mut svd = TruncatedSvd::from_params(ExecMode::Sequential, &params).unwrap();
        let out = svd.fit_transform(&Features::Dense(line_data()), None).unwrap();
        assert_eq!(out.dim(), (20, 1));
    }
}
