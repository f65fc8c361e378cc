//! Gaussian random projection.

use crate::data::{Features, Labels};
use crate::estimator::{not_fitted, Estimator, ExecMode};
use crate::params::{ParamValue, Params};
use anyhow::{bail, ensure, Result};
use ndarray::Array2;
use std::any::Any;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetDimension {
    Auto,
    Fixed(usize),
}

/// Minimum embedding dimension that keeps pairwise distances within
/// `(1 ± eps)` for `n_samples` points (Johnson–Lindenstrauss bound).
pub fn johnson_lindenstrauss_min_dim(n_samples: usize, eps: f64) -> usize {
    let denominator = eps.powi(2) / 2.0 - eps.powi(3) / 3.0;
    (4.0 * (n_samples.max(1) as f64).ln() / denominator) as usize
}

#[derive(Debug, Clone)]
pub struct GaussianRandomProjection {
    mode: ExecMode,
    target: TargetDimension,
    eps: f64,
    seed: u64,
    components: Option<Array2<f32>>,
}

const GRP_OPTIONS: &[&str] = &["n_components", "eps", "random_state"];

impl GaussianRandomProjection {
    pub fn from_params(mode: ExecMode, params: &Params) -> Result<Self> {
        params.ensure_known("GaussianRandomProjection", GRP_OPTIONS)?;
        let target = match params.get("n_components") {
            None => TargetDimension::Auto,
            Some(ParamValue::Str(s)) if s == "auto" => TargetDimension::Auto,
            Some(ParamValue::Int(n)) if *n > 0 => TargetDimension::Fixed(*n as usize),
            Some(other) => bail!("GaussianRandomProjection: invalid n_components {other:?}"),
        };
        let eps = params.get_f64("eps", 0.1)?;
        ensure!(eps > 0.0 && eps < 1.0, "GaussianRandomProjection: eps must be in (0, 1)");
        Ok(Self {
            mode,
            target,
            eps,
            seed: params.get_seed("random_state", 0)?,
            components: None,
        })
    }

    /// Projection matrix, one row per output component.
    pub fn components(&self) -> Option<&Array2<f32>> {
        self.components.as_ref()
    }
}

impl Estimator for GaussianRandomProjection {
    fn name(&self) -> &'static str {
        "GaussianRandomProjection"
    }

    fn mode(&self) -> ExecMode {
        self.mode
    }

    fn is_fitted(&self) -> bool {
        self.components.is_some()
    }

    fn fit(&mut self, features: &Features, _labels: Option<&Labels>) -> Result<()> {
        let (n_samples, n_features) = (features.nrows(), features.ncols());
        let n_components = match self.target {
            TargetDimension::Fixed(n) => n,
            TargetDimension::Auto => {
                let bound = johnson_lindenstrauss_min_dim(n_samples, self.eps);
                if bound > n_features {
                    warn!(
                        bound,
                        n_features, "JL bound exceeds feature count; projecting to n_features"
                    );
                    n_features
                } else {
                    bound.max(1)
                }
            }
        };

        let std = 1.0 / (n_components as f32).sqrt();
        let seed = self.seed;
        // One RNG stream per output component keeps both modes identical.
        let rows = self.mode.map_indices(n_components, |c| {
            let mut rng = fastrand::Rng::with_seed(seed.wrapping_add(c as u64));
            (0..n_features)
                .map(|_| standard_normal(&mut rng) * std)
                .collect::<Vec<f32>>()
        });
        self.components = Some(Array2::from_shape_fn((n_components, n_features), |(i, j)| {
            rows[i][j]
        }));
        Ok(())
    }

    fn transform(&self, features: &Features) -> Result<Array2<f32>> {
        let components = self.components.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let data = features.dense()?;
        ensure!(
            data.ncols() == components.ncols(),
            "GaussianRandomProjection: expected {} features, got {}",
            components.ncols(),
            data.ncols()
        );
        let rows = self.mode.map_indices(data.nrows(), |i| components.dot(&data.row(i)));
        Ok(Array2::from_shape_fn((data.nrows(), components.nrows()), |(i, c)| rows[i][c]))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Box–Muller sample from N(0, 1).
pub fn standard_normal(rng: &mut fastrand::Rng) -> f32 {
    let u1 = rng.f32().max(f32::MIN_POSITIVE);
    let u2 = rng.f32();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jl_bound_matches_known_value() {
        // 4 ln(1000) / (0.005 - 0.000333...) ≈ 5920
        assert_eq!(johnson_lindenstrauss_min_dim(1000, 0.1), 5920);
    }

    #[test]
    fn auto_dimension_falls_back_to_feature_count() {
        let params = Params::new().with("n_components", "auto");
        let mut grp = GaussianRandomProjection::from_params(ExecMode::Parallel, &params).unwrap();
        let data = Array2::from_shape_fn((30, 12), |(i, j)| (i * j) as f32);
        let out = grp.fit_transform(&Features::Dense(data), None).unwrap();
        assert_eq!(out.dim(), (30, 12));
    }

    #[test]
    fn fixed_dimension_is_honored_and_modes_agree() {
        let params = Params::new().with("n_components", 4).with("random_state", 9);
        let data = Features::Dense(Array2::from_shape_fn((10, 8), |(i, j)| (i + j) as f32));
        let mut seq = GaussianRandomProjection::from_params(ExecMode::Sequential, &params).unwrap();
        let mut par = GaussianRandomProjection::from_params(ExecMode::Parallel, &params).unwrap();
        let a = seq.fit_transform(&data, None).unwrap();
        let b = par.fit_transform(&data, None).unwrap();
        assert_eq!(a.dim(), (10, 4));
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_positive_dimension() {
        let params = Params::new().with("n_components", 0);
        assert!(GaussianRandomProjection::from_params(ExecMode::Sequential, &params).is_err());
    }
}
