//! Run configuration for the benchmark driver.

use crate::datagen::DatasetKind;
use anyhow::{Context, Result};
use pairbench_estimators::Params;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOptions {
    pub n_rows: usize,
    pub n_cols: usize,
    pub warmup_runs: usize,
    pub runs: usize,
    pub seed: u64,
    /// Forces one dataset for every algorithm instead of picking one from
    /// the accuracy function.
    pub dataset: Option<DatasetKind>,
    /// Applied to both sides.
    pub params: Params,
    pub reference_params: Params,
    pub accelerated_params: Params,
    pub skip_reference: bool,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            n_rows: 1_000,
            n_cols: 20,
            warmup_runs: 1,
            runs: 3,
            seed: 0,
            dataset: None,
            params: Params::new(),
            reference_params: Params::new(),
            accelerated_params: Params::new(),
            skip_reference: false,
        }
    }
}

/// A benchmark run described in JSON. Every field is optional; missing
/// fields keep the [`BenchmarkOptions`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    /// Algorithm names; empty selects the whole registry.
    pub algorithms: Vec<String>,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    pub warmup: Option<usize>,
    pub runs: Option<usize>,
    pub seed: Option<u64>,
    pub dataset: Option<DatasetKind>,
    pub params: Params,
    pub reference_params: Params,
    pub accelerated_params: Params,
    pub skip_reference: bool,
    pub output: Option<PathBuf>,
    pub baseline: Option<PathBuf>,
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let blob = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_slice(&blob).with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_options(&self) -> BenchmarkOptions {
        let defaults = BenchmarkOptions::default();
        BenchmarkOptions {
            n_rows: self.rows.unwrap_or(defaults.n_rows),
            n_cols: self.cols.unwrap_or(defaults.n_cols),
            warmup_runs: self.warmup.unwrap_or(defaults.warmup_runs),
            runs: self.runs.unwrap_or(defaults.runs),
            seed: self.seed.unwrap_or(defaults.seed),
            dataset: self.dataset,
            params: self.params.clone(),
            reference_params: self.reference_params.clone(),
            accelerated_params: self.accelerated_params.clone(),
            skip_reference: self.skip_reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairbench_estimators::ParamValue;
    use std::io::Write;

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"algorithms": ["kmeans"], "rows": 250, "dataset": "blobs", "params": {{"n_clusters": 4}}}}"#
        )
        .unwrap();

        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.algorithms, vec!["kmeans".to_string()]);
        let options = config.to_options();
        assert_eq!(options.n_rows, 250);
        assert_eq!(options.n_cols, BenchmarkOptions::default().n_cols);
        assert_eq!(options.dataset, Some(DatasetKind::Blobs));
        assert_eq!(options.params.get("n_clusters"), Some(&ParamValue::Int(4)));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rowz": 10}}"#).unwrap();
        assert!(BenchConfig::load(file.path()).is_err());
    }
}
