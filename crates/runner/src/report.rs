//! Benchmark reports and baseline comparison.

use crate::datagen::DatasetKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendTiming {
    pub constructor: String,
    pub mean_ms: f64,
    pub min_ms: f64,
    /// Mean time spent in the setup step, outside the timed region.
    pub setup_ms: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub algorithm: String,
    pub dataset: DatasetKind,
    pub n_rows: usize,
    pub n_cols: usize,
    pub runs: usize,
    pub accuracy_metric: Option<String>,
    pub accelerated: BackendTiming,
    pub reference: Option<BackendTiming>,
}

impl BenchmarkResult {
    /// Reference mean time over accelerated mean time.
    pub fn speedup(&self) -> Option<f64> {
        let reference = self.reference.as_ref()?;
        (self.accelerated.mean_ms > 0.0).then(|| reference.mean_ms / self.accelerated.mean_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_at_unix_ms: u128,
    pub results: Vec<BenchmarkResult>,
}

impl BenchmarkReport {
    pub fn new(results: Vec<BenchmarkResult>) -> Self {
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis();
        Self {
            generated_at_unix_ms,
            results,
        }
    }

    pub fn as_map(&self) -> BTreeMap<&str, &BenchmarkResult> {
        self.results
            .iter()
            .map(|result| (result.algorithm.as_str(), result))
            .collect()
    }

    /// Per-algorithm changes against `baseline`. Algorithms missing from
    /// either report are skipped.
    pub fn diff<'a>(&'a self, baseline: &'a BenchmarkReport) -> BTreeMap<&'a str, BenchmarkDelta<'a>> {
        let previous = baseline.as_map();
        self.as_map()
            .into_iter()
            .filter_map(|(algorithm, current)| {
                let &baseline = previous.get(algorithm)?;
                let reference_ms_delta = match (&current.reference, &baseline.reference) {
                    (Some(now), Some(before)) => Some(now.mean_ms - before.mean_ms),
                    _ => None,
                };
                let accuracy_delta = match (current.accelerated.accuracy, baseline.accelerated.accuracy) {
                    (Some(now), Some(before)) => Some(now - before),
                    _ => None,
                };
                Some((
                    algorithm,
                    BenchmarkDelta {
                        current,
                        baseline,
                        accelerated_ms_delta: current.accelerated.mean_ms - baseline.accelerated.mean_ms,
                        reference_ms_delta,
                        accuracy_delta,
                    },
                ))
            })
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("reading report {}", path.display()))?;
        let report = serde_json::from_slice(&data).with_context(|| format!("parsing report {}", path.display()))?;
        Ok(report)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct BenchmarkDelta<'a> {
    pub current: &'a BenchmarkResult,
    pub baseline: &'a BenchmarkResult,
    pub accelerated_ms_delta: f64,
    pub reference_ms_delta: Option<f64>,
    /// Change in the accelerated side's accuracy.
    pub accuracy_delta: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn timing(mean_ms: f64, accuracy: Option<f64>) -> BackendTiming {
        BackendTiming {
            constructor: "KMeans".into(),
            mean_ms,
            min_ms: mean_ms,
            setup_ms: 0.0,
            accuracy,
        }
    }

    fn result(algorithm: &str, accelerated: f64, reference: Option<f64>) -> BenchmarkResult {
        BenchmarkResult {
            algorithm: algorithm.into(),
            dataset: DatasetKind::Blobs,
            n_rows: 100,
            n_cols: 4,
            runs: 3,
            accuracy_metric: Some("homogeneity_score".into()),
            accelerated: timing(accelerated, Some(0.9)),
            reference: reference.map(|ms| timing(ms, Some(0.95))),
        }
    }

    #[test]
    fn diff_matches_algorithms_by_name() {
        let baseline = BenchmarkReport::new(vec![result("KMeans", 10.0, Some(40.0)), result("PCA", 2.0, None)]);
        let current = BenchmarkReport::new(vec![result("KMeans", 8.0, Some(41.0)), result("TSNE", 1.0, None)]);

        let deltas = current.diff(&baseline);
        assert_eq!(deltas.len(), 1);
        let kmeans = &deltas["KMeans"];
        assert_abs_diff_eq!(kmeans.accelerated_ms_delta, -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kmeans.reference_ms_delta.unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kmeans.accuracy_delta.unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn speedup_needs_a_reference() {
        assert_abs_diff_eq!(result("KMeans", 10.0, Some(40.0)).speedup().unwrap(), 4.0, epsilon = 1e-12);
        assert!(result("MBSGD", 10.0, None).speedup().is_none());
    }

    #[test]
    fn save_then_load_preserves_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = BenchmarkReport::new(vec![result("KMeans", 10.0, Some(40.0))]);
        report.save(&path).unwrap();
        assert_eq!(BenchmarkReport::load(&path).unwrap(), report);
    }

    #[test]
    fn missing_report_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(BenchmarkReport::load(&dir.path().join("absent.json")).is_err());
    }
}
