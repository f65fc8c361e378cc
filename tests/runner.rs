use anyhow::Result;
use approx::assert_abs_diff_eq;
use pairbench::registry::{build_registry, find_by_name};
use pairbench::runner::{BenchConfig, BenchmarkOptions, BenchmarkReport, BenchmarkRunner, DatasetKind};
use std::fs;

fn quick_options() -> BenchmarkOptions {
    BenchmarkOptions {
        n_rows: 80,
        n_cols: 12,
        warmup_runs: 1,
        runs: 2,
        ..BenchmarkOptions::default()
    }
}

#[test]
fn report_round_trips_and_diffs_against_itself() -> Result<()> {
    let registry = build_registry();
    let selected = ["KMeans", "PCA", "Ridge"]
        .iter()
        .filter_map(|name| find_by_name(&registry, name));
    let report = BenchmarkRunner::new(quick_options()).run_all(selected)?;
    assert_eq!(report.results.len(), 3);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reports").join("baseline.json");
    report.save(&path)?;
    let baseline = BenchmarkReport::load(&path)?;

    let deltas = report.diff(&baseline);
    assert_eq!(deltas.len(), 3);
    for delta in deltas.values() {
        assert_abs_diff_eq!(delta.accelerated_ms_delta, 0.0, epsilon = 1e-12);
    }
    assert_eq!(
        report.as_map()["Ridge"].dataset,
        DatasetKind::Regression,
        "regressors are scored on a regression dataset"
    );
    Ok(())
}

#[test]
fn json_config_selects_algorithms_and_options() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bench.json");
    fs::write(
        &path,
        r#"{
            "algorithms": ["tsvd"],
            "rows": 50,
            "cols": 12,
            "runs": 1,
            "warmup": 0,
            "accelerated_params": {"n_iter": 20}
        }"#,
    )?;

    let config = BenchConfig::load(&path)?;
    let registry = build_registry();
    let selected = config.algorithms.iter().filter_map(|name| find_by_name(&registry, name));
    let report = BenchmarkRunner::new(config.to_options()).run_all(selected)?;

    let result = &report.results[0];
    assert_eq!(result.algorithm, "tSVD");
    assert_eq!((result.n_rows, result.n_cols, result.runs), (50, 12, 1));
    assert!(result.reference.is_some());
    Ok(())
}
