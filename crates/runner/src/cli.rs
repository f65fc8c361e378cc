//! CLI wiring for the `pairbench` binary.

use crate::config::{BenchConfig, BenchmarkOptions};
use crate::datagen::DatasetKind;
use crate::report::BenchmarkReport;
use crate::runner::BenchmarkRunner;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pairbench_estimators::ParamValue;
use pairbench_registry::{build_registry, find_by_name, AlgorithmDescriptor};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pairbench", about = "Accelerated vs. reference algorithm benchmarks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the registered algorithm pairs.
    List,
    /// Time the selected algorithms on a synthetic dataset and emit a JSON report.
    Run {
        /// Algorithm names (case-insensitive). Defaults to every registered algorithm.
        #[arg(long = "algorithm", short = 'a')]
        algorithms: Vec<String>,
        #[arg(long)]
        rows: Option<usize>,
        #[arg(long)]
        cols: Option<usize>,
        #[arg(long)]
        runs: Option<usize>,
        #[arg(long)]
        warmup: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        dataset: Option<DatasetKind>,
        /// Extra estimator option for both sides, as `key=value`.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, ParamValue)>,
        #[arg(long, default_value_t = false)]
        skip_reference: bool,
        /// JSON run configuration; command-line flags take precedence.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        baseline: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, ParamValue)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty option name in {raw:?}"));
    }
    Ok((key.to_string(), ParamValue::parse_literal(value.trim())))
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let registry = build_registry();
    match cli.command {
        Command::List => {
            for descriptor in &registry {
                println!(
                    "- {}: accelerated={} reference={} entry={} accuracy={}",
                    descriptor.name(),
                    descriptor.accelerated_backend().name,
                    descriptor.reference_backend().map(|b| b.name).unwrap_or("-"),
                    descriptor.entry_point().as_str(),
                    descriptor.accuracy().map(|a| a.name()).unwrap_or("-"),
                );
            }
        }
        Command::Run {
            algorithms,
            rows,
            cols,
            runs,
            warmup,
            seed,
            dataset,
            params,
            skip_reference,
            config,
            output,
            baseline,
        } => {
            let config = match config {
                Some(path) => BenchConfig::load(&path)?,
                None => BenchConfig::default(),
            };
            let defaults = config.to_options();
            let mut extra = defaults.params.clone();
            for (key, value) in params {
                extra.insert(&key, value);
            }
            let options = BenchmarkOptions {
                n_rows: rows.unwrap_or(defaults.n_rows),
                n_cols: cols.unwrap_or(defaults.n_cols),
                runs: runs.unwrap_or(defaults.runs),
                warmup_runs: warmup.unwrap_or(defaults.warmup_runs),
                seed: seed.unwrap_or(defaults.seed),
                dataset: dataset.or(defaults.dataset),
                params: extra,
                skip_reference: skip_reference || defaults.skip_reference,
                ..defaults
            };

            let names = if algorithms.is_empty() { config.algorithms.clone() } else { algorithms };
            let selected = select(&registry, &names)?;
            let report = BenchmarkRunner::new(options).run_all(selected)?;
            print_report(&report);

            if let Some(path) = baseline.or(config.baseline) {
                if path.exists() {
                    let baseline_report = BenchmarkReport::load(&path)?;
                    for (name, delta) in report.diff(&baseline_report) {
                        println!(
                            "Δ {}: accelerated_ms={:+.3} reference_ms={} accuracy={}",
                            name,
                            delta.accelerated_ms_delta,
                            signed(delta.reference_ms_delta),
                            signed(delta.accuracy_delta),
                        );
                    }
                } else {
                    info!(path = %path.display(), "baseline report not found; skipping diff");
                }
            }

            if let Some(path) = output.or(config.output) {
                report.save(&path)?;
                info!(path = %path.display(), "report written");
            }
        }
    }
    Ok(())
}

fn select<'a>(registry: &'a [AlgorithmDescriptor], names: &[String]) -> Result<Vec<&'a AlgorithmDescriptor>> {
    if names.is_empty() {
        return Ok(registry.iter().collect());
    }
    names
        .iter()
        .map(|name| find_by_name(registry, name).ok_or_else(|| anyhow!("unknown algorithm {name:?}")))
        .collect()
}

fn print_report(report: &BenchmarkReport) {
    println!(
        "results={}, generated_at={}",
        report.results.len(),
        report.generated_at_unix_ms
    );
    for result in &report.results {
        let reference = result
            .reference
            .as_ref()
            .map(|r| format!("{:.3}", r.mean_ms))
            .unwrap_or_else(|| "-".to_string());
        let speedup = result
            .speedup()
            .map(|s| format!("{s:.2}x"))
            .unwrap_or_else(|| "-".to_string());
        let accuracy = result
            .accelerated
            .accuracy
            .map(|a| format!("{a:.4}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {} [{} {}x{}]: accelerated_ms={:.3} reference_ms={} speedup={} {}={}",
            result.algorithm,
            result.dataset,
            result.n_rows,
            result.n_cols,
            result.accelerated.mean_ms,
            reference,
            speedup,
            result.accuracy_metric.as_deref().unwrap_or("accuracy"),
            accuracy,
        );
    }
}

fn signed(value: Option<f64>) -> String {
    value.map(|v| format!("{v:+.3}")).unwrap_or_else(|| "-".to_string())
}
