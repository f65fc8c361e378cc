//! Timed execution of algorithm pairs.

use crate::config::BenchmarkOptions;
use crate::datagen::{self, DatasetKind};
use crate::report::{BackendTiming, BenchmarkReport, BenchmarkResult};
use anyhow::{ensure, Result};
use pairbench_estimators::{Dataset, Params};
use pairbench_registry::{AlgorithmDescriptor, BackendKind, Execution};
use std::time::{Duration, Instant};
use tracing::info;

pub struct BenchmarkRunner {
    options: BenchmarkOptions,
}

impl BenchmarkRunner {
    pub fn new(options: BenchmarkOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BenchmarkOptions {
        &self.options
    }

    pub fn dataset_for(&self, descriptor: &AlgorithmDescriptor) -> Result<(DatasetKind, Dataset)> {
        let kind = self
            .options
            .dataset
            .unwrap_or_else(|| DatasetKind::for_accuracy(descriptor.accuracy().map(|a| a.name())));
        let data = datagen::generate(kind, self.options.n_rows, self.options.n_cols, self.options.seed)?;
        Ok((kind, data))
    }

    pub fn run(&self, descriptor: &AlgorithmDescriptor) -> Result<BenchmarkResult> {
        ensure!(self.options.runs > 0, "at least one timed run is required");
        let (dataset, data) = self.dataset_for(descriptor)?;

        let accelerated = self.time_backend(descriptor, BackendKind::Accelerated, &data)?;
        let reference = if descriptor.has_reference() && !self.options.skip_reference {
            Some(self.time_backend(descriptor, BackendKind::Reference, &data)?)
        } else {
            None
        };

        let result = BenchmarkResult {
            algorithm: descriptor.name().to_string(),
            dataset,
            n_rows: data.n_samples(),
            n_cols: data.n_features(),
            runs: self.options.runs,
            accuracy_metric: descriptor.accuracy().map(|a| a.name().to_string()),
            accelerated,
            reference,
        };
        info!(
            algorithm = %result.algorithm,
            accelerated_ms = result.accelerated.mean_ms,
            reference_ms = result.reference.as_ref().map(|r| r.mean_ms),
            speedup = result.speedup(),
            "benchmark finished"
        );
        Ok(result)
    }

    pub fn run_all<'a>(
        &self,
        descriptors: impl IntoIterator<Item = &'a AlgorithmDescriptor>,
    ) -> Result<BenchmarkReport> {
        let results = descriptors
            .into_iter()
            .map(|descriptor| self.run(descriptor))
            .collect::<Result<Vec<_>>>()?;
        Ok(BenchmarkReport::new(results))
    }

    fn side_params(&self, kind: BackendKind) -> Params {
        let side = match kind {
            BackendKind::Reference => &self.options.reference_params,
            BackendKind::Accelerated => &self.options.accelerated_params,
        };
        Params::merged([&self.options.params, side])
    }

    /// One setup plus execution. Only the execution is timed.
    fn run_once(
        &self,
        descriptor: &AlgorithmDescriptor,
        kind: BackendKind,
        data: &Dataset,
        params: &Params,
    ) -> Result<(Duration, Duration, Execution)> {
        let (setup_time, overrides) = timed(|| Ok(descriptor.setup(kind, data, params)?))?;
        let overrides = overrides.with_params(params.clone());
        let (elapsed, execution) = timed(|| Ok(descriptor.execute(kind, data, overrides)?))?;
        Ok((setup_time, elapsed, execution))
    }

    fn time_backend(&self, descriptor: &AlgorithmDescriptor, kind: BackendKind, data: &Dataset) -> Result<BackendTiming> {
        let params = self.side_params(kind);

        for _ in 0..self.options.warmup_runs {
            self.run_once(descriptor, kind, data, &params)?;
        }

        let mut total = Duration::default();
        let mut best = Duration::MAX;
        let mut setup_total = Duration::default();
        let mut last = None;
        for _ in 0..self.options.runs {
            let (setup_time, elapsed, execution) = self.run_once(descriptor, kind, data, &params)?;
            setup_total += setup_time;
            total += elapsed;
            best = best.min(elapsed);
            last = Some(execution);
        }

        let accuracy = match (descriptor.accuracy(), &last) {
            (Some(accuracy), Some(execution)) => Some(accuracy.evaluate(data, execution)?),
            _ => None,
        };
        let constructor = last
            .as_ref()
            .map(|execution| execution.estimator.name().to_string())
            .unwrap_or_default();
        let runs = self.options.runs as f64;
        let timing = BackendTiming {
            constructor,
            mean_ms: total.as_secs_f64() * 1000.0 / runs,
            min_ms: best.as_secs_f64() * 1000.0,
            setup_ms: setup_total.as_secs_f64() * 1000.0 / runs,
            accuracy,
        };
        info!(
            algorithm = %descriptor.name(),
            backend = %kind,
            mean_ms = timing.mean_ms,
            accuracy = timing.accuracy,
            "backend timed"
        );
        Ok(timing)
    }
}

pub(crate) fn timed<F, T>(f: F) -> Result<(Duration, T)>
where
    F: FnOnce() -> Result<T>,
{
    let start = Instant::now();
    let value = f()?;
    Ok((start.elapsed(), value))
}
