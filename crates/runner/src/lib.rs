//! Benchmark driver for PairBench algorithm pairs.
//!
//! Generates a deterministic dataset per algorithm, times both sides of each
//! pair with setup kept outside the timed region, scores the results and
//! writes JSON reports that can be diffed against a baseline.

pub mod config;
pub mod datagen;
pub mod report;
pub mod runner;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{BenchConfig, BenchmarkOptions};
pub use datagen::{generate, DatasetKind};
pub use report::{BackendTiming, BenchmarkDelta, BenchmarkReport, BenchmarkResult};
pub use runner::BenchmarkRunner;
