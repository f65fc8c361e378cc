//! Algorithm registry and adapter for PairBench.
//!
//! Each [`AlgorithmDescriptor`] pairs an accelerated estimator with an
//! optional reference estimator and runs either side through the same
//! steps: merge parameters, construct (or reuse a setup result), prepare
//! the data and drive the configured [`EntryPoint`].

pub mod catalog;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod hooks;
pub mod probe;

pub use catalog::*;
pub use descriptor::*;
pub use entry::*;
pub use error::*;
pub use hooks::*;
pub use probe::*;
