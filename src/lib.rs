//! PairBench: accelerated and reference ML backends paired behind one
//! registry, with a cluster fixture and a benchmark driver.

pub use pairbench_cluster as cluster;
pub use pairbench_estimators as estimators;
pub use pairbench_registry as registry;
pub use pairbench_runner as runner;
