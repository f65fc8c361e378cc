//! Scoped compute-cluster fixtures.
//!
//! A [`ClusterFixture`] acquires a cluster from a [`ClusterManager`] and
//! releases it when dropped. [`LocalCluster`] runs workers in-process on a
//! dedicated rayon pool.

pub mod config;
pub mod error;
pub mod fixture;
pub mod manager;

pub use config::*;
pub use error::*;
pub use fixture::*;
pub use manager::*;
