//! Estimator primitives and algorithm implementations for PairBench.
//!
//! Every algorithm is implemented once and parameterised by [`ExecMode`]:
//! the reference backend runs it sequentially, the accelerated backend runs
//! the hot loops on the rayon pool.

pub mod clustering;
pub mod data;
pub mod decomposition;
pub mod ensemble;
pub mod estimator;
pub mod forest_inference;
pub mod linear;
pub mod manifold;
pub mod metrics;
pub mod neighbors;
pub mod params;
pub mod random_projection;
#[cfg(feature = "umap")]
pub mod umap;
pub mod utils;

pub use data::*;
pub use estimator::*;
pub use params::*;

/// Whether the density-preserving embedding library was compiled in.
pub const fn umap_available() -> bool {
    cfg!(feature = "umap")
}

/// Whether the sequential tree-inference runtime was compiled in.
pub const fn tree_runtime_available() -> bool {
    cfg!(feature = "tree-runtime")
}
