//! Capability probes for optional estimator libraries.

use pairbench_estimators::{tree_runtime_available, umap_available};

/// Whether the sequential tree-inference runtime is compiled in.
pub fn has_tree_runtime() -> bool {
    tree_runtime_available()
}

/// Whether the density-preserving embedding library (UMAP) is compiled in.
pub fn has_density_embedding() -> bool {
    umap_available()
}

/// Optional libraries a registry build may use.
///
/// A capability can only narrow what the build provides: claiming a library
/// that was not compiled in has no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub tree_runtime: bool,
    pub density_embedding: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            tree_runtime: has_tree_runtime(),
            density_embedding: has_density_embedding(),
        }
    }

    pub const fn none() -> Self {
        Self {
            tree_runtime: false,
            density_embedding: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect()
    }
}
