//! Typed failures surfaced by the registry adapter.

use std::fmt;
use thiserror::Error;

/// Which half of an algorithm pair an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Reference,
    Accelerated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Reference => "reference",
            BackendKind::Accelerated => "accelerated",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{algorithm} has no {backend} backend")]
    UnsupportedBackend {
        algorithm: String,
        backend: BackendKind,
    },

    #[error("optional dependency `{dependency}` is not available in this build")]
    MissingOptionalDependency { dependency: &'static str },

    #[error("{algorithm} trains on labels but the dataset has none")]
    MissingLabels { algorithm: String },

    /// Construction, fitting or prediction failed inside an estimator.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_pass_through_unchanged() {
        let err = RegistryError::from(anyhow::anyhow!("PCA: n_components=10 too large"));
        assert_eq!(err.to_string(), "PCA: n_components=10 too large");
        assert!(matches!(err, RegistryError::Backend(_)));
    }

    #[test]
    fn unsupported_backend_names_the_side() {
        let err = RegistryError::UnsupportedBackend {
            algorithm: "MBSGDClassifier".into(),
            backend: BackendKind::Reference,
        };
        assert_eq!(err.to_string(), "MBSGDClassifier has no reference backend");
    }
}
