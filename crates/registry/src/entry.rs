//! How a benchmark drives an estimator once it has been constructed.

use anyhow::Result;
use ndarray::Array2;
use pairbench_estimators::{Estimator, Features, Labels, Neighbors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryPoint {
    #[default]
    Fit,
    FitPredict,
    FitTransform,
    FitKNeighbors,
    /// Predict with a model built during setup; no training happens.
    Predict,
}

/// What an entry point produced besides the trained estimator itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutput {
    Predictions(Labels),
    Embedding(Array2<f32>),
    Neighbors(Neighbors),
}

impl EntryPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::Fit => "fit",
            EntryPoint::FitPredict => "fit_predict",
            EntryPoint::FitTransform => "fit_transform",
            EntryPoint::FitKNeighbors => "fit_kneighbors",
            EntryPoint::Predict => "predict",
        }
    }

    /// `labels` is `None` for descriptors that train on features alone.
    pub fn invoke(
        self,
        estimator: &mut dyn Estimator,
        features: &Features,
        labels: Option<&Labels>,
    ) -> Result<Option<ExecutionOutput>> {
        match self {
            EntryPoint::Fit => {
                estimator.fit(features, labels)?;
                Ok(None)
            }
            EntryPoint::FitPredict => {
                estimator.fit(features, labels)?;
                Ok(Some(ExecutionOutput::Predictions(estimator.predict(features)?)))
            }
            EntryPoint::FitTransform => Ok(Some(ExecutionOutput::Embedding(
                estimator.fit_transform(features, labels)?,
            ))),
            EntryPoint::FitKNeighbors => {
                estimator.fit(features, labels)?;
                Ok(Some(ExecutionOutput::Neighbors(estimator.kneighbors(features, None)?)))
            }
            EntryPoint::Predict => Ok(Some(ExecutionOutput::Predictions(estimator.predict(features)?))),
        }
    }
}
