//! Data-preparation hooks applied to a dataset before a backend sees it.

use crate::error::{RegistryError, Result};
use crate::probe::has_tree_runtime;
use pairbench_estimators::{Dataset, Features, Labels, TreeBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPrepHook {
    /// Cast labels to 32-bit integer classes.
    LabelsToInt,
    /// Convert dense features into the tree runtime's batch layout.
    TreeBatchFormat,
}

impl DataPrepHook {
    pub fn as_str(self) -> &'static str {
        match self {
            DataPrepHook::LabelsToInt => "labels_to_int",
            DataPrepHook::TreeBatchFormat => "tree_batch_format",
        }
    }

    pub fn apply(self, data: &Dataset) -> Result<Dataset> {
        match self {
            DataPrepHook::LabelsToInt => Ok(Dataset::new(
                data.features.clone(),
                data.labels.as_ref().map(|labels| Labels::Int(labels.to_i32())),
            )),
            DataPrepHook::TreeBatchFormat => {
                if !has_tree_runtime() {
                    return Err(RegistryError::MissingOptionalDependency {
                        dependency: "tree-runtime",
                    });
                }
                let features = match &data.features {
                    Features::Dense(dense) => Features::Batch(TreeBatch::from_dense(dense.view())),
                    Features::Batch(batch) => Features::Batch(batch.clone()),
                };
                Ok(Dataset::new(features, data.labels.clone()))
            }
        }
    }
}
