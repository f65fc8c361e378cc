//! Pairing of an accelerated estimator with its optional reference
//! counterpart, and the adapter that runs either side uniformly.

use crate::entry::{EntryPoint, ExecutionOutput};
use crate::error::{BackendKind, RegistryError, Result};
use crate::hooks::DataPrepHook;
use anyhow::{anyhow, Context};
use ndarray::ArrayView2;
use pairbench_estimators::{BoxedEstimator, Dataset, Estimator, Labels, Params};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

pub type BuildFn = fn(&Params) -> anyhow::Result<BoxedEstimator>;

/// Builds an estimator ready for its entry point (for example a model
/// trained ahead of an inference-only benchmark). Timing excludes it.
pub type SetupFn = fn(&Backend, &Dataset, &Params) -> anyhow::Result<BoxedEstimator>;

/// A named estimator constructor.
#[derive(Clone, Copy)]
pub struct Backend {
    pub name: &'static str,
    build: BuildFn,
}

impl Backend {
    pub const fn new(name: &'static str, build: BuildFn) -> Self {
        Self { name, build }
    }

    pub fn build(&self, params: &Params) -> anyhow::Result<BoxedEstimator> {
        (self.build)(params).with_context(|| format!("constructing {}", self.name))
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("name", &self.name).finish()
    }
}

/// Per-run overrides: extra parameters plus setup results keyed by side.
#[derive(Default)]
pub struct Overrides {
    pub params: Params,
    pub reference_setup: Option<BoxedEstimator>,
    pub accelerated_setup: Option<BoxedEstimator>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    fn take_setup(&mut self, kind: BackendKind) -> Option<BoxedEstimator> {
        match kind {
            BackendKind::Reference => self.reference_setup.take(),
            BackendKind::Accelerated => self.accelerated_setup.take(),
        }
    }

    pub fn setup_result(&self, kind: BackendKind) -> Option<&dyn Estimator> {
        match kind {
            BackendKind::Reference => self.reference_setup.as_deref(),
            BackendKind::Accelerated => self.accelerated_setup.as_deref(),
        }
    }
}

impl From<Params> for Overrides {
    fn from(params: Params) -> Self {
        Self::new().with_params(params)
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overrides")
            .field("params", &self.params)
            .field("reference_setup", &self.reference_setup.as_ref().map(|e| e.name()))
            .field("accelerated_setup", &self.accelerated_setup.as_ref().map(|e| e.name()))
            .finish()
    }
}

pub type LabelScore = fn(&Labels, &Labels) -> anyhow::Result<f64>;
pub type EmbeddingScore = fn(ArrayView2<'_, f32>, ArrayView2<'_, f32>) -> anyhow::Result<f64>;

/// Scalar quality measure for a finished run.
#[derive(Clone, Copy)]
pub enum AccuracyFunction {
    /// Compares expected labels with predictions.
    Labels { name: &'static str, score: LabelScore },
    /// Compares the input features with the produced embedding.
    Embedding {
        name: &'static str,
        score: EmbeddingScore,
    },
}

impl AccuracyFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AccuracyFunction::Labels { name, .. } | AccuracyFunction::Embedding { name, .. } => *name,
        }
    }

    /// Score a finished run against the unprepared dataset it was given.
    pub fn evaluate(&self, data: &Dataset, execution: &Execution) -> anyhow::Result<f64> {
        match self {
            AccuracyFunction::Labels { score, .. } => {
                let expected = data
                    .labels
                    .as_ref()
                    .ok_or_else(|| anyhow!("{} needs labelled data", self.name()))?;
                let predicted = match &execution.output {
                    Some(ExecutionOutput::Predictions(labels)) => Cow::Borrowed(labels),
                    _ => Cow::Owned(execution.estimator.predict(&data.features)?),
                };
                score(expected, &predicted)
            }
            AccuracyFunction::Embedding { score, .. } => {
                let original = data.features.dense()?;
                match (&execution.output, execution.estimator.embedding()) {
                    (Some(ExecutionOutput::Embedding(embedded)), _) => score(original, embedded.view()),
                    (_, Some(embedded)) => score(original, embedded),
                    _ => {
                        let embedded = execution.estimator.transform(&data.features)?;
                        score(original, embedded.view())
                    }
                }
            }
        }
    }
}

impl fmt::Debug for AccuracyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccuracyFunction").field(&self.name()).finish()
    }
}

/// A trained estimator together with whatever its entry point returned.
pub struct Execution {
    pub estimator: BoxedEstimator,
    pub output: Option<ExecutionOutput>,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("estimator", &self.estimator.name())
            .field("output", &self.output)
            .finish()
    }
}

struct Side<'a> {
    backend: Option<&'a Backend>,
    params: &'a Params,
    prep: Option<DataPrepHook>,
    setup: Option<SetupFn>,
}

#[derive(Clone)]
pub struct AlgorithmDescriptor {
    name: String,
    reference_backend: Option<Backend>,
    accelerated_backend: Backend,
    shared_params: Params,
    reference_params: Params,
    accelerated_params: Params,
    accepts_labels: bool,
    reference_prep: Option<DataPrepHook>,
    accelerated_prep: Option<DataPrepHook>,
    entry_point: EntryPoint,
    setup_reference: Option<SetupFn>,
    setup_accelerated: Option<SetupFn>,
    accuracy: Option<AccuracyFunction>,
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("name", &self.name)
            .field("reference_backend", &self.reference_backend)
            .field("accelerated_backend", &self.accelerated_backend)
            .field("shared_params", &self.shared_params)
            .field("accepts_labels", &self.accepts_labels)
            .field("entry_point", &self.entry_point)
            .field("accuracy", &self.accuracy)
            .finish_non_exhaustive()
    }
}

impl AlgorithmDescriptor {
    pub fn new(reference: Option<Backend>, accelerated: Backend, shared_params: Params) -> Self {
        Self {
            name: accelerated.name.to_string(),
            reference_backend: reference,
            accelerated_backend: accelerated,
            shared_params,
            reference_params: Params::new(),
            accelerated_params: Params::new(),
            accepts_labels: true,
            reference_prep: None,
            accelerated_prep: None,
            entry_point: EntryPoint::Fit,
            setup_reference: None,
            setup_accelerated: None,
            accuracy: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_reference_params(mut self, params: Params) -> Self {
        self.reference_params = params;
        self
    }

    pub fn with_accelerated_params(mut self, params: Params) -> Self {
        self.accelerated_params = params;
        self
    }

    pub fn accepts_labels(mut self, accepts_labels: bool) -> Self {
        self.accepts_labels = accepts_labels;
        self
    }

    pub fn with_reference_prep(mut self, hook: DataPrepHook) -> Self {
        self.reference_prep = Some(hook);
        self
    }

    pub fn with_accelerated_prep(mut self, hook: DataPrepHook) -> Self {
        self.accelerated_prep = Some(hook);
        self
    }

    /// Apply the same hook to both sides.
    pub fn with_prep(self, hook: DataPrepHook) -> Self {
        self.with_reference_prep(hook).with_accelerated_prep(hook)
    }

    pub fn with_entry_point(mut self, entry_point: EntryPoint) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn with_reference_setup(mut self, setup: SetupFn) -> Self {
        self.setup_reference = Some(setup);
        self
    }

    pub fn with_accelerated_setup(mut self, setup: SetupFn) -> Self {
        self.setup_accelerated = Some(setup);
        self
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyFunction) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference_backend(&self) -> Option<&Backend> {
        self.reference_backend.as_ref()
    }

    pub fn accelerated_backend(&self) -> &Backend {
        &self.accelerated_backend
    }

    pub fn has_reference(&self) -> bool {
        self.reference_backend.is_some()
    }

    pub fn shared_params(&self) -> &Params {
        &self.shared_params
    }

    pub fn takes_labels(&self) -> bool {
        self.accepts_labels
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point
    }

    pub fn accuracy(&self) -> Option<&AccuracyFunction> {
        self.accuracy.as_ref()
    }

    pub fn has_setup(&self, kind: BackendKind) -> bool {
        self.side(kind).setup.is_some()
    }

    fn side(&self, kind: BackendKind) -> Side<'_> {
        match kind {
            BackendKind::Reference => Side {
                backend: self.reference_backend.as_ref(),
                params: &self.reference_params,
                prep: self.reference_prep,
                setup: self.setup_reference,
            },
            BackendKind::Accelerated => Side {
                backend: Some(&self.accelerated_backend),
                params: &self.accelerated_params,
                prep: self.accelerated_prep,
                setup: self.setup_accelerated,
            },
        }
    }

    fn unsupported(&self, kind: BackendKind) -> RegistryError {
        RegistryError::UnsupportedBackend {
            algorithm: self.name.clone(),
            backend: kind,
        }
    }

    /// Effective parameters for one side: shared, then side-specific, then
    /// `overrides`, later layers winning.
    pub fn effective_params(&self, kind: BackendKind, overrides: &Params) -> Params {
        Params::merged([&self.shared_params, self.side(kind).params, overrides])
    }

    pub fn reference_params(&self, overrides: &Params) -> Params {
        self.effective_params(BackendKind::Reference, overrides)
    }

    pub fn accelerated_params(&self, overrides: &Params) -> Params {
        self.effective_params(BackendKind::Accelerated, overrides)
    }

    /// Construct (or reuse the setup result for) one side, prepare the data
    /// and drive the entry point.
    pub fn execute(&self, kind: BackendKind, data: &Dataset, mut overrides: Overrides) -> Result<Execution> {
        let side = self.side(kind);
        let backend = side.backend.ok_or_else(|| self.unsupported(kind))?;
        let params = self.effective_params(kind, &overrides.params);

        let mut estimator = match overrides.take_setup(kind) {
            Some(prepared) => {
                debug!(algorithm = %self.name, backend = %kind, "reusing setup result");
                prepared
            }
            None => {
                debug!(algorithm = %self.name, backend = %kind, constructor = backend.name, "constructing estimator");
                backend.build(&params)?
            }
        };

        let data: Cow<'_, Dataset> = match side.prep {
            Some(hook) => Cow::Owned(hook.apply(data)?),
            None => Cow::Borrowed(data),
        };
        let labels = if self.accepts_labels {
            let labels = data.labels.as_ref().ok_or_else(|| RegistryError::MissingLabels {
                algorithm: self.name.clone(),
            })?;
            Some(labels)
        } else {
            None
        };

        let output = self
            .entry_point
            .invoke(estimator.as_mut(), &data.features, labels)?;
        Ok(Execution { estimator, output })
    }

    pub fn run_reference(&self, data: &Dataset, overrides: Overrides) -> Result<BoxedEstimator> {
        self.execute(BackendKind::Reference, data, overrides)
            .map(|execution| execution.estimator)
    }

    pub fn run_accelerated(&self, data: &Dataset, overrides: Overrides) -> Result<BoxedEstimator> {
        self.execute(BackendKind::Accelerated, data, overrides)
            .map(|execution| execution.estimator)
    }

    /// Run the side's setup step, if any; a side without one yields empty
    /// [`Overrides`] even when it has no backend. The returned value carries
    /// only the setup result; add run parameters with
    /// [`Overrides::with_params`].
    pub fn setup(&self, kind: BackendKind, data: &Dataset, overrides: &Params) -> Result<Overrides> {
        let side = self.side(kind);
        let Some(setup) = side.setup else {
            return Ok(Overrides::new());
        };
        let backend = side.backend.ok_or_else(|| self.unsupported(kind))?;
        let params = self.effective_params(kind, overrides);
        debug!(algorithm = %self.name, backend = %kind, "running setup");
        let prepared = setup(backend, data, &params)?;

        let mut result = Overrides::new();
        match kind {
            BackendKind::Reference => result.reference_setup = Some(prepared),
            BackendKind::Accelerated => result.accelerated_setup = Some(prepared),
        }
        Ok(result)
    }

    pub fn setup_reference(&self, data: &Dataset, overrides: &Params) -> Result<Overrides> {
        self.setup(BackendKind::Reference, data, overrides)
    }

    pub fn setup_accelerated(&self, data: &Dataset, overrides: &Params) -> Result<Overrides> {
        self.setup(BackendKind::Accelerated, data, overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use pairbench_estimators::clustering::KMeans;
    use pairbench_estimators::linear::LinearRegression;
    use pairbench_estimators::metrics::r2_score;
    use pairbench_estimators::ExecMode;

    fn kmeans_accelerated(params: &Params) -> anyhow::Result<BoxedEstimator> {
        Ok(Box::new(KMeans::from_params(ExecMode::Parallel, params)?))
    }

    fn kmeans_reference(params: &Params) -> anyhow::Result<BoxedEstimator> {
        Ok(Box::new(KMeans::from_params(ExecMode::Sequential, params)?))
    }

    fn regression_reference(params: &Params) -> anyhow::Result<BoxedEstimator> {
        Ok(Box::new(LinearRegression::from_params(ExecMode::Sequential, params)?))
    }

    fn regression_accelerated(params: &Params) -> anyhow::Result<BoxedEstimator> {
        Ok(Box::new(LinearRegression::from_params(ExecMode::Parallel, params)?))
    }

    fn prefit(backend: &Backend, data: &Dataset, params: &Params) -> anyhow::Result<BoxedEstimator> {
        let mut estimator = backend.build(params)?;
        estimator.fit(&data.features, None)?;
        Ok(estimator)
    }

    fn address(estimator: &dyn Estimator) -> usize {
        estimator as *const _ as *const () as usize
    }

    fn blobs() -> Dataset {
        let x = Array2::from_shape_fn((12, 2), |(i, j)| (i / 6) as f32 * 10.0 + (i + j) as f32 * 0.1);
        Dataset::unlabeled(x)
    }

    fn kmeans() -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(
            Some(Backend::new("KMeans", kmeans_reference)),
            Backend::new("KMeans", kmeans_accelerated),
            Params::new().with("n_clusters", 2).with("max_iter", 50),
        )
        .with_reference_params(Params::new().with("init", "random"))
        .accepts_labels(false)
    }

    #[test]
    fn merge_applies_shared_then_side_then_overrides() {
        let descriptor = kmeans();
        let params = descriptor.reference_params(&Params::new().with("max_iter", 5));
        assert_eq!(params.get_i64("n_clusters", 0).unwrap(), 2);
        assert_eq!(params.get_i64("max_iter", 0).unwrap(), 5);
        assert_eq!(params.get_str("init", "").unwrap(), "random");
        assert!(!descriptor.accelerated_params(&Params::new()).contains("init"));
    }

    #[test]
    fn both_sides_train() {
        let descriptor = kmeans();
        let reference = descriptor.run_reference(&blobs(), Overrides::new()).unwrap();
        let accelerated = descriptor.run_accelerated(&blobs(), Overrides::new()).unwrap();
        assert!(reference.is_fitted());
        assert!(accelerated.is_fitted());
        assert_eq!(reference.name(), "KMeans");
    }

    #[test]
    fn missing_reference_is_reported() {
        let descriptor = AlgorithmDescriptor::new(None, Backend::new("KMeans", kmeans_accelerated), Params::new());
        let Err(err) = descriptor.run_reference(&blobs(), Overrides::new()) else {
            panic!("reference run without a reference backend succeeded");
        };
        assert!(matches!(
            err,
            RegistryError::UnsupportedBackend {
                backend: BackendKind::Reference,
                ..
            }
        ));
    }

    #[test]
    fn setup_without_setup_fn_is_empty_even_without_backend() {
        let descriptor = AlgorithmDescriptor::new(None, Backend::new("KMeans", kmeans_accelerated), Params::new());
        let overrides = descriptor.setup_reference(&blobs(), &Params::new()).unwrap();
        assert!(overrides.params.is_empty());
        assert!(overrides.reference_setup.is_none());
        assert!(overrides.accelerated_setup.is_none());
    }

    #[test]
    fn setup_fn_without_backend_is_unsupported() {
        let descriptor = AlgorithmDescriptor::new(None, Backend::new("KMeans", kmeans_accelerated), Params::new())
            .with_reference_setup(prefit);
        assert!(matches!(
            descriptor.setup_reference(&blobs(), &Params::new()),
            Err(RegistryError::UnsupportedBackend {
                backend: BackendKind::Reference,
                ..
            })
        ));
    }

    #[test]
    fn labelled_descriptor_rejects_unlabelled_data() {
        let descriptor = AlgorithmDescriptor::new(
            Some(Backend::new("LinearRegression", regression_reference)),
            Backend::new("LinearRegression", regression_accelerated),
            Params::new(),
        );
        assert!(matches!(
            descriptor.run_accelerated(&blobs(), Overrides::new()),
            Err(RegistryError::MissingLabels { .. })
        ));
    }

    #[test]
    fn backend_failures_are_wrapped() {
        let descriptor = kmeans();
        let overrides = Overrides::from(Params::new().with("n_clusters", "many"));
        assert!(matches!(
            descriptor.run_accelerated(&blobs(), overrides),
            Err(RegistryError::Backend(_))
        ));
    }

    #[test]
    fn setup_result_is_reused_by_its_own_side_only() {
        let descriptor = kmeans().with_accelerated_setup(prefit);
        assert!(descriptor.setup_reference(&blobs(), &Params::new()).unwrap().reference_setup.is_none());

        let overrides = descriptor.setup_accelerated(&blobs(), &Params::new()).unwrap();
        let prepared = overrides
            .setup_result(BackendKind::Accelerated)
            .map(address)
            .unwrap();
        let trained = descriptor.run_accelerated(&blobs(), overrides).unwrap();
        assert_eq!(address(&*trained), prepared);
    }

    #[test]
    fn accuracy_falls_back_to_predict() {
        let descriptor = AlgorithmDescriptor::new(
            Some(Backend::new("LinearRegression", regression_reference)),
            Backend::new("LinearRegression", regression_accelerated),
            Params::new(),
        )
        .with_accuracy(AccuracyFunction::Labels {
            name: "r2",
            score: r2_score,
        });
        let x = array![[0.0f32], [1.0], [2.0], [3.0]];
        let data = Dataset::labeled(x, Labels::Float(array![1.0, 3.0, 5.0, 7.0]));
        let execution = descriptor
            .execute(BackendKind::Reference, &data, Overrides::new())
            .unwrap();
        let accuracy = descriptor.accuracy().unwrap().evaluate(&data, &execution).unwrap();
        assert_abs_diff_eq!(accuracy, 1.0, epsilon = 1e-3);
    }
}
