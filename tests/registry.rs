use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use pairbench::estimators::linear::LinearRegression;
use pairbench::estimators::{BoxedEstimator, Dataset, Estimator, ExecMode, ParamValue, Params};
use pairbench::registry::{
    build_registry, build_registry_with, find_by_name, AlgorithmDescriptor, Backend, BackendKind, Capabilities,
    Overrides, RegistryError,
};
use pairbench::runner::{generate, DatasetKind};
use std::sync::atomic::{AtomicUsize, Ordering};

fn small_dataset() -> Result<Dataset> {
    generate(DatasetKind::Classification, 40, 12, 11)
}

fn address(estimator: &dyn Estimator) -> usize {
    estimator as *const _ as *const () as usize
}

#[test]
fn every_paired_algorithm_runs_on_both_sides() -> Result<()> {
    let data = small_dataset()?;
    let registry = build_registry();
    for descriptor in registry.iter().filter(|d| d.has_reference() && d.name() != "FIL") {
        let reference = descriptor
            .run_reference(&data, Overrides::new())
            .with_context(|| format!("{} reference", descriptor.name()))?;
        let accelerated = descriptor
            .run_accelerated(&data, Overrides::new())
            .with_context(|| format!("{} accelerated", descriptor.name()))?;
        assert!(reference.is_fitted(), "{} reference not fitted", descriptor.name());
        assert!(accelerated.is_fitted(), "{} accelerated not fitted", descriptor.name());
    }
    Ok(())
}

static REFERENCE_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn counted_reference(params: &Params) -> Result<BoxedEstimator> {
    REFERENCE_BUILDS.fetch_add(1, Ordering::SeqCst);
    Ok(Box::new(LinearRegression::from_params(ExecMode::Sequential, params)?))
}

fn linear_accelerated(params: &Params) -> Result<BoxedEstimator> {
    Ok(Box::new(LinearRegression::from_params(ExecMode::Parallel, params)?))
}

#[test]
fn missing_reference_fails_without_constructing() -> Result<()> {
    let data = generate(DatasetKind::Regression, 20, 3, 0)?;
    let accelerated_only =
        AlgorithmDescriptor::new(None, Backend::new("LinearRegression", linear_accelerated), Params::new());

    assert!(matches!(
        accelerated_only.run_reference(&data, Overrides::new()),
        Err(RegistryError::UnsupportedBackend {
            backend: BackendKind::Reference,
            ..
        })
    ));

    let paired = AlgorithmDescriptor::new(
        Some(Backend::new("LinearRegression", counted_reference)),
        Backend::new("LinearRegression", linear_accelerated),
        Params::new(),
    );
    let before = REFERENCE_BUILDS.load(Ordering::SeqCst);
    paired.run_accelerated(&data, Overrides::new())?;
    assert_eq!(REFERENCE_BUILDS.load(Ordering::SeqCst), before);
    paired.run_reference(&data, Overrides::new())?;
    assert_eq!(REFERENCE_BUILDS.load(Ordering::SeqCst), before + 1);
    Ok(())
}

#[test]
fn setup_without_a_setup_step_is_empty_for_accelerated_only_algorithms() -> Result<()> {
    let data = small_dataset()?;
    let registry = build_registry();
    let mbsgd = find_by_name(&registry, "MBSGDClassifier").expect("registered");
    assert!(!mbsgd.has_reference());

    let overrides = mbsgd.setup_reference(&data, &Params::new())?;
    assert!(overrides.params.is_empty());
    assert!(overrides.setup_result(BackendKind::Reference).is_none());
    assert!(overrides.setup_result(BackendKind::Accelerated).is_none());
    Ok(())
}

#[test]
fn lookup_ignores_case() {
    let registry = build_registry();
    for name in ["kmeans", "KMEANS", "KMeans", "tsvd"] {
        assert!(find_by_name(&registry, name).is_some(), "{name} not found");
    }
    assert!(find_by_name(&registry, "NotAnAlgorithm").is_none());
}

#[test]
fn overrides_take_precedence_over_side_and_shared_params() {
    let descriptor = AlgorithmDescriptor::new(
        Some(Backend::new("LinearRegression", counted_reference)),
        Backend::new("LinearRegression", linear_accelerated),
        Params::new().with("a", 1).with("b", 2),
    )
    .with_reference_params(Params::new().with("b", 3));

    let merged = descriptor.reference_params(&Params::new().with("b", 4));
    assert_eq!(merged.get("a"), Some(&ParamValue::Int(1)));
    assert_eq!(merged.get("b"), Some(&ParamValue::Int(4)));
    assert_eq!(merged.len(), 2);

    let accelerated = descriptor.accelerated_params(&Params::new());
    assert_eq!(accelerated.get("b"), Some(&ParamValue::Int(2)));
}

#[test]
fn setup_result_is_reused_by_the_run() -> Result<()> {
    let data = small_dataset()?;
    let registry = build_registry();
    let fil = find_by_name(&registry, "FIL").expect("FIL is always registered");

    let overrides = fil.setup_accelerated(&data, &Params::new())?;
    let prepared = overrides
        .setup_result(BackendKind::Accelerated)
        .map(address)
        .expect("setup produced an estimator");
    assert!(overrides.setup_result(BackendKind::Reference).is_none());

    let execution = fil.execute(BackendKind::Accelerated, &data, overrides)?;
    assert_eq!(address(execution.estimator.as_ref()), prepared);
    assert!(execution.output.is_some());
    Ok(())
}

#[test]
fn registry_build_is_idempotent() {
    let names = |registry: &[AlgorithmDescriptor]| registry.iter().map(|d| d.name().to_string()).collect::<Vec<_>>();
    assert_eq!(names(&build_registry()), names(&build_registry()));
}

#[test]
fn missing_optional_libraries_shrink_the_catalog() {
    let full = build_registry();
    let minimal = build_registry_with(&Capabilities::none());

    assert!(find_by_name(&minimal, "UMAP").is_none());
    let fil = find_by_name(&minimal, "FIL").expect("FIL has no optional accelerated dependency");
    assert!(!fil.has_reference());
    assert!(minimal.len() <= full.len());
    assert!(minimal
        .iter()
        .all(|descriptor| find_by_name(&full, descriptor.name()).is_some()));
}

#[test]
fn accelerated_and_reference_agree_on_linear_models() -> Result<()> {
    let data = generate(DatasetKind::Regression, 80, 5, 2)?;
    let registry = build_registry();
    let linear = find_by_name(&registry, "LinearRegression").expect("registered");

    let reference = linear.run_reference(&data, Overrides::new())?;
    let accelerated = linear.run_accelerated(&data, Overrides::new())?;
    let expected = reference.predict(&data.features)?.to_f32();
    let predicted = accelerated.predict(&data.features)?.to_f32();
    for (e, p) in expected.iter().zip(predicted.iter()) {
        assert_abs_diff_eq!(*e, *p, epsilon = 1e-2 * e.abs().max(1.0));
    }
    Ok(())
}
