//! The built-in catalog of algorithm pairs.

use crate::descriptor::{AccuracyFunction, AlgorithmDescriptor, Backend, BuildFn};
use crate::entry::EntryPoint;
use crate::hooks::DataPrepHook;
use crate::probe::Capabilities;
use anyhow::Result;
use pairbench_estimators::clustering::{Dbscan, KMeans};
use pairbench_estimators::decomposition::{Pca, TruncatedSvd};
use pairbench_estimators::ensemble::{RandomForestClassifier, RandomForestRegressor};
use pairbench_estimators::forest_inference::{train_classifier_model, ForestInference};
use pairbench_estimators::linear::{ElasticNet, LinearRegression, LogisticRegression, MbsgdClassifier, Ridge};
use pairbench_estimators::manifold::Tsne;
use pairbench_estimators::metrics;
use pairbench_estimators::neighbors::NearestNeighbors;
use pairbench_estimators::random_projection::GaussianRandomProjection;
use pairbench_estimators::{BoxedEstimator, Dataset, Estimator, ExecMode, Params};
use tracing::debug;

fn boxed<E: Estimator>(estimator: Result<E>) -> Result<BoxedEstimator> {
    Ok(Box::new(estimator?))
}

/// Sequential and parallel constructors for estimators built with
/// `from_params(mode, params)`.
macro_rules! mode_backends {
    ($($reference:ident, $accelerated:ident => $ctor:path;)*) => {
        $(
            fn $reference(params: &Params) -> Result<BoxedEstimator> {
                boxed($ctor(ExecMode::Sequential, params))
            }

            fn $accelerated(params: &Params) -> Result<BoxedEstimator> {
                boxed($ctor(ExecMode::Parallel, params))
            }
        )*
    };
}

mode_backends! {
    kmeans_reference, kmeans_accelerated => KMeans::from_params;
    pca_reference, pca_accelerated => Pca::from_params;
    tsvd_reference, tsvd_accelerated => TruncatedSvd::from_params;
    grp_reference, grp_accelerated => GaussianRandomProjection::from_params;
    nn_reference, nn_accelerated => NearestNeighbors::from_params;
    dbscan_reference, dbscan_accelerated => Dbscan::from_params;
    linear_reference, linear_accelerated => LinearRegression::from_params;
    elastic_net_reference, elastic_net_accelerated => ElasticNet::from_params;
    lasso_reference, lasso_accelerated => ElasticNet::lasso_from_params;
    ridge_reference, ridge_accelerated => Ridge::from_params;
    logistic_reference, logistic_accelerated => LogisticRegression::from_params;
    rfc_reference, rfc_accelerated => RandomForestClassifier::from_params;
    rfr_reference, rfr_accelerated => RandomForestRegressor::from_params;
    tsne_reference, tsne_accelerated => Tsne::from_params;
}

#[cfg(feature = "umap")]
mode_backends! {
    umap_reference, umap_accelerated => pairbench_estimators::umap::Umap::from_params;
}

fn mbsgd_accelerated(params: &Params) -> Result<BoxedEstimator> {
    boxed(MbsgdClassifier::from_params(ExecMode::Parallel, params))
}

fn fil_accelerated(params: &Params) -> Result<BoxedEstimator> {
    boxed(ForestInference::from_params(params))
}

#[cfg(feature = "tree-runtime")]
fn tree_runtime_reference(params: &Params) -> Result<BoxedEstimator> {
    boxed(pairbench_estimators::forest_inference::TreeRuntimePredictor::from_params(params))
}

/// Train a forest on the benchmark data and load it into the backend's
/// inference engine.
fn load_trained_forest(backend: &Backend, data: &Dataset, params: &Params) -> Result<BoxedEstimator> {
    let model = train_classifier_model(data, params)?;
    let mut estimator = backend.build(params)?;
    estimator.load_model(model)?;
    Ok(estimator)
}

const HOMOGENEITY: AccuracyFunction = AccuracyFunction::Labels {
    name: "homogeneity_score",
    score: metrics::homogeneity_score,
};

const R2: AccuracyFunction = AccuracyFunction::Labels {
    name: "r2_score",
    score: metrics::r2_score,
};

const ACCURACY: AccuracyFunction = AccuracyFunction::Labels {
    name: "accuracy_score",
    score: metrics::accuracy_score,
};

const TREE_INFERENCE_ACCURACY: AccuracyFunction = AccuracyFunction::Labels {
    name: "tree_inference_accuracy",
    score: metrics::tree_inference_accuracy,
};

#[cfg(feature = "umap")]
const TRUSTWORTHINESS: AccuracyFunction = AccuracyFunction::Embedding {
    name: "trustworthiness",
    score: metrics::embedding_trustworthiness,
};

fn pair(name: &'static str, reference: BuildFn, accelerated: BuildFn, shared: Params) -> AlgorithmDescriptor {
    AlgorithmDescriptor::new(
        Some(Backend::new(name, reference)),
        Backend::new(name, accelerated),
        shared,
    )
}

/// Build the catalog with the optional libraries detected in this build.
pub fn build_registry() -> Vec<AlgorithmDescriptor> {
    build_registry_with(&Capabilities::detect())
}

/// Build the catalog for an explicit capability set. Descriptors whose
/// libraries are unavailable are omitted, never an error.
pub fn build_registry_with(capabilities: &Capabilities) -> Vec<AlgorithmDescriptor> {
    let mut algorithms = vec![
        pair(
            "KMeans",
            kmeans_reference,
            kmeans_accelerated,
            Params::new()
                .with("init", "random")
                .with("n_clusters", 8)
                .with("max_iter", 300),
        )
        .accepts_labels(false)
        .with_accuracy(HOMOGENEITY),
        pair("PCA", pca_reference, pca_accelerated, Params::new().with("n_components", 10)).accepts_labels(false),
        pair("TruncatedSVD", tsvd_reference, tsvd_accelerated, Params::new().with("n_components", 10))
            .named("tSVD")
            .accepts_labels(false),
        pair(
            "GaussianRandomProjection",
            grp_reference,
            grp_accelerated,
            Params::new().with("n_components", "auto"),
        )
        .accepts_labels(false)
        .with_entry_point(EntryPoint::FitTransform),
        pair(
            "NearestNeighbors",
            nn_reference,
            nn_accelerated,
            Params::new().with("n_neighbors", 1024),
        )
        .with_reference_params(Params::new().with("algorithm", "brute").with("n_jobs", -1))
        .accepts_labels(false)
        .with_entry_point(EntryPoint::FitKNeighbors),
        pair(
            "DBSCAN",
            dbscan_reference,
            dbscan_accelerated,
            Params::new().with("eps", 3.0).with("min_samples", 2),
        )
        .with_reference_params(Params::new().with("algorithm", "brute"))
        .accepts_labels(false),
        pair("LinearRegression", linear_reference, linear_accelerated, Params::new()).with_accuracy(R2),
        pair(
            "ElasticNet",
            elastic_net_reference,
            elastic_net_accelerated,
            Params::new().with("alpha", 0.1).with("l1_ratio", 0.5),
        )
        .with_accuracy(R2),
        pair("Lasso", lasso_reference, lasso_accelerated, Params::new()).with_accuracy(R2),
        pair("Ridge", ridge_reference, ridge_accelerated, Params::new()).with_accuracy(R2),
        pair(
            "LogisticRegression",
            logistic_reference,
            logistic_accelerated,
            Params::new().with("solver", "lbfgs"),
        )
        .with_accuracy(ACCURACY),
        pair(
            "RandomForestClassifier",
            rfc_reference,
            rfc_accelerated,
            Params::new().with("max_features", 1.0).with("n_estimators", 10),
        )
        .with_prep(DataPrepHook::LabelsToInt)
        .with_accuracy(ACCURACY),
        pair(
            "RandomForestRegressor",
            rfr_reference,
            rfr_accelerated,
            Params::new().with("max_features", 1.0).with("n_estimators", 10),
        )
        .with_accuracy(R2),
        pair("TSNE", tsne_reference, tsne_accelerated, Params::new()).accepts_labels(false),
        AlgorithmDescriptor::new(None, Backend::new("MBSGDClassifier", mbsgd_accelerated), Params::new())
            .with_accelerated_params(Params::new().with("eta0", 0.005).with("epochs", 100))
            .with_accuracy(ACCURACY),
    ];

    let fil_reference = tree_runtime_backend(capabilities);
    let mut fil = AlgorithmDescriptor::new(
        fil_reference,
        Backend::new("ForestInference", fil_accelerated),
        Params::new().with("num_rounds", 10).with("max_depth", 10),
    )
    .named("FIL")
    .with_accelerated_params(
        Params::new()
            .with("fil_algo", "BATCH_TREE_REORG")
            .with("output_class", true)
            .with("threshold", 0.5)
            .with("storage_type", "AUTO"),
    )
    .accepts_labels(false)
    .with_entry_point(EntryPoint::Predict)
    .with_accelerated_setup(load_trained_forest)
    .with_accuracy(TREE_INFERENCE_ACCURACY);
    if fil.has_reference() {
        fil = fil
            .with_reference_setup(load_trained_forest)
            .with_reference_prep(DataPrepHook::TreeBatchFormat);
    }
    algorithms.push(fil);

    if let Some(umap) = umap_descriptor(capabilities) {
        algorithms.push(umap);
    }

    debug!(count = algorithms.len(), ?capabilities, "algorithm registry built");
    algorithms
}

#[cfg(feature = "tree-runtime")]
fn tree_runtime_backend(capabilities: &Capabilities) -> Option<Backend> {
    capabilities
        .tree_runtime
        .then(|| Backend::new("TreeRuntimePredictor", tree_runtime_reference))
}

#[cfg(not(feature = "tree-runtime"))]
fn tree_runtime_backend(_capabilities: &Capabilities) -> Option<Backend> {
    None
}

#[cfg(feature = "umap")]
fn umap_descriptor(capabilities: &Capabilities) -> Option<AlgorithmDescriptor> {
    capabilities.density_embedding.then(|| {
        pair(
            "UMAP",
            umap_reference,
            umap_accelerated,
            Params::new().with("n_neighbors", 5).with("n_epochs", 500),
        )
        .accepts_labels(false)
        .with_accuracy(TRUSTWORTHINESS)
    })
}

#[cfg(not(feature = "umap"))]
fn umap_descriptor(_capabilities: &Capabilities) -> Option<AlgorithmDescriptor> {
    None
}

/// Case-insensitive lookup; the first match wins when names repeat.
pub fn find_by_name<'a>(algorithms: &'a [AlgorithmDescriptor], name: &str) -> Option<&'a AlgorithmDescriptor> {
    algorithms
        .iter()
        .find(|algorithm| algorithm.name().eq_ignore_ascii_case(name))
}
