use anyhow::Result;
use pairbench::cluster::{ClusterConfig, ClusterFixture, LocalCluster, Protocol};
use pairbench::registry::{build_registry, find_by_name, Overrides};
use pairbench::runner::{generate, DatasetKind};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[test]
fn accelerated_backend_runs_on_the_cluster_workers() -> Result<()> {
    let manager = LocalCluster::new();
    let cluster = ClusterFixture::new(&manager, &ClusterConfig::tcp().with_workers(2))?;
    assert_eq!(cluster.protocol(), Protocol::Tcp);
    assert_eq!(cluster.n_workers(), 2);

    let registry = build_registry();
    let kmeans = find_by_name(&registry, "KMeans").expect("registered");
    let data = generate(DatasetKind::Blobs, 64, 3, 5)?;
    let fitted = cluster.install(|| kmeans.run_accelerated(&data, Overrides::new()))?;
    assert!(fitted.is_fitted());

    cluster.close()?;
    assert_eq!(manager.active_clusters(), 0);
    Ok(())
}

#[test]
fn cluster_is_released_when_a_test_panics() {
    let manager = LocalCluster::new();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let _cluster = ClusterFixture::new(&manager, &ClusterConfig::ucx().with_workers(1)).unwrap();
        assert_eq!(manager.active_clusters(), 1);
        panic!("test body failed");
    }));
    assert!(outcome.is_err());
    assert_eq!(manager.active_clusters(), 0);
}

#[test]
fn invalid_configuration_never_acquires() {
    let manager = LocalCluster::new();
    let config = ClusterConfig {
        enable_nvlink: true,
        ..ClusterConfig::tcp()
    };
    assert!(ClusterFixture::new(&manager, &config).is_err());
    assert_eq!(manager.active_clusters(), 0);
}
