//! Cluster lifecycle management.

use crate::config::{ClusterConfig, Protocol};
use crate::error::ClusterError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Starts and stops clusters. Every handle returned by `acquire` must be
/// passed back to `release` exactly once.
pub trait ClusterManager {
    type Handle;

    fn acquire(&self, config: &ClusterConfig) -> Result<Self::Handle, ClusterError>;

    fn release(&self, handle: Self::Handle) -> Result<(), ClusterError>;
}

/// A running in-process cluster: one rayon pool with a thread per worker.
pub struct LocalClusterHandle {
    id: u64,
    config: ClusterConfig,
    pool: rayon::ThreadPool,
}

impl LocalClusterHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn scheduler_address(&self) -> String {
        format!("{}://local/{}", self.config.protocol, self.id)
    }

    /// Run `op` with the cluster's workers as the active rayon pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for LocalClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClusterHandle")
            .field("id", &self.id)
            .field("protocol", &self.config.protocol)
            .field("n_workers", &self.n_workers())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct LocalCluster {
    next_id: AtomicU64,
    active: Mutex<HashSet<u64>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clusters acquired and not yet released.
    pub fn active_clusters(&self) -> usize {
        self.tracked().len()
    }

    /// The set survives a panic in another holder; its contents stay valid.
    fn tracked(&self) -> MutexGuard<'_, HashSet<u64>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterManager for LocalCluster {
    type Handle = LocalClusterHandle;

    fn acquire(&self, config: &ClusterConfig) -> Result<Self::Handle, ClusterError> {
        config.validate()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let create_context = config.create_device_context;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.n_workers)
            .thread_name(move |index| format!("pairbench-cluster-{id}-worker-{index}"))
            .start_handler(move |index| {
                if create_context {
                    debug!(cluster = id, worker = index, "device context created");
                }
            })
            .build()?;
        self.tracked().insert(id);
        info!(
            cluster = id,
            protocol = %config.protocol,
            workers = config.n_workers,
            "local cluster started"
        );
        Ok(LocalClusterHandle {
            id,
            config: config.clone(),
            pool,
        })
    }

    fn release(&self, handle: Self::Handle) -> Result<(), ClusterError> {
        if !self.tracked().remove(&handle.id) {
            return Err(ClusterError::UnknownCluster { id: handle.id });
        }
        info!(cluster = handle.id, "local cluster closed");
        // Dropping the pool joins its worker threads.
        drop(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_starts_requested_workers() {
        let manager = LocalCluster::new();
        let handle = manager.acquire(&ClusterConfig::tcp().with_workers(3)).unwrap();
        assert_eq!(handle.n_workers(), 3);
        assert_eq!(handle.install(rayon::current_num_threads), 3);
        assert!(handle.scheduler_address().starts_with("tcp://"));
        assert_eq!(manager.active_clusters(), 1);
        manager.release(handle).unwrap();
        assert_eq!(manager.active_clusters(), 0);
    }

    #[test]
    fn invalid_config_starts_nothing() {
        let manager = LocalCluster::new();
        assert!(manager.acquire(&ClusterConfig::tcp().with_workers(0)).is_err());
        assert_eq!(manager.active_clusters(), 0);
    }

    #[test]
    fn handles_belong_to_their_manager() {
        let first = LocalCluster::new();
        let second = LocalCluster::new();
        let handle = first.acquire(&ClusterConfig::ucx().with_workers(1)).unwrap();
        assert!(matches!(
            second.release(handle),
            Err(ClusterError::UnknownCluster { id: 0 })
        ));
        assert_eq!(first.active_clusters(), 1);
    }

    #[test]
    fn tracking_survives_a_poisoned_lock() {
        let manager = LocalCluster::new();
        let handle = manager.acquire(&ClusterConfig::tcp().with_workers(1)).unwrap();
        std::thread::scope(|scope| {
            let poisoned = scope
                .spawn(|| {
                    let _guard = manager.active.lock().unwrap();
                    panic!("holder panicked");
                })
                .join();
            assert!(poisoned.is_err());
        });
        assert!(manager.active.is_poisoned());

        assert_eq!(manager.active_clusters(), 1);
        let second = manager.acquire(&ClusterConfig::tcp().with_workers(1)).unwrap();
        assert_eq!(manager.active_clusters(), 2);
        manager.release(handle).unwrap();
        manager.release(second).unwrap();
        assert_eq!(manager.active_clusters(), 0);
    }
}
