//! Scoped cluster acquisition for tests.

use crate::config::ClusterConfig;
use crate::error::ClusterError;
use crate::manager::ClusterManager;
use std::ops::Deref;
use tracing::warn;

/// Holds a cluster for the lifetime of a test scope and releases it on drop,
/// including when the scope unwinds from a panic.
pub struct ClusterFixture<'m, M: ClusterManager> {
    manager: &'m M,
    handle: Option<M::Handle>,
}

impl<'m, M: ClusterManager> ClusterFixture<'m, M> {
    pub fn new(manager: &'m M, config: &ClusterConfig) -> Result<Self, ClusterError> {
        let handle = manager.acquire(config)?;
        Ok(Self {
            manager,
            handle: Some(handle),
        })
    }

    /// Release now and report the outcome instead of logging it on drop.
    pub fn close(mut self) -> Result<(), ClusterError> {
        match self.handle.take() {
            Some(handle) => self.manager.release(handle),
            None => Ok(()),
        }
    }
}

impl<M: ClusterManager> Deref for ClusterFixture<'_, M> {
    type Target = M::Handle;

    fn deref(&self) -> &Self::Target {
        // Only `close` and `drop` take the handle, and both consume the fixture.
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("cluster fixture used after release"),
        }
    }
}

impl<M: ClusterManager> Drop for ClusterFixture<'_, M> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.manager.release(handle) {
                warn!(error = %err, "failed to release cluster fixture");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::LocalCluster;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn drop_releases_cluster() {
        let manager = LocalCluster::new();
        {
            let cluster = ClusterFixture::new(&manager, &ClusterConfig::tcp().with_workers(2)).unwrap();
            assert_eq!(cluster.n_workers(), 2);
            assert_eq!(manager.active_clusters(), 1);
        }
        assert_eq!(manager.active_clusters(), 0);
    }

    #[test]
    fn panic_still_releases_cluster() {
        let manager = LocalCluster::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _cluster = ClusterFixture::new(&manager, &ClusterConfig::ucx().with_workers(1)).unwrap();
            panic!("test body failed");
        }));
        assert!(outcome.is_err());
        assert_eq!(manager.active_clusters(), 0);
    }

    #[test]
    fn close_reports_release() {
        let manager = LocalCluster::new();
        let cluster = ClusterFixture::new(&manager, &ClusterConfig::tcp().with_workers(1)).unwrap();
        cluster.close().unwrap();
        assert_eq!(manager.active_clusters(), 0);
    }
}
