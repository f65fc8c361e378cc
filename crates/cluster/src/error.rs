use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("`{option}` is only available with the UCX protocol")]
    RequiresUcx { option: &'static str },

    #[error("a cluster needs at least one worker")]
    NoWorkers,

    #[error("named network device selection must list at least one device")]
    EmptyNetDevices,

    #[error("cluster {id} is not active on this manager")]
    UnknownCluster { id: u64 },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
