#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("executor capacity must be at least 1")]
    ZeroCapacity,

    #[error("executor has been shut down")]
    Shutdown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
