#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("{0}")]
    Bus(#[from] gw_event_bus::BusError),

    #[error("shutdown timed out after {0}s")]
    ShutdownTimeout(u64),

    #[error("startup task: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
