use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("device {0} not found")]
    DeviceNotFound(uuid::Uuid),

    #[error("a device named {0:?} already exists")]
    NameCollision(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(uuid::Uuid),

    #[error("a transaction is already in progress on device {0}")]
    TransactionInProgress(uuid::Uuid),

    #[error("invalid connection details: {0}")]
    InvalidConnection(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("printer error: {0}")]
    Printer(#[from] peri_printer::PrinterError),

    #[error("transport error: {0}")]
    Transport(#[from] peri_transport::TransportError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Configuration errors are reported synchronously and never retried;
    /// everything else may be worth a caller-side retry.
    pub fn recoverable(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::DeviceNotFound(_)
                | OrchestratorError::NameCollision(_)
                | OrchestratorError::TransactionNotFound(_)
                | OrchestratorError::InvalidConnection(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
