//! Flat, crate-boundary error type. Mirrors the shape of `peri_ecr`'s
//! `ZVTError`/`PaxError` enums and the teacher-adjacent daemon's
//! `DaemonError`: one enum per concern, `#[from]` conversions at the edges,
//! `anyhow` only where a function just needs to propagate with context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("printer {0} not found")]
    NotFound(String),

    #[error("printer {0} is offline")]
    Offline(String),

    #[error("queue storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("routing error: {0}")]
    Routing(String),

    #[error("transport error: {0}")]
    Transport(#[from] peri_transport::TransportError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PrinterError>;
