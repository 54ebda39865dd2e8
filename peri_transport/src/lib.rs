//! Uniform asynchronous byte-pipe abstraction. A [Transport] owns exactly one
//! underlying link (serial port, Bluetooth RFCOMM device, TCP socket, or the
//! OS print spooler) and is itself owned by exactly one caller — per-transport
//! `send`/`receive` are not meant to be called concurrently; the protocol
//! engine or printer worker above it is the sole caller and serializes them.

pub mod backoff;
pub mod bluetooth;
pub mod buffer;
pub mod network;
pub mod os_printer;
pub mod reconnect;
pub mod serial;

use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

#[derive(Debug, Clone, Default)]
pub struct TransportStatus {
    pub connected: bool,
    pub last_connected: Option<SystemTime>,
    pub last_error: Option<String>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection timed out")]
    ConnectionTimeout,
    #[error("transport error: {0}")]
    Io(String),
    #[error("not connected")]
    NotConnected,
    #[error("receive timed out")]
    ReceiveTimeout,
    #[error("connect failed after retries: {0}")]
    ConnectionFailed(String),
    #[error("invalid printer name: {0}")]
    InvalidPrinterName(String),
}

impl TransportError {
    /// Whether the auto-reconnect policy should act on this error. Connect
    /// errors before any success are handled by the caller's retry loop
    /// instead, once retries are exhausted.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::NotConnected
                | TransportError::ReceiveTimeout
                | TransportError::ConnectionTimeout
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Shared connect/retry/reconnect parameters. `retry_base_delay` and the 5s
/// backoff cap apply both to the initial connect-retry loop and to
/// auto-reconnect after a connected link is lost.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub auto_reconnect: bool,
    pub reconnect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            auto_reconnect: true,
            reconnect_timeout: Duration::from_secs(60),
        }
    }
}

/// The cap on exponential backoff delays, per spec: auto-reconnect and queue
/// retry both saturate at 5 seconds between attempts.
pub const BACKOFF_CAP: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<()>;

    /// Best-effort; never fails destructively even if the link is already
    /// down.
    async fn disconnect(&mut self);

    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Returns the next available chunk (at least one byte) or a
    /// `receive-timeout` if none arrives within `timeout`.
    async fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    async fn send_and_receive(&mut self, bytes: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.send(bytes).await?;
        self.receive(timeout).await
    }

    fn state(&self) -> TransportState;

    fn status(&self) -> TransportStatus;
}

/// Drives `connect()` through up to `config.max_retries` attempts, delaying
/// `retry_base_delay * 2^(k-1)` before attempt *k* and racing each attempt
/// against `connect_timeout`. Surfaces `ConnectionFailed` once exhausted.
pub async fn connect_with_retry<T: Transport + ?Sized>(
    transport: &mut T,
    config: &TransportConfig,
) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=config.max_retries.max(1) {
        if attempt > 1 {
            let delay = backoff::delay_for_attempt(config.retry_base_delay, attempt - 1, BACKOFF_CAP);
            tokio::time::sleep(delay).await;
        }
        match tokio::time::timeout(config.connect_timeout, transport.connect()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some("connect timed out".to_string()),
        }
        log::warn!("connect attempt {attempt} failed: {:?}", last_err);
    }
    Err(TransportError::ConnectionFailed(
        last_err.unwrap_or_else(|| "no attempts made".to_string()),
    ))
}
