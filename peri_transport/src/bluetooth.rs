//! Bluetooth Serial Port Profile transport for payment terminals and
//! printers that pair over RFCOMM.
//!
//! Pairing and RFCOMM binding happen outside this crate (`bluetoothctl
//! pair <mac>` then `rfcomm bind <channel> <mac>`, producing a device node
//! such as `/dev/rfcomm0`). Once bound, the device behaves like a serial
//! port: this transport opens it, puts the line discipline into raw mode so
//! binary frames pass through unmodified, and reads/writes it exactly like
//! [crate::serial].

use crate::buffer::RecvBuffer;
use crate::{Result, Transport, TransportError, TransportState, TransportStatus};
use async_trait::async_trait;
use nix::sys::termios::{self, SetArg};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, SystemTime};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct BluetoothConfig {
    /// Paired device MAC, kept for status reporting and reconnect logging —
    /// the actual I/O happens through `device_path`.
    pub mac_address: String,
    pub rfcomm_channel: u8,
    pub device_path: String,
}

impl BluetoothConfig {
    pub fn new(mac_address: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            rfcomm_channel: 1,
            device_path: device_path.into(),
        }
    }
}

fn configure_raw_mode(fd: i32) -> Result<()> {
    let mut attrs = termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })
        .map_err(|e| TransportError::Io(format!("tcgetattr failed: {e}")))?;
    termios::cfmakeraw(&mut attrs);
    termios::tcsetattr(
        unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) },
        SetArg::TCSANOW,
        &attrs,
    )
    .map_err(|e| TransportError::Io(format!("tcsetattr failed: {e}")))?;
    Ok(())
}

pub struct BluetoothTransport {
    config: BluetoothConfig,
    write_half: Option<tokio::io::WriteHalf<tokio::fs::File>>,
    recv: Option<RecvBuffer>,
    reader_task: Option<JoinHandle<()>>,
    state: TransportState,
    status: TransportStatus,
}

impl BluetoothTransport {
    pub fn new(config: BluetoothConfig) -> Self {
        Self {
            config,
            write_half: None,
            recv: None,
            reader_task: None,
            state: TransportState::Disconnected,
            status: TransportStatus::default(),
        }
    }
}

#[async_trait]
impl Transport for BluetoothTransport {
    async fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.device_path)
            .await
            .map_err(|e| {
                TransportError::Io(format!(
                    "failed to open {}: {e}",
                    self.config.device_path
                ))
            })?;
        configure_raw_mode(file.as_raw_fd())?;

        let (mut read_half, write_half) = tokio::io::split(file);
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let _ = tx.send(Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "rfcomm device closed",
                        )));
                        break;
                    }
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        self.write_half = Some(write_half);
        self.recv = Some(RecvBuffer::new(rx));
        self.reader_task = Some(reader_task);
        self.state = TransportState::Connected;
        self.status.connected = true;
        self.status.last_connected = Some(SystemTime::now());
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut write_half) = self.write_half.take() {
            let _ = write_half.shutdown().await;
        }
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.recv = None;
        self.state = TransportState::Disconnected;
        self.status.connected = false;
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        // Chunked to avoid overrunning the RFCOMM buffer on large printer
        // jobs; a small inter-chunk delay throttles throughput to roughly
        // what SPP sustains.
        const CHUNK_SIZE: usize = 4096;
        const CHUNK_DELAY: Duration = Duration::from_millis(20);

        let write_half = self
            .write_half
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        for (i, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
            write_half
                .write_all(chunk)
                .await
                .map_err(|e| TransportError::Io(e.to_string()))?;
        }
        write_half
            .flush()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.status.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let recv = self.recv.as_mut().ok_or(TransportError::NotConnected)?;
        let chunk = recv.receive(timeout).await?;
        self.status.bytes_received += chunk.len() as u64;
        Ok(chunk)
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn status(&self) -> TransportStatus {
        self.status.clone()
    }
}
