//! RS-232 serial transport, the traditional ZVT wire. Defaults match the
//! terminals this protocol targets: 9600 8N1, no flow control.

use crate::buffer::RecvBuffer;
use crate::{Result, Transport, TransportError, TransportState, TransportStatus};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 9600,
        }
    }
}

pub struct SerialTransport {
    config: SerialConfig,
    write_half: Option<tokio::io::WriteHalf<tokio_serial::SerialStream>>,
    recv: Option<RecvBuffer>,
    reader_task: Option<JoinHandle<()>>,
    state: TransportState,
    status: TransportStatus,
}

impl SerialTransport {
    pub fn new(config: SerialConfig) -> Self {
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
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;
        let port = tokio_serial::new(&self.config.path, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        let (mut read_half, write_half) = tokio::io::split(port);
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let _ = tx.send(Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "serial port closed",
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
        let write_half = self
            .write_half
            .as_mut()
            .ok_or(TransportError::NotConnected)?;
        write_half
            .write_all(bytes)
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
