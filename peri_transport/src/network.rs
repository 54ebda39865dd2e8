//! TCP transport. Used by the ZVT/Generic ECR engines (default ports
//! 20007/none) and by the raw-TCP thermal printer link (port 9100).

use crate::buffer::RecvBuffer;
use crate::{Result, Transport, TransportError, TransportState, TransportStatus};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct NetworkConfig {
    pub addr: SocketAddr,
    pub keepalive: Option<Duration>,
}

pub struct NetworkTransport {
    config: NetworkConfig,
    write_half: Option<tokio::net::tcp::OwnedWriteHalf>,
    recv: Option<RecvBuffer>,
    reader_task: Option<JoinHandle<()>>,
    state: TransportState,
    status: TransportStatus,
}

impl NetworkTransport {
    pub fn new(config: NetworkConfig) -> Self {
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
impl Transport for NetworkTransport {
    async fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;
        let stream = TcpStream::connect(self.config.addr)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if let Some(interval) = self.config.keepalive {
            let sock_ref = socket2::SockRef::from(&stream);
            let keepalive = socket2::TcpKeepalive::new().with_time(interval);
            let _ = sock_ref.set_tcp_keepalive(&keepalive);
        }

        let (mut read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let _ = tx.send(Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            "connection closed",
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
            // Graceful shutdown with a hard-close watchdog: don't hang
            // forever if the peer never acknowledges the FIN.
            let _ = tokio::time::timeout(Duration::from_secs(1), write_half.shutdown()).await;
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
