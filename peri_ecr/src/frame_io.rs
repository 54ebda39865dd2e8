//! Frames ZVT ADPU packets (`class instr length[ payload]`) on top of a
//! [peri_transport::Transport]. Replaces the split `io::PacketTransport` /
//! `logging::PacketWriter` pair the ZVT engine used to reach for — the two
//! never actually agreed on a method set, so every sequence gets its framing
//! from here instead, whatever transport backs it.

use crate::constants::error_message;
use crate::{ZvtParser, ZvtSerializer};
use anyhow::{anyhow, bail, Result};
use peri_transport::Transport;
use std::time::Duration;

/// Header is 3 bytes (`class instr length`) unless `length == 0xff`, which
/// marks an extended header: two more bytes carry the big-endian u16 length.
fn frame_header_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 3 {
        return None;
    }
    if buf[2] != 0xff {
        Some(3)
    } else if buf.len() >= 5 {
        Some(5)
    } else {
        None
    }
}

fn frame_payload_len(buf: &[u8], header_len: usize) -> usize {
    if header_len == 3 {
        buf[2] as usize
    } else {
        ((buf[3] as usize) << 8) | buf[4] as usize
    }
}

/// Reads and writes whole ADPU frames against a live transport, buffering
/// partial reads across `receive` calls the way [peri_transport::buffer]
/// does for raw transports.
pub struct FrameIo<'a> {
    transport: &'a mut dyn Transport,
    timeout: Duration,
    buf: Vec<u8>,
}

impl<'a> FrameIo<'a> {
    pub fn new(transport: &'a mut dyn Transport, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            buf: Vec::new(),
        }
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(header_len) = frame_header_len(&self.buf) {
                let total = header_len + frame_payload_len(&self.buf, header_len);
                if self.buf.len() >= total {
                    let frame: Vec<u8> = self.buf.drain(..total).collect();
                    log::debug!("read {frame:02x?}");
                    return Ok(frame);
                }
            }
            let chunk = self
                .transport
                .receive(self.timeout)
                .await
                .map_err(|e| anyhow!("transport receive failed: {e}"))?;
            self.buf.extend_from_slice(&chunk);
        }
    }

    /// Reads one complete frame and parses it as `T`, an enum of all packet
    /// types the PT might send in response to whatever was last written.
    pub async fn read_packet<T: ZvtParser>(&mut self) -> Result<T> {
        let frame = self.read_frame().await?;
        T::zvt_parse(&frame).map_err(|e| anyhow!("failed to parse response frame: {e}"))
    }

    /// Serializes and writes one command frame.
    pub async fn write_packet<T: ZvtSerializer>(&mut self, packet: &T) -> Result<()> {
        let bytes = packet.zvt_serialize();
        log::debug!("write {bytes:02x?}");
        self.transport
            .send(&bytes)
            .await
            .map_err(|e| anyhow!("transport send failed: {e}"))
    }

    /// Writes a command frame and waits for the PT's positive/negative
    /// acknowledgement, per chapter 2.2.2. A negative ACK's first payload
    /// byte is the error code.
    pub async fn write_packet_with_ack<T: ZvtSerializer>(&mut self, packet: &T) -> Result<()> {
        self.write_packet(packet).await?;
        let frame = self.read_frame().await?;
        match frame.get(0) {
            Some(0x80) => Ok(()),
            Some(0x84) => {
                let error = *frame.get(3).unwrap_or(&0);
                bail!("negative acknowledgement: {}", error_message(error));
            }
            _ => bail!("expected ACK/NACK, got frame starting {:02x?}", &frame[..frame.len().min(2)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use peri_transport::{Result as TResult, TransportState, TransportStatus};
    use std::collections::VecDeque;

    struct ScriptedTransport {
        chunks: VecDeque<Vec<u8>>,
        sent: Vec<u8>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(&mut self) -> TResult<()> {
            Ok(())
        }
        async fn disconnect(&mut self) {}
        async fn send(&mut self, bytes: &[u8]) -> TResult<()> {
            self.sent.extend_from_slice(bytes);
            Ok(())
        }
        async fn receive(&mut self, _timeout: Duration) -> TResult<Vec<u8>> {
            self.chunks
                .pop_front()
                .ok_or(peri_transport::TransportError::NotConnected)
        }
        fn state(&self) -> TransportState {
            TransportState::Connected
        }
        fn status(&self) -> TransportStatus {
            TransportStatus::default()
        }
    }

    #[tokio::test]
    async fn reassembles_a_frame_split_across_chunks() {
        let mut transport = ScriptedTransport {
            chunks: VecDeque::from([vec![0x80, 0x00], vec![0x00]]),
            sent: Vec::new(),
        };
        let mut io = FrameIo::new(&mut transport, Duration::from_secs(1));
        let frame = io.read_frame().await.unwrap();
        assert_eq!(frame, vec![0x80, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn extended_length_header_is_honored() {
        let mut payload = vec![0xaa; 300];
        let mut frame = vec![0x06, 0x01, 0xff, 0x01, 0x2c];
        frame.append(&mut payload);
        let mut transport = ScriptedTransport {
            chunks: VecDeque::from([frame.clone()]),
            sent: Vec::new(),
        };
        let mut io = FrameIo::new(&mut transport, Duration::from_secs(1));
        let got = io.read_frame().await.unwrap();
        assert_eq!(got, frame);
    }

    #[tokio::test]
    async fn negative_ack_surfaces_the_error_message() {
        let mut transport = ScriptedTransport {
            chunks: VecDeque::from([vec![0x84, 0x00, 0x01, 0x6c]]),
            sent: Vec::new(),
        };
        let mut io = FrameIo::new(&mut transport, Duration::from_secs(1));
        let err = io
            .write_packet_with_ack(&crate::packets::Ack {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("abort via timeout"));
    }
}
