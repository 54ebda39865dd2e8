//! The receive model described for [crate::Transport]: a single internal byte
//! buffer fed by a background reader task, drained before any new wait
//! begins. The `mpsc` channel between the reader task and [RecvBuffer] plays
//! the role of the FIFO of pending receivers — since a transport's owner
//! serializes `send`/`receive` (see the module docs), there is never more
//! than one outstanding waiter in practice, so the channel's own ordering is
//! sufficient without a hand-rolled waiter queue.

use crate::{Result, TransportError};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

pub struct RecvBuffer {
    buffer: Vec<u8>,
    incoming: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>,
}

impl RecvBuffer {
    pub fn new(incoming: mpsc::UnboundedReceiver<std::io::Result<Vec<u8>>>) -> Self {
        Self {
            buffer: Vec::new(),
            incoming,
        }
    }

    /// Drains any already-buffered bytes; otherwise waits for the next chunk
    /// or `t`, whichever comes first.
    pub async fn receive(&mut self, t: Duration) -> Result<Vec<u8>> {
        if !self.buffer.is_empty() {
            return Ok(std::mem::take(&mut self.buffer));
        }
        self.next_chunk(t).await
    }

    /// Reads exactly `n` bytes, re-buffering any excess received past `n` for
    /// the next call.
    pub async fn receive_exact(&mut self, n: usize, t: Duration) -> Result<Vec<u8>> {
        while self.buffer.len() < n {
            let chunk = self.next_chunk(t).await?;
            self.buffer.extend_from_slice(&chunk);
        }
        let tail = self.buffer.split_off(n);
        Ok(std::mem::replace(&mut self.buffer, tail))
    }

    async fn next_chunk(&mut self, t: Duration) -> Result<Vec<u8>> {
        match timeout(t, self.incoming.recv()).await {
            Ok(Some(Ok(chunk))) => Ok(chunk),
            Ok(Some(Err(e))) => Err(TransportError::Io(e.to_string())),
            Ok(None) => Err(TransportError::NotConnected),
            Err(_) => Err(TransportError::ReceiveTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_buffer_before_waiting() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(vec![1, 2, 3])).unwrap();
        let mut buf = RecvBuffer::new(rx);
        let got = buf.receive(Duration::from_millis(50)).await.unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn receive_exact_rebuffers_tail() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Ok(vec![1, 2, 3, 4, 5])).unwrap();
        let mut buf = RecvBuffer::new(rx);
        let head = buf.receive_exact(3, Duration::from_millis(50)).await.unwrap();
        assert_eq!(head, vec![1, 2, 3]);
        let rest = buf.receive(Duration::from_millis(50)).await.unwrap();
        assert_eq!(rest, vec![4, 5]);
    }

    #[tokio::test]
    async fn times_out_when_nothing_arrives() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut buf = RecvBuffer::new(rx);
        let err = buf.receive(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, TransportError::ReceiveTimeout));
    }
}
