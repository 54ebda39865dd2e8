//! Generic auto-reconnect loop, usable by any [crate::Transport]
//! implementation. The ZVT-terminal-specific version of this idea only
//! retried against one vendor's handshake; here it drives `connect()` on
//! whatever transport the caller hands it, so a printer's TCP link reuses
//! the exact same policy as a ZVT terminal's serial one.

use crate::backoff::delay_for_attempt;
use crate::{Transport, TransportConfig, TransportState, BACKOFF_CAP};
use futures::Stream;
use std::time::Instant;

/// Drives reconnect attempts against `transport` until either it reconnects
/// successfully or `config.reconnect_timeout` has elapsed since the link
/// was first noticed down. Yields a [TransportState] after every attempt so
/// the caller can surface state-change notifications (spec: transports
/// report Disconnected / Connecting / Connected / Reconnecting / Error).
pub fn reconnect_stream<'a, T: Transport + ?Sized>(
    transport: &'a mut T,
    config: &'a TransportConfig,
) -> impl Stream<Item = TransportState> + 'a {
    async_stream::stream! {
        if !config.auto_reconnect {
            yield TransportState::Error;
            return;
        }
        let deadline = Instant::now() + config.reconnect_timeout;
        let mut attempt: u32 = 1;
        loop {
            yield TransportState::Reconnecting;
            let delay = delay_for_attempt(config.retry_base_delay, attempt, BACKOFF_CAP);
            tokio::time::sleep(delay).await;

            match tokio::time::timeout(config.connect_timeout, transport.connect()).await {
                Ok(Ok(())) => {
                    yield TransportState::Connected;
                    return;
                }
                Ok(Err(e)) => {
                    log::warn!("reconnect attempt {attempt} failed: {e}");
                }
                Err(_) => {
                    log::warn!("reconnect attempt {attempt} timed out");
                }
            }

            if Instant::now() >= deadline {
                yield TransportState::Error;
                return;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Result, TransportStatus};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;

    struct FlakyTransport {
        fail_times: u32,
        attempts: u32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn connect(&mut self) -> Result<()> {
            self.attempts += 1;
            if self.attempts <= self.fail_times {
                Err(crate::TransportError::Io("simulated failure".to_string()))
            } else {
                Ok(())
            }
        }
        async fn disconnect(&mut self) {}
        async fn send(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        fn state(&self) -> TransportState {
            TransportState::Connected
        }
        fn status(&self) -> TransportStatus {
            TransportStatus::default()
        }
    }

    #[tokio::test]
    async fn reconnects_after_transient_failures() {
        let mut transport = FlakyTransport {
            fail_times: 2,
            attempts: 0,
        };
        let config = TransportConfig {
            retry_base_delay: Duration::from_millis(1),
            reconnect_timeout: Duration::from_secs(5),
            ..TransportConfig::default()
        };
        let states: Vec<_> = reconnect_stream(&mut transport, &config)
            .collect()
            .await;
        assert_eq!(states.last(), Some(&TransportState::Connected));
        assert_eq!(transport.attempts, 3);
    }

    #[tokio::test]
    async fn gives_up_when_auto_reconnect_disabled() {
        let mut transport = FlakyTransport {
            fail_times: 100,
            attempts: 0,
        };
        let config = TransportConfig {
            auto_reconnect: false,
            ..TransportConfig::default()
        };
        let states: Vec<_> = reconnect_stream(&mut transport, &config)
            .collect()
            .await;
        assert_eq!(states, vec![TransportState::Error]);
    }
}
