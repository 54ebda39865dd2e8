//! OS print-spooler transport. `connect()` checks the named printer is
//! known to the spooler; `send()` streams raw bytes to it via `lp -o raw`,
//! bypassing any driver-side reinterpretation of the ESC/POS stream.
//!
//! The printer name reaches a shell-adjacent API (a spawned process
//! argument list, not a shell string, but treated as untrusted regardless)
//! so it is validated once at construction rather than at every send.

use crate::{Result, Transport, TransportError, TransportState, TransportStatus};
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Rejects anything that could be interpreted specially by a shell or by
/// the spooler's own argument parsing: quotes, backslash, control
/// characters (including NUL and newline), and common metacharacters.
fn validate_printer_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TransportError::InvalidPrinterName(
            "printer name is empty".to_string(),
        ));
    }
    let forbidden = |c: char| {
        c.is_control()
            || matches!(
                c,
                '\'' | '"'
                    | '\\'
                    | '`'
                    | '$'
                    | '|'
                    | '&'
                    | ';'
                    | '<'
                    | '>'
                    | '('
                    | ')'
                    | '{'
                    | '}'
                    | '*'
                    | '?'
                    | '~'
                    | '\n'
                    | '\r'
                    | '\0'
            )
    };
    if name.chars().any(forbidden) {
        return Err(TransportError::InvalidPrinterName(format!(
            "printer name {name:?} contains disallowed characters"
        )));
    }
    Ok(())
}

pub struct OsPrinterTransport {
    printer_name: String,
    state: TransportState,
    status: TransportStatus,
}

impl OsPrinterTransport {
    pub fn new(printer_name: impl Into<String>) -> Result<Self> {
        let printer_name = printer_name.into();
        validate_printer_name(&printer_name)?;
        Ok(Self {
            printer_name,
            state: TransportState::Disconnected,
            status: TransportStatus::default(),
        })
    }
}

#[async_trait]
impl Transport for OsPrinterTransport {
    async fn connect(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;
        let output = Command::new("lpstat")
            .arg("-p")
            .arg(&self.printer_name)
            .output()
            .await
            .map_err(|e| TransportError::Io(format!("lpstat failed: {e}")))?;
        if !output.status.success() {
            self.state = TransportState::Error;
            return Err(TransportError::Io(format!(
                "printer {:?} not known to spooler",
                self.printer_name
            )));
        }
        self.state = TransportState::Connected;
        self.status.connected = true;
        self.status.last_connected = Some(SystemTime::now());
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.state = TransportState::Disconnected;
        self.status.connected = false;
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut child = Command::new("lp")
            .arg("-d")
            .arg(&self.printer_name)
            .arg("-o")
            .arg("raw")
            .stdin(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::Io(format!("lp spawn failed: {e}")))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("lp: no stdin handle".to_string()))?;
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        drop(stdin);
        let status = child
            .wait()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        if !status.success() {
            return Err(TransportError::Io(format!(
                "lp exited with status {status}"
            )));
        }
        self.status.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    async fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>> {
        // The OS spooler is a write-only sink; there is no status channel
        // to read from here. Status comes from `lpstat` polling, done by
        // the printer status monitor above this transport, not here.
        Err(TransportError::NotConnected)
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn status(&self) -> TransportStatus {
        self.status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_shell_metacharacters() {
        for bad in ["foo; rm -rf", "foo`whoami`", "foo$(id)", "foo|cat", "foo\"bar", "foo\nbar"] {
            assert!(OsPrinterTransport::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn accepts_plain_names() {
        assert!(OsPrinterTransport::new("Kitchen-Printer-1").is_ok());
        assert!(OsPrinterTransport::new("HP_LaserJet_400").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(OsPrinterTransport::new("").is_err());
    }
}
