//! Generic ECR protocol engine: a compact binary frame format for
//! terminals that speak neither ZVT nor PAX. Gets its own framing for the
//! same reason [crate::pax] does — the wire shape doesn't fit
//! [crate::frame_io::FrameIo]'s ADPU assumptions.

use anyhow::{anyhow, bail, Result};
use peri_transport::Transport;
use std::time::Duration;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericCommand {
    Sale,
    Refund,
    Void,
    PreAuth,
    PreAuthComplete,
    Status,
    Abort,
    Settlement,
}

impl GenericCommand {
    fn code(self) -> u8 {
        match self {
            GenericCommand::Sale => 0x01,
            GenericCommand::Refund => 0x02,
            GenericCommand::Void => 0x03,
            GenericCommand::PreAuth => 0x04,
            GenericCommand::PreAuthComplete => 0x05,
            GenericCommand::Status => 0x06,
            GenericCommand::Abort => 0x07,
            GenericCommand::Settlement => 0x08,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericTransactionPayload {
    pub amount_minor_units: u32,
    /// Numeric ISO-4217 currency code (EUR=978, USD=840).
    pub currency: u16,
    pub reference: String,
}

impl GenericTransactionPayload {
    fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(26);
        data.extend_from_slice(&self.amount_minor_units.to_be_bytes());
        data.extend_from_slice(&self.currency.to_be_bytes());
        let mut reference = self.reference.clone().into_bytes();
        reference.resize(20, b' ');
        data.extend_from_slice(&reference[..20]);
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericResponseCode {
    Approved,
    Declined,
    Cancelled,
    Timeout,
}

impl GenericResponseCode {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x00 => Ok(GenericResponseCode::Approved),
            0x01 => Ok(GenericResponseCode::Declined),
            0x02 => Ok(GenericResponseCode::Cancelled),
            0x03 => Ok(GenericResponseCode::Timeout),
            other => bail!("unknown generic-ECR response code {other:#04x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericEntryMethod {
    Chip,
    Contactless,
    Swipe,
    Manual,
    Unknown(u8),
}

impl GenericEntryMethod {
    fn from_byte(b: u8) -> Self {
        match b {
            0x01 => GenericEntryMethod::Chip,
            0x02 => GenericEntryMethod::Contactless,
            0x03 => GenericEntryMethod::Swipe,
            0x04 => GenericEntryMethod::Manual,
            other => GenericEntryMethod::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericOutcome {
    pub code: GenericResponseCode,
    pub auth_code: Option<String>,
    pub card_last_four: Option<String>,
    pub card_type: Option<u8>,
    pub entry_method: Option<GenericEntryMethod>,
}

/// Received while a transaction is in progress; carries free-form ASCII
/// progress text. Commands `0x10..=0x1f` are reserved for these.
#[derive(Debug, Clone)]
pub struct GenericIntermediateStatus {
    pub text: String,
}

pub enum GenericEvent {
    Intermediate(GenericIntermediateStatus),
    Final(GenericOutcome),
}

fn lrc_over(len_bytes: &[u8], cmd: u8, data: &[u8]) -> u8 {
    len_bytes
        .iter()
        .copied()
        .chain(std::iter::once(cmd))
        .chain(data.iter().copied())
        .fold(0u8, |acc, b| acc ^ b)
}

fn build_frame(cmd: GenericCommand, data: &[u8], extended_length: bool) -> Vec<u8> {
    let len_bytes: Vec<u8> = if extended_length {
        let len = data.len() as u32;
        vec![(len >> 16) as u8, (len >> 8) as u8, len as u8]
    } else {
        vec![data.len() as u8]
    };

    let lrc = lrc_over(&len_bytes, cmd.code(), data);

    let mut frame = Vec::with_capacity(3 + len_bytes.len() + data.len());
    frame.push(STX);
    frame.extend_from_slice(&len_bytes);
    frame.push(cmd.code());
    frame.extend_from_slice(data);
    frame.push(lrc);
    frame.push(ETX);
    frame
}

struct ParsedFrame {
    cmd: u8,
    data: Vec<u8>,
}

fn try_parse_frame(buf: &[u8], extended_length: bool) -> Option<(ParsedFrame, usize)> {
    if buf.first() != Some(&STX) {
        return None;
    }
    let len_size = if extended_length { 3 } else { 1 };
    if buf.len() < 1 + len_size + 1 {
        return None;
    }
    let len_bytes = &buf[1..1 + len_size];
    let data_len = if extended_length {
        ((len_bytes[0] as usize) << 16) | ((len_bytes[1] as usize) << 8) | len_bytes[2] as usize
    } else {
        len_bytes[0] as usize
    };

    let cmd_index = 1 + len_size;
    let data_start = cmd_index + 1;
    let data_end = data_start + data_len;
    let lrc_index = data_end;
    let etx_index = lrc_index + 1;
    if buf.len() <= etx_index {
        return None;
    }
    if buf[etx_index] != ETX {
        return None;
    }

    let cmd = buf[cmd_index];
    let data = buf[data_start..data_end].to_vec();
    let computed = lrc_over(len_bytes, cmd, &data);
    if computed != buf[lrc_index] {
        return None;
    }

    Some((ParsedFrame { cmd, data }, etx_index + 1))
}

async fn read_one_frame(transport: &mut dyn Transport, timeout: Duration, buf: &mut Vec<u8>, extended_length: bool) -> Result<ParsedFrame> {
    loop {
        if let Some((frame, consumed)) = try_parse_frame(buf, extended_length) {
            buf.drain(..consumed);
            return Ok(frame);
        }
        let chunk = transport.receive(timeout).await.map_err(|e| anyhow!("generic-ECR receive failed: {e}"))?;
        buf.extend_from_slice(&chunk);
    }
}

fn decode_outcome(frame: &ParsedFrame) -> Result<GenericOutcome> {
    let code = GenericResponseCode::from_byte(*frame.data.first().ok_or_else(|| anyhow!("empty response payload"))?)?;
    if code != GenericResponseCode::Approved {
        return Ok(GenericOutcome {
            code,
            auth_code: None,
            card_last_four: None,
            card_type: None,
            entry_method: None,
        });
    }

    let data = &frame.data[1..];
    if data.len() < 12 {
        bail!("approved response payload too short");
    }
    let auth_code = String::from_utf8_lossy(&data[0..6]).to_string();
    let card_last_four = String::from_utf8_lossy(&data[6..10]).to_string();
    let card_type = data[10];
    let entry_method = GenericEntryMethod::from_byte(data[11]);

    Ok(GenericOutcome {
        code,
        auth_code: Some(auth_code),
        card_last_four: Some(card_last_four),
        card_type: Some(card_type),
        entry_method: Some(entry_method),
    })
}

/// Sends a transaction command and drives the intermediate/final response
/// loop, invoking `on_event` for every message until a final outcome is
/// produced.
pub async fn run_transaction(
    transport: &mut dyn Transport,
    timeout: Duration,
    cmd: GenericCommand,
    payload: &GenericTransactionPayload,
    extended_length: bool,
    mut on_event: impl FnMut(&GenericEvent),
) -> Result<GenericOutcome> {
    let frame = build_frame(cmd, &payload.encode(), extended_length);
    transport.send(&frame).await.map_err(|e| anyhow!("generic-ECR send failed: {e}"))?;

    let mut buf = Vec::new();
    loop {
        let parsed = read_one_frame(transport, timeout, &mut buf, extended_length).await?;
        if (0x10..=0x1f).contains(&parsed.cmd) {
            let status = GenericIntermediateStatus {
                text: String::from_utf8_lossy(&parsed.data).to_string(),
            };
            on_event(&GenericEvent::Intermediate(status));
            continue;
        }
        let outcome = decode_outcome(&parsed)?;
        on_event(&GenericEvent::Final(outcome.clone()));
        return Ok(outcome);
    }
}

pub async fn abort(transport: &mut dyn Transport, timeout: Duration, extended_length: bool) -> Result<()> {
    let frame = build_frame(GenericCommand::Abort, &[], extended_length);
    transport.send(&frame).await.map_err(|e| anyhow!("generic-ECR abort send failed: {e}"))?;
    let mut buf = Vec::new();
    read_one_frame(transport, timeout, &mut buf, extended_length).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        let payload = GenericTransactionPayload {
            amount_minor_units: 1234,
            currency: 978,
            reference: "order-1".to_string(),
        };
        let frame = build_frame(GenericCommand::Sale, &payload.encode(), false);
        let (parsed, consumed) = try_parse_frame(&frame, false).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(parsed.cmd, GenericCommand::Sale.code());
        assert_eq!(parsed.data.len(), 26);
    }

    #[test]
    fn extended_length_frame_round_trips() {
        let payload = GenericTransactionPayload {
            amount_minor_units: 999,
            currency: 840,
            reference: "x".to_string(),
        };
        let frame = build_frame(GenericCommand::Refund, &payload.encode(), true);
        let (parsed, consumed) = try_parse_frame(&frame, true).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(parsed.cmd, GenericCommand::Refund.code());
    }

    #[test]
    fn approved_payload_decodes_card_fields() {
        let mut data = vec![0x00];
        data.extend_from_slice(b"123456");
        data.extend_from_slice(b"1234");
        data.push(0x02);
        data.push(0x01);
        let frame = ParsedFrame { cmd: GenericCommand::Sale.code(), data };
        let outcome = decode_outcome(&frame).unwrap();
        assert_eq!(outcome.code, GenericResponseCode::Approved);
        assert_eq!(outcome.auth_code.as_deref(), Some("123456"));
        assert_eq!(outcome.card_last_four.as_deref(), Some("1234"));
        assert_eq!(outcome.entry_method, Some(GenericEntryMethod::Chip));
    }

    #[test]
    fn declined_payload_has_no_card_fields() {
        let frame = ParsedFrame { cmd: GenericCommand::Sale.code(), data: vec![0x01] };
        let outcome = decode_outcome(&frame).unwrap();
        assert_eq!(outcome.code, GenericResponseCode::Declined);
        assert!(outcome.auth_code.is_none());
    }

    #[test]
    fn tampered_lrc_is_not_recognized_as_a_complete_frame() {
        let payload = GenericTransactionPayload {
            amount_minor_units: 1,
            currency: 978,
            reference: "r".to_string(),
        };
        let mut frame = build_frame(GenericCommand::Sale, &payload.encode(), false);
        let lrc_index = frame.len() - 2;
        frame[lrc_index] ^= 0xff;
        assert!(try_parse_frame(&frame, false).is_none());
    }
}
