//! PAX protocol engine. Unlike ZVT this is a flat ASCII field protocol, not
//! an ADPU stream, so it gets its own minimal framing instead of
//! [crate::frame_io::FrameIo] — there is no shared packet model between
//! the two wire formats.

use anyhow::{anyhow, bail, Result};
use peri_transport::Transport;
use std::time::Duration;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const FS: u8 = 0x1c;
const VERSION: &str = "1.28";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaxCommand {
    Initialize,
    GetInfo,
    DoCredit,
    DoRefund,
    DoVoid,
    DoPreAuth,
    DoPostAuth,
    BatchClose,
    Reset,
}

impl PaxCommand {
    fn code(self) -> &'static str {
        match self {
            PaxCommand::Initialize => "A00",
            PaxCommand::GetInfo => "A14",
            PaxCommand::DoCredit | PaxCommand::DoRefund => "T00",
            PaxCommand::DoVoid => "T01",
            PaxCommand::DoPreAuth => "T02",
            PaxCommand::DoPostAuth => "T03",
            PaxCommand::BatchClose => "B00",
            PaxCommand::Reset => "A09",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaxTransType {
    Sale,
    Return,
    AuthOnly,
    PostAuth,
    Void,
}

impl PaxTransType {
    fn code(self) -> &'static str {
        match self {
            PaxTransType::Sale => "01",
            PaxTransType::Return => "02",
            PaxTransType::AuthOnly => "03",
            PaxTransType::PostAuth => "04",
            PaxTransType::Void => "05",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaxTransactionRequest {
    pub trans_type: Option<PaxTransType>,
    pub amount_cents: Option<u64>,
    pub tip_cents: Option<u64>,
    pub cashback_cents: Option<u64>,
    pub reference: Option<String>,
    pub edc_type: Option<String>,
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaxEntryMode {
    Chip,
    Contactless,
    Swipe,
    Manual,
    Unknown,
}

impl PaxEntryMode {
    fn from_code(c: char) -> Self {
        match c {
            'C' => PaxEntryMode::Chip,
            'L' => PaxEntryMode::Contactless,
            'S' => PaxEntryMode::Swipe,
            'M' => PaxEntryMode::Manual,
            _ => PaxEntryMode::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaxOutcomeKind {
    Approved,
    PartialApproval,
    Declined,
    UserCancelled,
    HostTimeout,
    Unknown(String),
}

impl PaxOutcomeKind {
    fn from_response_code(code: &str) -> Self {
        match code {
            "000000" => PaxOutcomeKind::Approved,
            "000100" => PaxOutcomeKind::PartialApproval,
            "100000" => PaxOutcomeKind::Declined,
            "100001" => PaxOutcomeKind::UserCancelled,
            "100010" => PaxOutcomeKind::HostTimeout,
            other => PaxOutcomeKind::Unknown(other.to_string()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, PaxOutcomeKind::Approved | PaxOutcomeKind::PartialApproval)
    }
}

#[derive(Debug, Clone)]
pub struct PaxOutcome {
    pub kind: PaxOutcomeKind,
    pub auth_code: Option<String>,
    pub terminal_reference: Option<String>,
    pub card_last_four: Option<String>,
    pub card_type: Option<String>,
    pub entry_mode: Option<PaxEntryMode>,
}

fn build_frame(cmd: PaxCommand, fields: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(STX);
    body.extend_from_slice(cmd.code().as_bytes());
    body.push(FS);
    body.extend_from_slice(VERSION.as_bytes());
    for field in fields {
        body.push(FS);
        body.extend_from_slice(field.as_bytes());
    }
    body.push(ETX);

    let lrc = body[1..].iter().fold(0u8, |acc, b| acc ^ b);
    body.push(lrc);
    body
}

/// Parses a full frame, dropping the command code and version header and
/// returning only the ordered field list (field 1 = index 0, matching the
/// 1-based positions the wire format documentation uses).
fn parse_frame(frame: &[u8]) -> Result<Vec<String>> {
    if frame.len() < 4 || frame[0] != STX {
        bail!("malformed PAX frame: missing STX");
    }
    let lrc = frame[frame.len() - 1];
    let etx_index = frame.len() - 2;
    if frame[etx_index] != ETX {
        bail!("malformed PAX frame: missing ETX");
    }
    let computed = frame[1..=etx_index].iter().fold(0u8, |acc, b| acc ^ b);
    if computed != lrc {
        bail!("PAX frame LRC mismatch: expected {lrc:02x}, computed {computed:02x}");
    }

    let body = &frame[1..etx_index];
    let mut parts: Vec<String> = body.split(|&b| b == FS).map(|s| String::from_utf8_lossy(s).to_string()).collect();
    if parts.len() >= 2 {
        parts.drain(..2); // drop CMD, VERSION
    }
    Ok(parts)
}

fn request_fields(req: &PaxTransactionRequest) -> Vec<String> {
    vec![
        req.trans_type.map(|t| t.code().to_string()).unwrap_or_default(),
        req.amount_cents.map(|a| a.to_string()).unwrap_or_default(),
        req.tip_cents.map(|t| t.to_string()).unwrap_or_default(),
        req.cashback_cents.map(|c| c.to_string()).unwrap_or_default(),
        req.reference.clone().unwrap_or_default(),
        req.edc_type.clone().unwrap_or_else(|| "CREDIT".to_string()),
        req.invoice_number.clone().unwrap_or_default(),
    ]
}

/// `fields` is 0-indexed with field 1 (response code) at index 0, matching
/// [parse_frame]'s convention.
fn parse_response(fields: &[String]) -> PaxOutcome {
    let response_code = fields.first().map(|s| s.as_str()).unwrap_or("");
    let get = |pos: usize| fields.get(pos - 1).filter(|s| !s.is_empty()).cloned();

    PaxOutcome {
        kind: PaxOutcomeKind::from_response_code(response_code),
        auth_code: get(4),
        terminal_reference: get(5),
        card_last_four: get(8).map(|masked| masked.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect()),
        card_type: get(9),
        entry_mode: get(10).and_then(|s| s.chars().next()).map(PaxEntryMode::from_code),
    }
}

/// Sends one command frame and waits for the single response frame. PAX has
/// no intermediate-status messages on the wire the way ZVT/Generic do: the
/// terminal's UI prompts happen locally and only the final result is
/// reported back.
async fn send_command(
    transport: &mut dyn Transport,
    timeout: Duration,
    cmd: PaxCommand,
    fields: &[String],
) -> Result<Vec<String>> {
    let frame = build_frame(cmd, fields);
    transport.send(&frame).await.map_err(|e| anyhow!("PAX send failed: {e}"))?;

    let mut buf = Vec::new();
    loop {
        if let Some(start) = buf.iter().position(|&b| b == STX) {
            if buf.len() >= start + 2 {
                if let Some(etx_rel) = buf[start..].iter().position(|&b| b == ETX) {
                    let end = start + etx_rel + 2; // ETX + LRC
                    if buf.len() >= end {
                        return parse_frame(&buf[start..end]);
                    }
                }
            }
        }
        let chunk = transport.receive(timeout).await.map_err(|e| anyhow!("PAX receive failed: {e}"))?;
        buf.extend_from_slice(&chunk);
    }
}

pub async fn initialize(transport: &mut dyn Transport, timeout: Duration) -> Result<Vec<String>> {
    send_command(transport, timeout, PaxCommand::Initialize, &[]).await
}

pub async fn get_info(transport: &mut dyn Transport, timeout: Duration) -> Result<Vec<String>> {
    send_command(transport, timeout, PaxCommand::GetInfo, &[]).await
}

pub async fn do_credit(
    transport: &mut dyn Transport,
    timeout: Duration,
    req: PaxTransactionRequest,
) -> Result<PaxOutcome> {
    let fields = request_fields(&req);
    let response = send_command(transport, timeout, PaxCommand::DoCredit, &fields).await?;
    Ok(parse_response(&response))
}

pub async fn do_refund(
    transport: &mut dyn Transport,
    timeout: Duration,
    req: PaxTransactionRequest,
) -> Result<PaxOutcome> {
    let fields = request_fields(&req);
    let response = send_command(transport, timeout, PaxCommand::DoRefund, &fields).await?;
    Ok(parse_response(&response))
}

pub async fn do_void(
    transport: &mut dyn Transport,
    timeout: Duration,
    req: PaxTransactionRequest,
) -> Result<PaxOutcome> {
    let fields = request_fields(&req);
    let response = send_command(transport, timeout, PaxCommand::DoVoid, &fields).await?;
    Ok(parse_response(&response))
}

pub async fn batch_close(transport: &mut dyn Transport, timeout: Duration) -> Result<Vec<String>> {
    send_command(transport, timeout, PaxCommand::BatchClose, &[]).await
}

pub async fn reset(transport: &mut dyn Transport, timeout: Duration) -> Result<Vec<String>> {
    send_command(transport, timeout, PaxCommand::Reset, &[]).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_parse() {
        let fields = vec!["01".to_string(), "1234".to_string()];
        let frame = build_frame(PaxCommand::DoCredit, &fields);
        assert_eq!(frame[0], STX);

        let parsed = parse_frame(&frame).unwrap();
        assert_eq!(parsed[0], "01");
        assert_eq!(parsed[1], "1234");
    }

    #[test]
    fn lrc_mismatch_is_rejected() {
        let mut frame = build_frame(PaxCommand::Reset, &[]);
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert!(parse_frame(&frame).is_err());
    }

    #[test]
    fn response_code_maps_to_outcome() {
        let fields: Vec<String> = ["000000", "", "", "123456", "REF1", "", "", "************1234", "VISA", "C"]
            .into_iter()
            .map(String::from)
            .collect();
        let outcome = parse_response(&fields);
        assert!(outcome.kind.is_approved());
        assert_eq!(outcome.auth_code.as_deref(), Some("123456"));
        assert_eq!(outcome.card_last_four.as_deref(), Some("1234"));
        assert_eq!(outcome.entry_mode, Some(PaxEntryMode::Chip));
    }

    #[test]
    fn declined_response_is_not_approved() {
        let fields: Vec<String> = ["100000"].into_iter().map(String::from).collect();
        let outcome = parse_response(&fields);
        assert!(!outcome.kind.is_approved());
    }
}
