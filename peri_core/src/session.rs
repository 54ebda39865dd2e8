//! Terminal session: owns one device's transport for the duration of its
//! connection and serializes transactions against it. Per §5, a transport's
//! `send`/`receive` are not concurrent-safe — this is the sole caller.

use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventSender};
use crate::model::{iso4217_numeric, CardType, Connection, Device, EntryMethod, Protocol, Transaction, TransactionStatus};
use peri_ecr::sequences::Sequence;
use peri_ecr::{frame_io::FrameIo, generic, pax, sequences};
use peri_transport::{
    bluetooth::{BluetoothConfig, BluetoothTransport},
    network::{NetworkConfig, NetworkTransport},
    serial::{SerialConfig, SerialTransport},
    Transport,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

fn build_transport(connection: &Connection) -> Result<Box<dyn Transport>> {
    match connection {
        Connection::Network { host, port, .. } => {
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .map_err(|e| OrchestratorError::InvalidConnection(format!("{host}:{port}: {e}")))?;
            Ok(Box::new(NetworkTransport::new(NetworkConfig { addr, keepalive: None })))
        }
        Connection::Serial { path, baud, .. } => Ok(Box::new(SerialTransport::new(SerialConfig {
            path: path.clone(),
            baud_rate: *baud,
        }))),
        Connection::Bluetooth { mac, channel, .. } => {
            let mut config = BluetoothConfig::new(mac.clone(), format!("/dev/rfcomm{channel}"));
            config.rfcomm_channel = *channel;
            Ok(Box::new(BluetoothTransport::new(config)))
        }
        Connection::Usb { .. } | Connection::SystemSpool { .. } => {
            Err(OrchestratorError::InvalidConnection("payment terminals do not connect over USB or the OS spooler".to_string()))
        }
    }
}

/// One in-flight-transaction guard plus the live transport for a single
/// device. Created on `connectDevice`, torn down on `disconnectDevice`.
pub struct TerminalSession {
    pub device: Device,
    transport: Mutex<Box<dyn Transport>>,
    in_flight: Mutex<Option<Uuid>>,
    events: EventSender,
}

impl TerminalSession {
    pub async fn connect(device: Device, events: EventSender) -> Result<Self> {
        let mut transport = build_transport(&device.connection)?;
        transport.connect().await?;
        log::info!("device {} ({:?}) connected", device.id, device.protocol);
        events
            .send(Event::DeviceConnected { device_id: device.id })
            .ok();
        Ok(Self {
            device,
            transport: Mutex::new(transport),
            in_flight: Mutex::new(None),
            events,
        })
    }

    pub async fn disconnect(&self) {
        let mut guard = self.in_flight.lock().await;
        if let Some(tx_id) = guard.take() {
            self.events
                .send(Event::TransactionStatus {
                    transaction_id: tx_id,
                    status: TransactionStatus::Cancelled,
                    message: Some("device disconnected mid-transaction".to_string()),
                })
                .ok();
        }
        self.transport.lock().await.disconnect().await;
        self.events
            .send(Event::DeviceDisconnected { device_id: self.device.id })
            .ok();
    }

    pub fn is_connected(&self) -> bool {
        // `try_lock` avoids blocking a status poll behind an in-flight send.
        self.transport
            .try_lock()
            .map(|t| t.state() == peri_transport::TransportState::Connected)
            .unwrap_or(true)
    }

    async fn begin(&self, transaction_id: Uuid) -> Result<()> {
        let mut guard = self.in_flight.lock().await;
        if guard.is_some() {
            return Err(OrchestratorError::TransactionInProgress(self.device.id));
        }
        *guard = Some(transaction_id);
        self.events
            .send(Event::TransactionStarted { transaction_id, device_id: self.device.id })
            .ok();
        Ok(())
    }

    async fn finish(&self) {
        *self.in_flight.lock().await = None;
    }

    /// Sends the protocol-specific abort for whatever transaction is
    /// currently in flight, per §5's cancellation rule.
    pub async fn cancel(&self) -> Result<()> {
        let tx_id = *self.in_flight.lock().await;
        let Some(transaction_id) = tx_id else {
            return Ok(());
        };

        let mut transport = self.transport.lock().await;
        match self.device.protocol {
            Protocol::Zvt => {
                let mut io = FrameIo::new(transport.as_mut(), COMMAND_TIMEOUT);
                io.write_packet(&peri_ecr::packets::Abort { error: 0x1e }).await.ok();
            }
            Protocol::Pax => {
                pax::reset(transport.as_mut(), COMMAND_TIMEOUT).await.ok();
            }
            Protocol::GenericEcr => {
                generic::abort(transport.as_mut(), COMMAND_TIMEOUT, false).await.ok();
            }
            Protocol::EscPos => {}
        }
        drop(transport);

        self.events
            .send(Event::TransactionStatus {
                transaction_id,
                status: TransactionStatus::Cancelled,
                message: Some("cancelled by caller".to_string()),
            })
            .ok();
        self.finish().await;
        Ok(())
    }

    /// Runs one sale/refund/void through whichever protocol this device
    /// speaks, reporting intermediate progress through `events` and
    /// returning the terminal outcome merged into `transaction`.
    pub async fn run_transaction(&self, mut transaction: Transaction) -> Result<Transaction> {
        self.begin(transaction.id).await?;
        let mut transport = self.transport.lock().await;

        let result = match self.device.protocol {
            Protocol::Zvt => self.run_zvt(transport.as_mut(), &mut transaction).await,
            Protocol::Pax => self.run_pax(transport.as_mut(), &mut transaction).await,
            Protocol::GenericEcr => self.run_generic(transport.as_mut(), &mut transaction).await,
            Protocol::EscPos => Err(OrchestratorError::InvalidConnection("ESC/POS is a printer protocol, not a terminal protocol".to_string())),
        };
        drop(transport);
        self.finish().await;

        match result {
            Ok(()) => {
                self.events
                    .send(Event::TransactionCompleted { transaction: Box::new(transaction.clone()) })
                    .ok();
                Ok(transaction)
            }
            Err(e) => {
                log::warn!("transaction {} on device {} failed: {e}", transaction.id, self.device.id);
                transaction.status = TransactionStatus::Error;
                transaction.error_message = Some(e.to_string());
                self.events
                    .send(Event::Error { device_id: Some(self.device.id), message: e.to_string() })
                    .ok();
                Ok(transaction)
            }
        }
    }

    async fn run_zvt(&self, transport: &mut dyn Transport, transaction: &mut Transaction) -> Result<()> {
        let mut io = FrameIo::new(transport, COMMAND_TIMEOUT);
        let request = peri_ecr::packets::Authorization {
            amount: Some(transaction.amount_minor_units as usize),
            currency: Some(iso4217_numeric(&transaction.currency) as usize),
            service_byte: None,
            expiry_date: None,
            card_pan: None,
            track_2_data: None,
            timeout: None,
            maximum_no_of_status_info: None,
            additional_text: None,
            card_type_id: None,
        };

        let mut stream = sequences::Authorization::into_stream(&request, &mut io);
        let mut last_status: Option<peri_ecr::packets::StatusInformation> = None;

        use tokio_stream::StreamExt;
        while let Some(item) = stream.next().await {
            match item.map_err(OrchestratorError::Other)? {
                sequences::AuthorizationResponse::IntermediateStatusInformation(s) => {
                    self.events
                        .send(Event::DisplayMessage { device_id: self.device.id, text: format!("status {}", s.status) })
                        .ok();
                }
                sequences::AuthorizationResponse::StatusInformation(s) => {
                    last_status = Some(s);
                }
                sequences::AuthorizationResponse::CompletionData(c) => {
                    let approved = c.result_code == Some(0);
                    apply_zvt_outcome(transaction, approved, &c, last_status.take());
                    return Ok(());
                }
                sequences::AuthorizationResponse::Abort(_) => {
                    transaction.status = TransactionStatus::Declined;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(OrchestratorError::Other(anyhow::anyhow!("ZVT transaction stream ended without a terminal response")))
    }

    async fn run_pax(&self, transport: &mut dyn Transport, transaction: &mut Transaction) -> Result<()> {
        let req = pax::PaxTransactionRequest {
            trans_type: Some(match transaction.kind {
                crate::model::TransactionKind::Refund => pax::PaxTransType::Return,
                crate::model::TransactionKind::Void => pax::PaxTransType::Void,
                crate::model::TransactionKind::PreAuth => pax::PaxTransType::AuthOnly,
                crate::model::TransactionKind::PreAuthCompletion => pax::PaxTransType::PostAuth,
                crate::model::TransactionKind::Sale => pax::PaxTransType::Sale,
            }),
            amount_cents: Some(transaction.amount_minor_units as u64),
            tip_cents: transaction.tip_amount_minor_units.map(|t| t as u64),
            cashback_cents: None,
            reference: transaction.order_id.clone(),
            edc_type: Some("CREDIT".to_string()),
            invoice_number: None,
        };

        let outcome = match transaction.kind {
            crate::model::TransactionKind::Refund => pax::do_refund(transport, COMMAND_TIMEOUT, req).await,
            crate::model::TransactionKind::Void => pax::do_void(transport, COMMAND_TIMEOUT, req).await,
            _ => pax::do_credit(transport, COMMAND_TIMEOUT, req).await,
        }
        .map_err(OrchestratorError::Other)?;

        transaction.status = if outcome.kind.is_approved() {
            TransactionStatus::Approved
        } else if outcome.kind == pax::PaxOutcomeKind::UserCancelled {
            TransactionStatus::Cancelled
        } else if outcome.kind == pax::PaxOutcomeKind::HostTimeout {
            TransactionStatus::Timeout
        } else {
            TransactionStatus::Declined
        };
        transaction.authorization_code = outcome.auth_code;
        transaction.terminal_reference = outcome.terminal_reference;
        transaction.card_last_four = outcome.card_last_four;
        transaction.entry_method = outcome.entry_mode.map(|m| match m {
            pax::PaxEntryMode::Chip => EntryMethod::Chip,
            pax::PaxEntryMode::Contactless => EntryMethod::Contactless,
            pax::PaxEntryMode::Swipe => EntryMethod::Swipe,
            pax::PaxEntryMode::Manual => EntryMethod::Manual,
            pax::PaxEntryMode::Unknown => EntryMethod::Unknown,
        });
        Ok(())
    }

    async fn run_generic(&self, transport: &mut dyn Transport, transaction: &mut Transaction) -> Result<()> {
        let cmd = match transaction.kind {
            crate::model::TransactionKind::Sale => generic::GenericCommand::Sale,
            crate::model::TransactionKind::Refund => generic::GenericCommand::Refund,
            crate::model::TransactionKind::Void => generic::GenericCommand::Void,
            crate::model::TransactionKind::PreAuth => generic::GenericCommand::PreAuth,
            crate::model::TransactionKind::PreAuthCompletion => generic::GenericCommand::PreAuthComplete,
        };
        let payload = generic::GenericTransactionPayload {
            amount_minor_units: transaction.amount_minor_units as u32,
            currency: iso4217_numeric(&transaction.currency),
            reference: transaction.order_id.clone().unwrap_or_default(),
        };

        let device_id = self.device.id;
        let events = self.events.clone();
        let outcome = generic::run_transaction(transport, COMMAND_TIMEOUT, cmd, &payload, false, move |event| {
            if let generic::GenericEvent::Intermediate(status) = event {
                events
                    .send(Event::DisplayMessage { device_id, text: status.text.clone() })
                    .ok();
            }
        })
        .await
        .map_err(OrchestratorError::Other)?;

        transaction.status = match outcome.code {
            generic::GenericResponseCode::Approved => TransactionStatus::Approved,
            generic::GenericResponseCode::Declined => TransactionStatus::Declined,
            generic::GenericResponseCode::Cancelled => TransactionStatus::Cancelled,
            generic::GenericResponseCode::Timeout => TransactionStatus::Timeout,
        };
        transaction.authorization_code = outcome.auth_code;
        transaction.card_last_four = outcome.card_last_four;
        transaction.entry_method = outcome.entry_method.map(|m| match m {
            generic::GenericEntryMethod::Chip => EntryMethod::Chip,
            generic::GenericEntryMethod::Contactless => EntryMethod::Contactless,
            generic::GenericEntryMethod::Swipe => EntryMethod::Swipe,
            generic::GenericEntryMethod::Manual => EntryMethod::Manual,
            generic::GenericEntryMethod::Unknown(_) => EntryMethod::Unknown,
        });
        Ok(())
    }
}

/// Maps ZVT's `card_type_id`/PAN-last-two-bytes onto the shared model, per
/// the worked sale example: card-type 0x02 is Visa, last four comes from
/// the low byte pair of `card_pan`.
///
/// Card data can arrive in the completion frame itself (§4.3 step 4) or in
/// an earlier status push; the completion frame wins when both are
/// present since it's the terminal's final word on the transaction.
fn apply_zvt_outcome(
    transaction: &mut Transaction,
    approved: bool,
    completion: &peri_ecr::packets::CompletionData,
    status: Option<peri_ecr::packets::StatusInformation>,
) {
    transaction.status = if approved { TransactionStatus::Approved } else { TransactionStatus::Declined };

    let card_pan = completion.card_pan.or_else(|| status.as_ref().and_then(|s| s.card_pan));
    let card_type_id = completion.card_type_id.or_else(|| status.as_ref().and_then(|s| s.card_type_id));
    let auth_code = completion.auth_code.clone().or_else(|| status.and_then(|s| s.auth_code));

    transaction.authorization_code = auth_code;
    if let Some(pan) = card_pan {
        transaction.card_last_four = Some(format!("{:04}", pan % 10000));
    }
    transaction.card_type = card_type_id.map(|id| match id {
        0x02 => CardType::Visa,
        0x06 => CardType::Mastercard,
        0x2c => CardType::Amex,
        0x07 => CardType::Maestro,
        _ => CardType::Unknown,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeviceKind, TransactionKind};
    use async_trait::async_trait;
    use peri_ecr::ZvtSerializer;
    use peri_transport::{Result as TResult, TransportState, TransportStatus};
    use std::collections::VecDeque;

    /// Same scripting pattern as `peri_ecr::frame_io`'s tests: canned inbound
    /// chunks, captured outbound bytes, always reports connected.
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
            self.chunks.pop_front().ok_or(peri_transport::TransportError::NotConnected)
        }
        fn state(&self) -> TransportState {
            TransportState::Connected
        }
        fn status(&self) -> TransportStatus {
            TransportStatus::default()
        }
    }

    fn test_device(protocol: Protocol) -> Device {
        let now = chrono::Utc::now();
        Device {
            id: Uuid::new_v4(),
            name: "Test Terminal".to_string(),
            kind: DeviceKind::PaymentTerminal,
            connection: Connection::default(),
            protocol,
            terminal_id: None,
            merchant_id: None,
            is_default: false,
            enabled: true,
            settings: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_transaction(device_id: Uuid, kind: TransactionKind, amount: i64, currency: &str) -> Transaction {
        let now = chrono::Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            device_id,
            order_id: None,
            kind,
            amount_minor_units: amount,
            tip_amount_minor_units: None,
            currency: currency.to_string(),
            status: TransactionStatus::Pending,
            authorization_code: None,
            terminal_reference: None,
            card_type: None,
            card_last_four: None,
            entry_method: None,
            cardholder_name: None,
            customer_receipt: None,
            merchant_receipt: None,
            error_message: None,
            error_code: None,
            original_transaction_id: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        }
    }

    fn test_session(device: Device, transport: ScriptedTransport) -> TerminalSession {
        let (events, _rx) = crate::events::channel();
        TerminalSession {
            device,
            transport: Mutex::new(Box::new(transport)),
            in_flight: Mutex::new(None),
            events,
        }
    }

    /// S1 — ZVT sale, approved: the completion frame itself carries the
    /// PAN/card-type/auth-code (the PT's only other frame is an
    /// intermediate status push, which never carries card data).
    #[tokio::test]
    async fn s1_zvt_sale_parses_card_data_from_the_completion_frame() {
        let device = test_device(Protocol::Zvt);
        let transaction = test_transaction(device.id, TransactionKind::Sale, 1234, "EUR");

        let intermediate = peri_ecr::packets::IntermediateStatusInformation { status: 0xff, timeout: None };
        let completion = peri_ecr::packets::CompletionData {
            result_code: Some(0x00),
            status_byte: None,
            terminal_id: None,
            currency: None,
            card_pan: Some(1234),
            card_type_id: Some(0x02),
            auth_code: Some("123456".to_string()),
        };
        let transport = ScriptedTransport {
            chunks: VecDeque::from([vec![0x80, 0x00, 0x00], intermediate.zvt_serialize(), completion.zvt_serialize()]),
            sent: Vec::new(),
        };

        let session = test_session(device, transport);
        let result = session.run_transaction(transaction).await.unwrap();

        assert_eq!(result.status, TransactionStatus::Approved);
        assert_eq!(result.authorization_code.as_deref(), Some("123456"));
        assert_eq!(result.card_last_four.as_deref(), Some("1234"));
        assert_eq!(result.card_type, Some(CardType::Visa));
    }

    /// S2 — PAX refund 5.00 USD, declined: the response code maps to
    /// `Declined` and the transaction keeps the caller's USD currency even
    /// though PAX's own wire fields never carry a currency.
    #[tokio::test]
    async fn s2_pax_usd_refund_decline_is_reported_with_its_currency() {
        let device = test_device(Protocol::Pax);
        let transaction = test_transaction(device.id, TransactionKind::Refund, 500, "USD");

        let mut body = vec![0x02u8]; // STX
        body.extend_from_slice(b"T00");
        body.push(0x1c); // FS
        body.extend_from_slice(b"1.28");
        body.push(0x1c);
        body.extend_from_slice(b"100000"); // response code: declined
        body.push(0x03); // ETX
        let lrc = body[1..].iter().fold(0u8, |acc, b| acc ^ b);
        body.push(lrc);

        let transport = ScriptedTransport {
            chunks: VecDeque::from([body]),
            sent: Vec::new(),
        };

        let session = test_session(device, transport);
        let result = session.run_transaction(transaction).await.unwrap();

        assert_eq!(result.status, TransactionStatus::Declined);
        assert_eq!(result.currency, "USD");
    }
}
