//! Event model for the top-level orchestrator. Per subject (device or
//! printer), events are emitted in the order they are produced — callers
//! get an `mpsc` receiver and must drain it in order, matching §5's
//! per-subject ordering guarantee.

use crate::model::{Transaction, TransactionStatus};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Event {
    DeviceConnected { device_id: Uuid },
    DeviceDisconnected { device_id: Uuid },
    DeviceStatusChanged { device_id: Uuid, status: String },
    TransactionStarted { transaction_id: Uuid, device_id: Uuid },
    TransactionStatus { transaction_id: Uuid, status: TransactionStatus, message: Option<String> },
    TransactionCompleted { transaction: Box<Transaction> },
    DisplayMessage { device_id: Uuid, text: String },
    PrintReceipt { device_id: Uuid, transaction_id: Uuid, receipt: String },
    Error { device_id: Option<Uuid>, message: String },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<Event>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<Event>;

pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
