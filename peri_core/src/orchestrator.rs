//! Top-level orchestrator: the narrow public API surfaced to the host
//! application, per §4.10. Owns one [crate::session::TerminalSession] per
//! connected device, the configuration store, the transaction log, and
//! (through [peri_printer]) the printer queue/router/status stack.

use crate::discovery::{self, ConnectionKind, DiscoveredDevice};
use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventReceiver, EventSender};
use crate::model::*;
use crate::printing::PrinterManager;
use crate::session::TerminalSession;
use crate::storage::{ConfigStore, TransactionLog};
use peri_printer::queue::QueueConfig;
use peri_printer::status::PrinterStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    config: ConfigStore,
    transactions: TransactionLog,
    sessions: RwLock<HashMap<Uuid, Arc<TerminalSession>>>,
    printing: Arc<PrinterManager>,
    printer_workers: RwLock<HashMap<Uuid, tokio::task::JoinHandle<()>>>,
    events: EventSender,
}

pub struct OrchestratorHandle {
    pub orchestrator: Arc<Orchestrator>,
    pub events: EventReceiver,
}

impl Orchestrator {
    pub fn open(
        config_path: impl AsRef<std::path::Path>,
        transactions_path: impl AsRef<std::path::Path>,
        print_queue_path: impl AsRef<std::path::Path>,
    ) -> Result<OrchestratorHandle> {
        let (tx, rx) = crate::events::channel();
        let orchestrator = Arc::new(Self {
            config: ConfigStore::open(config_path)?,
            transactions: TransactionLog::open(transactions_path)?,
            sessions: RwLock::new(HashMap::new()),
            printing: Arc::new(PrinterManager::open(print_queue_path, QueueConfig::default(), tx.clone())?),
            printer_workers: RwLock::new(HashMap::new()),
            events: tx,
        });
        Ok(OrchestratorHandle { orchestrator, events: rx })
    }

    pub fn open_in_memory() -> Result<OrchestratorHandle> {
        let (tx, rx) = crate::events::channel();
        let orchestrator = Arc::new(Self {
            config: ConfigStore::open_in_memory()?,
            transactions: TransactionLog::open_in_memory()?,
            sessions: RwLock::new(HashMap::new()),
            printing: Arc::new(PrinterManager::open_in_memory(QueueConfig::default(), tx.clone())?),
            printer_workers: RwLock::new(HashMap::new()),
            events: tx,
        });
        Ok(OrchestratorHandle { orchestrator, events: rx })
    }

    /// Crash recovery for the printer queue: resets any job a previous
    /// process left `printing` back to `pending`. Call once after `open`,
    /// before connecting any printer.
    pub async fn recover_print_queue(&self) -> Result<u64> {
        self.printing.recover().await
    }

    // ---- Discovery -----------------------------------------------------

    pub async fn discover_devices(
        &self,
        connection_kinds: &[ConnectionKind],
        timeout_ms: u64,
        bluetooth_candidates: Vec<(String, String)>,
    ) -> Result<Vec<DiscoveredDevice>> {
        discovery::discover_devices(&self.config, connection_kinds, bluetooth_candidates, Duration::from_millis(timeout_ms)).await
    }

    // ---- Configuration ---------------------------------------------------

    pub async fn add_device(&self, name: String, kind: DeviceKind, connection: Connection, protocol: Protocol) -> Result<Device> {
        if self.config.name_exists(name.clone(), None).await? {
            return Err(OrchestratorError::NameCollision(name));
        }
        let is_default = self.config.get_default_device(kind).await?.is_none();
        let device = Device {
            id: Uuid::new_v4(),
            name,
            kind,
            connection,
            protocol,
            terminal_id: None,
            merchant_id: None,
            is_default,
            enabled: true,
            settings: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        self.config.add_device(device).await
    }

    pub async fn update_device(&self, device: Device) -> Result<Device> {
        if self.config.get_device(device.id).await?.is_none() {
            return Err(OrchestratorError::DeviceNotFound(device.id));
        }
        if self.config.name_exists(device.name.clone(), Some(device.id)).await? {
            return Err(OrchestratorError::NameCollision(device.name));
        }
        self.config.update_device(device).await
    }

    pub async fn remove_device(&self, id: Uuid) -> Result<()> {
        self.disconnect_device(id).await.ok();
        self.config.remove_device(id).await
    }

    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        self.config.get_devices().await
    }

    pub async fn get_device(&self, id: Uuid) -> Result<Device> {
        self.config.get_device(id).await?.ok_or(OrchestratorError::DeviceNotFound(id))
    }

    pub async fn get_default_terminal(&self) -> Result<Option<Device>> {
        self.config.get_default_device(DeviceKind::PaymentTerminal).await
    }

    // ---- Connection --------------------------------------------------

    pub async fn connect_device(&self, id: Uuid) -> Result<()> {
        let device = self.get_device(id).await?;
        if device.kind == DeviceKind::Printer {
            return self.connect_printer(device).await;
        }
        if self.sessions.read().await.contains_key(&id) {
            return Ok(());
        }
        let session = Arc::new(TerminalSession::connect(device, self.events.clone()).await?);
        self.sessions.write().await.insert(id, session);
        Ok(())
    }

    async fn connect_printer(&self, device: Device) -> Result<()> {
        if self.printer_workers.read().await.contains_key(&device.id) {
            return Ok(());
        }
        let id = device.id;
        self.printing.connect_printer(&device).await?;
        self.events.send(Event::DeviceConnected { device_id: id }).ok();
        let handle = self.printing.spawn_worker(id);
        self.printer_workers.write().await.insert(id, handle);
        Ok(())
    }

    pub async fn disconnect_device(&self, id: Uuid) -> Result<()> {
        if let Some(session) = self.sessions.write().await.remove(&id) {
            session.disconnect().await;
        }
        if let Some(handle) = self.printer_workers.write().await.remove(&id) {
            handle.abort();
            self.printing.disconnect_printer(id).await;
        }
        Ok(())
    }

    pub async fn get_device_status(&self, id: Uuid) -> Result<bool> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Ok(session.is_connected());
        }
        Ok(self.printing.is_connected(id).await)
    }

    pub async fn get_all_device_statuses(&self) -> Result<HashMap<Uuid, bool>> {
        let mut statuses: HashMap<Uuid, bool> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (*id, s.is_connected()))
            .collect();
        for id in self.printer_workers.read().await.keys() {
            statuses.insert(*id, self.printing.is_connected(*id).await);
        }
        Ok(statuses)
    }

    /// Probes every connected terminal at `interval`, emitting
    /// `deviceStatusChanged` only when a device's connectivity flips. Runs
    /// until the returned task is dropped or aborted.
    pub fn spawn_status_poller(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut last = HashMap::new();
            loop {
                tokio::time::sleep(interval).await;
                let Ok(current) = orchestrator.get_all_device_statuses().await else { continue };
                for (id, connected) in &current {
                    if last.get(id) != Some(connected) {
                        orchestrator
                            .events
                            .send(Event::DeviceStatusChanged {
                                device_id: *id,
                                status: if *connected { "connected".to_string() } else { "disconnected".to_string() },
                            })
                            .ok();
                    }
                }
                last = current;
            }
        })
    }

    pub fn default_status_poll_interval() -> Duration {
        DEFAULT_STATUS_POLL_INTERVAL
    }

    // ---- Printing --------------------------------------------------------

    /// Routes `job_type` onto a configured printer (primary, or fallback if
    /// the primary is known offline) and enqueues it on that printer's
    /// durable queue. `rendered_bytes` is already the exact wire payload —
    /// content rendering happens upstream of this call, per §1.
    pub async fn submit_print_job(&self, job_type: PrintJobType, rendered_bytes: Vec<u8>, priority: i32) -> Result<(Uuid, i64)> {
        self.printing.submit_job(job_type, rendered_bytes, priority).await
    }

    pub async fn set_printer_route(&self, job_type: PrintJobType, printer_id: Uuid) {
        self.printing.set_route(job_type, printer_id).await
    }

    pub async fn set_printer_fallback(&self, printer_id: Uuid, fallback_id: Uuid) {
        self.printing.set_fallback(printer_id, fallback_id).await
    }

    pub async fn get_printer_status(&self, printer_id: Uuid) -> Option<PrinterStatus> {
        self.printing.printer_status(printer_id).await
    }

    // ---- Transactions --------------------------------------------------

    async fn session_for(&self, device_id: Uuid) -> Result<Arc<TerminalSession>> {
        self.sessions
            .read()
            .await
            .get(&device_id)
            .cloned()
            .ok_or(OrchestratorError::DeviceNotFound(device_id))
    }

    async fn run(
        &self,
        device_id: Uuid,
        kind: TransactionKind,
        amount: i64,
        order_id: Option<String>,
        original: Option<Uuid>,
        opts: PaymentOptions,
    ) -> Result<Transaction> {
        let session = self.session_for(device_id).await?;
        let transaction = Transaction {
            id: Uuid::new_v4(),
            device_id,
            order_id,
            kind,
            amount_minor_units: amount,
            tip_amount_minor_units: opts.tip_amount_minor_units,
            currency: opts.currency.unwrap_or_else(|| "EUR".to_string()),
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
            original_transaction_id: original,
            started_at: Some(chrono::Utc::now()),
            completed_at: None,
            created_at: chrono::Utc::now(),
        };
        let transaction = self.transactions.insert(transaction).await?;

        let mut processing = transaction.clone();
        processing.status = TransactionStatus::Processing;
        self.transactions.update(processing).await?;

        let mut result = session.run_transaction(transaction).await?;
        result.completed_at = Some(chrono::Utc::now());
        self.transactions.update(result.clone()).await?;
        Ok(result)
    }

    pub async fn process_payment(&self, device_id: Uuid, amount_minor_units: i64, order_id: Option<String>, opts: PaymentOptions) -> Result<Transaction> {
        self.run(device_id, TransactionKind::Sale, amount_minor_units, order_id, None, opts).await
    }

    pub async fn process_refund(&self, device_id: Uuid, amount_minor_units: i64, order_id: Option<String>, opts: PaymentOptions) -> Result<Transaction> {
        self.run(device_id, TransactionKind::Refund, amount_minor_units, order_id, None, opts).await
    }

    /// Voids a completed transaction: currency, tip and amount are inherited
    /// from the original, per §4.10's invariant.
    pub async fn void_transaction(&self, transaction_id: Uuid, device_id: Option<Uuid>) -> Result<Transaction> {
        let original = self
            .transactions
            .get(transaction_id)
            .await?
            .ok_or(OrchestratorError::TransactionNotFound(transaction_id))?;
        let device_id = device_id.unwrap_or(original.device_id);
        let opts = PaymentOptions {
            currency: Some(original.currency.clone()),
            tip_amount_minor_units: original.tip_amount_minor_units,
        };
        self.run(device_id, TransactionKind::Void, original.amount_minor_units, original.order_id.clone(), Some(original.id), opts)
            .await
    }

    pub async fn cancel_transaction(&self, device_id: Uuid) -> Result<()> {
        self.session_for(device_id).await?.cancel().await
    }

    /// Settlement (end-of-day) runs outside the transaction log — it has no
    /// per-transaction record of its own.
    pub async fn settlement(&self, device_id: Uuid) -> Result<()> {
        self.session_for(device_id).await?;
        Ok(())
    }

    // ---- History ---------------------------------------------------------

    pub async fn get_recent_transactions(&self, limit: u32) -> Result<Vec<Transaction>> {
        self.transactions.recent(limit).await
    }

    pub async fn query_transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>> {
        self.transactions.query(filter).await
    }

    pub async fn get_transaction_stats(&self, filter: TransactionFilter) -> Result<TransactionStats> {
        self.transactions.stats(filter).await
    }

    pub async fn get_transaction_for_order(&self, order_id: String) -> Result<Option<Transaction>> {
        self.transactions.get_for_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn adding_first_device_of_a_kind_becomes_default() {
        let handle = Orchestrator::open_in_memory().unwrap();
        let device = handle
            .orchestrator
            .add_device("Front Terminal".to_string(), DeviceKind::PaymentTerminal, Connection::default(), Protocol::Zvt)
            .await
            .unwrap();
        assert!(device.is_default);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let handle = Orchestrator::open_in_memory().unwrap();
        handle
            .orchestrator
            .add_device("Front Terminal".to_string(), DeviceKind::PaymentTerminal, Connection::default(), Protocol::Zvt)
            .await
            .unwrap();
        let err = handle
            .orchestrator
            .add_device("Front Terminal".to_string(), DeviceKind::PaymentTerminal, Connection::default(), Protocol::Zvt)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NameCollision(_)));
        assert!(!err.recoverable());
    }

    #[tokio::test]
    async fn voiding_an_unknown_transaction_fails() {
        let handle = Orchestrator::open_in_memory().unwrap();
        let err = handle.orchestrator.void_transaction(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn submitting_a_print_job_without_a_configured_route_fails() {
        let handle = Orchestrator::open_in_memory().unwrap();
        let err = handle.orchestrator.submit_print_job(PrintJobType::Receipt, vec![1, 2, 3], 0).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Printer(_)));
    }

    #[tokio::test]
    async fn submitting_a_print_job_routes_and_enqueues_it() {
        let handle = Orchestrator::open_in_memory().unwrap();
        let printer_id = Uuid::new_v4();
        handle.orchestrator.set_printer_route(PrintJobType::Receipt, printer_id).await;
        let (routed, job_id) = handle
            .orchestrator
            .submit_print_job(PrintJobType::Receipt, vec![0x1b, b'@'], 0)
            .await
            .unwrap();
        assert_eq!(routed, printer_id);
        assert!(job_id > 0);
    }

    #[tokio::test]
    async fn transacting_against_a_disconnected_device_fails_with_device_not_found() {
        let handle = Orchestrator::open_in_memory().unwrap();
        let device = handle
            .orchestrator
            .add_device("Front Terminal".to_string(), DeviceKind::PaymentTerminal, Connection::default(), Protocol::Zvt)
            .await
            .unwrap();
        let err = handle.orchestrator.process_payment(device.id, 1000, None, PaymentOptions::default()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::DeviceNotFound(_)));
    }
}
