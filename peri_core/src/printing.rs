//! Printer job pipeline: per-printer transport, the durable queue, the
//! router, the status monitor and a circuit breaker, wired together the way
//! §2's print data flow describes it: `submitJob` routes a job onto a
//! printer, `queue.enqueue` persists it, and one worker task per connected
//! printer dequeues, sends, and marks the job completed/retried/failed.
//!
//! Receipt/ticket *content* rendering is a collaborator's job (§1's
//! Non-goals) — by the time a job reaches `submit_job` its payload is
//! already the exact bytes to put on the wire.

use crate::error::{OrchestratorError, Result};
use crate::events::{Event, EventSender};
use crate::model::{Connection, Device, PrintJobType};
use base64::Engine;
use peri_printer::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use peri_printer::queue::{PrintJob, QueueConfig, QueueManager, PENDING};
use peri_printer::router::{PrinterRouter, RouteResult};
use peri_printer::status::{PrinterState, PrinterStatus, StatusChange, StatusMonitor};
use peri_transport::{
    bluetooth::{BluetoothConfig, BluetoothTransport},
    network::{NetworkConfig, NetworkTransport},
    os_printer::OsPrinterTransport,
    serial::{SerialConfig, SerialTransport},
    Transport,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// How long an idle worker waits between empty dequeues before polling again.
const WORKER_IDLE_POLL: Duration = Duration::from_millis(500);

fn build_printer_transport(connection: &Connection) -> Result<Box<dyn Transport>> {
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
        Connection::Usb { system_name, .. } => {
            let name = system_name
                .clone()
                .ok_or_else(|| OrchestratorError::InvalidConnection("USB printer has no OS spooler name".to_string()))?;
            Ok(Box::new(OsPrinterTransport::new(name)?))
        }
        Connection::SystemSpool { name } => Ok(Box::new(OsPrinterTransport::new(name.clone())?)),
    }
}

fn encode_payload(bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({ "data": base64::engine::general_purpose::STANDARD.encode(bytes) })
}

fn decode_payload(payload: &serde_json::Value) -> Vec<u8> {
    payload
        .get("data")
        .and_then(|v| v.as_str())
        .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
        .unwrap_or_default()
}

/// Owns the queue, router, and status monitor shared by every printer, plus
/// one live transport and circuit breaker per currently connected printer.
pub struct PrinterManager {
    queue: QueueManager,
    router: RwLock<PrinterRouter>,
    status: RwLock<StatusMonitor>,
    breakers: RwLock<HashMap<Uuid, Arc<CircuitBreaker>>>,
    transports: RwLock<HashMap<Uuid, Arc<Mutex<Box<dyn Transport>>>>>,
    events: EventSender,
}

impl PrinterManager {
    pub fn open(queue_path: impl AsRef<std::path::Path>, config: QueueConfig, events: EventSender) -> Result<Self> {
        Ok(Self {
            queue: QueueManager::open(queue_path, config)?,
            router: RwLock::new(PrinterRouter::new()),
            status: RwLock::new(StatusMonitor::new()),
            breakers: RwLock::new(HashMap::new()),
            transports: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn open_in_memory(config: QueueConfig, events: EventSender) -> Result<Self> {
        Ok(Self {
            queue: QueueManager::open_in_memory(config)?,
            router: RwLock::new(PrinterRouter::new()),
            status: RwLock::new(StatusMonitor::new()),
            breakers: RwLock::new(HashMap::new()),
            transports: RwLock::new(HashMap::new()),
            events,
        })
    }

    /// Crash recovery: any job a previous process left `printing` gets reset
    /// to `pending` so a worker picks it up again. Call once at startup,
    /// before `spawn_worker`.
    pub async fn recover(&self) -> Result<u64> {
        Ok(self.queue.reset_printing_jobs().await?)
    }

    pub async fn set_route(&self, job_type: PrintJobType, printer_id: Uuid) {
        self.router.write().await.set_route(job_type.as_str(), printer_id.to_string());
    }

    pub async fn set_fallback(&self, printer_id: Uuid, fallback_id: Uuid) {
        self.router.write().await.set_fallback(printer_id.to_string(), fallback_id.to_string());
    }

    /// §2's print data flow: route by job type (consulting current status
    /// for fallback selection), then enqueue on the winning printer's
    /// durable queue. Returns the printer that won the route and the job id.
    pub async fn submit_job(&self, job_type: PrintJobType, rendered_bytes: Vec<u8>, priority: i32) -> Result<(Uuid, i64)> {
        let route: RouteResult = {
            let status = self.status.read().await;
            self.router.read().await.route_job(job_type.as_str(), Some(&status))?
        };
        let printer_id: Uuid = route
            .printer_id
            .parse()
            .map_err(|_| OrchestratorError::InvalidConnection(format!("routing table printer id {:?} is not a uuid", route.printer_id)))?;
        let payload = encode_payload(&rendered_bytes);
        let id = self.queue.enqueue(route.printer_id, job_type.as_str().to_string(), payload, priority).await?;
        Ok((printer_id, id))
    }

    pub async fn connect_printer(&self, device: &Device) -> Result<()> {
        let mut transport = build_printer_transport(&device.connection)?;
        transport.connect().await?;
        self.transports.write().await.insert(device.id, Arc::new(Mutex::new(transport)));
        self.breakers
            .write()
            .await
            .entry(device.id)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(device.id.to_string(), CircuitBreakerConfig::default())));
        log::info!("printer {} connected", device.id);
        Ok(())
    }

    pub async fn disconnect_printer(&self, printer_id: Uuid) {
        if let Some(transport) = self.transports.write().await.remove(&printer_id) {
            transport.lock().await.disconnect().await;
        }
        self.events.send(Event::DeviceDisconnected { device_id: printer_id }).ok();
    }

    pub async fn printer_status(&self, printer_id: Uuid) -> Option<PrinterStatus> {
        self.status.read().await.get(&printer_id.to_string()).cloned()
    }

    pub async fn is_connected(&self, printer_id: Uuid) -> bool {
        self.transports.read().await.contains_key(&printer_id)
    }

    pub async fn queue_length(&self, printer_id: Uuid) -> Result<u64> {
        Ok(self.queue.get_queue_length(printer_id.to_string(), None).await?)
    }

    /// Spawns the per-printer worker loop: dequeue, send behind the circuit
    /// breaker, mark complete/retry/fail. Runs until aborted or dropped.
    pub fn spawn_worker(self: &Arc<Self>, printer_id: Uuid) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                match manager.queue.dequeue(printer_id.to_string()).await {
                    Ok(Some(job)) => manager.process_job(printer_id, job).await,
                    Ok(None) => tokio::time::sleep(WORKER_IDLE_POLL).await,
                    Err(e) => {
                        log::warn!("queue dequeue failed for printer {printer_id}: {e}");
                        tokio::time::sleep(WORKER_IDLE_POLL).await;
                    }
                }
            }
        })
    }

    async fn process_job(&self, printer_id: Uuid, job: PrintJob) {
        let transport = self.transports.read().await.get(&printer_id).cloned();
        let breaker = self.breakers.read().await.get(&printer_id).cloned();
        let (Some(transport), Some(breaker)) = (transport, breaker) else {
            self.queue.mark_failed(job.id, "printer not connected".to_string()).await.ok();
            return;
        };

        let bytes = decode_payload(&job.payload);
        let result = breaker
            .execute(|| async {
                let mut t = transport.lock().await;
                t.send(&bytes).await
            })
            .await;

        match result {
            Ok(()) => {
                self.queue.mark_completed(job.id).await.ok();
                self.note_status(printer_id, PrinterState::Online, None).await;
            }
            Err(CircuitBreakerError::Open) => {
                self.queue.set_last_error(job.id, "circuit open, printer considered offline".to_string()).await.ok();
                self.note_status(printer_id, PrinterState::Offline, None).await;
                tokio::time::sleep(Duration::from_millis(self.queue.retry_delay_ms(job.retry_count))).await;
            }
            Err(CircuitBreakerError::Operation(e)) => {
                self.note_status(printer_id, PrinterState::Error, Some(1)).await;
                if job.retry_count + 1 >= self.queue.config().max_retries {
                    self.queue.mark_failed(job.id, e.to_string()).await.ok();
                } else {
                    self.queue.set_last_error(job.id, e.to_string()).await.ok();
                    tokio::time::sleep(Duration::from_millis(self.queue.retry_delay_ms(job.retry_count))).await;
                    self.queue.increment_retry(job.id).await.ok();
                }
            }
        }
    }

    async fn note_status(&self, printer_id: Uuid, state: PrinterState, error_code: Option<u32>) {
        let queue_length = self
            .queue
            .get_queue_length(printer_id.to_string(), Some(PENDING.to_string()))
            .await
            .unwrap_or(0);
        let change = self
            .status
            .write()
            .await
            .update(&printer_id.to_string(), state, error_code, queue_length as usize);
        if let StatusChange::Changed(status) = change {
            self.events
                .send(Event::DeviceStatusChanged { device_id: printer_id, status: format!("{:?}", status.state) })
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitting_a_job_with_no_route_fails() {
        let (tx, _rx) = crate::events::channel();
        let manager = PrinterManager::open_in_memory(QueueConfig::default(), tx).unwrap();
        let err = manager.submit_job(PrintJobType::Receipt, vec![1, 2, 3], 0).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Printer(_)));
    }

    #[tokio::test]
    async fn submitting_a_job_enqueues_it_on_the_routed_printer() {
        let (tx, _rx) = crate::events::channel();
        let manager = PrinterManager::open_in_memory(QueueConfig::default(), tx).unwrap();
        let printer_id = Uuid::new_v4();
        manager.set_route(PrintJobType::Receipt, printer_id).await;

        let (routed, job_id) = manager.submit_job(PrintJobType::Receipt, vec![0x1b, b'@'], 5).await.unwrap();
        assert_eq!(routed, printer_id);
        assert!(job_id > 0);
        assert_eq!(manager.queue_length(printer_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn payload_round_trips_through_base64() {
        let bytes = vec![0x1b, b'@', 0x00, 0xffu8];
        let payload = encode_payload(&bytes);
        assert_eq!(decode_payload(&payload), bytes);
    }

    /// S3 — primary offline, fallback online: every receipt job routes to
    /// the fallback and the primary's queue stays empty.
    #[tokio::test]
    async fn jobs_fall_back_to_the_backup_printer_while_the_primary_is_offline() {
        let (tx, _rx) = crate::events::channel();
        let manager = PrinterManager::open_in_memory(QueueConfig::default(), tx).unwrap();
        let primary = Uuid::new_v4();
        let fallback = Uuid::new_v4();
        manager.set_route(PrintJobType::Receipt, primary).await;
        manager.set_fallback(primary, fallback).await;
        manager.status.write().await.update(&primary.to_string(), PrinterState::Offline, Some(4), 0);

        for _ in 0..3 {
            let (routed, job_id) = manager.submit_job(PrintJobType::Receipt, vec![0x1b, b'@'], 0).await.unwrap();
            assert_eq!(routed, fallback);
            assert!(job_id > 0);
        }

        assert_eq!(manager.queue_length(primary).await.unwrap(), 0);
        assert_eq!(manager.queue_length(fallback).await.unwrap(), 3);
    }
}
