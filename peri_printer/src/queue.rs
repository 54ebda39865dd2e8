//! Durable per-printer print queue. Grounded on the teacher-adjacent printer
//! daemon's `queue::QueueManager`, with one deliberate deviation: that
//! daemon stores jobs through `tokio_rusqlite` (an actor-per-connection
//! wrapper); this crate uses plain `rusqlite` behind a `Mutex` and runs every
//! call through `tokio::task::spawn_blocking`, matching the synchronous
//! storage access pattern the rest of this workspace uses (`peri_core`'s
//! config store and transaction log do the same). See DESIGN.md.

use crate::error::{PrinterError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

pub const PENDING: &str = "pending";
pub const PRINTING: &str = "printing";
pub const COMPLETED: &str = "completed";
pub const FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: i64,
    pub printer_id: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 500,
            max_retry_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub printing: u64,
    pub completed: u64,
    pub failed: u64,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<PrintJob> {
    let payload_text: String = row.get("payload")?;
    Ok(PrintJob {
        id: row.get("id")?,
        printer_id: row.get("printer_id")?,
        job_type: row.get("job_type")?,
        payload: serde_json::from_str(&payload_text).unwrap_or(serde_json::Value::Null),
        priority: row.get("priority")?,
        status: row.get("status")?,
        retry_count: row.get("retry_count")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

pub struct QueueManager {
    conn: Arc<Mutex<Connection>>,
    config: QueueConfig,
}

impl QueueManager {
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    pub fn open_in_memory(config: QueueConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS print_jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                printer_id TEXT NOT NULL,
                job_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_print_jobs_printer_status
                ON print_jobs (printer_id, status);
            CREATE INDEX IF NOT EXISTS idx_print_jobs_dequeue
                ON print_jobs (printer_id, status, priority DESC, created_at ASC);",
        )?;
        Ok(())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// `base * 2^(retry_count)`, capped — used by the worker between retries
    /// of the same job, mirroring `peri_transport::backoff`.
    pub fn retry_delay_ms(&self, retry_count: u32) -> u64 {
        let scaled = self
            .config
            .retry_base_delay_ms
            .saturating_mul(1u64 << retry_count.min(16));
        scaled.min(self.config.max_retry_delay_ms)
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| PrinterError::Other(anyhow::anyhow!("queue task join error: {e}")))?
        .map_err(PrinterError::from)
    }

    pub async fn enqueue(
        &self,
        printer_id: String,
        job_type: String,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<i64> {
        let payload_text = serde_json::to_string(&payload)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO print_jobs (printer_id, job_type, payload, priority, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                params![printer_id, job_type, payload_text, priority, now_millis()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Atomically claims the next pending job for `printer_id`: highest
    /// priority first, then oldest first, transitioning it to `printing` as
    /// one statement so two concurrent workers can never claim the same row.
    pub async fn dequeue(&self, printer_id: String) -> Result<Option<PrintJob>> {
        self.with_conn(move |conn| {
            let id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM print_jobs
                     WHERE printer_id = ?1 AND status = 'pending'
                     ORDER BY priority DESC, created_at ASC
                     LIMIT 1",
                    params![printer_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = id else { return Ok(None) };

            let updated = conn.execute(
                "UPDATE print_jobs SET status = 'printing', started_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, now_millis()],
            )?;
            if updated == 0 {
                // Lost the race to another worker between the select and the update.
                return Ok(None);
            }

            conn.query_row(
                "SELECT * FROM print_jobs WHERE id = ?1",
                params![id],
                row_to_job,
            )
            .optional()
        })
        .await
    }

    pub async fn mark_completed(&self, id: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE print_jobs SET status = 'completed', completed_at = ?2 WHERE id = ?1",
                params![id, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_failed(&self, id: i64, err: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE print_jobs SET status = 'failed', last_error = ?2, completed_at = ?3 WHERE id = ?1",
                params![id, err, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    /// `retryCount += 1`, `status -> pending` — re-eligible for the next
    /// `dequeue`. Callers check `retry_count >= config.max_retries` first
    /// and call `mark_failed` instead once exhausted.
    pub async fn increment_retry(&self, id: i64) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE print_jobs SET retry_count = retry_count + 1, status = 'pending' WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn set_last_error(&self, id: i64, msg: String) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE print_jobs SET last_error = ?2 WHERE id = ?1",
                params![id, msg],
            )?;
            Ok(())
        })
        .await
    }

    /// Crash recovery: on startup, any row still `printing` means the
    /// process died mid-send. Reset them to `pending` before any worker
    /// starts so they get picked up again.
    pub async fn reset_printing_jobs(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE print_jobs SET status = 'pending', started_at = NULL WHERE status = 'printing'",
                [],
            )?;
            Ok(n as u64)
        })
        .await
    }

    pub async fn get_queued_jobs(&self, printer_id: String) -> Result<Vec<PrintJob>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM print_jobs WHERE printer_id = ?1 AND status IN ('pending', 'printing')
                 ORDER BY priority DESC, created_at ASC",
            )?;
            let rows = stmt.query_map(params![printer_id], row_to_job)?;
            rows.collect()
        })
        .await
    }

    pub async fn get_queue_length(&self, printer_id: String, status: Option<String>) -> Result<u64> {
        self.with_conn(move |conn| match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM print_jobs WHERE printer_id = ?1 AND status = ?2",
                params![printer_id, status],
                |row| row.get(0),
            ),
            None => conn.query_row(
                "SELECT COUNT(*) FROM print_jobs WHERE printer_id = ?1",
                params![printer_id],
                |row| row.get(0),
            ),
        })
        .await
    }

    pub async fn get_stats(&self, printer_id: String) -> Result<QueueStats> {
        self.with_conn(move |conn| {
            let mut stats = QueueStats::default();
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM print_jobs WHERE printer_id = ?1 GROUP BY status",
            )?;
            let rows = stmt.query_map(params![printer_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?;
            for row in rows {
                let (status, count) = row?;
                match status.as_str() {
                    PENDING => stats.pending = count,
                    PRINTING => stats.printing = count,
                    COMPLETED => stats.completed = count,
                    FAILED => stats.failed = count,
                    _ => {}
                }
            }
            Ok(stats)
        })
        .await
    }

    pub async fn clear_queue(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM print_jobs WHERE status IN ('pending', 'printing')", [])?;
            Ok(())
        })
        .await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM print_jobs WHERE status IN ('completed', 'failed')", [])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager() -> QueueManager {
        QueueManager::open_in_memory(QueueConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn dequeue_honors_priority_then_fifo() {
        let q = manager();
        q.enqueue("p1".into(), "receipt".into(), json!({"n": 1}), 0).await.unwrap();
        q.enqueue("p1".into(), "receipt".into(), json!({"n": 2}), 5).await.unwrap();
        q.enqueue("p1".into(), "receipt".into(), json!({"n": 3}), 5).await.unwrap();

        let first = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(first.payload["n"], 2);
        let second = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(second.payload["n"], 3);
        let third = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(third.payload["n"], 1);
        assert!(q.dequeue("p1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dequeued_job_does_not_reappear_until_requeued() {
        let q = manager();
        let id = q.enqueue("p1".into(), "receipt".into(), json!({}), 0).await.unwrap();
        let job = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, PRINTING);
        assert!(q.dequeue("p1".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn increment_retry_makes_job_eligible_again() {
        let q = manager();
        let id = q.enqueue("p1".into(), "receipt".into(), json!({}), 0).await.unwrap();
        q.dequeue("p1".into()).await.unwrap();
        q.increment_retry(id).await.unwrap();
        let job = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.status, PRINTING);
    }

    #[tokio::test]
    async fn reset_printing_jobs_recovers_from_crash() {
        let q = manager();
        q.enqueue("p1".into(), "receipt".into(), json!({}), 0).await.unwrap();
        q.dequeue("p1".into()).await.unwrap();
        assert_eq!(q.get_queue_length("p1".into(), Some(PRINTING.into())).await.unwrap(), 1);

        let recovered = q.reset_printing_jobs().await.unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(q.get_queue_length("p1".into(), Some(PENDING.into())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stats_counts_by_status() {
        let q = manager();
        let a = q.enqueue("p1".into(), "receipt".into(), json!({}), 0).await.unwrap();
        q.enqueue("p1".into(), "receipt".into(), json!({}), 0).await.unwrap();
        let dequeued = q.dequeue("p1".into()).await.unwrap().unwrap();
        assert_eq!(dequeued.id, a);
        q.mark_completed(a).await.unwrap();

        let stats = q.get_stats("p1".into()).await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
    }
}
