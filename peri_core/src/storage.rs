//! Peripheral configuration store and transaction log. Both are plain
//! `rusqlite` behind a `Mutex`, run through `spawn_blocking` — the same
//! synchronous storage pattern `peri_printer::queue` uses, kept uniform
//! across the workspace rather than mixing in an async SQLite wrapper for
//! just this one crate. See DESIGN.md.

use crate::error::{OrchestratorError, Result};
use crate::model::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc::now()
}

struct Db(Arc<Mutex<Connection>>);

impl Db {
    async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.0.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| OrchestratorError::Other(anyhow::anyhow!("storage task join error: {e}")))?
        .map_err(OrchestratorError::from)
    }
}

pub struct ConfigStore {
    db: Db,
}

fn device_kind_str(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::PaymentTerminal => "payment-terminal",
        DeviceKind::CashDrawer => "cash-drawer",
        DeviceKind::Printer => "printer",
    }
}

fn parse_device_kind(s: &str) -> DeviceKind {
    match s {
        "cash-drawer" => DeviceKind::CashDrawer,
        "printer" => DeviceKind::Printer,
        _ => DeviceKind::PaymentTerminal,
    }
}

fn protocol_str(p: Protocol) -> &'static str {
    match p {
        Protocol::GenericEcr => "generic-ecr",
        Protocol::Zvt => "zvt",
        Protocol::Pax => "pax",
        Protocol::EscPos => "esc-pos",
    }
}

fn parse_protocol(s: &str) -> Protocol {
    match s {
        "zvt" => Protocol::Zvt,
        "pax" => Protocol::Pax,
        "esc-pos" => Protocol::EscPos,
        _ => Protocol::GenericEcr,
    }
}

fn row_to_device(row: &rusqlite::Row) -> rusqlite::Result<Device> {
    let id: String = row.get("id")?;
    let kind: String = row.get("kind")?;
    let protocol: String = row.get("protocol")?;
    let connection_json: String = row.get("connection")?;
    let settings_json: String = row.get("settings")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Device {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name: row.get("name")?,
        kind: parse_device_kind(&kind),
        connection: serde_json::from_str(&connection_json).unwrap_or_default(),
        protocol: parse_protocol(&protocol),
        terminal_id: row.get("terminal_id")?,
        merchant_id: row.get("merchant_id")?,
        is_default: row.get::<_, i64>("is_default")? != 0,
        enabled: row.get::<_, i64>("enabled")? != 0,
        settings: serde_json::from_str(&settings_json).unwrap_or(serde_json::Value::Null),
        created_at: created_at.parse().unwrap_or_else(|_| now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| now()),
    })
}

impl ConfigStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Db(Arc::new(Mutex::new(conn))),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Db(Arc::new(Mutex::new(conn))),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                connection TEXT NOT NULL,
                protocol TEXT NOT NULL,
                terminal_id TEXT,
                merchant_id TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                settings TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
    }

    /// Inserts a new device. `is_default` is enforced as a single-winner
    /// flag per kind: clearing any existing default of the same kind and
    /// inserting the new row happen in one transaction.
    pub async fn add_device(&self, mut device: Device) -> Result<Device> {
        device.created_at = now();
        device.updated_at = device.created_at;
        let d = device.clone();

        self.db
            .call(move |conn| {
                let tx = conn.unchecked_transaction()?;
                if d.is_default {
                    tx.execute(
                        "UPDATE devices SET is_default = 0 WHERE kind = ?1",
                        params![device_kind_str(d.kind)],
                    )?;
                }
                tx.execute(
                    "INSERT INTO devices (id, name, kind, connection, protocol, terminal_id, merchant_id, is_default, enabled, settings, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        d.id.to_string(),
                        d.name,
                        device_kind_str(d.kind),
                        serde_json::to_string(&d.connection).unwrap(),
                        protocol_str(d.protocol),
                        d.terminal_id,
                        d.merchant_id,
                        d.is_default as i64,
                        d.enabled as i64,
                        serde_json::to_string(&d.settings).unwrap(),
                        d.created_at.to_rfc3339(),
                        d.updated_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(device)
    }

    pub async fn update_device(&self, device: Device) -> Result<Device> {
        let mut device = device;
        device.updated_at = now();
        let d = device.clone();

        self.db
            .call(move |conn| {
                let tx = conn.unchecked_transaction()?;
                if d.is_default {
                    tx.execute(
                        "UPDATE devices SET is_default = 0 WHERE kind = ?1 AND id != ?2",
                        params![device_kind_str(d.kind), d.id.to_string()],
                    )?;
                }
                tx.execute(
                    "UPDATE devices SET name=?2, kind=?3, connection=?4, protocol=?5, terminal_id=?6,
                     merchant_id=?7, is_default=?8, enabled=?9, settings=?10, updated_at=?11 WHERE id=?1",
                    params![
                        d.id.to_string(),
                        d.name,
                        device_kind_str(d.kind),
                        serde_json::to_string(&d.connection).unwrap(),
                        protocol_str(d.protocol),
                        d.terminal_id,
                        d.merchant_id,
                        d.is_default as i64,
                        d.enabled as i64,
                        serde_json::to_string(&d.settings).unwrap(),
                        d.updated_at.to_rfc3339(),
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        Ok(device)
    }

    pub async fn remove_device(&self, id: Uuid) -> Result<()> {
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM devices WHERE id = ?1", params![id.to_string()])?;
                Ok(())
            })
            .await
    }

    pub async fn get_device(&self, id: Uuid) -> Result<Option<Device>> {
        self.db
            .call(move |conn| {
                conn.query_row("SELECT * FROM devices WHERE id = ?1", params![id.to_string()], row_to_device)
                    .optional()
            })
            .await
    }

    pub async fn get_devices(&self) -> Result<Vec<Device>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT * FROM devices ORDER BY created_at ASC")?;
                let rows = stmt.query_map([], row_to_device)?;
                rows.collect()
            })
            .await
    }

    pub async fn get_default_device(&self, kind: DeviceKind) -> Result<Option<Device>> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT * FROM devices WHERE kind = ?1 AND is_default = 1",
                    params![device_kind_str(kind)],
                    row_to_device,
                )
                .optional()
            })
            .await
    }

    pub async fn name_exists(&self, name: String, excluding: Option<Uuid>) -> Result<bool> {
        self.db
            .call(move |conn| {
                let count: i64 = match excluding {
                    Some(id) => conn.query_row(
                        "SELECT COUNT(*) FROM devices WHERE name = ?1 AND id != ?2",
                        params![name, id.to_string()],
                        |r| r.get(0),
                    )?,
                    None => conn.query_row(
                        "SELECT COUNT(*) FROM devices WHERE name = ?1",
                        params![name],
                        |r| r.get(0),
                    )?,
                };
                Ok(count > 0)
            })
            .await
    }
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let id: String = row.get("id")?;
    let device_id: String = row.get("device_id")?;
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    let card_type: Option<String> = row.get("card_type")?;
    let entry_method: Option<String> = row.get("entry_method")?;
    let original_transaction_id: Option<String> = row.get("original_transaction_id")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(Transaction {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        device_id: Uuid::parse_str(&device_id).unwrap_or_default(),
        order_id: row.get("order_id")?,
        kind: parse_transaction_kind(&kind),
        amount_minor_units: row.get("amount_minor_units")?,
        tip_amount_minor_units: row.get("tip_amount_minor_units")?,
        currency: row.get("currency")?,
        status: parse_transaction_status(&status),
        authorization_code: row.get("authorization_code")?,
        terminal_reference: row.get("terminal_reference")?,
        card_type: card_type.as_deref().map(parse_card_type),
        card_last_four: row.get("card_last_four")?,
        entry_method: entry_method.as_deref().map(parse_entry_method),
        cardholder_name: row.get("cardholder_name")?,
        customer_receipt: row.get("customer_receipt")?,
        merchant_receipt: row.get("merchant_receipt")?,
        error_message: row.get("error_message")?,
        error_code: row.get("error_code")?,
        original_transaction_id: original_transaction_id.and_then(|s| Uuid::parse_str(&s).ok()),
        started_at: started_at.and_then(|s| s.parse().ok()),
        completed_at: completed_at.and_then(|s| s.parse().ok()),
        created_at: created_at.parse().unwrap_or_else(|_| now()),
    })
}

fn transaction_kind_str(k: TransactionKind) -> &'static str {
    match k {
        TransactionKind::Sale => "sale",
        TransactionKind::Refund => "refund",
        TransactionKind::Void => "void",
        TransactionKind::PreAuth => "pre-auth",
        TransactionKind::PreAuthCompletion => "pre-auth-completion",
    }
}
fn parse_transaction_kind(s: &str) -> TransactionKind {
    match s {
        "refund" => TransactionKind::Refund,
        "void" => TransactionKind::Void,
        "pre-auth" => TransactionKind::PreAuth,
        "pre-auth-completion" => TransactionKind::PreAuthCompletion,
        _ => TransactionKind::Sale,
    }
}

fn transaction_status_str(s: TransactionStatus) -> &'static str {
    match s {
        TransactionStatus::Pending => "pending",
        TransactionStatus::Processing => "processing",
        TransactionStatus::Approved => "approved",
        TransactionStatus::Declined => "declined",
        TransactionStatus::Error => "error",
        TransactionStatus::Timeout => "timeout",
        TransactionStatus::Cancelled => "cancelled",
    }
}
fn parse_transaction_status(s: &str) -> TransactionStatus {
    match s {
        "processing" => TransactionStatus::Processing,
        "approved" => TransactionStatus::Approved,
        "declined" => TransactionStatus::Declined,
        "error" => TransactionStatus::Error,
        "timeout" => TransactionStatus::Timeout,
        "cancelled" => TransactionStatus::Cancelled,
        _ => TransactionStatus::Pending,
    }
}

fn card_type_str(c: CardType) -> &'static str {
    match c {
        CardType::Visa => "visa",
        CardType::Mastercard => "mastercard",
        CardType::Amex => "amex",
        CardType::Maestro => "maestro",
        CardType::Unknown => "unknown",
    }
}
fn parse_card_type(s: &str) -> CardType {
    match s {
        "visa" => CardType::Visa,
        "mastercard" => CardType::Mastercard,
        "amex" => CardType::Amex,
        "maestro" => CardType::Maestro,
        _ => CardType::Unknown,
    }
}

fn entry_method_str(e: EntryMethod) -> &'static str {
    match e {
        EntryMethod::Chip => "chip",
        EntryMethod::Contactless => "contactless",
        EntryMethod::Swipe => "swipe",
        EntryMethod::Manual => "manual",
        EntryMethod::Unknown => "unknown",
    }
}
fn parse_entry_method(s: &str) -> EntryMethod {
    match s {
        "chip" => EntryMethod::Chip,
        "contactless" => EntryMethod::Contactless,
        "swipe" => EntryMethod::Swipe,
        "manual" => EntryMethod::Manual,
        _ => EntryMethod::Unknown,
    }
}

pub struct TransactionLog {
    db: Db,
}

impl TransactionLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Db(Arc::new(Mutex::new(conn))),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Db(Arc::new(Mutex::new(conn))),
        })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                order_id TEXT,
                kind TEXT NOT NULL,
                amount_minor_units INTEGER NOT NULL,
                tip_amount_minor_units INTEGER,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                authorization_code TEXT,
                terminal_reference TEXT,
                card_type TEXT,
                card_last_four TEXT,
                entry_method TEXT,
                cardholder_name TEXT,
                customer_receipt TEXT,
                merchant_receipt TEXT,
                error_message TEXT,
                error_code TEXT,
                original_transaction_id TEXT,
                started_at TEXT,
                completed_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tx_device ON transactions (device_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_tx_order ON transactions (order_id);",
        )
    }

    pub async fn insert(&self, tx: Transaction) -> Result<Transaction> {
        let t = tx.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO transactions (id, device_id, order_id, kind, amount_minor_units, tip_amount_minor_units,
                     currency, status, authorization_code, terminal_reference, card_type, card_last_four, entry_method,
                     cardholder_name, customer_receipt, merchant_receipt, error_message, error_code,
                     original_transaction_id, started_at, completed_at, created_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
                    params![
                        t.id.to_string(),
                        t.device_id.to_string(),
                        t.order_id,
                        transaction_kind_str(t.kind),
                        t.amount_minor_units,
                        t.tip_amount_minor_units,
                        t.currency,
                        transaction_status_str(t.status),
                        t.authorization_code,
                        t.terminal_reference,
                        t.card_type.map(card_type_str),
                        t.card_last_four,
                        t.entry_method.map(entry_method_str),
                        t.cardholder_name,
                        t.customer_receipt,
                        t.merchant_receipt,
                        t.error_message,
                        t.error_code,
                        t.original_transaction_id.map(|u| u.to_string()),
                        t.started_at.map(|d| d.to_rfc3339()),
                        t.completed_at.map(|d| d.to_rfc3339()),
                        t.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(tx)
    }

    /// Transactions are never mutated after a terminal response except by
    /// this update path, used to move `pending -> processing -> <final>`.
    pub async fn update(&self, tx: Transaction) -> Result<Transaction> {
        let t = tx.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "UPDATE transactions SET status=?2, authorization_code=?3, terminal_reference=?4,
                     card_type=?5, card_last_four=?6, entry_method=?7, cardholder_name=?8, customer_receipt=?9,
                     merchant_receipt=?10, error_message=?11, error_code=?12, started_at=?13, completed_at=?14
                     WHERE id=?1",
                    params![
                        t.id.to_string(),
                        transaction_status_str(t.status),
                        t.authorization_code,
                        t.terminal_reference,
                        t.card_type.map(card_type_str),
                        t.card_last_four,
                        t.entry_method.map(entry_method_str),
                        t.cardholder_name,
                        t.customer_receipt,
                        t.merchant_receipt,
                        t.error_message,
                        t.error_code,
                        t.started_at.map(|d| d.to_rfc3339()),
                        t.completed_at.map(|d| d.to_rfc3339()),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(tx)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Transaction>> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT * FROM transactions WHERE id = ?1",
                    params![id.to_string()],
                    row_to_transaction,
                )
                .optional()
            })
            .await
    }

    pub async fn get_for_order(&self, order_id: String) -> Result<Option<Transaction>> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    "SELECT * FROM transactions WHERE order_id = ?1 ORDER BY created_at DESC LIMIT 1",
                    params![order_id],
                    row_to_transaction,
                )
                .optional()
            })
            .await
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<Transaction>> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT * FROM transactions ORDER BY created_at DESC LIMIT ?1")?;
                let rows = stmt.query_map(params![limit], row_to_transaction)?;
                rows.collect()
            })
            .await
    }

    pub async fn query(&self, filter: TransactionFilter) -> Result<Vec<Transaction>> {
        self.db
            .call(move |conn| {
                let mut sql = "SELECT * FROM transactions WHERE 1=1".to_string();
                let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

                if let Some(device_id) = filter.device_id {
                    sql.push_str(" AND device_id = ?");
                    args.push(Box::new(device_id.to_string()));
                }
                if let Some(status) = filter.status {
                    sql.push_str(" AND status = ?");
                    args.push(Box::new(transaction_status_str(status).to_string()));
                }
                if let Some(kind) = filter.kind {
                    sql.push_str(" AND kind = ?");
                    args.push(Box::new(transaction_kind_str(kind).to_string()));
                }
                if let Some(from) = filter.from {
                    sql.push_str(" AND created_at >= ?");
                    args.push(Box::new(from.to_rfc3339()));
                }
                if let Some(to) = filter.to {
                    sql.push_str(" AND created_at <= ?");
                    args.push(Box::new(to.to_rfc3339()));
                }
                sql.push_str(" ORDER BY created_at DESC");

                let mut stmt = conn.prepare(&sql)?;
                let params_ref: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
                let rows = stmt.query_map(params_ref.as_slice(), row_to_transaction)?;
                rows.collect()
            })
            .await
    }

    pub async fn stats(&self, filter: TransactionFilter) -> Result<TransactionStats> {
        let rows = self.query(filter).await?;
        let mut stats = TransactionStats::default();
        for t in &rows {
            stats.count += 1;
            stats.total_amount_minor_units += t.amount_minor_units;
            match t.status {
                TransactionStatus::Approved => stats.approved_count += 1,
                TransactionStatus::Declined => stats.declined_count += 1,
                TransactionStatus::Error | TransactionStatus::Timeout => stats.error_count += 1,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_device(name: &str, kind: DeviceKind, is_default: bool) -> Device {
        Device {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            connection: Connection::default(),
            protocol: Protocol::Zvt,
            terminal_id: None,
            merchant_id: None,
            is_default,
            enabled: true,
            settings: serde_json::json!({}),
            created_at: now(),
            updated_at: now(),
        }
    }

    #[tokio::test]
    async fn setting_a_new_default_clears_the_old_one() {
        let store = ConfigStore::open_in_memory().unwrap();
        let first = store
            .add_device(sample_device("Terminal A", DeviceKind::PaymentTerminal, true))
            .await
            .unwrap();
        let second = store
            .add_device(sample_device("Terminal B", DeviceKind::PaymentTerminal, true))
            .await
            .unwrap();

        let first = store.get_device(first.id).await.unwrap().unwrap();
        assert!(!first.is_default);
        let default = store.get_default_device(DeviceKind::PaymentTerminal).await.unwrap().unwrap();
        assert_eq!(default.id, second.id);
    }

    #[tokio::test]
    async fn name_uniqueness_check() {
        let store = ConfigStore::open_in_memory().unwrap();
        store.add_device(sample_device("Terminal A", DeviceKind::PaymentTerminal, false)).await.unwrap();
        assert!(store.name_exists("Terminal A".to_string(), None).await.unwrap());
        assert!(!store.name_exists("Terminal Z".to_string(), None).await.unwrap());
    }

    #[tokio::test]
    async fn transaction_round_trips() {
        let log = TransactionLog::open_in_memory().unwrap();
        let device_id = Uuid::new_v4();
        let tx = Transaction {
            id: Uuid::new_v4(),
            device_id,
            order_id: Some("order-1".to_string()),
            kind: TransactionKind::Sale,
            amount_minor_units: 1234,
            tip_amount_minor_units: None,
            currency: "EUR".to_string(),
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
            created_at: now(),
        };
        log.insert(tx.clone()).await.unwrap();

        let mut updated = tx.clone();
        updated.status = TransactionStatus::Approved;
        updated.authorization_code = Some("123456".to_string());
        log.update(updated).await.unwrap();

        let fetched = log.get(tx.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, TransactionStatus::Approved);
        assert_eq!(fetched.authorization_code.as_deref(), Some("123456"));

        let by_order = log.get_for_order("order-1".to_string()).await.unwrap().unwrap();
        assert_eq!(by_order.id, tx.id);
    }
}
