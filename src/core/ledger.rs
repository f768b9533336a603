use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

use crate::core::outcome::OutcomeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub attempts: u32,
    pub last_status: OutcomeStatus,
}

/// Whether a previously seen record may be dispatched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Any record already attempted is skipped, even if it failed.
    #[default]
    AtMostOnce,
    /// Failed records are retried until `max_attempts` attempts were made.
    RetryFailed { max_attempts: u32 },
}

impl RetryPolicy {
    /// `0` keeps at-most-once; anything else caps total attempts.
    pub fn from_max_attempts(max_attempts: u32) -> Self {
        match max_attempts {
            0 | 1 => RetryPolicy::AtMostOnce,
            n => RetryPolicy::RetryFailed { max_attempts: n },
        }
    }

    pub fn should_skip(&self, entry: Option<&LedgerEntry>) -> bool {
        let Some(entry) = entry else {
            return false;
        };
        match self {
            RetryPolicy::AtMostOnce => true,
            RetryPolicy::RetryFailed { max_attempts } => {
                entry.last_status == OutcomeStatus::Success || entry.attempts >= *max_attempts
            }
        }
    }
}

/// The executed-record set, keyed by `Record::ledger_key`.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn lookup(&self, key: &str) -> Result<Option<LedgerEntry>>;

    async fn mark_run(&self, key: &str, status: OutcomeStatus) -> Result<()>;

    async fn has_run(&self, key: &str) -> Result<bool> {
        Ok(self.lookup(key).await?.is_some())
    }
}

/// Process-lifetime ledger.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl RunLedger for MemoryLedger {
    async fn lookup(&self, key: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.entries.lock().await.get(key).copied())
    }

    async fn mark_run(&self, key: &str, status: OutcomeStatus) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(LedgerEntry {
            attempts: 0,
            last_status: status,
        });
        entry.attempts += 1;
        entry.last_status = status;
        Ok(())
    }
}

/// Ledger persisted to a SQLite file so the at-most-once guarantee
/// survives restarts.
pub struct SqliteLedger {
    db: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Connection::open(path)
            .with_context(|| format!("failed to open ledger {}", path.display()))?;
        Self::with_connection(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(db: Connection) -> Result<Self> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS executed_records (
                key TEXT PRIMARY KEY,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_status TEXT NOT NULL,
                executed_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(Self { db: Mutex::new(db) })
    }
}

#[async_trait]
impl RunLedger for SqliteLedger {
    async fn lookup(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT attempts, last_status FROM executed_records WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(attempts, status)| LedgerEntry {
            attempts: attempts.max(0) as u32,
            // Unreadable status counts as done; a duplicate run is worse.
            last_status: OutcomeStatus::from_status(&status).unwrap_or(OutcomeStatus::Success),
        }))
    }

    async fn mark_run(&self, key: &str, status: OutcomeStatus) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO executed_records (key, attempts, last_status, executed_at)
             VALUES (?1, 1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET
                attempts = attempts + 1,
                last_status = excluded.last_status,
                executed_at = CURRENT_TIMESTAMP",
            params![key, status.as_str()],
        )?;
        Ok(())
    }
}
