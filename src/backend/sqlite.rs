//! SQLite Backend
//!
//! Stores the claim in a SQLite table shared by every participant that
//! opens the same database file. `BEGIN IMMEDIATE` takes the database
//! write lock up front, so the read-decide-write sequence of one attempt
//! cannot interleave with another process's attempt. Timestamps come from
//! SQLite's clock.
//!
//! Calls are synchronous: under contention `begin` parks the calling
//! runtime worker for up to the configured busy timeout. Keep
//! `busy_timeout_ms` well below the heartbeat interval, and prefer a
//! multi-threaded runtime when other work shares it.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{from_millis, Backend};
use crate::config::validate_table;
use crate::error::{Error, Result};
use crate::id::ProcessId;
use crate::lease::Claim;

/// Current time in unix milliseconds, evaluated by SQLite
const NOW_MS: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

/// Claim store backed by SQLite
pub struct SqliteBackend {
    /// Database connection
    conn: Connection,
    /// Claim table name
    table: String,
    /// Election name (row key)
    name: String,
    /// Whether a transaction is open
    in_tx: bool,
}

impl SqliteBackend {
    /// Create or open the claim database
    pub fn open(path: &Path, table: &str, name: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table, name, busy_timeout)
    }

    /// Use an existing connection
    pub fn with_connection(
        conn: Connection,
        table: &str,
        name: &str,
        busy_timeout: Duration,
    ) -> Result<Self> {
        validate_table(table)?;
        conn.busy_timeout(busy_timeout)?;

        // Initialize schema
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                name TEXT PRIMARY KEY,
                holder TEXT NOT NULL,
                heartbeat_ms INTEGER NOT NULL
            );
            "#
        ))?;

        Ok(Self {
            conn,
            table: table.to_string(),
            name: name.to_string(),
            in_tx: false,
        })
    }

    fn ensure_tx(&self) -> Result<()> {
        if self.in_tx {
            Ok(())
        } else {
            Err(Error::NoTransaction)
        }
    }

    fn now_ms(&self) -> Result<i64> {
        let now: i64 = self
            .conn
            .query_row(&format!("SELECT {NOW_MS}"), [], |row| row.get(0))?;
        Ok(now)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    /// Blocks the current thread while another connection holds the write lock
    async fn begin(&mut self) -> Result<()> {
        if self.in_tx {
            return Err(Error::Backend("transaction already open".into()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if !self.in_tx {
            return Ok(());
        }
        self.conn.execute_batch("COMMIT")?;
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_tx {
            return Ok(());
        }
        self.in_tx = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    async fn current(&mut self) -> Result<Claim> {
        self.ensure_tx()?;

        let now = from_millis(self.now_ms()?)?;
        let result: std::result::Result<(String, i64), _> = self.conn.query_row(
            &format!("SELECT holder, heartbeat_ms FROM {} WHERE name = ?1", self.table),
            params![self.name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );

        match result {
            Ok((holder, heartbeat_ms)) => {
                Ok(Claim::new(Some(holder), from_millis(heartbeat_ms)?, now))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Claim::vacant(now)),
            Err(e) => Err(Error::Backend(format!("Failed to read claim: {}", e))),
        }
    }

    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
        self.ensure_tx()?;
        self.conn.execute(
            &format!(
                r#"
                INSERT INTO {table} (name, holder, heartbeat_ms) VALUES (?1, ?2, {NOW_MS})
                ON CONFLICT(name) DO UPDATE SET holder = ?2, heartbeat_ms = {NOW_MS}
                "#,
                table = self.table
            ),
            params![self.name, id.as_str()],
        )?;
        Ok(())
    }

    async fn release(&mut self, id: &ProcessId) -> Result<()> {
        self.ensure_tx()?;
        self.conn.execute(
            &format!("DELETE FROM {} WHERE name = ?1 AND holder = ?2", self.table),
            params![self.name, id.as_str()],
        )?;
        Ok(())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Backend(format!("SQLite error: {}", e))
    }
}
