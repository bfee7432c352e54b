//! MySQL / MariaDB Backend
//!
//! Keeps the claim as one row per election in a shared table. The row is
//! read with `SELECT ... FOR UPDATE`, so a competing attempt blocks on the
//! row lock until this transaction ends, and the server's clock supplies
//! every timestamp.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, MySqlPool, Transaction};

use super::{from_millis, Backend};
use crate::config::{validate_table, BackendConfig};
use crate::error::{Error, Result};
use crate::id::ProcessId;
use crate::lease::Claim;

/// Current time in unix milliseconds, evaluated by the server
const NOW_MS: &str = "CAST(UNIX_TIMESTAMP(NOW(3)) * 1000 AS SIGNED)";

/// Claim store backed by a MySQL-compatible server
pub struct MySqlBackend {
    /// Connection pool
    pool: MySqlPool,
    /// Claim table name
    table: String,
    /// Election name (row key)
    name: String,
    /// Open transaction, if any
    tx: Option<Transaction<'static, MySql>>,
}

impl MySqlBackend {
    /// Connect using a `kind = "mysql"` backend configuration
    pub async fn connect(config: &BackendConfig, name: &str) -> Result<Self> {
        let BackendConfig::Mysql {
            host,
            port,
            user,
            password,
            database,
            pool_size,
            connect_timeout_secs,
            table,
        } = config
        else {
            return Err(Error::Config(format!(
                "expected a mysql backend, got {}",
                config.kind()
            )));
        };

        let url = format!("mysql://{}:{}@{}:{}/{}", user, password, host, port, database);
        let pool = MySqlPoolOptions::new()
            .max_connections(*pool_size)
            .acquire_timeout(Duration::from_secs(*connect_timeout_secs))
            .connect(&url)
            .await?;

        Self::with_pool(pool, table, name).await
    }

    /// Use an existing pool, creating the claim table if needed
    pub async fn with_pool(pool: MySqlPool, table: &str, name: &str) -> Result<Self> {
        validate_table(table)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                name VARCHAR(191) NOT NULL PRIMARY KEY,
                holder VARCHAR(64) NOT NULL,
                heartbeat_ms BIGINT NOT NULL
            )
            "#
        ))
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            table: table.to_string(),
            name: name.to_string(),
            tx: None,
        })
    }

    fn tx(&mut self) -> Result<&mut Transaction<'static, MySql>> {
        self.tx.as_mut().ok_or(Error::NoTransaction)
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::Backend("transaction already open".into()));
        }
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn current(&mut self) -> Result<Claim> {
        let sql = format!(
            "SELECT holder, heartbeat_ms, {NOW_MS} FROM {} WHERE name = ? FOR UPDATE",
            self.table
        );
        let now_sql = format!("SELECT {NOW_MS}");
        let name = self.name.clone();
        let tx = self.tx()?;

        let row: Option<(String, i64, i64)> = sqlx::query_as(&sql)
            .bind(&name)
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some((holder, heartbeat_ms, now_ms)) => Ok(Claim::new(
                Some(holder),
                from_millis(heartbeat_ms)?,
                from_millis(now_ms)?,
            )),
            None => {
                let (now_ms,): (i64,) = sqlx::query_as(&now_sql).fetch_one(&mut **tx).await?;
                Ok(Claim::vacant(from_millis(now_ms)?))
            }
        }
    }

    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (name, holder, heartbeat_ms) VALUES (?, ?, {NOW_MS})
            ON DUPLICATE KEY UPDATE holder = VALUES(holder), heartbeat_ms = VALUES(heartbeat_ms)
            "#,
            self.table
        );
        let name = self.name.clone();
        let tx = self.tx()?;

        sqlx::query(&sql)
            .bind(&name)
            .bind(id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn release(&mut self, id: &ProcessId) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE name = ? AND holder = ?", self.table);
        let name = self.name.clone();
        let tx = self.tx()?;

        sqlx::query(&sql)
            .bind(&name)
            .bind(id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
