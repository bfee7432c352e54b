//! Backend Module
//!
//! The election core talks to the shared store only through the
//! [`Backend`] trait. A backend wraps one transactional scope at a time;
//! the atomicity of its conditional write is the only thing preventing
//! two processes from committing a claim for the same instant.

mod memory;
mod mysql;
mod noop;
mod sqlite;

pub use memory::{MemoryBackend, MemoryStore};
pub use mysql::MySqlBackend;
pub use noop::NoopBackend;
pub use sqlite::SqliteBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::id::ProcessId;
use crate::lease::Claim;

/// Transactional access to the shared leadership claim
#[async_trait]
pub trait Backend: Send {
    /// Open a transactional scope against the shared store
    async fn begin(&mut self) -> Result<()>;

    /// Durably apply writes made in the open scope. A no-op if nothing was written.
    async fn commit(&mut self) -> Result<()>;

    /// Discard uncommitted writes. Safe to call after `commit` (no-op then).
    async fn rollback(&mut self) -> Result<()>;

    /// Read the present claim together with the backend's current time
    async fn current(&mut self) -> Result<Claim>;

    /// Write a claim naming `id` with a fresh heartbeat, as of the open scope.
    /// Fails if the write conflicts with a concurrent writer.
    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()>;

    /// Delete the claim if, and only if, it is held by `id`
    async fn release(&mut self, _id: &ProcessId) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    async fn begin(&mut self) -> Result<()> {
        (**self).begin().await
    }

    async fn commit(&mut self) -> Result<()> {
        (**self).commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        (**self).rollback().await
    }

    async fn current(&mut self) -> Result<Claim> {
        (**self).current().await
    }

    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
        (**self).try_acquire(id).await
    }

    async fn release(&mut self, id: &ProcessId) -> Result<()> {
        (**self).release(id).await
    }
}

/// Open the backend described by the configuration
pub async fn open(config: &BackendConfig, election: &str) -> Result<Box<dyn Backend>> {
    config.validate()?;

    match config {
        BackendConfig::Noop => Ok(Box::new(NoopBackend::new())),
        BackendConfig::Sqlite { path, table, busy_timeout_ms } => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let backend = SqliteBackend::open(
                path,
                table,
                election,
                Duration::from_millis(*busy_timeout_ms),
            )?;
            Ok(Box::new(backend))
        }
        BackendConfig::Mysql { .. } => {
            let backend = MySqlBackend::connect(config, election).await?;
            Ok(Box::new(backend))
        }
    }
}

/// Unix milliseconds to a UTC timestamp
pub(crate) fn from_millis(ms: i64) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| crate::Error::Backend(format!("Timestamp out of range: {}", ms)))
}
