//! In-Memory Backend
//!
//! A shared claim store living inside one process. Every election holding
//! a [`MemoryBackend`] from the same [`MemoryStore`] competes for the same
//! claim. Writes use optimistic concurrency: a transaction remembers the
//! store version it started from and fails with [`Error::Conflict`] if any
//! other writer committed in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Backend;
use crate::error::{Error, Result};
use crate::id::ProcessId;
use crate::lease::Claim;

#[derive(Debug, Default)]
struct StoreInner {
    holder: Option<String>,
    last_heartbeat: Option<DateTime<Utc>>,
    /// Bumped on every committed write
    version: u64,
    /// Added to the wall clock when the store reports its time
    skew: Duration,
}

impl StoreInner {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::from_std(self.skew).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Shared claim store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend handle connected to this store
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            store: self.clone(),
            tx: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current holder of the claim
    pub fn holder(&self) -> Option<String> {
        self.lock().holder.clone()
    }

    /// Current time by the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.lock().now()
    }

    /// Number of committed writes so far
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Overwrite the claim directly, bypassing transactions
    pub fn set_claim(&self, holder: impl Into<String>, last_heartbeat: DateTime<Utc>) {
        let mut inner = self.lock();
        inner.holder = Some(holder.into());
        inner.last_heartbeat = Some(last_heartbeat);
        inner.version += 1;
    }

    /// Remove the claim
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.holder = None;
        inner.last_heartbeat = None;
        inner.version += 1;
    }

    /// Move the store clock forward
    pub fn advance(&self, by: Duration) {
        let mut inner = self.lock();
        inner.skew += by;
    }
}

#[derive(Debug)]
enum Staged {
    Acquire(String),
    Release(String),
}

#[derive(Debug)]
struct Pending {
    version: u64,
    write: Option<Staged>,
}

/// Backend handle onto a [`MemoryStore`]
#[derive(Debug)]
pub struct MemoryBackend {
    store: MemoryStore,
    tx: Option<Pending>,
}

impl MemoryBackend {
    fn pending(&mut self) -> Result<&mut Pending> {
        self.tx.as_mut().ok_or(Error::NoTransaction)
    }

    fn stage(&mut self, write: Staged) -> Result<()> {
        let version = self.store.version();
        let pending = self.pending()?;
        if pending.version != version {
            return Err(Error::Conflict(format!(
                "store moved from version {} to {}",
                pending.version, version
            )));
        }
        pending.write = Some(write);
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::Backend("transaction already open".into()));
        }
        self.tx = Some(Pending {
            version: self.store.version(),
            write: None,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(pending) = self.tx.take() else {
            return Ok(());
        };
        let Some(write) = pending.write else {
            return Ok(());
        };

        let mut inner = self.store.lock();
        if inner.version != pending.version {
            return Err(Error::Conflict(format!(
                "store moved from version {} to {}",
                pending.version, inner.version
            )));
        }

        match write {
            Staged::Acquire(holder) => {
                let now = inner.now();
                inner.last_heartbeat = Some(now);
                inner.holder = Some(holder);
            }
            Staged::Release(holder) => {
                if inner.holder.as_deref() == Some(holder.as_str()) {
                    inner.holder = None;
                    inner.last_heartbeat = None;
                }
            }
        }
        inner.version += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }

    async fn current(&mut self) -> Result<Claim> {
        self.pending()?;
        let inner = self.store.lock();
        let now = inner.now();
        Ok(Claim::new(
            inner.holder.clone(),
            inner.last_heartbeat.unwrap_or(now),
            now,
        ))
    }

    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
        self.stage(Staged::Acquire(id.to_string()))
    }

    async fn release(&mut self, id: &ProcessId) -> Result<()> {
        self.stage(Staged::Release(id.to_string()))
    }
}
