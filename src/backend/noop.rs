//! No-op Backend
//!
//! Coordinates nothing: every operation succeeds and whoever acquires
//! the claim keeps it forever. Useful for single-process deployments.

use async_trait::async_trait;
use chrono::Utc;

use super::Backend;
use crate::error::Result;
use crate::id::ProcessId;
use crate::lease::Claim;

/// Backend that always grants leadership
#[derive(Debug, Default)]
pub struct NoopBackend {
    holder: Option<String>,
}

impl NoopBackend {
    /// Create a vacant no-op backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for NoopBackend {
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    async fn current(&mut self) -> Result<Claim> {
        let now = Utc::now();
        Ok(Claim::new(self.holder.clone(), now, now))
    }

    async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
        self.holder = Some(id.to_string());
        Ok(())
    }

    async fn release(&mut self, id: &ProcessId) -> Result<()> {
        if self.holder.as_deref() == Some(id.as_str()) {
            self.holder = None;
        }
        Ok(())
    }
}
