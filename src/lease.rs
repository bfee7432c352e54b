//! Lease Policy
//!
//! Decides, from a snapshot of the shared claim, whether this process
//! should write a new claim. The decision is pure: all clock readings come
//! from the backend so that local clock skew does not affect staleness.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ProcessId;

/// Snapshot of the leadership claim as read inside a backend transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Current holder, `None` when no process holds the claim
    pub holder: Option<String>,
    /// Time of the holder's last successful heartbeat
    pub last_heartbeat: DateTime<Utc>,
    /// Backend-supplied current time
    pub now: DateTime<Utc>,
}

impl Claim {
    /// Build a snapshot, treating an empty holder as vacant
    pub fn new(holder: Option<String>, last_heartbeat: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            holder: holder.filter(|h| !h.is_empty()),
            last_heartbeat,
            now,
        }
    }

    /// A vacant claim observed at `now`
    pub fn vacant(now: DateTime<Utc>) -> Self {
        Self {
            holder: None,
            last_heartbeat: now,
            now,
        }
    }

    /// Check if nobody holds the claim
    pub fn is_vacant(&self) -> bool {
        self.holder.is_none()
    }

    /// Time elapsed since the last heartbeat, by the backend's clock
    pub fn age(&self) -> chrono::Duration {
        self.now.signed_duration_since(self.last_heartbeat)
    }

    /// Check if the lease has expired: backend time strictly after
    /// `last_heartbeat + timeout`. A deadline that overflows never expires.
    pub fn is_stale(&self, timeout: Duration) -> bool {
        chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|t| self.last_heartbeat.checked_add_signed(t))
            .map(|deadline| self.now > deadline)
            .unwrap_or(false)
    }
}

/// Outcome of the lease policy for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nobody holds the claim
    Claim,
    /// We hold the claim and refresh its heartbeat
    Renew,
    /// Another process holds a stale claim
    Steal,
    /// Another process holds a live claim
    Defer,
}

impl Decision {
    /// Whether this decision leads to a write attempt
    pub fn writes(&self) -> bool {
        !matches!(self, Decision::Defer)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Claim => write!(f, "CLAIM"),
            Decision::Renew => write!(f, "RENEW"),
            Decision::Steal => write!(f, "STEAL"),
            Decision::Defer => write!(f, "DEFER"),
        }
    }
}

/// Apply the lease policy. Cases are checked in order: vacant, held by
/// us, held by a stale peer; anything else defers.
pub fn decide(claim: &Claim, me: &ProcessId, timeout: Duration) -> Decision {
    match claim.holder.as_deref() {
        None => Decision::Claim,
        Some(holder) if me.matches(holder) => Decision::Renew,
        Some(_) if claim.is_stale(timeout) => Decision::Steal,
        Some(_) => Decision::Defer,
    }
}
