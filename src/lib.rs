//! WolfElect - Lease-Based Leader Election
//!
//! Picks a single leader among a fleet of independent processes that share
//! a durable coordination point, such as a row in a SQL database.
//!
//! # Architecture
//!
//! Each process runs one election driver. On every heartbeat the driver
//! opens a transaction on the shared store, reads the current claim and
//! claims it if it is vacant, renews it if it is ours, or steals it if its
//! holder has not renewed within the lease timeout. The store's
//! transactional isolation is the only arbiter between racing processes:
//! this is lease-based mutual exclusion, not a consensus protocol.
//!
//! # Features
//!
//! - Pluggable backends: no-op, in-memory, SQLite and MySQL/MariaDB
//! - Backend-supplied clock for staleness checks (no local clock skew)
//! - Non-blocking leadership checks from any number of tasks
//! - Ordered change notification and `watch`-based status observers
//! - Graceful stop with optional claim release

pub mod backend;
pub mod config;
pub mod error;
pub mod id;
pub mod lease;
pub mod state;

pub use config::WolfElectConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backend::{Backend, MemoryStore, NoopBackend, SqliteBackend};
    pub use crate::config::{BackendConfig, ElectionConfig, WolfElectConfig};
    pub use crate::error::{Error, Result};
    pub use crate::id::ProcessId;
    pub use crate::lease::{Claim, Decision};
    pub use crate::state::Election;
}
