//! Leadership Flag
//!
//! Process-local "am I the leader" flag. One writer (the election) and any
//! number of readers. Backed by a `watch` channel so that reads are a
//! short shared-lock borrow and async observers can wait for changes.

use tokio::sync::watch;

/// Cached leadership status of this process
#[derive(Debug)]
pub struct LeaderState {
    lead: watch::Sender<bool>,
}

impl LeaderState {
    /// New state, not leader
    pub fn new() -> Self {
        let (lead, _) = watch::channel(false);
        Self { lead }
    }

    /// Current cached status. Never waits on backend I/O.
    pub fn is_leader(&self) -> bool {
        *self.lead.borrow()
    }

    /// Store the outcome of an attempt, returning the previous value
    pub(crate) fn set(&self, lead: bool) -> bool {
        self.lead.send_replace(lead)
    }

    /// Receiver that observes the latest status
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.lead.subscribe()
    }
}

impl Default for LeaderState {
    fn default() -> Self {
        Self::new()
    }
}
