//! Change Notifier
//!
//! Delivers leadership transitions to registered observers. Transitions
//! are queued and drained by a single dispatcher task, so observers see
//! them in the order they happened and never run on the election's
//! critical path. The dispatcher is spawned on the first transition.
//! A panicking observer is logged and skipped; the others still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

/// Observer callback invoked with the new leadership status
pub type ChangeHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// Ordered dispatcher of leadership transitions
pub struct Notifier {
    handlers: Vec<ChangeHandler>,
    tx: mpsc::UnboundedSender<bool>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<bool>>>,
}

impl Notifier {
    /// Create a notifier with no observers
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handlers: Vec::new(),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Register an observer
    pub fn register(&mut self, handler: ChangeHandler) {
        self.handlers.push(handler);
    }

    /// Check if nobody is listening
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Queue a transition. Must be called from within a tokio runtime.
    pub fn notify(&self, lead: bool) {
        if self.handlers.is_empty() {
            return;
        }

        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(rx) = rx {
            tokio::spawn(dispatch(rx, self.handlers.clone()));
        }

        if self.tx.send(lead).is_err() {
            tracing::warn!("Leadership observer dispatcher has stopped; dropping transition to {}", lead);
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<bool>, handlers: Vec<ChangeHandler>) {
    while let Some(lead) = rx.recv().await {
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(lead))) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic".to_string());
                tracing::error!(
                    "Leadership observer {} panicked on transition to {}: {}",
                    index,
                    lead,
                    message
                );
            }
        }
    }
    tracing::trace!("Leadership observer dispatcher stopped");
}
