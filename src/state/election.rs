//! Leader Election
//!
//! Lease-based single-leader election over a shared transactional store.
//! Every tick each process opens a backend transaction, reads the claim
//! and decides whether to claim, renew or steal it. The backend's atomic
//! conditional write is the only arbiter between racing processes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::config::ElectionConfig;
use crate::error::{Error, Result};
use crate::id::ProcessId;
use crate::lease::{self, Decision};
use crate::state::{ChangeHandler, LeaderState, Notifier};

/// Result of one acquisition attempt that reached the backend
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    /// Claim written and committed
    Acquired(Decision),
    /// Another process holds a live claim
    Deferred(String),
}

/// Election participant for one process
pub struct Election {
    /// This process's identity
    id: ProcessId,
    /// Election configuration
    config: ElectionConfig,
    /// Shared store; the mutex serialises attempts
    backend: Mutex<Box<dyn Backend>>,
    /// Cached leadership status
    state: LeaderState,
    /// Transition observers
    notifier: Notifier,
    /// Set while the driver loop is active
    running: AtomicBool,
    /// Set while a backend transaction is open; left set if an attempt was cancelled
    tx_open: AtomicBool,
    /// Shutdown signal
    shutdown: watch::Sender<bool>,
}

impl Election {
    /// Create a new election participant with a freshly generated identity
    pub fn new(config: ElectionConfig, backend: impl Backend + 'static) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            id: ProcessId::generate(),
            config,
            backend: Mutex::new(Box::new(backend)),
            state: LeaderState::new(),
            notifier: Notifier::new(),
            running: AtomicBool::new(false),
            tx_open: AtomicBool::new(false),
            shutdown: shutdown_tx,
        }
    }

    /// Use a specific identity instead of a generated one
    pub fn with_id(mut self, id: ProcessId) -> Self {
        self.id = id;
        self
    }

    /// Register an observer for leadership transitions
    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let handler: ChangeHandler = Arc::new(callback);
        self.notifier.register(handler);
        self
    }

    /// Get this process's identity
    pub fn id(&self) -> &ProcessId {
        &self.id
    }

    /// Get the election name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the election configuration
    pub fn config(&self) -> &ElectionConfig {
        &self.config
    }

    /// Check if this process currently believes it is the leader
    pub fn is_leader(&self) -> bool {
        self.state.is_leader()
    }

    /// Observe leadership status changes (latest value only)
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Run `action` only if this process is currently the leader.
    ///
    /// Leadership may be lost externally while `action` runs; this is a
    /// check, not a fence.
    pub fn run_if_leader<F>(&self, action: F) -> bool
    where
        F: FnOnce(),
    {
        let lead = self.is_leader();
        if lead {
            action();
        }
        lead
    }

    /// Async variant of [`Election::run_if_leader`], returning the action's output
    pub async fn run_if_leader_async<F, Fut, T>(&self, action: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_leader() {
            Some(action().await)
        } else {
            None
        }
    }

    /// Check if the driver loop is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Make one acquisition attempt and return the resulting status.
    ///
    /// Errors are not surfaced: any failure leaves this process a follower
    /// until a later attempt succeeds.
    pub async fn try_acquire(&self) -> bool {
        let mut backend = self.backend.lock().await;

        let lead = match self.attempt(&mut **backend).await {
            Ok(Outcome::Acquired(decision)) => {
                tracing::debug!(
                    "Election {}: {} succeeded for {}",
                    self.config.name,
                    decision,
                    self.id
                );
                true
            }
            Ok(Outcome::Deferred(holder)) => {
                tracing::debug!(
                    "Election {}: claim held by {}, not stale",
                    self.config.name,
                    holder
                );
                false
            }
            Err(e) => {
                tracing::warn!("Election {}: attempt failed: {}", self.config.name, e);
                false
            }
        };

        let was_leader = self.state.set(lead);
        drop(backend);

        if lead != was_leader {
            self.announce(lead);
        }
        lead
    }

    /// One attempt inside a backend transaction. The transaction is always
    /// rolled back afterwards, which is a no-op once committed.
    async fn attempt(&self, backend: &mut dyn Backend) -> Result<Outcome> {
        self.begin(backend).await?;
        let result = self.attempt_in_tx(backend).await;
        self.rollback(backend).await;
        result
    }

    async fn begin(&self, backend: &mut dyn Backend) -> Result<()> {
        if self.tx_open.load(Ordering::Acquire) {
            tracing::debug!(
                "Election {}: rolling back transaction of a cancelled attempt",
                self.config.name
            );
            self.rollback(backend).await;
        }
        backend.begin().await?;
        self.tx_open.store(true, Ordering::Release);
        Ok(())
    }

    async fn rollback(&self, backend: &mut dyn Backend) {
        if let Err(e) = backend.rollback().await {
            tracing::trace!("Election {}: rollback failed: {}", self.config.name, e);
        }
        self.tx_open.store(false, Ordering::Release);
    }

    async fn attempt_in_tx(&self, backend: &mut dyn Backend) -> Result<Outcome> {
        let claim = backend.current().await?;

        let decision = lease::decide(&claim, &self.id, self.config.timeout());
        if !decision.writes() {
            return Ok(Outcome::Deferred(claim.holder.unwrap_or_default()));
        }

        if decision == Decision::Steal {
            tracing::info!(
                "Election {}: lease of {} is stale (last heartbeat {} ago), taking over",
                self.config.name,
                claim.holder.as_deref().unwrap_or_default(),
                claim.age()
            );
        }

        backend.try_acquire(&self.id).await?;
        backend.commit().await?;
        Ok(Outcome::Acquired(decision))
    }

    fn announce(&self, lead: bool) {
        if lead {
            tracing::info!("Election {}: {} became LEADER", self.config.name, self.id);
        } else {
            tracing::warn!("Election {}: {} lost leadership", self.config.name, self.id);
        }
        self.notifier.notify(lead);
    }

    /// Release the claim if this process holds it, and step down
    pub async fn resign(&self) -> Result<()> {
        let mut backend = self.backend.lock().await;
        if !self.state.is_leader() {
            return Ok(());
        }

        self.begin(&mut **backend).await?;
        let result = async {
            backend.release(&self.id).await?;
            backend.commit().await
        }
        .await;
        self.rollback(&mut **backend).await;
        result?;

        self.state.set(false);
        drop(backend);

        tracing::info!("Election {}: {} resigned from leadership", self.config.name, self.id);
        self.notifier.notify(false);
        Ok(())
    }

    /// Run the periodic driver until [`Election::stop`] is called.
    ///
    /// Only one driver may be active per election. Whenever the driver
    /// ends, including when its future is dropped, this process steps down
    /// locally; without renewals the claim will go stale. `stop` is final:
    /// a stopped election's driver returns immediately.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }
        let _guard = DriverGuard { election: self };

        let mut shutdown_rx = self.shutdown.subscribe();
        let heartbeat = self.config.heartbeat_interval();

        tracing::info!(
            "Starting leader election {} (process: {}, heartbeat: {:?}, timeout: {:?})",
            self.config.name,
            self.id,
            heartbeat,
            self.config.timeout()
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.try_acquire().await;

            tokio::select! {
                _ = tokio::time::sleep(heartbeat) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        if self.config.release_on_stop {
            if let Err(e) = self.resign().await {
                tracing::warn!("Election {}: failed to release claim: {}", self.config.name, e);
            }
        }

        tracing::info!("Leader election {} stopped", self.config.name);
        Ok(())
    }

    /// Drop local leadership without touching the backend
    fn step_down(&self) {
        if self.state.set(false) {
            tracing::info!(
                "Election {}: {} stepped down, driver stopped",
                self.config.name,
                self.id
            );
            self.notifier.notify(false);
        }
    }

    /// Run the driver on a background task
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<()>> {
        let election = Arc::clone(self);
        tokio::spawn(async move { election.run().await })
    }

    /// Signal the driver to stop. Takes effect even before `run` starts.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Clears the running flag and steps down when the driver ends
struct DriverGuard<'a> {
    election: &'a Election,
}

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        self.election.step_down();
        self.election.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStore, NoopBackend, SqliteBackend};
    use crate::lease::Claim;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn config() -> ElectionConfig {
        ElectionConfig {
            name: "test".into(),
            heartbeat_interval_ms: 15_000,
            timeout_ms: 25_000,
            release_on_stop: false,
        }
    }

    fn fast_config() -> ElectionConfig {
        ElectionConfig {
            heartbeat_interval_ms: 10,
            ..config()
        }
    }

    /// Records transitions delivered to an observer
    fn observed(election: Election) -> (Election, mpsc::UnboundedReceiver<bool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let election = election.on_change(move |lead| {
            let _ = tx.send(lead);
        });
        (election, rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<bool>) -> bool {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no transition delivered")
            .expect("observer channel closed")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<bool>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "unexpected transition");
    }

    /// Call counters and failure switches shared with a [`ScriptedBackend`]
    #[derive(Default)]
    struct Script {
        begin: AtomicUsize,
        commit: AtomicUsize,
        rollback: AtomicUsize,
        try_acquire: AtomicUsize,
        fail_begin: AtomicBool,
        fail_current: AtomicBool,
        fail_acquire: AtomicBool,
        fail_commit: AtomicBool,
        hang_current: AtomicBool,
    }

    impl Script {
        fn count(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        fn fail(switch: &AtomicBool, on: bool) {
            switch.store(on, Ordering::SeqCst);
        }
    }

    /// Backend with a fixed claim that renews as the caller
    struct ScriptedBackend {
        claim: Claim,
        script: Arc<Script>,
    }

    impl ScriptedBackend {
        fn new(claim: Claim) -> (Self, Arc<Script>) {
            let script = Arc::new(Script::default());
            let backend = Self {
                claim,
                script: Arc::clone(&script),
            };
            (backend, script)
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn begin(&mut self) -> Result<()> {
            self.script.begin.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_begin.load(Ordering::SeqCst) {
                return Err(Error::Backend("connection refused".into()));
            }
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.script.commit.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_commit.load(Ordering::SeqCst) {
                return Err(Error::Backend("commit failed".into()));
            }
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.script.rollback.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn current(&mut self) -> Result<Claim> {
            if self.script.hang_current.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.script.fail_current.load(Ordering::SeqCst) {
                return Err(Error::Backend("read failed".into()));
            }
            Ok(self.claim.clone())
        }

        async fn try_acquire(&mut self, id: &ProcessId) -> Result<()> {
            self.script.try_acquire.fetch_add(1, Ordering::SeqCst);
            if self.script.fail_acquire.load(Ordering::SeqCst) {
                return Err(Error::Conflict("lost the race".into()));
            }
            let now = Utc::now();
            self.claim = Claim::new(Some(id.to_string()), now, now);
            Ok(())
        }
    }

    fn held_by(holder: &str, age_secs: i64) -> Claim {
        let now = Utc::now();
        Claim::new(Some(holder.into()), now - chrono::Duration::seconds(age_secs), now)
    }

    #[tokio::test]
    async fn test_vacant_claim_single_process_becomes_leader() {
        let store = MemoryStore::new();
        let (election, mut rx) = observed(Election::new(config(), store.backend()));

        assert!(!election.is_leader());
        assert!(election.try_acquire().await);
        assert!(election.is_leader());
        assert_eq!(store.holder().as_deref(), Some(election.id().as_str()));

        assert!(next_event(&mut rx).await);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_live_foreign_claim_is_not_contested() {
        let (backend, script) = ScriptedBackend::new(held_by("P1", 10));
        let (election, mut rx) =
            observed(Election::new(config(), backend).with_id(ProcessId::from_raw("P2")));

        assert!(!election.try_acquire().await);
        assert!(!election.is_leader());
        assert_eq!(Script::count(&script.try_acquire), 0);
        assert_eq!(Script::count(&script.rollback), 1);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_stale_foreign_claim_is_stolen() {
        let (backend, script) = ScriptedBackend::new(held_by("P1", 30));
        let (election, mut rx) =
            observed(Election::new(config(), backend).with_id(ProcessId::from_raw("P2")));

        assert!(election.try_acquire().await);
        assert!(election.is_leader());
        assert_eq!(Script::count(&script.try_acquire), 1);
        assert_eq!(Script::count(&script.commit), 1);
        assert!(next_event(&mut rx).await);
    }

    #[tokio::test]
    async fn test_stale_claim_in_shared_store_is_stolen() {
        let store = MemoryStore::new();
        store.set_claim("P1", store.now() - chrono::Duration::seconds(30));
        let election = Election::new(config(), store.backend()).with_id(ProcessId::from_raw("P2"));

        assert!(election.try_acquire().await);
        assert_eq!(store.holder().as_deref(), Some("P2"));
    }

    #[tokio::test]
    async fn test_read_failure_leaves_follower_and_rolls_back() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        Script::fail(&script.fail_current, true);
        let (election, mut rx) = observed(Election::new(config(), backend));

        assert!(!election.try_acquire().await);
        assert!(!election.is_leader());
        assert_eq!(Script::count(&script.rollback), 1);
        assert_eq!(Script::count(&script.try_acquire), 0);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_read_failure_demotes_leader() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        let (election, mut rx) = observed(Election::new(config(), backend));

        assert!(election.try_acquire().await);
        assert!(next_event(&mut rx).await);

        Script::fail(&script.fail_current, true);
        assert!(!election.try_acquire().await);
        assert!(!election.is_leader());
        assert!(!next_event(&mut rx).await);
        assert_eq!(Script::count(&script.rollback), 2);

        // recovers on the next tick once the backend is healthy again
        Script::fail(&script.fail_current, false);
        assert!(election.try_acquire().await);
        assert!(next_event(&mut rx).await);
    }

    #[tokio::test]
    async fn test_foreign_overwrite_demotes_leader() {
        let store = MemoryStore::new();
        let (election, mut rx) = observed(Election::new(config(), store.backend()));
        assert!(election.try_acquire().await);
        assert!(next_event(&mut rx).await);

        store.set_claim("P1", store.now());
        assert!(!election.try_acquire().await);
        assert!(!election.is_leader());
        assert!(!next_event(&mut rx).await);
    }

    #[tokio::test]
    async fn test_begin_failure_skips_rollback() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        Script::fail(&script.fail_begin, true);
        let election = Election::new(config(), backend);

        assert!(!election.try_acquire().await);
        assert_eq!(Script::count(&script.begin), 1);
        assert_eq!(Script::count(&script.rollback), 0);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_follower() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        Script::fail(&script.fail_acquire, true);
        let election = Election::new(config(), backend);

        assert!(!election.try_acquire().await);
        assert_eq!(Script::count(&script.commit), 0);
        assert_eq!(Script::count(&script.rollback), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_follower() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        Script::fail(&script.fail_commit, true);
        let election = Election::new(config(), backend);

        assert!(!election.try_acquire().await);
        assert!(!election.is_leader());
        assert_eq!(Script::count(&script.commit), 1);
        assert_eq!(Script::count(&script.rollback), 1);
    }

    #[tokio::test]
    async fn test_renewals_notify_once() {
        let store = MemoryStore::new();
        let (election, mut rx) = observed(Election::new(config(), store.backend()));

        for _ in 0..5 {
            assert!(election.try_acquire().await);
        }
        assert_eq!(store.version(), 5);
        assert!(next_event(&mut rx).await);
        assert_quiet(&mut rx).await;
    }

    #[tokio::test]
    async fn test_renewing_leader_keeps_lease() {
        let store = MemoryStore::new();
        let a = Election::new(config(), store.backend());
        let b = Election::new(config(), store.backend());

        assert!(a.try_acquire().await);
        for _ in 0..10 {
            // each step is shorter than the 25s timeout
            store.advance(Duration::from_secs(15));
            assert!(!b.try_acquire().await);
            assert!(a.try_acquire().await);
        }
        assert_eq!(store.holder().as_deref(), Some(a.id().as_str()));
    }

    #[tokio::test]
    async fn test_takeover_only_after_timeout() {
        let store = MemoryStore::new();
        let a = Election::new(config(), store.backend());
        let b = Election::new(config(), store.backend());

        assert!(a.try_acquire().await);

        store.advance(Duration::from_secs(20));
        assert!(!b.try_acquire().await);

        store.advance(Duration::from_secs(6));
        assert!(b.try_acquire().await);
        assert_eq!(store.holder().as_deref(), Some(b.id().as_str()));

        // the old leader finds out on its next attempt
        assert!(a.is_leader());
        assert!(!a.try_acquire().await);
        assert!(!a.is_leader());
    }

    #[tokio::test]
    async fn test_racing_elections_single_winner() {
        let store = MemoryStore::new();
        let elections: Vec<Arc<Election>> = (0..8)
            .map(|_| Arc::new(Election::new(config(), store.backend())))
            .collect();

        for _ in 0..5 {
            let handles: Vec<_> = elections
                .iter()
                .map(|e| {
                    let e = Arc::clone(e);
                    tokio::spawn(async move { e.try_acquire().await })
                })
                .collect();

            let mut leaders = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    leaders += 1;
                }
            }
            assert_eq!(leaders, 1);
        }

        let holder = store.holder().unwrap();
        let leader = elections.iter().find(|e| e.is_leader()).unwrap();
        assert_eq!(leader.id().as_str(), holder);
    }

    #[tokio::test]
    async fn test_optimistic_conflict_between_begin_and_commit() {
        let store = MemoryStore::new();
        let mut a = store.backend();
        let b = Election::new(config(), store.backend());

        // `a` opens a transaction and sees a vacant claim
        a.begin().await.unwrap();
        assert!(a.current().await.unwrap().is_vacant());

        // `b` wins the claim in the meantime
        assert!(b.try_acquire().await);

        a.try_acquire(&ProcessId::from_raw("A")).await.unwrap_err();
        a.rollback().await.unwrap();
        assert_eq!(store.holder().as_deref(), Some(b.id().as_str()));
    }

    #[tokio::test]
    async fn test_sqlite_shared_file_single_winner() {
        let dir = tempdir().unwrap();
        let open = || {
            SqliteBackend::open(
                &dir.path().join("election.db"),
                "leader_election",
                "test",
                Duration::from_millis(500),
            )
            .unwrap()
        };
        let a = Election::new(config(), open());
        let b = Election::new(config(), open());

        assert!(a.try_acquire().await);
        assert!(!b.try_acquire().await);
        assert!(a.try_acquire().await);
        assert!(a.is_leader());
        assert!(!b.is_leader());
    }

    #[tokio::test]
    async fn test_noop_backend_always_leads() {
        let election = Election::new(config(), NoopBackend::new());
        assert!(election.try_acquire().await);
        assert!(election.try_acquire().await);
        assert!(election.is_leader());
    }

    #[tokio::test]
    async fn test_run_if_leader() {
        let election = Election::new(config(), NoopBackend::new());
        let mut ran = false;
        assert!(!election.run_if_leader(|| ran = true));
        assert!(!ran);

        election.try_acquire().await;
        assert!(election.run_if_leader(|| ran = true));
        assert!(ran);

        assert_eq!(election.run_if_leader_async(|| async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn test_driver_runs_until_stopped() {
        let store = MemoryStore::new();
        let election = Arc::new(Election::new(fast_config(), store.backend()));
        let mut status = election.subscribe();

        let handle = election.spawn();
        tokio::time::timeout(Duration::from_secs(1), status.wait_for(|lead| *lead))
            .await
            .unwrap()
            .unwrap();
        assert!(election.is_running());

        // a second driver is refused
        assert!(matches!(election.run().await, Err(Error::AlreadyRunning)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.version() > 1, "leader should keep renewing");

        election.stop();
        handle.await.unwrap().unwrap();
        assert!(!election.is_running());
        // claim is kept unless release_on_stop is set
        assert_eq!(store.holder().as_deref(), Some(election.id().as_str()));
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let election = Election::new(fast_config(), NoopBackend::new());
        election.stop();
        tokio::time::timeout(Duration::from_secs(1), election.run())
            .await
            .unwrap()
            .unwrap();
        assert!(!election.is_leader());
    }

    #[tokio::test]
    async fn test_release_on_stop() {
        let store = MemoryStore::new();
        let config = ElectionConfig {
            release_on_stop: true,
            ..fast_config()
        };
        let (election, mut rx) = observed(Election::new(config, store.backend()));
        let election = Arc::new(election);

        let handle = election.spawn();
        assert!(next_event(&mut rx).await);

        election.stop();
        handle.await.unwrap().unwrap();

        assert!(!election.is_leader());
        assert!(store.holder().is_none());
        assert!(!next_event(&mut rx).await);
    }

    #[tokio::test]
    async fn test_resign_lets_peer_take_over() {
        let store = MemoryStore::new();
        let a = Election::new(config(), store.backend());
        let b = Election::new(config(), store.backend());

        assert!(a.try_acquire().await);
        a.resign().await.unwrap();
        assert!(!a.is_leader());
        assert!(b.try_acquire().await);

        // resigning as follower touches nothing
        a.resign().await.unwrap();
        assert_eq!(store.holder().as_deref(), Some(b.id().as_str()));
    }

    #[tokio::test]
    async fn test_stopped_driver_steps_down() {
        let store = MemoryStore::new();
        let (a, mut rx) = observed(Election::new(fast_config(), store.backend()));
        let a = Arc::new(a);
        let b = Election::new(config(), store.backend());

        let handle = a.spawn();
        assert!(next_event(&mut rx).await);

        a.stop();
        handle.await.unwrap().unwrap();
        assert!(!a.is_leader());
        assert!(!a.run_if_leader(|| {}));
        assert!(!next_event(&mut rx).await);

        // the unreleased claim goes stale and a peer takes over
        assert!(!b.try_acquire().await);
        store.advance(Duration::from_secs(60));
        assert!(b.try_acquire().await);
        assert!(!a.is_leader());
        assert!(b.is_leader());
    }

    #[tokio::test]
    async fn test_dropped_driver_can_be_restarted() {
        let store = MemoryStore::new();
        let election = Arc::new(Election::new(fast_config(), store.backend()));

        let dropped = tokio::time::timeout(Duration::from_millis(50), election.run()).await;
        assert!(dropped.is_err());
        assert!(!election.is_running());
        assert!(!election.is_leader());

        let mut status = election.subscribe();
        let handle = election.spawn();
        tokio::time::timeout(Duration::from_secs(1), status.wait_for(|lead| *lead))
            .await
            .unwrap()
            .unwrap();

        election.stop();
        handle.await.unwrap().unwrap();
        assert!(!election.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_attempt_is_rolled_back_before_next() {
        let (backend, script) = ScriptedBackend::new(Claim::vacant(Utc::now()));
        Script::fail(&script.hang_current, true);
        let election = Election::new(config(), backend);

        let cancelled = tokio::time::timeout(Duration::from_millis(50), election.try_acquire()).await;
        assert!(cancelled.is_err());
        assert_eq!(Script::count(&script.rollback), 0);

        Script::fail(&script.hang_current, false);
        assert!(election.try_acquire().await);
        assert_eq!(Script::count(&script.begin), 2);
        // one for the abandoned transaction, one after the successful attempt
        assert_eq!(Script::count(&script.rollback), 2);
    }

    #[tokio::test]
    async fn test_stop_is_final() {
        let store = MemoryStore::new();
        let election = Arc::new(Election::new(fast_config(), store.backend()));

        let handle = election.spawn();
        let mut status = election.subscribe();
        tokio::time::timeout(Duration::from_secs(1), status.wait_for(|lead| *lead))
            .await
            .unwrap()
            .unwrap();
        election.stop();
        handle.await.unwrap().unwrap();

        let version = store.version();
        tokio::time::timeout(Duration::from_secs(1), election.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.version(), version);
        assert!(!election.is_leader());
    }
}
