//! The account pool scheduler: owns every `Account`, dispatches
//! check-out/check-in, and parks accounts under flood-wait. Grounded in
//! `tg/account/collection.py`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::account::account::{Account, AccountError, CodeFn, PasswordFn};
use crate::rpc::{RpcClientFactory, RpcError};
use crate::storage::{BlobStore, BlobStoreError};
use crate::utils::metrics::PoolMetrics;
use crate::utils::progress::ProgressReporter;

pub const MAX_ACC_WAITING_TIME: Duration = Duration::from_secs(300);
const SESSION_LOCK_KEY: &str = ".session_lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPolicy {
    Ignore,
    Raise,
    Revalidate,
}

impl Default for InvalidPolicy {
    fn default() -> Self {
        InvalidPolicy::Revalidate
    }
}

impl InvalidPolicy {
    fn revalidate(self) -> bool {
        matches!(self, InvalidPolicy::Revalidate)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("another session already holds the pool lock")]
    SessionsInUse,

    #[error("account {phone} failed to start: {source}")]
    AccountStartFailed { phone: String, source: AccountError },

    #[error("no account became available in time (available_at={available_at:?})")]
    AllAccountsUnavailable { available_at: Option<DateTime<Utc>> },

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),
}

/// One account plus the state the scheduler needs to track it outside the
/// account's own fields (the `available` queue itself lives in `Pool`).
struct Slot<F: RpcClientFactory> {
    account: Arc<Mutex<Account<F>>>,
}

/// Owns every `Account` for a session and dispatches check-out/check-in.
///
/// The `available` queue is an mpsc channel of phone keys rather than of the
/// accounts themselves: an `Account` is never copied or moved, only looked up
/// by phone in `accounts` and locked for the duration of a checkout.
pub struct Pool<F: RpcClientFactory> {
    store: Arc<dyn BlobStore>,
    factory: Arc<F>,
    accounts: HashMap<String, Slot<F>>,
    invalid_policy: InvalidPolicy,
    available_tx: mpsc::UnboundedSender<String>,
    available_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    max_acc_waiting_time: Duration,
    code_fn: CodeFn,
    password_fn: PasswordFn,
    metrics: Option<Arc<PoolMetrics>>,
}

impl<F: RpcClientFactory + 'static> Pool<F> {
    pub fn new(
        store: Arc<dyn BlobStore>,
        factory: Arc<F>,
        phones: impl IntoIterator<Item = String>,
        invalid_policy: InvalidPolicy,
        code_fn: CodeFn,
        password_fn: PasswordFn,
    ) -> Self {
        let (available_tx, available_rx) = mpsc::unbounded_channel();
        let accounts = phones
            .into_iter()
            .map(|phone| {
                let account = Account::new(store.clone(), factory.clone(), phone.clone());
                (phone, Slot { account: Arc::new(Mutex::new(account)) })
            })
            .collect();

        Self {
            store,
            factory,
            accounts,
            invalid_policy,
            available_tx,
            available_rx: Mutex::new(available_rx),
            max_acc_waiting_time: MAX_ACC_WAITING_TIME,
            code_fn,
            password_fn,
            metrics: None,
        }
    }

    pub fn with_max_waiting_time(mut self, d: Duration) -> Self {
        self.max_acc_waiting_time = d;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PoolMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn phones(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(|s| s.as_str())
    }

    /// The outer scoped session. Returns a guard
    /// whose `close()` must be awaited to release the lock and stop every
    /// account; a background `Drop` fallback covers cancellation/panic.
    #[instrument(skip(self, pbar), fields(accounts = self.accounts.len()))]
    pub async fn session(
        self: Arc<Self>,
        pbar: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<PoolSessionGuard<F>, PoolError> {
        if self.store.exists(SESSION_LOCK_KEY).await {
            return Err(PoolError::SessionsInUse);
        }

        self.start_sessions().await?;
        self.store.touch(SESSION_LOCK_KEY).await?;
        info!("Pool session started with {} accounts", self.accounts.len());

        Ok(PoolSessionGuard::new(self, pbar))
    }

    /// Starts every account concurrently.
    #[instrument(skip(self))]
    async fn start_sessions(&self) -> Result<(), PoolError> {
        let revalidate = self.invalid_policy.revalidate();
        let mut handles: Vec<(String, JoinHandle<Result<(), AccountError>>)> = Vec::new();

        for (phone, slot) in &self.accounts {
            let account = slot.account.clone();
            let code_fn = self.code_fn.clone();
            let password_fn = self.password_fn.clone();
            let phone = phone.clone();
            let handle = tokio::spawn(async move {
                let mut guard = account.lock().await;
                guard.start(revalidate, &code_fn, &password_fn).await
            });
            handles.push((phone, handle));
        }

        let mut first_failure: Option<(String, AccountError)> = None;
        let mut started: Vec<String> = Vec::new();

        for (phone, handle) in &mut handles {
            if first_failure.is_some() && !matches!(self.invalid_policy, InvalidPolicy::Ignore) {
                // A prior account already failed under a cancel-on-failure policy;
                // abort every task we haven't awaited yet instead of letting it
                // run to a result nobody will read.
                handle.abort();
                continue;
            }

            match handle.await {
                Ok(Ok(())) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.accounts_started.inc();
                    }
                    started.push(phone.clone());
                }
                Ok(Err(e)) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.accounts_start_failed.inc();
                    }
                    match self.invalid_policy {
                        InvalidPolicy::Ignore => {
                            warn!("Account {} failed to start, ignoring: {}", phone, e);
                        }
                        InvalidPolicy::Raise | InvalidPolicy::Revalidate => {
                            error!("Account {} failed to start: {}", phone, e);
                            first_failure.get_or_insert((phone.clone(), e));
                        }
                    }
                }
                Err(join_err) if join_err.is_cancelled() => {
                    debug!("Start task for {} cancelled", phone);
                }
                Err(join_err) => {
                    warn!("Start task for {} panicked: {}", phone, join_err);
                }
            }
        }

        if let Some((phone, source)) = first_failure {
            // Abort every task not yet awaited above (ones that were spawned
            // after the failing one completed but weren't reached yet).
            for (_, handle) in &handles {
                handle.abort();
            }
            return Err(PoolError::AccountStartFailed { phone, source });
        }

        for phone in started {
            let _ = self.available_tx.send(phone);
            if let Some(metrics) = &self.metrics {
                metrics.available_queue_depth.inc();
            }
        }

        Ok(())
    }

    /// Stops every started account in parallel.
    #[instrument(skip(self))]
    async fn close_sessions(&self) {
        let mut handles = Vec::new();
        for slot in self.accounts.values() {
            let account = slot.account.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = account.lock().await;
                guard.stop().await
            }));
        }

        // Drain the available queue so no stale phone key lingers.
        let mut rx = self.available_rx.lock().await;
        while rx.try_recv().is_ok() {}
        drop(rx);

        for handle in handles {
            if let Ok(Err(e)) = handle.await {
                warn!("Error stopping account during close_sessions: {}", e);
            }
        }
    }

    /// Check-out/check-in core. Dequeues one account,
    /// hands it to the caller via a consuming lease.
    #[instrument(skip(self))]
    pub async fn get_acc(self: &Arc<Self>) -> Result<AccountLease<F>, PoolError> {
        let wait_started = Utc::now();
        let phone = {
            let mut rx = self.available_rx.lock().await;
            match tokio::time::timeout(self.max_acc_waiting_time, rx.recv()).await {
                Ok(Some(phone)) => phone,
                Ok(None) => {
                    return Err(PoolError::AllAccountsUnavailable {
                        available_at: self.min_wait().await.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                    })
                }
                Err(_) => {
                    return Err(PoolError::AllAccountsUnavailable {
                        available_at: self.min_wait().await.map(|s| Utc::now() + chrono::Duration::seconds(s)),
                    })
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.available_queue_depth.dec();
            let waited = (Utc::now() - wait_started).num_milliseconds() as f64 / 1000.0;
            metrics.checkout_wait_seconds.observe(waited.max(0.0));
        }

        let slot = self
            .accounts
            .get(&phone)
            .expect("phone dequeued from available must exist in accounts");

        Ok(AccountLease {
            pool: self.clone(),
            phone,
            account: slot.account.clone(),
            released: false,
        })
    }

    /// Minimum remaining park time across every parked account, in seconds, or
    /// `None` if none are parked.
    pub async fn min_wait(&self) -> Option<i64> {
        let now = Utc::now();
        let mut min: Option<i64> = None;
        for slot in self.accounts.values() {
            let guard = slot.account.lock().await;
            if let Some(remaining) = guard.remaining_flood_wait(now) {
                min = Some(min.map_or(remaining, |m: i64| m.min(remaining)));
            }
        }
        min
    }

    /// Parks an account for `seconds`, then returns it to the queue. Spawned
    /// detached so it runs concurrently with every other pool operation.
    fn spawn_flood_wait(self: &Arc<Self>, phone: String, seconds: u64) {
        let pool = self.clone();
        tokio::spawn(async move {
            let slot = match pool.accounts.get(&phone) {
                Some(slot) => slot,
                None => return,
            };

            {
                let mut guard = slot.account.lock().await;
                guard.set_flood_wait(Utc::now(), seconds);
            }
            if let Some(metrics) = &pool.metrics {
                metrics.flood_waits_total.inc();
            }
            info!("Account {} parked for {}s (flood wait)", phone, seconds);

            tokio::time::sleep(Duration::from_secs(seconds)).await;

            {
                let mut guard = slot.account.lock().await;
                guard.clear_flood_wait();
            }
            let _ = pool.available_tx.send(phone.clone());
            if let Some(metrics) = &pool.metrics {
                metrics.available_queue_depth.inc();
            }
            debug!("Account {} released from flood wait", phone);
        });
    }
}

/// RAII guard for the outer pool session. `close()` is the intended exit
/// path; `Drop` spawns a best-effort background cleanup if the caller was
/// cancelled or panicked before calling it (async `Drop` does not exist).
pub struct PoolSessionGuard<F: RpcClientFactory> {
    pool: Option<Arc<Pool<F>>>,
    pub pbar: Option<Arc<dyn ProgressReporter>>,
}

impl<F: RpcClientFactory + 'static> PoolSessionGuard<F> {
    fn new(pool: Arc<Pool<F>>, pbar: Option<Arc<dyn ProgressReporter>>) -> Self {
        Self { pool: Some(pool), pbar }
    }

    pub fn pool(&self) -> &Arc<Pool<F>> {
        self.pool.as_ref().expect("PoolSessionGuard used after close")
    }

    /// Releases the lock and stops every account. Safe to call at most once;
    /// idempotent no-op if already closed.
    pub async fn close(mut self) {
        if let Some(pool) = self.pool.take() {
            let _ = pool.store.rm(SESSION_LOCK_KEY).await;
            pool.close_sessions().await;
            info!("Pool session closed");
        }
    }
}

impl<F: RpcClientFactory> Drop for PoolSessionGuard<F> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            tokio::spawn(async move {
                let _ = pool.store.rm(SESSION_LOCK_KEY).await;
                pool.close_sessions().await;
                warn!("Pool session cleaned up via Drop fallback (close() was not awaited)");
            });
        }
    }
}

/// A single checked-out account. Consuming methods (`release`, `flood_wait`)
/// are the intended exit paths; `Drop` re-enqueues as a fallback so a
/// cancelled caller can never leak the account outside the dispatcher's three
/// disjoint states.
pub struct AccountLease<F: RpcClientFactory> {
    pool: Arc<Pool<F>>,
    phone: String,
    account: Arc<Mutex<Account<F>>>,
    released: bool,
}

impl<F: RpcClientFactory + 'static> AccountLease<F> {
    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// Holds the account's lock for the duration of `f`'s returned future, so
    /// RPC calls made inside `f` see a consistent, exclusively-owned account.
    pub async fn with_account<R, Fut>(&self, f: impl FnOnce(&Account<F>) -> Fut) -> R
    where
        Fut: std::future::Future<Output = R>,
    {
        let guard = self.account.lock().await;
        f(&guard).await
    }

    pub async fn with_account_mut<R, Fut>(&self, f: impl FnOnce(&mut Account<F>) -> Fut) -> R
    where
        Fut: std::future::Future<Output = R>,
    {
        let mut guard = self.account.lock().await;
        f(&mut guard).await
    }

    /// Normal return: re-enqueue at the tail of `available`.
    pub fn release(mut self) {
        self.released = true;
        let _ = self.pool.available_tx.send(self.phone.clone());
        if let Some(metrics) = &self.pool.metrics {
            metrics.available_queue_depth.inc();
        }
    }

    /// The caller's RPC call returned `FloodWait`: park instead of
    /// re-enqueuing.
    pub fn flood_wait(mut self, seconds: u64) {
        self.released = true;
        self.pool.spawn_flood_wait(self.phone.clone(), seconds);
    }

    /// Any other error: re-enqueue immediately, same as a normal return, then
    /// let the caller propagate the error.
    pub fn release_on_error(self) {
        self.release();
    }

    /// Classifies an RPC error and performs the matching release, mirroring
    /// the dispatch into a single call.
    pub fn release_for(self, result: &Result<(), RpcError>) {
        match result {
            Err(RpcError::FloodWait { seconds }) => {
                let seconds = *seconds;
                self.flood_wait(seconds);
            }
            _ => self.release(),
        }
    }
}

impl<F: RpcClientFactory> Drop for AccountLease<F> {
    fn drop(&mut self) {
        if !self.released {
            let tx = self.pool.available_tx.clone();
            let phone = self.phone.clone();
            let _ = tx.send(phone);
            if let Some(metrics) = &self.pool.metrics {
                metrics.available_queue_depth.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::fakes::{FakeData, FakeRpcClientFactory};
    use crate::storage::MemoryBlobStore;

    /// `setup_new_session` always asks for a login code, so these must return
    /// a usable stub rather than panic — every test pool below starts from an
    /// empty `BlobStore`, which always takes the fresh-session path.
    fn code_fns() -> (CodeFn, PasswordFn) {
        (
            Arc::new(|| "000000".to_string()),
            Arc::new(|| panic!("2FA password should not be requested by the fake client")),
        )
    }

    fn make_pool(
        store: Arc<dyn BlobStore>,
        phones: Vec<&str>,
        policy: InvalidPolicy,
    ) -> Arc<Pool<FakeRpcClientFactory>> {
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let (code_fn, password_fn) = code_fns();
        Arc::new(Pool::new(
            store,
            factory,
            phones.into_iter().map(String::from),
            policy,
            code_fn,
            password_fn,
        ))
    }

    #[tokio::test]
    async fn session_fails_when_lock_already_present() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.touch(SESSION_LOCK_KEY).await.unwrap();
        let pool = make_pool(store, vec!["+1"], InvalidPolicy::Revalidate);

        let err = pool.session(None).await.unwrap_err();
        assert!(matches!(err, PoolError::SessionsInUse));
    }

    #[tokio::test]
    async fn lock_removed_and_accounts_stopped_on_close() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store.clone(), vec!["+1", "+2"], InvalidPolicy::Revalidate);

        let guard = pool.clone().session(None).await.unwrap();
        assert!(store.exists(SESSION_LOCK_KEY).await);
        guard.close().await;
        assert!(!store.exists(SESSION_LOCK_KEY).await);
    }

    #[tokio::test]
    async fn ignore_policy_starts_surviving_accounts_and_skips_the_failed_one() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.write("+1.session", "ok-session").await.unwrap();
        store.write("+2.session", "fail").await.unwrap();
        store.write("+3.session", "ok-session").await.unwrap();
        let pool = make_pool(store, vec!["+1", "+2", "+3"], InvalidPolicy::Ignore);

        let guard = pool.clone().session(None).await.unwrap();
        let lease1 = pool.get_acc().await.unwrap();
        let lease2 = pool.get_acc().await.unwrap();
        assert_ne!(lease1.phone(), lease2.phone());
        assert_ne!(lease1.phone(), "+2");
        assert_ne!(lease2.phone(), "+2");
        lease1.release();
        lease2.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn raise_policy_fails_session_when_any_account_fails_to_start() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.write("+1.session", "ok-session").await.unwrap();
        store.write("+2.session", "fail").await.unwrap();
        let pool = make_pool(store, vec!["+1", "+2"], InvalidPolicy::Raise);

        let err = pool.session(None).await.unwrap_err();
        match err {
            PoolError::AccountStartFailed { phone, .. } => assert_eq!(phone, "+2"),
            other => panic!("expected AccountStartFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn checkout_then_release_round_trips_through_available_queue() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store, vec!["+1"], InvalidPolicy::Revalidate);
        let guard = pool.clone().session(None).await.unwrap();

        let lease = pool.get_acc().await.unwrap();
        assert_eq!(lease.phone(), "+1");
        lease.release();

        let lease2 = pool.get_acc().await.unwrap();
        assert_eq!(lease2.phone(), "+1");
        lease2.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn released_account_rejoins_the_tail_of_the_queue() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store, vec!["+1", "+2"], InvalidPolicy::Revalidate);
        let guard = pool.clone().session(None).await.unwrap();

        let a = pool.get_acc().await.unwrap();
        let phone_a = a.phone().to_string();
        let b = pool.get_acc().await.unwrap();
        assert_ne!(a.phone(), b.phone());

        // Only `a` goes back to `available`; the next checkout must return it,
        // since `b` is still held by this scope.
        a.release();
        let c = pool.get_acc().await.unwrap();
        assert_eq!(c.phone(), phone_a);

        c.release();
        b.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn dropping_a_lease_without_releasing_still_requeues_it() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store, vec!["+1"], InvalidPolicy::Revalidate);
        let guard = pool.clone().session(None).await.unwrap();

        {
            let lease = pool.get_acc().await.unwrap();
            assert_eq!(lease.phone(), "+1");
            // Dropped here without calling release()/flood_wait(); the Drop
            // fallback must still return the account to `available`.
        }

        let lease2 = pool.get_acc().await.unwrap();
        assert_eq!(lease2.phone(), "+1");
        lease2.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn flood_wait_parks_account_until_timer_expires() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store, vec!["+1"], InvalidPolicy::Revalidate);
        let guard = pool.clone().session(None).await.unwrap();

        let lease = pool.get_acc().await.unwrap();
        lease.flood_wait(0);

        // Give the spawned timer task a chance to park-then-requeue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let lease2 = pool.get_acc().await.unwrap();
        assert_eq!(lease2.phone(), "+1");
        lease2.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn min_wait_reports_the_smallest_remaining_park_time() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let pool = make_pool(store, vec!["+1", "+2"], InvalidPolicy::Revalidate);
        let guard = pool.clone().session(None).await.unwrap();

        let lease1 = pool.get_acc().await.unwrap();
        let lease2 = pool.get_acc().await.unwrap();
        lease1.flood_wait(60);
        lease2.flood_wait(5);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let min = pool.min_wait().await;
        assert!(matches!(min, Some(s) if s > 0 && s <= 5));

        guard.close().await;
    }

    #[tokio::test]
    async fn get_acc_times_out_with_available_at_when_all_parked() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let (code_fn, password_fn) = code_fns();
        let pool = Arc::new(
            Pool::new(
                store,
                factory,
                vec!["+1".to_string()],
                InvalidPolicy::Revalidate,
                code_fn,
                password_fn,
            )
            .with_max_waiting_time(std::time::Duration::from_millis(100)),
        );
        let guard = pool.clone().session(None).await.unwrap();

        let lease = pool.get_acc().await.unwrap();
        lease.flood_wait(10);

        let err = pool.get_acc().await.unwrap_err();
        match err {
            PoolError::AllAccountsUnavailable { available_at } => assert!(available_at.is_some()),
            other => panic!("expected AllAccountsUnavailable, got {other:?}"),
        }

        guard.close().await;
    }

    #[tokio::test]
    async fn get_acc_times_out_with_no_available_at_when_nothing_parked() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let (code_fn, password_fn) = code_fns();
        let pool = Arc::new(
            Pool::new(
                store,
                factory,
                vec!["+1".to_string()],
                InvalidPolicy::Revalidate,
                code_fn,
                password_fn,
            )
            .with_max_waiting_time(std::time::Duration::from_millis(100)),
        );
        let guard = pool.clone().session(None).await.unwrap();

        let held = pool.get_acc().await.unwrap();

        let err = pool.get_acc().await.unwrap_err();
        match err {
            PoolError::AllAccountsUnavailable { available_at } => assert!(available_at.is_none()),
            other => panic!("expected AllAccountsUnavailable, got {other:?}"),
        }

        held.release();
        guard.close().await;
    }

    #[tokio::test]
    async fn metrics_track_starts_checkouts_and_flood_waits() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let (code_fn, password_fn) = code_fns();
        let metrics = Arc::new(PoolMetrics::new().unwrap());
        let pool = Arc::new(
            Pool::new(
                store,
                factory,
                vec!["+1".to_string(), "+2".to_string()],
                InvalidPolicy::Revalidate,
                code_fn,
                password_fn,
            )
            .with_metrics(metrics.clone()),
        );

        let guard = pool.clone().session(None).await.unwrap();
        assert_eq!(metrics.accounts_started.get(), 2.0);
        assert_eq!(metrics.accounts_start_failed.get(), 0.0);
        assert_eq!(metrics.available_queue_depth.get(), 2.0);

        let lease = pool.get_acc().await.unwrap();
        assert_eq!(metrics.available_queue_depth.get(), 1.0);
        assert_eq!(metrics.checkout_wait_seconds.get_sample_count(), 1);

        lease.flood_wait(0);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(metrics.flood_waits_total.get(), 1.0);
        assert_eq!(metrics.available_queue_depth.get(), 2.0);

        let lease2 = pool.get_acc().await.unwrap();
        lease2.release();
        assert_eq!(metrics.available_queue_depth.get(), 2.0);

        guard.close().await;
    }

    #[tokio::test]
    async fn metrics_count_a_failed_start() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.write("+1.session", "ok-session").await.unwrap();
        store.write("+2.session", "fail").await.unwrap();
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let (code_fn, password_fn) = code_fns();
        let metrics = Arc::new(PoolMetrics::new().unwrap());
        let pool = Arc::new(
            Pool::new(
                store,
                factory,
                vec!["+1".to_string(), "+2".to_string()],
                InvalidPolicy::Ignore,
                code_fn,
                password_fn,
            )
            .with_metrics(metrics.clone()),
        );

        let guard = pool.clone().session(None).await.unwrap();
        assert_eq!(metrics.accounts_started.get(), 1.0);
        assert_eq!(metrics.accounts_start_failed.get(), 1.0);
        guard.close().await;
    }
}
