//! A single authenticated session to the messaging platform, grounded
//! in `tg/account/account.py`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::rpc::{RpcClientFactory, RpcError, TelegramRpc};
use crate::storage::{BlobStore, BlobStoreError};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("no session file for {phone}")]
    NoSessionFile { phone: String },

    #[error("session unusable for {phone}: {source}")]
    SessionUnusable { phone: String, source: RpcError },

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),
}

/// Supplies a verification code during interactive sign-in. May block on human
/// input (mirrors the original's `lambda: input("Enter code:")`); `Arc`-wrapped so
/// the same callback can be shared across the concurrently spawned `start` tasks
/// the pool fans out in `start_sessions`.
pub type CodeFn = Arc<dyn Fn() -> String + Send + Sync>;
pub type PasswordFn = Arc<dyn Fn() -> String + Send + Sync>;

/// One authenticated session, identified by phone number.
///
/// Invariants: `started ⇒ client connected`; `flood_wait_from == None`
/// iff `flood_wait_timeout == 0`.
pub struct Account<F: RpcClientFactory> {
    pub phone: String,
    pub filename: String,
    store: Arc<dyn BlobStore>,
    factory: Arc<F>,
    client: Option<F::Client>,
    started: bool,
    flood_wait_from: Option<DateTime<Utc>>,
    flood_wait_timeout: u64,
}

impl<F: RpcClientFactory> Account<F> {
    pub fn new(store: Arc<dyn BlobStore>, factory: Arc<F>, phone: impl Into<String>) -> Self {
        let phone = phone.into();
        let filename = format!("{phone}.session");
        Self {
            phone,
            filename,
            store,
            factory,
            client: None,
            started: false,
            flood_wait_from: None,
            flood_wait_timeout: 0,
        }
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn flood_wait_from(&self) -> Option<DateTime<Utc>> {
        self.flood_wait_from
    }

    pub fn flood_wait_timeout(&self) -> u64 {
        self.flood_wait_timeout
    }

    /// Remaining park time in seconds, or `None` if not currently parked.
    pub fn remaining_flood_wait(&self, now: DateTime<Utc>) -> Option<i64> {
        let from = self.flood_wait_from?;
        let elapsed = (now - from).num_seconds();
        Some(self.flood_wait_timeout as i64 - elapsed)
    }

    pub(crate) fn set_flood_wait(&mut self, from: DateTime<Utc>, timeout: u64) {
        self.flood_wait_from = Some(from);
        self.flood_wait_timeout = timeout;
    }

    pub(crate) fn clear_flood_wait(&mut self) {
        self.flood_wait_from = None;
        self.flood_wait_timeout = 0;
    }

    pub fn client(&self) -> Option<&F::Client> {
        self.client.as_ref()
    }

    /// Starts the account session.
    #[instrument(skip(self, code_fn, password_fn), fields(phone = %self.phone))]
    pub async fn start(
        &mut self,
        revalidate: bool,
        code_fn: &CodeFn,
        password_fn: &PasswordFn,
    ) -> Result<(), AccountError> {
        debug!("Account.start called; revalidate={}", revalidate);

        if self.store.exists(&self.filename).await {
            let session_string = self.store.read(&self.filename).await?.trim().to_string();
            debug!("Loaded session string, length={}", session_string.len());

            match self.factory.from_session_string(&session_string).await {
                Ok(mut client) => {
                    client.connect().await?;
                    debug!("Client connected: is_connected={}", client.is_connected());

                    match client.is_user_authorized().await {
                        Ok(true) => {
                            self.client = Some(client);
                        }
                        Ok(false) | Err(_) => {
                            info!("Stored session not authorized for {}", self.phone);
                            if revalidate {
                                self.setup_new_session(code_fn, password_fn).await?;
                            } else {
                                return Err(AccountError::SessionUnusable {
                                    phone: self.phone.clone(),
                                    source: RpcError::Unauthorized,
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to restore session from stored value: {}", e);
                    if revalidate {
                        self.setup_new_session(code_fn, password_fn).await?;
                    } else {
                        return Err(AccountError::SessionUnusable {
                            phone: self.phone.clone(),
                            source: e,
                        });
                    }
                }
            }
        } else if revalidate {
            debug!("No session file; starting setup_new_session");
            self.setup_new_session(code_fn, password_fn).await?;
        } else {
            return Err(AccountError::NoSessionFile {
                phone: self.phone.clone(),
            });
        }

        self.started = true;
        self.clear_flood_wait();
        info!("Account started for {}", self.phone);
        Ok(())
    }

    /// Establishes a brand-new session using fresh credentials, requesting a login
    /// code (and, if needed, a 2FA password) from the caller.
    #[instrument(skip(self, code_fn, password_fn), fields(phone = %self.phone))]
    pub async fn setup_new_session(
        &mut self,
        code_fn: &CodeFn,
        password_fn: &PasswordFn,
    ) -> Result<(), AccountError> {
        info!("Setting up new session for {}", self.phone);
        let mut client = self.factory.fresh().await?;
        client.connect().await?;
        client.send_code_request(&self.phone).await?;

        let code = code_fn();
        match client.sign_in_code(&self.phone, &code).await {
            Ok(()) => {}
            Err(RpcError::PasswordNeeded) => {
                info!("2FA required for {}; prompting for password", self.phone);
                let password = password_fn();
                client.sign_in_password(&password).await?;
            }
            Err(e) => return Err(e.into()),
        }

        self.client = Some(client);
        self.started = true;
        info!("New session established for {}", self.phone);
        // Persist immediately to avoid a stale read on a subsequent start.
        self.save_session_string().await?;
        Ok(())
    }

    /// Stops the account session. Safe to call from any completion path, including
    /// when the account was never started.
    #[instrument(skip(self), fields(phone = %self.phone))]
    pub async fn stop(&mut self) -> Result<(), AccountError> {
        if !self.started {
            return Ok(());
        }

        self.save_session_string().await?;

        if let Some(client) = self.client.as_mut() {
            if client.is_connected() {
                client.disconnect().await?;
            }
        }

        self.started = false;
        info!("Account stopped for {}", self.phone);
        Ok(())
    }

    pub async fn save_session_string(&self) -> Result<(), AccountError> {
        let client = self
            .client
            .as_ref()
            .expect("save_session_string called without an active client");
        let session_str = client.session_string();
        self.store.write(&self.filename, &session_str).await?;
        debug!("Session string saved for {} (length={})", self.phone, session_str.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::fakes::{FakeData, FakeRpcClientFactory};
    use crate::storage::MemoryBlobStore;

    /// Used for paths where a stored session restores cleanly and no new
    /// login flow should ever be triggered.
    fn no_code() -> CodeFn {
        Arc::new(|| panic!("code_fn should not be called"))
    }

    fn no_password() -> PasswordFn {
        Arc::new(|| panic!("password_fn should not be called"))
    }

    /// Used for paths that go through `setup_new_session`, which always asks
    /// for a login code up front.
    fn stub_code() -> CodeFn {
        Arc::new(|| "000000".to_string())
    }

    fn stub_password() -> PasswordFn {
        Arc::new(|| panic!("2FA password should not be requested by the fake client"))
    }

    #[tokio::test]
    async fn start_without_revalidate_and_no_blob_fails_with_no_session_file() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store, factory, "+1");

        let err = account.start(false, &no_code(), &no_password()).await.unwrap_err();
        assert!(matches!(err, AccountError::NoSessionFile { .. }));
        assert!(!account.started());
    }

    #[tokio::test]
    async fn start_with_revalidate_and_no_blob_sets_up_new_session_and_persists_it() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store.clone(), factory, "+1");

        account.start(true, &stub_code(), &stub_password()).await.unwrap();
        assert!(account.started());
        assert!(store.exists("+1.session").await);
    }

    #[tokio::test]
    async fn start_from_existing_session_string_restores_without_prompting() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        store.write("+1.session", "prior-session").await.unwrap();
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store, factory, "+1");

        account.start(false, &no_code(), &no_password()).await.unwrap();
        assert!(account.started());
    }

    #[tokio::test]
    async fn stop_on_never_started_account_is_a_no_op() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store, factory, "+1");

        account.stop().await.unwrap();
        assert!(!account.started());
    }

    #[tokio::test]
    async fn stop_persists_session_string_and_clears_started() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store.clone(), factory, "+1");

        account.start(true, &stub_code(), &stub_password()).await.unwrap();
        account.stop().await.unwrap();

        assert!(!account.started());
        assert!(store.exists("+1.session").await);
    }

    #[tokio::test]
    async fn flood_wait_bookkeeping_tracks_remaining_time() {
        let store: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let factory = Arc::new(FakeRpcClientFactory::new(FakeData::default()));
        let mut account = Account::new(store, factory, "+1");

        assert_eq!(account.remaining_flood_wait(Utc::now()), None);

        let from = Utc::now();
        account.set_flood_wait(from, 60);
        let remaining = account.remaining_flood_wait(from + chrono::Duration::seconds(10)).unwrap();
        assert_eq!(remaining, 50);

        account.clear_flood_wait();
        assert_eq!(account.flood_wait_from(), None);
        assert_eq!(account.flood_wait_timeout(), 0);
    }
}
