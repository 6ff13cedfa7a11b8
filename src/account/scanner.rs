//! Thin adapter exposing domain operations over the pool, grounded in
//! `tg/account/scanner.py`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::account::pool::{Pool, PoolError, PoolSessionGuard};
use crate::chat_cache::{ChatCache, ChatCacheError, ChatCacheItem};
use crate::rpc::{ChatEntity, ChatKind, RawMessage, RpcClientFactory, RpcError};
use crate::utils::progress::ProgressReporter;
use crate::utils::url::ensure_at_single;

/// Cap on the implementation-side reply count.
const REPLY_COUNT_CAP: usize = 1000;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("chat cache error: {0}")]
    ChatCache(#[from] ChatCacheError),

    #[error("a checked-out account hit flood wait, retry after {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("chat_id must not be empty")]
    EmptyChatId,

    #[error("msg_id must be positive, got {0}")]
    NonPositiveMsgId(i64),
}

/// Adapter over the pool adding chat-cache-aware domain operations.
pub struct Scanner<F: RpcClientFactory> {
    pool: Arc<Pool<F>>,
    chat_cache: Mutex<ChatCache>,
}

impl<F: RpcClientFactory + 'static> Scanner<F> {
    pub fn new(pool: Arc<Pool<F>>, chat_cache: ChatCache) -> Self {
        Self {
            pool,
            chat_cache: Mutex::new(chat_cache),
        }
    }

    pub fn pool(&self) -> &Arc<Pool<F>> {
        &self.pool
    }

    /// Loads the chat cache, then composes the pool's outer session under it
    /// so `close()` can persist the cache before releasing the pool lock.
    pub async fn session(
        self: &Arc<Self>,
        pbar: Option<Arc<dyn ProgressReporter>>,
    ) -> Result<ScannerSessionGuard<F>, ScannerError> {
        {
            let mut cache = self.chat_cache.lock().await;
            cache.load().await?;
        }
        let pool_guard = self.pool.clone().session(pbar).await?;
        Ok(ScannerSessionGuard {
            scanner: self.clone(),
            pool_guard: Some(pool_guard),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_chat(&self, chat_id: &str) -> Result<ChatEntity, ScannerError> {
        let key = ensure_at_single(chat_id);

        if let Some(item) = self.chat_cache.lock().await.get(&key) {
            debug!("Chat cache hit for {}", key);
            return Ok(item.chat_entity.clone());
        }

        let lease = self.pool.get_acc().await?;
        let key_for_fetch = key.clone();
        let result = lease
            .with_account(|acc| async move {
                match acc.client() {
                    Some(client) => client.get_entity(&key_for_fetch).await.map_err(ScannerError::from),
                    None => unreachable!("account must be started to be checked out"),
                }
            })
            .await;

        match result {
            Ok(entity) => {
                lease.release();
                self.chat_cache.lock().await.set(&key, ChatCacheItem::new(entity.clone()));
                Ok(entity)
            }
            Err(e) => {
                self.release_for_error(lease, &e);
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_chat_members_count(&self, chat_id: &str) -> Result<u64, ScannerError> {
        let key = ensure_at_single(chat_id);
        let entity = self.get_chat(chat_id).await?;

        if let Some(count) = self.chat_cache.lock().await.get(&key).and_then(|i| i.members_count) {
            return Ok(count);
        }

        let count = match entity.kind {
            ChatKind::Channel | ChatKind::Group => {
                let lease = self.pool.get_acc().await?;
                let result = lease
                    .with_account(|acc| async move {
                        match acc.client() {
                            Some(client) => client.get_participants_count(&entity).await.map_err(ScannerError::from),
                            None => unreachable!("account must be started to be checked out"),
                        }
                    })
                    .await;

                match result {
                    Ok(n) => {
                        lease.release();
                        n
                    }
                    Err(e) => {
                        self.release_for_error(lease, &e);
                        return Err(e);
                    }
                }
            }
            ChatKind::User => 0,
        };

        if let Some(item) = self.chat_cache.lock().await.get_mut(&key) {
            item.members_count = Some(count);
        }
        Ok(count)
    }

    /// Produces a finite, newest-first batch of messages; the whole call is
    /// served by one checked-out account.
    #[instrument(skip(self))]
    pub async fn get_chat_history(
        &self,
        chat_id: &str,
        limit: Option<usize>,
        min_date: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawMessage>, ScannerError> {
        let entity = self.get_chat(chat_id).await?;
        let lease = self.pool.get_acc().await?;

        let result = lease
            .with_account(|acc| async move {
                match acc.client() {
                    Some(client) => client.iter_messages(&entity, limit).await.map_err(ScannerError::from),
                    None => unreachable!("account must be started to be checked out"),
                }
            })
            .await;

        let messages = match result {
            Ok(messages) => {
                lease.release();
                messages
            }
            Err(e) => {
                self.release_for_error(lease, &e);
                return Err(e);
            }
        };

        let mut out = Vec::new();
        for msg in messages {
            if let Some(min_date) = min_date {
                if msg.date < min_date {
                    break;
                }
            }
            out.push(msg);
            if let Some(limit) = limit {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Replies to a discussion thread. Invalid message/peer id is treated as
    /// an empty result, not an error.
    #[instrument(skip(self))]
    pub async fn get_discussion_replies(
        &self,
        chat_id: &str,
        msg_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<RawMessage>, ScannerError> {
        if chat_id.is_empty() {
            return Err(ScannerError::EmptyChatId);
        }
        if msg_id <= 0 {
            return Err(ScannerError::NonPositiveMsgId(msg_id));
        }

        // Resolving the peer itself can fail with "invalid peer id" for an
        // unknown/invalid chat; that is downgraded to an empty result the
        // same as an invalid id from `iter_replies` below.
        let entity = match self.get_chat(chat_id).await {
            Ok(entity) => entity,
            Err(ScannerError::Rpc(e)) if e.is_invalid_id() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let lease = self.pool.get_acc().await?;

        let result = lease
            .with_account(|acc| async move {
                match acc.client() {
                    Some(client) => client.iter_replies(&entity, msg_id, limit).await.map_err(ScannerError::from),
                    None => unreachable!("account must be started to be checked out"),
                }
            })
            .await;

        match result {
            Ok(replies) => {
                lease.release();
                Ok(replies)
            }
            Err(ScannerError::Rpc(e)) if e.is_invalid_id() => {
                lease.release();
                Ok(Vec::new())
            }
            Err(e) => {
                self.release_for_error(lease, &e);
                Err(e)
            }
        }
    }

    /// Count of replies, capped at `REPLY_COUNT_CAP`.
    #[instrument(skip(self))]
    pub async fn get_discussion_replies_count(&self, chat_id: &str, msg_id: i64) -> Result<usize, ScannerError> {
        let replies = self.get_discussion_replies(chat_id, msg_id, Some(REPLY_COUNT_CAP)).await?;
        Ok(replies.len())
    }

    fn release_for_error(&self, lease: crate::account::pool::AccountLease<F>, err: &ScannerError) {
        match err {
            ScannerError::Rpc(RpcError::FloodWait { seconds }) => lease.flood_wait(*seconds),
            _ => lease.release_on_error(),
        }
    }
}

/// RAII guard for a scanner session; on `close` persists the chat cache and
/// closes the underlying pool session in that order.
pub struct ScannerSessionGuard<F: RpcClientFactory> {
    scanner: Arc<Scanner<F>>,
    pool_guard: Option<PoolSessionGuard<F>>,
}

impl<F: RpcClientFactory + 'static> ScannerSessionGuard<F> {
    pub async fn close(mut self) -> Result<(), ScannerError> {
        self.scanner.chat_cache.lock().await.save().await?;
        if let Some(guard) = self.pool_guard.take() {
            guard.close().await;
        }
        Ok(())
    }
}
