//! Capability boundary for the underlying messaging-platform RPC client.
//!
//! The wire protocol to Telegram is explicitly out of scope: this module
//! only pins down the trait surface the rest of the crate is built against, so that
//! `Account`/`Pool`/`Scanner` can be exercised in tests against an in-memory fake
//! instead of a live connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by a `TelegramRpc` implementation.
///
/// `FloodWait` is the one variant the pool scheduler treats specially: it parks the
/// account instead of propagating the error as a hard failure.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    #[error("session is not authorized")]
    Unauthorized,

    #[error("message id invalid")]
    MsgIdInvalid,

    #[error("peer id invalid")]
    PeerIdInvalid,

    #[error("two-factor password required")]
    PasswordNeeded,

    #[error("rpc transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl RpcError {
    /// True for the "invalid message/peer id" family that `Scanner` downgrades to
    /// empty results rather than propagating.
    pub fn is_invalid_id(&self) -> bool {
        matches!(self, RpcError::MsgIdInvalid | RpcError::PeerIdInvalid)
    }
}

/// A resolved chat/channel/group entity, opaque beyond what the cache and the
/// member-count dispatch need.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatEntity {
    pub id: i64,
    pub kind: ChatKind,
    /// Raw payload as produced by the RPC client; round-tripped opaquely through the
    /// cache, which never inspects it beyond preserving it byte-for-byte.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ChatKind {
    Channel,
    Group,
    User,
}

/// A single message as returned by history/discussion iteration.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub views: Option<u64>,
    pub forwards: Option<u64>,
    pub reaction_count: u64,
    pub text: String,
}

/// One authenticated connection to the messaging platform.
///
/// Implementors own reconnect/backoff concerns internal to a single session; the
/// pool only calls `connect`/`disconnect` at session boundaries.
#[async_trait]
pub trait TelegramRpc: Send + Sync {
    async fn connect(&mut self) -> Result<(), RpcError>;
    async fn disconnect(&mut self) -> Result<(), RpcError>;
    fn is_connected(&self) -> bool;

    /// `true` once a stored/fresh session has been accepted by the server.
    async fn is_user_authorized(&self) -> Result<bool, RpcError>;

    /// Opaque string session state, persisted by `Account::save_session_string`.
    fn session_string(&self) -> String;

    async fn send_code_request(&mut self, phone: &str) -> Result<(), RpcError>;
    async fn sign_in_code(&mut self, phone: &str, code: &str) -> Result<(), RpcError>;
    async fn sign_in_password(&mut self, password: &str) -> Result<(), RpcError>;

    async fn get_entity(&self, chat_id: &str) -> Result<ChatEntity, RpcError>;
    async fn get_participants_count(&self, entity: &ChatEntity) -> Result<u64, RpcError>;

    /// Newest-first message iteration. `limit`, when set, caps the number of
    /// messages the implementation needs to fetch from the wire.
    async fn iter_messages(
        &self,
        entity: &ChatEntity,
        limit: Option<usize>,
    ) -> Result<Vec<RawMessage>, RpcError>;

    /// Newest-first reply iteration for a discussion thread rooted at `msg_id`.
    async fn iter_replies(
        &self,
        entity: &ChatEntity,
        msg_id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<RawMessage>, RpcError>;
}

/// Constructs a fresh, unauthenticated `TelegramRpc` client, and one restored from a
/// persisted session string. Kept as a separate factory trait so `Account` does not
/// need to know how a concrete client is constructed.
#[async_trait]
pub trait RpcClientFactory: Send + Sync {
    type Client: TelegramRpc;

    async fn from_session_string(&self, session_string: &str) -> Result<Self::Client, RpcError>;
    async fn fresh(&self) -> Result<Self::Client, RpcError>;
}
