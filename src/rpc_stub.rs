//! Placeholder `TelegramRpc`/`RpcClientFactory` implementation.
//!
//! The wire protocol to the messaging platform is explicitly out of scope:
//! this binary wires the pool/scanner/stats stack around
//! a generic `RpcClientFactory`, and ships this stub so `tg-scan` links and
//! runs end-to-end in tests and demos. A real deployment supplies its own
//! `RpcClientFactory` (backed by, e.g., `grammers` or a similar MTProto
//! client) and constructs `Pool`/`Scanner` against it directly through the
//! library API instead of this binary.

use async_trait::async_trait;

use crate::rpc::{ChatEntity, RawMessage, RpcClientFactory, RpcError, TelegramRpc};

fn unimplemented() -> RpcError {
    RpcError::Transport(anyhow::anyhow!(
        "no TelegramRpc implementation configured; the wire protocol is out of scope for this crate"
    ))
}

pub struct UnimplementedRpcClient;

#[async_trait]
impl TelegramRpc for UnimplementedRpcClient {
    async fn connect(&mut self) -> Result<(), RpcError> {
        Err(unimplemented())
    }

    async fn disconnect(&mut self) -> Result<(), RpcError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn is_user_authorized(&self) -> Result<bool, RpcError> {
        Err(unimplemented())
    }

    fn session_string(&self) -> String {
        String::new()
    }

    async fn send_code_request(&mut self, _phone: &str) -> Result<(), RpcError> {
        Err(unimplemented())
    }

    async fn sign_in_code(&mut self, _phone: &str, _code: &str) -> Result<(), RpcError> {
        Err(unimplemented())
    }

    async fn sign_in_password(&mut self, _password: &str) -> Result<(), RpcError> {
        Err(unimplemented())
    }

    async fn get_entity(&self, _chat_id: &str) -> Result<ChatEntity, RpcError> {
        Err(unimplemented())
    }

    async fn get_participants_count(&self, _entity: &ChatEntity) -> Result<u64, RpcError> {
        Err(unimplemented())
    }

    async fn iter_messages(&self, _entity: &ChatEntity, _limit: Option<usize>) -> Result<Vec<RawMessage>, RpcError> {
        Err(unimplemented())
    }

    async fn iter_replies(
        &self,
        _entity: &ChatEntity,
        _msg_id: i64,
        _limit: Option<usize>,
    ) -> Result<Vec<RawMessage>, RpcError> {
        Err(unimplemented())
    }
}

pub struct UnimplementedRpcClientFactory {
    pub api_id: i32,
    pub api_hash: String,
}

#[async_trait]
impl RpcClientFactory for UnimplementedRpcClientFactory {
    type Client = UnimplementedRpcClient;

    async fn from_session_string(&self, _session_string: &str) -> Result<Self::Client, RpcError> {
        Err(unimplemented())
    }

    async fn fresh(&self) -> Result<Self::Client, RpcError> {
        Err(unimplemented())
    }
}
