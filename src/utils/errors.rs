//! Crate-level error composition: a one-enum-per-layer pattern with a
//! top-level `BridgeError` wrapping each subsystem.

use thiserror::Error;

use crate::account::account::AccountError;
use crate::account::pool::PoolError;
use crate::account::scanner::ScannerError;
use crate::chat_cache::ChatCacheError;
use crate::stats::db::StatsDbError;
use crate::storage::BlobStoreError;
use crate::utils::url::UrlParseError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("chat cache error: {0}")]
    ChatCache(#[from] ChatCacheError),

    #[error("blob store error: {0}")]
    BlobStore(#[from] BlobStoreError),

    #[error("stats db error: {0}")]
    StatsDb(#[from] StatsDbError),

    #[error("url parse error: {0}")]
    UrlParse(#[from] UrlParseError),

    #[error("file system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("health server error: {0}")]
    Health(String),
}
