pub mod account;
pub mod chat_cache;
pub mod config;
pub mod rpc;
pub mod stats;
pub mod storage;
pub mod utils;

pub use account::{Account, AccountError, CodeFn, PasswordFn, InvalidPolicy, Pool, PoolError, Scanner, ScannerError};
pub use chat_cache::{ChatCache, ChatCacheError, ChatCacheItem};
pub use config::Config;
pub use rpc::{ChatEntity, ChatKind, RawMessage, RpcClientFactory, RpcError, TelegramRpc};
pub use stats::{Channel, ChannelStats, CollectedStats, Msg, StatsCollector, StatsDb, StatsDbError};
pub use storage::{BlobStore, BlobStoreError, FileBlobStore, MemoryBlobStore};
pub use utils::{setup_logging, BridgeError, PoolHealthServer, PoolMetrics};
