pub mod account;
pub mod pool;
pub mod scanner;

pub use account::{Account, AccountError, CodeFn, PasswordFn};
pub use pool::{AccountLease, InvalidPolicy, Pool, PoolError, PoolSessionGuard};
pub use scanner::{Scanner, ScannerError};
