pub mod errors;
pub mod health;
pub mod logger;
pub mod metrics;
pub mod progress;
pub mod url;

pub use errors::BridgeError;
pub use health::PoolHealthServer;
pub use logger::setup_logging;
pub use metrics::PoolMetrics;
pub use progress::{NoopProgress, ProgressReporter};
