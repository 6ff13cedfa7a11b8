//! Rust analogue of the original's `TQDMProtocol`: a capability trait for progress
//! reporting during a pool session, plus a no-op implementation for
//! non-interactive and test use.

/// Implemented by whatever progress-bar widget the caller wants to drive.
/// Kept intentionally small: `Pool`/`Scanner`/`StatsCollector` only need to
/// annotate the current account/channel and advance a counter.
pub trait ProgressReporter: Send + Sync {
    fn set_postfix(&self, postfix: &str);
    fn inc(&self);
}

/// Used whenever no progress reporter was supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn set_postfix(&self, _postfix: &str) {}
    fn inc(&self) {}
}
