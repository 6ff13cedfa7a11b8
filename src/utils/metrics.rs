//! Prometheus metrics for the account pool: a `PerformanceMonitor`-style
//! registry trimmed to the counters/gauges this crate's scheduler actually
//! produces.

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Registry};

/// Pool-level Prometheus metrics, registered once at startup and cloned (all
/// handles are cheap `Arc`-backed clones internally) into every task that
/// needs to record an observation.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub accounts_started: Counter,
    pub accounts_start_failed: Counter,
    pub available_queue_depth: Gauge,
    pub flood_waits_total: Counter,
    pub checkout_wait_seconds: Histogram,
    registry: Registry,
}

impl PoolMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let accounts_started = Counter::new(
            "tg_pool_accounts_started_total",
            "Total number of accounts successfully started",
        )?;
        registry.register(Box::new(accounts_started.clone()))?;

        let accounts_start_failed = Counter::new(
            "tg_pool_accounts_start_failed_total",
            "Total number of accounts that failed to start",
        )?;
        registry.register(Box::new(accounts_start_failed.clone()))?;

        let available_queue_depth = Gauge::new(
            "tg_pool_available_queue_depth",
            "Number of accounts currently available for checkout",
        )?;
        registry.register(Box::new(available_queue_depth.clone()))?;

        let flood_waits_total = Counter::new(
            "tg_pool_flood_waits_total",
            "Total number of flood-wait parks observed",
        )?;
        registry.register(Box::new(flood_waits_total.clone()))?;

        let checkout_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "tg_pool_checkout_wait_seconds",
            "Time spent waiting for an account to become available",
        ))?;
        registry.register(Box::new(checkout_wait_seconds.clone()))?;

        Ok(Self {
            accounts_started,
            accounts_start_failed,
            available_queue_depth,
            flood_waits_total,
            checkout_wait_seconds,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders every registered metric in Prometheus text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
