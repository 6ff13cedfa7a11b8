use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

mod rpc_stub;

use rpc_stub::UnimplementedRpcClientFactory;
use tg_account_pool::{
    BlobStore, ChatCache, Config, FileBlobStore, Pool, PoolHealthServer, PoolMetrics, Scanner, StatsCollector,
    StatsDb,
};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenv::dotenv() {
        if !e.to_string().contains("No such file or directory") {
            warn!("Failed to load .env file: {}", e);
        }
    } else {
        info!("Loaded environment variables from .env file");
    }

    tg_account_pool::setup_logging()?;

    info!("Starting tg-scan v{}", env!("CARGO_PKG_VERSION"));

    #[cfg(debug_assertions)]
    warn!("Running in DEBUG mode - rebuild with --release for production");

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let file_store = FileBlobStore::new(&config.paths.sessions_dir);
    file_store
        .ensure_directory()
        .await
        .context("Failed to initialize session storage directory")?;
    let store: Arc<dyn BlobStore> = Arc::new(file_store);

    let stats_db = StatsDb::open(
        &config.stats_db.database_path,
        &config.stats_db.channels_table,
        &config.stats_db.stats_table,
        &config.stats_db.msgs_table,
    )
    .context("Failed to open stats database")?;
    stats_db.ensure_schema().await?;
    let channels = stats_db.channels().await?;
    info!("Loaded {} channels from the stats database", channels.len());

    let metrics = Arc::new(PoolMetrics::new()?);
    if config.monitoring.enable_metrics_server {
        let health_server = PoolHealthServer::new(metrics.clone(), config.monitoring.health_check_port);
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                error!("Health server failed: {}", e);
            }
        });
        info!("Health check server started on port {}", config.monitoring.health_check_port);
    }

    let factory = Arc::new(UnimplementedRpcClientFactory {
        api_id: config.telegram.api_id,
        api_hash: config.telegram.api_hash.clone(),
    });

    let pool = Arc::new(
        Pool::new(
            store.clone(),
            factory,
            config.telegram.phones.clone(),
            config.pool.invalid_policy,
            prompt_fn("Enter code: "),
            prompt_fn("Enter 2FA password: "),
        )
        .with_max_waiting_time(std::time::Duration::from_secs(config.pool.max_acc_waiting_time_secs))
        .with_metrics(metrics.clone()),
    );

    let mut chat_cache = ChatCache::new(store.clone());
    chat_cache.load().await?;
    let scanner = Arc::new(Scanner::new(pool.clone(), chat_cache));

    if channels.is_empty() {
        warn!("No channels configured in the stats database; nothing to scan");
        return Ok(());
    }

    let collector = StatsCollector::new(scanner.clone(), None);
    match collector.collect_and_save(&channels, &stats_db, None).await {
        Ok(stats) => {
            info!(
                "Scan complete: {} messages across {} channels",
                stats.msgs.len(),
                stats.channels.len()
            );
        }
        Err(e) => {
            error!("Scan failed: {}", e);
        }
    }

    info!("tg-scan finished");
    Ok(())
}

/// Builds a blocking stdin prompt as a pool `code_fn`/`password_fn` callback,
/// mirroring the original's `lambda: input("Enter code:")`.
fn prompt_fn(prompt: &'static str) -> Arc<dyn Fn() -> String + Send + Sync> {
    Arc::new(move || {
        print!("{prompt}");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).unwrap_or(0);
        line.trim().to_string()
    })
}
