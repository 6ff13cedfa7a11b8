use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::account::pool::InvalidPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub pool: PoolConfig,
    pub paths: PathsConfig,
    pub stats_db: StatsDbConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    pub api_id: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_acc_waiting_time_secs")]
    pub max_acc_waiting_time_secs: u64,
    #[serde(default)]
    pub invalid_policy: InvalidPolicy,
}

fn default_max_acc_waiting_time_secs() -> u64 {
    300
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_acc_waiting_time_secs: default_max_acc_waiting_time_secs(),
            invalid_policy: InvalidPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    pub sessions_dir: PathBuf,
    pub cache_file: String,
    pub lock_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsDbConfig {
    pub database_path: PathBuf,
    #[serde(default = "default_channels_table")]
    pub channels_table: String,
    #[serde(default = "default_stats_table")]
    pub stats_table: String,
    #[serde(default = "default_msgs_table")]
    pub msgs_table: String,
}

fn default_channels_table() -> String {
    "channels".to_string()
}

fn default_stats_table() -> String {
    "stats".to_string()
}

fn default_msgs_table() -> String {
    "msgs".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub health_check_port: u16,
    pub enable_metrics_server: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let base_dir = home_dir.join(".tg_account_pool");

        Self {
            telegram: TelegramConfig {
                api_id: 0,
                api_hash: String::new(),
                phones: Vec::new(),
            },
            pool: PoolConfig::default(),
            paths: PathsConfig {
                sessions_dir: base_dir.join("sessions"),
                cache_file: ".chat_cache".to_string(),
                lock_file: ".session_lock".to_string(),
            },
            stats_db: StatsDbConfig {
                database_path: base_dir.join("stats.sqlite3"),
                channels_table: default_channels_table(),
                stats_table: default_stats_table(),
                msgs_table: default_msgs_table(),
            },
            monitoring: MonitoringConfig {
                health_check_port: 8080,
                enable_metrics_server: true,
            },
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_dir = Self::get_config_dir();
        let config_file = config_dir.join("config.toml");

        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

        let mut config = if config_file.exists() {
            info!("Loading configuration from: {}", config_file.display());
            let content = fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {}", config_file.display()))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_file.display()))?
        } else {
            warn!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save(&config_file)?;
            default_config
        };

        config.load_from_env()?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        let mut content = String::new();
        content.push_str("# tg-account-pool configuration\n");
        content.push_str("#\n");
        content.push_str("# Sensitive values (api_hash, phones) should be set via environment\n");
        content.push_str("# variables instead of committed to this file:\n");
        content.push_str("#\n");
        content.push_str("#   TG_API_ID=\"12345\"\n");
        content.push_str("#   TG_API_HASH=\"your_api_hash_here\"\n");
        content.push_str("#   TG_PHONES=\"+10000000001,+10000000002\"\n");
        content.push('\n');

        let config_content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        content.push_str(&config_content);

        fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    fn load_from_env(&mut self) -> Result<()> {
        if let Ok(api_id) = std::env::var("TG_API_ID") {
            if let Ok(api_id) = api_id.parse::<i32>() {
                self.telegram.api_id = api_id;
                info!("Loaded API id from environment");
            } else {
                warn!("Failed to parse TG_API_ID as an integer");
            }
        }

        if let Ok(api_hash) = std::env::var("TG_API_HASH") {
            if !api_hash.is_empty() {
                self.telegram.api_hash = api_hash;
                info!("Loaded API hash from environment");
            }
        }

        if let Ok(phones) = std::env::var("TG_PHONES") {
            if !phones.is_empty() {
                self.telegram.phones = phones.split(',').map(|s| s.trim().to_string()).collect();
                info!("Loaded {} phones from environment", self.telegram.phones.len());
            }
        }

        if let Ok(sessions_dir) = std::env::var("TG_SESSIONS_DIR") {
            self.paths.sessions_dir = PathBuf::from(sessions_dir);
        }

        if let Ok(db_path) = std::env::var("TG_STATS_DB_PATH") {
            self.stats_db.database_path = PathBuf::from(db_path);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.api_id == 0 {
            anyhow::bail!(
                "\nTelegram API id is required.\n\nPlease set the TG_API_ID environment variable:\n  export TG_API_ID=\"12345\"\n\nGet API credentials at https://my.telegram.org."
            );
        }

        if self.telegram.api_hash.is_empty() {
            anyhow::bail!(
                "\nTelegram API hash is required.\n\nPlease set the TG_API_HASH environment variable:\n  export TG_API_HASH=\"your_api_hash_here\""
            );
        }

        if self.telegram.phones.is_empty() {
            anyhow::bail!(
                "\nAt least one account phone number is required.\n\nPlease set the TG_PHONES environment variable:\n  export TG_PHONES=\"+10000000001,+10000000002\""
            );
        }

        if !self.paths.sessions_dir.is_absolute() {
            anyhow::bail!("Sessions directory must be an absolute path");
        }

        Ok(())
    }

    pub fn get_config_dir() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".tg_account_pool")
    }
}
