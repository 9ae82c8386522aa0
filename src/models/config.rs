use crate::models::backup_time::BackupTime;
use crate::models::config_validator::validate_config;
use crate::models::error::{BackupError, Result};
use crate::models::file_error_policy::FileErrorPolicy;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source_directory: String,
    #[serde(default)]
    pub destination_directory: String,
    #[serde(default)]
    pub backup_time: String,
    #[serde(default = "default_activity_log")]
    pub activity_log_file: String,
    #[serde(default = "usize_three")]
    pub retained_archives: usize,
    #[serde(default)]
    pub on_unreadable_file: FileErrorPolicy,
    #[serde(default = "u64_thirty")]
    pub scheduler_poll_seconds: u64,
    #[serde(default = "u64_thousand")]
    pub monitor_ui_interval_ms: u64,
    #[serde(default = "u64_ten")]
    pub monitor_log_interval_seconds: u64,
    #[serde(default)]
    pub importer: ImporterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImporterConfig {
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_stock_base_url")]
    pub stock_base_url: String,
    #[serde(default)]
    pub stock_api_token: Option<String>,
    #[serde(default = "default_crypto_base_url")]
    pub crypto_base_url: String,
    #[serde(default = "default_stocks")]
    pub stocks: Vec<String>,
    #[serde(default = "default_cryptos")]
    pub cryptos: Vec<String>,
    #[serde(default = "usize_three")]
    pub max_attempts: usize,
    #[serde(default = "u64_two")]
    pub retry_backoff_seconds: u64,
    #[serde(default = "u64_ten")]
    pub request_timeout_seconds: u64,
}

/// Validated settings a single backup run works from. Cloned at run start so
/// a reconfiguration never changes a run in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub time: BackupTime,
    pub retained_archives: usize,
    pub file_error_policy: FileErrorPolicy,
}

fn default_activity_log() -> String {
    "assets/log.txt".to_string()
}
fn default_database_file() -> String {
    "quotes.db".to_string()
}
fn default_stock_base_url() -> String {
    "https://brapi.dev".to_string()
}
fn default_crypto_base_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_stocks() -> Vec<String> {
    vec!["PETR4".to_string(), "VALE3".to_string()]
}
fn default_cryptos() -> Vec<String> {
    ["BTCBRL", "ETHBRL", "LTCBRL", "SOLBRL", "ADABRL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
const fn usize_three() -> usize {
    3
}
const fn u64_two() -> u64 {
    2
}
const fn u64_ten() -> u64 {
    10
}
const fn u64_thirty() -> u64 {
    30
}
const fn u64_thousand() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_directory: String::new(),
            destination_directory: String::new(),
            backup_time: String::new(),
            activity_log_file: default_activity_log(),
            retained_archives: usize_three(),
            on_unreadable_file: FileErrorPolicy::default(),
            scheduler_poll_seconds: u64_thirty(),
            monitor_ui_interval_ms: u64_thousand(),
            monitor_log_interval_seconds: u64_ten(),
            importer: ImporterConfig::default(),
        }
    }
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
            stock_base_url: default_stock_base_url(),
            stock_api_token: None,
            crypto_base_url: default_crypto_base_url(),
            stocks: default_stocks(),
            cryptos: default_cryptos(),
            max_attempts: usize_three(),
            retry_backoff_seconds: u64_two(),
            request_timeout_seconds: u64_ten(),
        }
    }
}

impl Config {
    /// Builds the per-run backup settings. Fails if any of the three user
    /// inputs is missing or the time is not `HH:MM`.
    pub fn backup_config(&self) -> Result<BackupConfig> {
        if self.source_directory.trim().is_empty()
            || self.destination_directory.trim().is_empty()
            || self.backup_time.trim().is_empty()
        {
            return Err(BackupError::InvalidConfig(
                "source_directory, destination_directory and backup_time must all be set"
                    .to_string(),
            ));
        }

        Ok(BackupConfig {
            source: PathBuf::from(&self.source_directory),
            destination: PathBuf::from(&self.destination_directory),
            time: self.backup_time.trim().parse()?,
            retained_archives: self.retained_archives,
            file_error_policy: self.on_unreadable_file,
        })
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_poll_seconds)
    }

    pub fn monitor_ui_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_ui_interval_ms)
    }

    pub fn monitor_log_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_log_interval_seconds)
    }
}

pub fn load_config(config_file: &str) -> Result<Config> {
    let config_path = PathBuf::from(config_file);
    info!("Loading config from: {}", config_path.display());

    let config_str = fs::read_to_string(&config_path).map_err(|cause| BackupError::ConfigRead {
        path: config_path.clone(),
        cause,
    })?;

    serde_json::from_str(&config_str).map_err(|cause| BackupError::ConfigParse {
        path: config_path,
        cause,
    })
}

/// Loads `config_file` with surrounding quotes stripped. An unreadable file
/// yields the defaults; a file that does not parse is still an error.
pub fn load_config_or_default(config_file: &str) -> Result<Config> {
    let config_file = config_file.trim_matches(|c| c == '"' || c == '\'');
    match load_config(config_file) {
        Err(BackupError::ConfigRead { path, cause }) => {
            warn!(
                "Config file {} not readable ({}), using defaults",
                path.display(),
                cause
            );
            Ok(Config::default())
        }
        other => other,
    }
}

pub fn setup_config(config_file: &str) -> Result<Config> {
    let config = load_config(config_file)?;

    validate_config(&config)?;

    Ok(config)
}
