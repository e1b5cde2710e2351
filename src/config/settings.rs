//! Application settings and configuration

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::schema::{Instrument, Resolution, SourceSpec};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Dataset name, the top-level directory under the sink root
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Instruments to collect
    #[serde(default = "default_instruments")]
    pub instruments: Vec<Instrument>,
    /// Resolutions collected for every instrument
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<Resolution>,
    /// Upstream source configurations
    #[serde(default)]
    pub source: SourceSettings,
    /// Watermark store configuration
    #[serde(default)]
    pub store: StoreSettings,
    /// Bar sink configuration
    #[serde(default)]
    pub sink: SinkSettings,
    /// Run policy
    #[serde(default)]
    pub collector: CollectorSettings,
    /// Failure reporting configuration
    #[serde(default)]
    pub report: ReportSettings,
}

fn default_dataset() -> String {
    "crypto".to_string()
}

fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument {
            id: "BTCUSD".to_string(),
            source: SourceSpec::Kraken {
                pair: "XBTUSD".to_string(),
                result_key: "XXBTZUSD".to_string(),
            },
        },
        Instrument {
            id: "ETHBTC".to_string(),
            source: SourceSpec::Kraken {
                pair: "ETHXBT".to_string(),
                result_key: "XETHXXBT".to_string(),
            },
        },
    ]
}

fn default_resolutions() -> Vec<Resolution> {
    vec![
        Resolution::new("1M", 1),
        Resolution::new("5M", 5),
        Resolution::new("15M", 15),
        Resolution::new("30M", 30),
        Resolution::new("1H", 60),
        Resolution::new("4H", 240),
        Resolution::new("1D", 1440),
        Resolution::new("1W", 10080),
    ]
}

/// Upstream source settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Kraken OHLC API configuration
    #[serde(default)]
    pub kraken: KrakenSourceSettings,
    /// Yahoo Finance chart API configuration
    #[serde(default)]
    pub yahoo: YahooSourceSettings,
}

/// Kraken OHLC API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KrakenSourceSettings {
    /// OHLC endpoint URL
    #[serde(default = "default_kraken_api_url")]
    pub api_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_kraken_api_url() -> String {
    "https://api.kraken.com/0/public/OHLC".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for KrakenSourceSettings {
    fn default() -> Self {
        Self {
            api_url: default_kraken_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Yahoo Finance chart API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YahooSourceSettings {
    /// Chart API base URL
    #[serde(default = "default_yahoo_api_url")]
    pub api_url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Range requested for series that already have a watermark
    #[serde(default = "default_lookback_range")]
    pub lookback_range: String,
}

fn default_yahoo_api_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_lookback_range() -> String {
    "5d".to_string()
}

impl Default for YahooSourceSettings {
    fn default() -> Self {
        Self {
            api_url: default_yahoo_api_url(),
            timeout_secs: default_timeout_secs(),
            lookback_range: default_lookback_range(),
        }
    }
}

/// Watermark store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite connection URL
    #[serde(default = "default_store_url")]
    pub url: String,
}

fn default_store_url() -> String {
    "sqlite://market_collector.db".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

/// How the sink handles an already-existing partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Replace the partition with the new batch
    Overwrite,
    /// Append the new batch after existing rows
    Merge,
}

impl Default for WritePolicy {
    fn default() -> Self {
        WritePolicy::Overwrite
    }
}

/// Bar sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Root directory for CSV partitions
    #[serde(default = "default_sink_root")]
    pub root: String,
    /// Behavior when a partition file already exists
    #[serde(default)]
    pub policy: WritePolicy,
}

fn default_sink_root() -> String {
    "data".to_string()
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            root: default_sink_root(),
            policy: WritePolicy::default(),
        }
    }
}

/// Run policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// Abort the whole run on the first cell failure. When false, failed
    /// cells are skipped and the rest of the grid still runs.
    #[serde(default = "default_true")]
    pub abort_on_cell_failure: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            abort_on_cell_failure: default_true(),
        }
    }
}

/// Failure reporting settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Incoming webhook URL; when unset, failures are only logged
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix("MARKET_COLLECTOR")
    }

    /// Load settings with a custom environment variable prefix
    pub fn load_with_prefix(env_prefix: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config_dir = Self::config_dir();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Add environment-specific configuration
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Add local overrides (not checked into git)
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Add environment variables (e.g., MARKET_COLLECTOR__STORE__URL)
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration directory path
    fn config_dir() -> String {
        std::env::var("MARKET_COLLECTOR_CONFIG_DIR").unwrap_or_else(|_| "config".into())
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            dataset: default_dataset(),
            instruments: default_instruments(),
            resolutions: default_resolutions(),
            source: SourceSettings::default(),
            store: StoreSettings::default(),
            sink: SinkSettings::default(),
            collector: CollectorSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}
