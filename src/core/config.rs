//! Configuration - Type-safe, validated config

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Price feed settings
    pub feed: FeedConfig,

    /// Persistence backend; absent means record-keeping is disabled
    pub backend: Option<BackendConfig>,

    /// Wallet limits enforced by the balance validator
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Instrument the session trades
    pub symbol: String,

    /// Opening price of the synthetic walk
    pub start_price: f64,

    /// Tick interval in milliseconds
    pub interval_ms: u64,

    /// Walk seed; omit for a clock-derived one
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the remote order/trade store
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Max notional value per order fill
    pub max_order_notional: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig {
                log_level: "info".to_string(),
            },
            feed: FeedConfig {
                symbol: "BTCUSDT".to_string(),
                start_price: 63_000.0,
                interval_ms: 1_000,
                seed: None,
            },
            backend: None,
            wallet: WalletConfig {
                max_order_notional: 50_000.0,
            },
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &PathBuf) -> crate::core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::core::Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::core::Error::Config(format!("Failed to parse config: {}", e)))
    }
}
