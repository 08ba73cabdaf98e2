use crate::scheduler::MAX_DELAY;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub reconciler: ReconcilerSettings,
    #[serde(default)]
    pub broker: BrokerSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcilerSettings {
    /// Seconds between scheduled passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// History lookback before the recorded open time, in seconds
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: i64,
    /// Ceiling for the polling delay while the broker is unreachable
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            lookback_secs: default_lookback_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BrokerMode {
    #[default]
    Bridge,
    /// In-memory broker. `POST /positions` opens the position on it as well, and
    /// `POST /simulated/positions/{id}/close` closes it with a given profit.
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    #[serde(default)]
    pub mode: BrokerMode,
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            mode: BrokerMode::default(),
            bridge_url: default_bridge_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingSettings {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_lookback_secs() -> i64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3002
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            // 1. Load user config from ~/.nexustrade/config.*
            .add_source(File::with_name(&format!("{}/.nexustrade/config", home)).required(false))
            // 2. Load project config from config/config.*
            .add_source(File::with_name("config/config").required(false))
            // 3. Load local config from config/local.* (not checked in)
            .add_source(File::with_name("config/local").required(false))
            // 4. Environment overrides, e.g. NEXUS_BROKER__BRIDGE_URL
            .add_source(Environment::with_prefix("NEXUS").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Between one second and [`MAX_DELAY`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.reconciler.interval_secs.max(1)).min(MAX_DELAY)
    }

    /// Never below the interval, never above [`MAX_DELAY`].
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.reconciler.max_backoff_secs)
            .max(self.interval())
            .min(MAX_DELAY)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconciler.lookback_secs.max(0))
    }
}
