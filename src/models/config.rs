use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub surveillance: SurveillanceConfig,
    pub geocoding: GeocodingConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Defaults, then `config.toml` / `config.json` if present, then
    /// `AVIATOR_<SECTION>__<KEY>` environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from(basename: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(basename).required(false))
            .add_source(
                Environment::with_prefix("AVIATOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub dashboard_interval_ms: u64,
    pub header_interval_ms: u64,
    pub flight_interval_ms: u64,
    /// Poll another console's API instead of the in-process backend.
    pub remote_base_url: Option<String>,
}

impl PollingConfig {
    pub fn dashboard_interval(&self) -> Duration {
        Duration::from_millis(self.dashboard_interval_ms)
    }

    pub fn header_interval(&self) -> Duration {
        Duration::from_millis(self.header_interval_ms)
    }

    pub fn flight_interval(&self) -> Duration {
        Duration::from_millis(self.flight_interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            dashboard_interval_ms: 3000,
            header_interval_ms: 5000,
            flight_interval_ms: 2000,
            remote_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveillanceConfig {
    pub enabled: bool,
    pub watched_class: String,
    pub threshold: f32,
    pub action_period_ms: u64,
    pub actions: Vec<String>,
    pub idle_label: String,
    pub frame_interval_ms: u64,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watched_class: "person".to_string(),
            threshold: 0.65,
            action_period_ms: 1500,
            actions: vec![
                "EVASIVE RIGHT".to_string(),
                "ALTITUDE UP".to_string(),
                "EVASIVE LEFT".to_string(),
                "HOLD POSITION".to_string(),
            ],
            idle_label: "Monitoring for threats...".to_string(),
            frame_interval_ms: 33,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "CyberMindAviator/1.0 (ops@cybermind-aviator.dev)".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
        }
    }
}
