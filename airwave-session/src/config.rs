//! Runtime configuration.
//!
//! Loaded from a TOML file. Every section has defaults, so a missing file
//! yields a working in-process setup with public STUN servers.

use crate::media::CaptureConstraints;
use crate::signaling::RetentionPolicy;
use crate::transport::TransportConfig;
use airwave_core::IceServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const ENV_DATABASE_URL: &str = "AIRWAVE_DATABASE_URL";
pub const ENV_LOG_LEVEL: &str = "AIRWAVE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "AIRWAVE_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AirwaveConfig {
    pub bus: BusSettings,
    pub rtc: RtcSettings,
    pub retention: RetentionSettings,
    pub audio: CaptureConstraints,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub backend: BusBackend,
    /// Only read by the `postgres` backend.
    pub database_url: String,
    pub max_connections: u32,
    /// Apply the signaling schema and trigger on connect.
    pub apply_schema: bool,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            database_url: "postgres://localhost/airwave".into(),
            max_connections: 5,
            apply_schema: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcSettings {
    /// STUN urls. No relay servers are supported.
    pub stun_servers: Vec<String>,
}

impl Default for RtcSettings {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub sweep_interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            max_age_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace/debug/info/warn/error or a full `EnvFilter` directive.
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AirwaveConfig {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            Self::from_toml(&raw)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.bus.database_url = url;
            self.bus.backend = BusBackend::Postgres;
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        let ice_servers = if self.rtc.stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![IceServerConfig {
                urls: self.rtc.stun_servers.clone(),
                username: None,
                credential: None,
            }]
        };
        TransportConfig { ice_servers }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            sweep_interval: Duration::from_secs(self.retention.sweep_interval_secs.max(1)),
            max_age: Duration::from_secs(self.retention.max_age_secs),
        }
    }
}
