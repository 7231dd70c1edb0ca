use std::path::PathBuf;
use std::time::Duration;

use openai_realtime::{DEFAULT_GATEWAY_URL, DEFAULT_MODEL, DEFAULT_STUN_URL, GatewayConfig, PeerConfig};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backend serving auth, ephemeral keys, progress, topics and profile.
    pub api_base_url: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub stun_url: String,
    pub connect_timeout: Option<Duration>,
    pub token_path: PathBuf,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_base_url = std::env::var("API_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("API_BASE_URL".to_string()))?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let realtime_url =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        let realtime_model =
            std::env::var("REALTIME_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let stun_url = std::env::var("STUN_URL").unwrap_or_else(|_| DEFAULT_STUN_URL.to_string());

        let connect_timeout = match std::env::var("CONNECT_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.parse::<u64>().ok().filter(|secs| *secs > 0).ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "CONNECT_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    )
                })?;
                Some(Duration::from_secs(secs))
            }
            Err(_) => None,
        };

        let token_path = std::env::var("TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.tutor-token.json"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            api_base_url,
            realtime_url,
            realtime_model,
            stun_url,
            connect_timeout,
            token_path,
            log_level,
        })
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
        }
    }

    pub fn peer(&self) -> PeerConfig {
        PeerConfig {
            ice_servers: vec![self.stun_url.clone()],
            ..PeerConfig::default()
        }
    }
}
