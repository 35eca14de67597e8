//! Per-destination client configuration.
//!
//! One `ClientConfig` describes one delivery destination: either an
//! InfluxDB write endpoint (v1 or v2 credentials, mutually exclusive by
//! construction) or a dashboard live-push endpoint. Configuration is
//! loaded from TOML and validated before a client is built from it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Port used when the InfluxDB destination leaves it unset.
pub const DEFAULT_INFLUX_PORT: u16 = 8086;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("parse error: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Authentication shape for the InfluxDB write API. The two API versions
/// take disjoint credential sets, so they are one enum rather than a pile
/// of optional fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// v1 API: `/write?db=...` with optional query-string user/password.
    V1 {
        database: String,
        #[serde(default)]
        user: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    /// v2 API: `/api/v2/write?org=...&bucket=...` with a token header.
    V2 {
        org: String,
        bucket: String,
        token: String,
    },
}

/// InfluxDB destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub host: String,
    /// 0 or absent selects [`DEFAULT_INFLUX_PORT`].
    #[serde(default)]
    pub port: u16,
    pub credentials: Credentials,
    /// Raw API path override; replaces `/write` or `/api/v2/write`.
    #[serde(default)]
    pub api_path: Option<String>,
}

impl InfluxConfig {
    pub fn port(&self) -> u16 {
        if self.port == 0 {
            DEFAULT_INFLUX_PORT
        } else {
            self.port
        }
    }
}

/// Dashboard live-push destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Host, optionally carrying a scheme (`ws://`, `wss://`, `http://`,
    /// `https://`). Without a scheme, plain HTTP is assumed.
    pub host: String,
    pub port: u16,
    /// Bearer token for the push API.
    pub token: String,
    /// Push channel identifier, the last path segment of the endpoint.
    pub push_id: String,
    /// TLS peer verification for `wss`/`https`.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_true() -> bool {
    true
}

/// What kind of endpoint this client delivers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Influx(InfluxConfig),
    Push(PushConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub destination: Destination,
    /// Maximum number of failed records the retry queue will hold.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1000
}

impl ClientConfig {
    pub fn influx(config: InfluxConfig, queue_capacity: usize) -> Self {
        Self {
            destination: Destination::Influx(config),
            queue_capacity,
        }
    }

    pub fn push(config: PushConfig, queue_capacity: usize) -> Self {
        Self {
            destination: Destination::Push(config),
            queue_capacity,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.destination {
            Destination::Influx(influx) => {
                if influx.host.is_empty() {
                    return Err(ConfigError::InvalidConfig("host must not be empty".into()));
                }
                match &influx.credentials {
                    Credentials::V1 { database, .. } => {
                        if database.is_empty() {
                            return Err(ConfigError::InvalidConfig(
                                "v1 credentials require a database name".into(),
                            ));
                        }
                    }
                    Credentials::V2 { org, bucket, token } => {
                        if org.is_empty() || bucket.is_empty() || token.is_empty() {
                            return Err(ConfigError::InvalidConfig(
                                "v2 credentials require org, bucket and token".into(),
                            ));
                        }
                    }
                }
                if let Some(path) = &influx.api_path
                    && !path.starts_with('/')
                {
                    return Err(ConfigError::InvalidConfig(
                        "api_path override must start with '/'".into(),
                    ));
                }
            }
            Destination::Push(push) => {
                if push.host.is_empty() {
                    return Err(ConfigError::InvalidConfig("host must not be empty".into()));
                }
                if push.token.is_empty() || push.push_id.is_empty() {
                    return Err(ConfigError::InvalidConfig(
                        "push destinations require token and push_id".into(),
                    ));
                }
                if push.port == 0 {
                    return Err(ConfigError::InvalidConfig(
                        "push destinations require an explicit port".into(),
                    ));
                }
                if let Some((scheme, rest)) = push.host.split_once("://") {
                    if !matches!(scheme, "http" | "https" | "ws" | "wss") {
                        return Err(ConfigError::InvalidUrl(format!(
                            "unsupported push scheme '{scheme}'"
                        )));
                    }
                    // The remainder must still parse as a host.
                    let probe = format!("http://{}:{}", rest, push.port);
                    Url::parse(&probe).map_err(|e| {
                        ConfigError::InvalidUrl(format!("invalid push host '{}': {e}", push.host))
                    })?;
                } else {
                    let probe = format!("http://{}:{}", push.host, push.port);
                    Url::parse(&probe).map_err(|e| {
                        ConfigError::InvalidUrl(format!("invalid push host '{}': {e}", push.host))
                    })?;
                }
            }
        }
        Ok(())
    }
}
