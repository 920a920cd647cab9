//! TOML configuration and the runtime context assembled from it.
//!
//! Cloud tokens may live in the TOML or come from the environment
//! (`SOURCE_CLOUD_TOKEN`, `DESTINATION_CLOUD_TOKEN`); the environment
//! wins so tokens can stay out of checked-in config files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::Level;
use url::Url;

use crate::manager::RunSettings;
use crate::session::{HttpCloudSession, SessionError, SessionPair};

/// Raw settings deserialized from the config TOML.
#[derive(Deserialize)]
struct Config {
    database_path: PathBuf,
    log_level: Option<LogLevel>,
    parallelism: Option<usize>,
    handler_timeout_secs: Option<u64>,
    stale_after_secs: Option<i64>,
    source: CloudConfig,
    destination: CloudConfig,
}

/// One cloud endpoint section (`[source]` or `[destination]`).
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub endpoint: Url,
    pub token: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("no token for the {0} cloud in config or environment")]
    MissingToken(&'static str),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Combined runtime context. Assembled from the TOML config plus
/// environment token overrides, defaults applied in one place.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub database_path: PathBuf,
    pub log_level: LogLevel,
    pub parallelism: usize,
    pub handler_timeout: Duration,
    pub stale_after: chrono::Duration,
    pub source: CloudConfig,
    pub destination: CloudConfig,
}

impl Ctx {
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        let mut source = config.source;
        let mut destination = config.destination;
        if let Ok(token) = std::env::var("SOURCE_CLOUD_TOKEN") {
            source.token = Some(token);
        }
        if let Ok(token) = std::env::var("DESTINATION_CLOUD_TOKEN") {
            destination.token = Some(token);
        }
        Ok(Self {
            database_path: config.database_path,
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            parallelism: config.parallelism.unwrap_or(4),
            handler_timeout: Duration::from_secs(config.handler_timeout_secs.unwrap_or(300)),
            stale_after: chrono::Duration::seconds(config.stale_after_secs.unwrap_or(3600)),
            source,
            destination,
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            parallelism: self.parallelism,
            handler_timeout: self.handler_timeout,
            stale_after: self.stale_after,
        }
    }

    /// Build the authenticated session pair for both clouds.
    pub fn session_pair(&self) -> Result<SessionPair, ConfigError> {
        Ok(SessionPair::new(
            cloud_session(&self.source, "source")?,
            cloud_session(&self.destination, "destination")?,
        ))
    }
}

fn cloud_session(
    cloud: &CloudConfig,
    side: &'static str,
) -> Result<Arc<HttpCloudSession>, ConfigError> {
    let token = cloud
        .token
        .clone()
        .ok_or(ConfigError::MissingToken(side))?;
    let timeout = Duration::from_secs(cloud.request_timeout_secs.unwrap_or(60));
    Ok(Arc::new(HttpCloudSession::new(
        cloud.endpoint.clone(),
        token,
        timeout,
    )?))
}

pub fn setup_tracing(log_level: LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("strato_migrate={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
