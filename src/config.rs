//! Configuration loading.
//!
//! Settings come from a YAML file (by default `watcheth.yml` in the working
//! directory) overlaid with `WATCHETH_*` environment variables:
//!
//! ```yaml
//! refresh_interval: 2s
//! clients:
//!   - name: lighthouse
//!     type: consensus
//!     endpoint: http://localhost:5052
//!     log_path: /var/log/{name}/beacon.log
//!   - name: geth
//!     type: execution
//!     endpoint: http://localhost:8545
//!   - name: vouch
//!     type: validator
//!     endpoint: http://localhost:8081
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;
use watcheth_types::{NodeKind, UnknownKind};

use crate::duration::parse_duration;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "watcheth.yml";

/// Prefix for environment overrides, e.g. `WATCHETH_REFRESH_INTERVAL=5s`.
pub const ENV_PREFIX: &str = "WATCHETH";

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_LOG_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_LOG_WINDOW: usize = 15;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no clients configured")]
    NoClients,

    #[error("client #{index} has no name")]
    MissingName { index: usize },

    #[error("client '{name}' has no endpoint")]
    MissingEndpoint { name: String },

    #[error("client '{name}' is configured more than once")]
    DuplicateName { name: String },

    #[error("client '{name}': {source}")]
    UnknownKind {
        name: String,
        #[source]
        source: UnknownKind,
    },
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
    #[serde(default)]
    pub refresh_interval: Option<String>,
    #[serde(default)]
    pub fetch_timeout: Option<String>,
    #[serde(default)]
    pub log_window: Option<usize>,
    #[serde(default)]
    pub log_poll_interval: Option<String>,
}

/// One monitored client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub name: String,
    /// `consensus` (default), `execution`, `validator` or `vouch`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub log_path: Option<String>,
}

impl ClientConfig {
    /// The client kind; an empty type means consensus.
    pub fn kind(&self) -> Result<NodeKind, UnknownKind> {
        self.kind.parse()
    }

    /// Log file path with `{name}` replaced by the lower-cased client name.
    pub fn log_path(&self) -> PathBuf {
        let name = self.name.to_lowercase();
        match self.log_path.as_deref() {
            Some(pattern) if !pattern.trim().is_empty() => {
                PathBuf::from(pattern.replace("{name}", &name))
            }
            _ => PathBuf::from(format!("/var/log/{name}/{name}.log")),
        }
    }
}

impl Settings {
    /// Load from `path`, or from `watcheth.yml` if present, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false),
        };
        Self::from_sources(file, Environment::with_prefix(ENV_PREFIX))
    }

    /// Parse settings from YAML text, without environment overrides.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_sources<F>(file: F, env: Environment) -> Result<Self, ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every client is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients.is_empty() {
            return Err(ConfigError::NoClients);
        }

        let mut seen = BTreeSet::new();
        for (index, client) in self.clients.iter().enumerate() {
            if client.name.trim().is_empty() {
                return Err(ConfigError::MissingName { index });
            }
            if client.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingEndpoint {
                    name: client.name.clone(),
                });
            }
            client.kind().map_err(|source| ConfigError::UnknownKind {
                name: client.name.clone(),
                source,
            })?;
            if !seen.insert(client.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: client.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Poll interval; falls back to 2s when missing or invalid.
    pub fn refresh_interval(&self) -> Duration {
        duration_or(self.refresh_interval.as_deref(), DEFAULT_REFRESH_INTERVAL)
    }

    pub fn fetch_timeout(&self) -> Duration {
        duration_or(self.fetch_timeout.as_deref(), DEFAULT_FETCH_TIMEOUT)
    }

    pub fn log_poll_interval(&self) -> Duration {
        duration_or(self.log_poll_interval.as_deref(), DEFAULT_LOG_POLL_INTERVAL)
    }

    pub fn log_window(&self) -> usize {
        self.log_window.filter(|&n| n > 0).unwrap_or(DEFAULT_LOG_WINDOW)
    }
}

fn duration_or(text: Option<&str>, default: Duration) -> Duration {
    let Some(text) = text else {
        return default;
    };
    match parse_duration(text) {
        Ok(d) if !d.is_zero() => d,
        Ok(_) | Err(_) => {
            tracing::warn!(value = text, default = ?default, "Invalid duration in config, using default");
            default
        }
    }
}
