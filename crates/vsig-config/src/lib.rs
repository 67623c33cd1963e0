//! Configuration for vsig applications.
//!
//! TOML settings layered with `SDV_`-prefixed environment variables,
//! native service discovery, translation to `vsig_core::ClientConfig`,
//! and tracing setup.

pub mod discovery;
pub mod logging;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vsig_core::{ClientConfig, MAX_IN_FLIGHT_LIMIT};

pub use discovery::NativeDiscovery;
pub use logging::{LogFormat, init_tracing, init_tracing_with};

/// Prefix of every environment variable read by this crate.
pub const ENV_PREFIX: &str = "SDV_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML settings structs ───────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default)]
    pub log: LogSettings,

    /// Service name → address, consulted after `SDV_<SERVICE>_ADDRESS`.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientSettings {
    #[serde(default = "default_broker_service")]
    pub broker_service: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            broker_service: default_broker_service(),
            request_timeout_ms: default_request_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_broker_service() -> String {
    ClientConfig::default().broker_service
}
fn default_request_timeout_ms() -> u64 {
    u64::try_from(ClientConfig::default().request_timeout.as_millis()).unwrap_or(u64::MAX)
}
fn default_max_in_flight() -> usize {
    ClientConfig::default().max_in_flight
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct LogSettings {
    /// Default verbosity when `RUST_LOG` is unset (0 = warn … 3 = trace).
    #[serde(default)]
    pub verbosity: u8,

    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    /// Validate and convert into the core client configuration.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let client = &self.client;
        if client.broker_service.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "client.broker_service".into(),
                reason: "must not be empty".into(),
            });
        }
        if client.request_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "client.request_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if client.max_in_flight == 0 {
            return Err(ConfigError::Validation {
                field: "client.max_in_flight".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if client.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Validation {
                field: "client.max_in_flight".into(),
                reason: format!("must not exceed {MAX_IN_FLIGHT_LIMIT}"),
            });
        }

        Ok(ClientConfig {
            broker_service: client.broker_service.clone(),
            request_timeout: Duration::from_millis(client.request_timeout_ms),
            max_in_flight: client.max_in_flight,
        })
    }

    /// Native discovery backed by this file's `[services]` table.
    pub fn discovery(&self) -> NativeDiscovery {
        NativeDiscovery::new(self.services.clone())
    }
}

// ── Settings file path ──────────────────────────────────────────────

/// Resolve the settings file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "vsig", "vsig").map_or_else(
        || PathBuf::from(".vsig").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Settings loading ────────────────────────────────────────────────

/// Load settings from the platform config file and the environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(&config_path())
}

/// Load settings from `path` (missing files are fine) and the environment.
///
/// Nested keys use a double underscore: `SDV_CLIENT__MAX_IN_FLIGHT=8`.
pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let settings: Settings = figment.extract()?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

// ── Settings saving ─────────────────────────────────────────────────

/// Serialize settings to TOML at the canonical path.
pub fn save_settings(settings: &Settings) -> Result<(), ConfigError> {
    save_settings_to(&config_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(settings)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
