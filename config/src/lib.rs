//! Configuration loading for Lumen.
//!
//! Configuration lives in a TOML file under the user's Lumen directory
//! (`~/.lumen/config.toml` by default), with environment overrides layered on
//! top:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `LUMEN_CONFIG_PATH` | Read configuration from this path instead. |
//! | `LUMEN_API_BASE_URL` | Override `[api] base_url`. |
//! | `LUMEN_API_TOKEN` | Provide a bearer token without touching the session record. |
//!
//! Raw deserialization structs stay private; the public [`Config`] is built
//! from the resolved settings types in `lumen-types`, so an existing `Config`
//! is always valid.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use lumen_types::{
    ApiSettings, ApiSettingsError, AuthToken, SessionSettings, StreamSettings,
};

/// Default API endpoint baked into a fresh install.
pub const DEFAULT_BASE_URL: &str = "https://api.lumen.example";

const CONFIG_DIR_NAME: &str = ".lumen";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid api settings: {0}")]
    InvalidApiSettings(#[from] ApiSettingsError),
    #[error("LUMEN_API_TOKEN override is empty")]
    EmptyTokenOverride,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    api: Option<ApiSettings>,
    stream: Option<StreamSettings>,
    session: Option<SessionSettings>,
}

/// Environment overrides, captured once so resolution stays a pure function.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("LUMEN_API_BASE_URL").ok(),
            token: std::env::var("LUMEN_API_TOKEN").ok(),
        }
    }
}

/// Fully-resolved Lumen configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiSettings,
    pub stream: StreamSettings,
    pub session: SessionSettings,
    /// Token supplied via environment, taking priority over the persisted
    /// session record during credential reconciliation.
    pub env_token: Option<AuthToken>,
}

impl Config {
    /// Load configuration from the default (or `LUMEN_CONFIG_PATH`) file,
    /// then apply environment overrides. A missing file is not an error;
    /// defaults apply.
    pub fn load() -> Result<Self, ConfigError> {
        let raw = match config_path() {
            Some(path) if path.is_file() => {
                let text = std::fs::read_to_string(&path).map_err(|source| {
                    ConfigError::Read {
                        path: path.clone(),
                        source,
                    }
                })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?
            }
            Some(path) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                RawConfigFile::default()
            }
            None => {
                tracing::warn!("Could not determine home directory, using default config");
                RawConfigFile::default()
            }
        };

        Self::resolve(raw, EnvOverrides::from_env())
    }

    /// Parse configuration from TOML text and apply the given overrides.
    pub fn from_toml(text: &str, overrides: EnvOverrides) -> Result<Self, ConfigError> {
        let raw = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(raw, overrides)
    }

    fn resolve(raw: RawConfigFile, overrides: EnvOverrides) -> Result<Self, ConfigError> {
        let mut api = match raw.api {
            Some(api) => api,
            None => ApiSettings::new(
                DEFAULT_BASE_URL,
                std::time::Duration::from_secs(lumen_types::DEFAULT_REQUEST_TIMEOUT_SECS),
            )?,
        };

        if let Some(base_url) = overrides.base_url {
            api = ApiSettings::new(&base_url, api.request_timeout())?;
        }

        let env_token = match overrides.token {
            Some(token) => {
                Some(AuthToken::new(token).map_err(|_| ConfigError::EmptyTokenOverride)?)
            }
            None => None,
        };

        Ok(Self {
            api,
            stream: raw.stream.unwrap_or_default(),
            session: raw.session.unwrap_or_default(),
            env_token,
        })
    }
}

/// Path of the Lumen config file: `LUMEN_CONFIG_PATH` if set, otherwise
/// `~/.lumen/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LUMEN_CONFIG_PATH") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Directory for persisted client-side state (session record, logs).
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME))
}
