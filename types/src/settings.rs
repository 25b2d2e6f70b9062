//! Resolved configuration types shared across crates.
//!
//! These types represent fully-validated, resolved configuration state.
//! Raw TOML deserialization structs (with `Option` fields and millisecond
//! integers) stay private behind `#[serde(try_from)]`; the config loader
//! resolves them into these types at the parse boundary.
//!
//! Existence of a value is the proof of its validity.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BATCH_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_REDIRECT_GUARD_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const DEFAULT_TERMINAL_ACTION_PATTERNS: [&str; 2] = ["task_complete", "task_reject"];

#[derive(Debug, Clone, Error)]
pub enum ApiSettingsError {
    #[error("base_url is not a valid URL: {0}")]
    InvalidBaseUrl(String),
    #[error("base_url must use http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error("request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

#[derive(Deserialize)]
struct RawApiSettings {
    base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Validated API endpoint settings.
///
/// Invariant: `base_url` parses, uses http(s), and has a host.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawApiSettings")]
pub struct ApiSettings {
    base_url: Url,
    request_timeout: Duration,
}

impl TryFrom<RawApiSettings> for ApiSettings {
    type Error = ApiSettingsError;

    fn try_from(raw: RawApiSettings) -> Result<Self, Self::Error> {
        if raw.request_timeout_secs == 0 {
            return Err(ApiSettingsError::ZeroTimeout);
        }
        Self::new(
            &raw.base_url,
            Duration::from_secs(raw.request_timeout_secs),
        )
    }
}

impl ApiSettings {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiSettingsError> {
        let url = Url::parse(base_url)
            .map_err(|e| ApiSettingsError::InvalidBaseUrl(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ApiSettingsError::UnsupportedScheme(other.to_owned())),
        }
        if url.host_str().is_none() {
            return Err(ApiSettingsError::InvalidBaseUrl("missing host".to_owned()));
        }
        Ok(Self {
            base_url: url,
            request_timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// True when transport-level TLS enforcement applies. Plain-http loopback
    /// endpoints (local development, test servers) are the only exemption.
    #[must_use]
    pub fn requires_tls(&self) -> bool {
        self.base_url.scheme() == "https"
    }
}

#[derive(Debug, Clone, Error)]
pub enum StreamSettingsError {
    #[error("batch_debounce_ms must be greater than zero")]
    ZeroDebounce,
    #[error("terminal_action_patterns must not be empty")]
    NoPatterns,
    #[error("terminal_action_patterns entries must not be blank")]
    BlankPattern,
}

#[derive(Deserialize)]
struct RawStreamSettings {
    #[serde(default = "default_batch_debounce_ms")]
    batch_debounce_ms: u64,
    #[serde(default = "default_terminal_action_patterns")]
    terminal_action_patterns: Vec<String>,
}

fn default_batch_debounce_ms() -> u64 {
    DEFAULT_BATCH_DEBOUNCE_MS
}

fn default_terminal_action_patterns() -> Vec<String> {
    DEFAULT_TERMINAL_ACTION_PATTERNS
        .iter()
        .map(|&p| p.to_owned())
        .collect()
}

/// Validated reasoning-stream settings: the batcher's idle-debounce interval
/// and the substring patterns that mark an `action_result` payload terminal.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawStreamSettings")]
pub struct StreamSettings {
    batch_debounce: Duration,
    terminal_action_patterns: Vec<String>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            batch_debounce: Duration::from_millis(DEFAULT_BATCH_DEBOUNCE_MS),
            terminal_action_patterns: default_terminal_action_patterns(),
        }
    }
}

impl TryFrom<RawStreamSettings> for StreamSettings {
    type Error = StreamSettingsError;

    fn try_from(raw: RawStreamSettings) -> Result<Self, Self::Error> {
        Self::new(
            Duration::from_millis(raw.batch_debounce_ms),
            raw.terminal_action_patterns,
        )
    }
}

impl StreamSettings {
    pub fn new(
        batch_debounce: Duration,
        terminal_action_patterns: Vec<String>,
    ) -> Result<Self, StreamSettingsError> {
        if batch_debounce.is_zero() {
            return Err(StreamSettingsError::ZeroDebounce);
        }
        if terminal_action_patterns.is_empty() {
            return Err(StreamSettingsError::NoPatterns);
        }
        if terminal_action_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(StreamSettingsError::BlankPattern);
        }
        Ok(Self {
            batch_debounce,
            terminal_action_patterns,
        })
    }

    #[must_use]
    pub fn batch_debounce(&self) -> Duration {
        self.batch_debounce
    }

    #[must_use]
    pub fn terminal_action_patterns(&self) -> &[String] {
        &self.terminal_action_patterns
    }

    /// The terminal-action predicate: does this `action_result` payload text
    /// mention any configured terminal pattern?
    #[must_use]
    pub fn is_terminal_action(&self, payload_text: &str) -> bool {
        self.terminal_action_patterns
            .iter()
            .any(|pattern| payload_text.contains(pattern.as_str()))
    }
}

#[derive(Debug, Clone, Error)]
pub enum SessionSettingsError {
    #[error("redirect_guard_secs must be greater than zero")]
    ZeroGuardWindow,
}

#[derive(Deserialize)]
struct RawSessionSettings {
    #[serde(default = "default_redirect_guard_secs")]
    redirect_guard_secs: u64,
}

fn default_redirect_guard_secs() -> u64 {
    DEFAULT_REDIRECT_GUARD_SECS
}

/// Validated session-machine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawSessionSettings")]
pub struct SessionSettings {
    redirect_guard_window: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            redirect_guard_window: Duration::from_secs(DEFAULT_REDIRECT_GUARD_SECS),
        }
    }
}

impl TryFrom<RawSessionSettings> for SessionSettings {
    type Error = SessionSettingsError;

    fn try_from(raw: RawSessionSettings) -> Result<Self, Self::Error> {
        Self::new(Duration::from_secs(raw.redirect_guard_secs))
    }
}

impl SessionSettings {
    pub fn new(redirect_guard_window: Duration) -> Result<Self, SessionSettingsError> {
        if redirect_guard_window.is_zero() {
            return Err(SessionSettingsError::ZeroGuardWindow);
        }
        Ok(Self {
            redirect_guard_window,
        })
    }

    #[must_use]
    pub fn redirect_guard_window(&self) -> Duration {
        self.redirect_guard_window
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ApiSettings, SessionSettings, StreamSettings};

    #[test]
    fn api_settings_validates_url() {
        let ok = ApiSettings::new("https://api.lumen.example", Duration::from_secs(30));
        assert!(ok.is_ok());
        assert!(ok.unwrap().requires_tls());

        assert!(ApiSettings::new("not a url", Duration::from_secs(30)).is_err());
        assert!(ApiSettings::new("ftp://api.lumen.example", Duration::from_secs(30)).is_err());
    }

    #[test]
    fn api_settings_allows_plain_http_for_local_endpoints() {
        let local = ApiSettings::new("http://127.0.0.1:8080", Duration::from_secs(30)).unwrap();
        assert!(!local.requires_tls());
    }

    #[test]
    fn api_settings_rejects_zero_timeout_at_deserialization() {
        let raw = serde_json::json!({
            "base_url": "https://api.lumen.example",
            "request_timeout_secs": 0
        });
        assert!(serde_json::from_value::<ApiSettings>(raw).is_err());
    }

    #[test]
    fn stream_settings_defaults_match_policy() {
        let settings = StreamSettings::default();
        assert_eq!(settings.batch_debounce(), Duration::from_millis(100));
        assert!(settings.is_terminal_action("{\"action\":\"task_complete\"}"));
        assert!(settings.is_terminal_action("... task_reject ..."));
        assert!(!settings.is_terminal_action("{\"action\":\"continue\"}"));
    }

    #[test]
    fn stream_settings_rejects_empty_patterns() {
        assert!(StreamSettings::new(Duration::from_millis(100), Vec::new()).is_err());
        assert!(
            StreamSettings::new(Duration::from_millis(100), vec![" ".to_owned()]).is_err()
        );
        assert!(StreamSettings::new(Duration::ZERO, vec!["done".to_owned()]).is_err());
    }

    #[test]
    fn stream_settings_custom_patterns_replace_defaults() {
        let settings = StreamSettings::new(
            Duration::from_millis(50),
            vec!["halted".to_owned()],
        )
        .unwrap();
        assert!(settings.is_terminal_action("run halted early"));
        assert!(!settings.is_terminal_action("task_complete"));
    }

    #[test]
    fn session_settings_default_window_is_five_seconds() {
        let settings = SessionSettings::default();
        assert_eq!(settings.redirect_guard_window(), Duration::from_secs(5));
    }

    #[test]
    fn session_settings_rejects_zero_window() {
        assert!(SessionSettings::new(Duration::ZERO).is_err());
    }
}
