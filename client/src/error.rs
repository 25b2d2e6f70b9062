//! The client error taxonomy and response classification.
//!
//! Classification happens once, at the transport boundary: callers match on
//! [`ClientError`] variants instead of re-parsing status codes and bodies.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (DNS, TLS, connect, mid-body IO). Already retried.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Connection could not be established after exhausting retries.
    #[error("connection failed after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        source: reqwest::Error,
    },

    /// Definitive authentication failure. Callers clear their session.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: StatusCode, message: String },

    /// Any other non-2xx API response.
    #[error("API error {status}: {message}")]
    Api { status: StatusCode, message: String },

    /// The server refused the operation until the setup wizard completes.
    #[error("setup required before this operation")]
    SetupRequired,

    /// Client-side input rejected before any request was sent.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The reasoning stream terminated abnormally (oversized buffer,
    /// invalid UTF-8). Parse failures of individual records are NOT errors.
    #[error("reasoning stream error: {0}")]
    Stream(String),
}

impl ClientError {
    /// True for failures that definitively invalidate the current session.
    ///
    /// Network-shaped failures are transient and return false; the session
    /// machine downgrades to a fallback identity instead of logging out.
    #[must_use]
    pub fn is_definitive_auth_failure(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Pull a human-readable message out of a JSON error body.
///
/// Tries the common envelope shapes (`{"error":{"message":..}}`,
/// `{"message":..}`, a bare string) before falling back to the raw body.
#[must_use]
pub fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body.trim()).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

/// Heuristic: does this error text describe an authentication failure?
///
/// Matches the vocabulary the API (and proxies in front of it) actually emit;
/// an explicit 401 status is handled before this is consulted.
#[must_use]
pub fn is_auth_error(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    let mentions_credential = lower.contains("token")
        || lower.contains("authorization")
        || lower.contains("credential");
    let failure_words = lower.contains("invalid")
        || lower.contains("expired")
        || lower.contains("missing")
        || lower.contains("unauthorized");

    lower.contains("unauthorized") || (mentions_credential && failure_words)
}

/// Does this error body carry the setup-gate marker?
fn is_setup_required(body: &str) -> bool {
    let Ok(payload) = serde_json::from_str::<Value>(body.trim()) else {
        return false;
    };
    let code = payload
        .pointer("/error/code")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/code").and_then(Value::as_str));
    code == Some("setup_required")
}

/// Classify a non-2xx response into the taxonomy.
pub(crate) async fn classify_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = crate::read_capped_error_body(response).await;
    classify(status, &body)
}

pub(crate) fn classify(status: StatusCode, body: &str) -> ClientError {
    let message = extract_error_message(body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned()
        } else {
            trimmed.to_owned()
        }
    });

    if is_setup_required(body) {
        return ClientError::SetupRequired;
    }

    if status == StatusCode::UNAUTHORIZED || is_auth_error(&message) {
        return ClientError::Auth { status, message };
    }

    ClientError::Api { status, message }
}
