//! Core domain types for Lumen.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod event;
mod identity;
mod ids;
mod settings;
mod stage;
mod tasks;

pub use event::{RawStreamRecord, StageEvent, StageEventParseError};
pub use identity::{NativeInjection, RoleParseError, SessionIdentity, UserRole};
pub use ids::{AgentId, InteractionId, TaskId, ThoughtId, TicketId};
pub use settings::{
    ApiSettings, ApiSettingsError, DEFAULT_BATCH_DEBOUNCE_MS, DEFAULT_REDIRECT_GUARD_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, SessionSettings, SessionSettingsError, StreamSettings,
    StreamSettingsError,
};
pub use stage::Stage;
pub use tasks::{TaskSnapshot, TrackedTask, TrackedThought};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bearer token for the Lumen API.
///
/// Debug output is redacted so tokens never leak into logs or panic messages.
/// Use [`AuthToken::expose_secret`] at the single point where the raw value is
/// attached to an outgoing request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthToken(String);

#[derive(Debug, Error)]
#[error("auth token must not be empty")]
pub struct EmptyTokenError;

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyTokenError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyTokenError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthToken(<redacted>)")
    }
}

impl TryFrom<String> for AuthToken {
    type Error = EmptyTokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AuthToken> for String {
    fn from(value: AuthToken) -> Self {
        value.0
    }
}
