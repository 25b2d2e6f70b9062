//! Session identity and credential-injection inputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AuthToken;

/// The authenticated user's role as reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Member,
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown user role: {0:?}")]
pub struct RoleParseError(String);

impl UserRole {
    pub fn parse(value: &str) -> Result<Self, RoleParseError> {
        match value.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "member" | "user" => Ok(Self::Member),
            "guest" => Ok(Self::Guest),
            other => Err(RoleParseError(other.to_owned())),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Guest => "guest",
        }
    }
}

/// One reconciled authenticated identity.
///
/// Created by the session machine when a credential source succeeds; cleared
/// on explicit logout or a definitive auth failure. At most one exists per
/// session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
    pub token: AuthToken,
}

impl SessionIdentity {
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// A locally-synthesized identity for a token whose remote identity fetch
    /// failed non-definitively. Grants no permissions beyond holding the
    /// token; a later successful fetch replaces it.
    #[must_use]
    pub fn fallback(token: AuthToken) -> Self {
        Self {
            user_id: "local-fallback".to_owned(),
            role: UserRole::Guest,
            permissions: Vec::new(),
            token,
        }
    }

    /// True if this identity was synthesized locally rather than fetched.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.user_id == "local-fallback"
    }
}

/// Credentials injected by the mobile shell's native bridge.
///
/// The bridge writes a ready marker plus optional token and profile fields;
/// the session machine treats a ready injection with a token as a credential
/// source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeInjection {
    /// Set once the native layer has finished injecting.
    pub ready: bool,
    pub token: Option<AuthToken>,
    pub user_id: Option<String>,
    pub role: Option<UserRole>,
}

impl NativeInjection {
    /// The injected token, if the injection is complete and carries one.
    #[must_use]
    pub fn usable_token(&self) -> Option<&AuthToken> {
        if self.ready { self.token.as_ref() } else { None }
    }
}
