//! Authentication endpoints: login, logout, current user.

use serde::{Deserialize, Serialize};

use lumen_types::{AuthToken, UserRole};

use crate::{ApiClient, ClientError};

pub const LOGIN_PATH: &str = "/v1/auth/login";
pub const LOGOUT_PATH: &str = "/v1/auth/logout";
pub const CURRENT_USER_PATH: &str = "/v1/auth/me";

/// The identity document returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: AuthToken,
    pub user: UserProfile,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a bearer token and profile.
    ///
    /// Input is validated before any request goes out; the resulting token is
    /// NOT installed on the client - the session layer decides that.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ClientError::Validation(format!(
                "{email:?} is not a valid email address"
            )));
        }
        if password.is_empty() {
            return Err(ClientError::Validation(
                "password must not be empty".to_owned(),
            ));
        }

        self.client
            .post_json(LOGIN_PATH, &LoginBody { email, password })
            .await
    }

    /// Invalidate the current token server-side.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let url = self.client.endpoint(LOGOUT_PATH)?;
        self.client
            .send(|| self.client.unary(reqwest::Method::POST, url.clone()))
            .await?;
        Ok(())
    }

    /// Fetch the identity behind the installed token.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        self.client.get_json(CURRENT_USER_PATH).await
    }
}
