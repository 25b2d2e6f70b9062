//! HTTP client for the Lumen assistant API.
//!
//! # Architecture
//!
//! [`ApiClient`] owns the transport (a hardened reqwest client, the resolved
//! [`ApiSettings`], and an optional bearer token) and hands out thin typed
//! resource views:
//!
//! | Resource | Endpoints |
//! |----------|-----------|
//! | [`AuthApi`] | login, logout, current user |
//! | [`DsarApi`] | DSAR submit, status, list, update |
//! | [`BillingApi`] | credit status |
//! | [`SetupApi`] | setup status, providers, templates, validate, complete |
//! | [`AgentApi`] | agent identity, history, message submit |
//!
//! The reasoning stream (`GET /v1/system/runtime/reasoning-stream`) is a
//! long-lived SSE feed consumed by [`ApiClient::stream_reasoning`]; see the
//! [`stream`] module.
//!
//! # Error Handling
//!
//! Every operation returns [`ClientError`]. Non-2xx responses are classified
//! at the transport boundary: 401/auth-shaped bodies become
//! [`ClientError::Auth`] (definitive - callers clear their session),
//! setup-gate bodies become [`ClientError::SetupRequired`], everything else
//! [`ClientError::Api`] with a capped error body. Transport failures are
//! retried per [`retry`] before surfacing as [`ClientError::Network`] or
//! [`ClientError::Connection`].

pub mod agent;
pub mod auth;
pub mod billing;
pub mod dsar;
pub mod error;
pub mod retry;
pub mod setup;
pub mod stream;

pub use agent::AgentApi;
pub use auth::AuthApi;
pub use billing::BillingApi;
pub use dsar::DsarApi;
pub use error::ClientError;
pub use setup::SetupApi;
pub use stream::{ReasoningStreamHandle, spawn_reasoning_stream};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use lumen_types::{ApiSettings, AuthToken};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 8;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

fn base_client_builder(settings: &ApiSettings) -> reqwest::ClientBuilder {
    let mut default_headers = HeaderMap::new();
    default_headers.insert("X-Lumen-Lang", HeaderValue::from_static("rust"));
    default_headers.insert(
        "X-Lumen-OS",
        HeaderValue::from_static(std::env::consts::OS),
    );
    default_headers.insert(
        "X-Lumen-Arch",
        HeaderValue::from_static(std::env::consts::ARCH),
    );

    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        // Plain http is only reachable for loopback-style endpoints; the
        // settings type has already vetted the scheme.
        .https_only(settings.requires_tls())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .default_headers(default_headers)
}

/// Read an error response body, truncating oversized payloads.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// The authenticated transport plus resource accessors.
///
/// Cloning is cheap (the underlying reqwest client is reference-counted) and
/// is how long-lived tasks such as the stream reader take ownership.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    settings: ApiSettings,
    token: Option<AuthToken>,
    retry_config: retry::RetryConfig,
}

impl ApiClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ClientError> {
        // No client-wide timeout: it would also bound the lifetime of the
        // reasoning stream, which stays open indefinitely. Unary requests get
        // the configured timeout per request instead.
        let http = base_client_builder(&settings).build()?;
        Ok(Self {
            http,
            settings,
            token: None,
            retry_config: retry::RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: AuthToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn set_token(&mut self, token: Option<AuthToken>) {
        self.token = token;
    }

    #[must_use]
    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Resolve an API path against the configured base URL.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.settings
            .base_url()
            .join(path)
            .map_err(|e| ClientError::Validation(format!("invalid endpoint path {path:?}: {e}")))
    }

    /// A bearer-authenticated request with no overall timeout (stream use).
    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// A bearer-authenticated request bounded by the configured timeout.
    pub(crate) fn unary(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.request(method, url)
            .timeout(self.settings.request_timeout())
    }

    /// Send a request with retries, classifying any non-2xx response.
    pub(crate) async fn send<F>(&self, build_request: F) -> Result<reqwest::Response, ClientError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let outcome = retry::send_with_retry(build_request, &self.retry_config).await;
        let response = match outcome {
            retry::RetryOutcome::Success(resp) | retry::RetryOutcome::HttpError(resp) => resp,
            retry::RetryOutcome::ConnectionError { attempts, source } => {
                return Err(ClientError::Connection { attempts, source });
            }
            retry::RetryOutcome::NonRetryable(source) => {
                return Err(ClientError::Network(source));
            }
        };

        if !response.status().is_success() {
            return Err(error::classify_response(response).await);
        }

        Ok(response)
    }

    pub(crate) async fn get_json<T>(&self, path: &str) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .send(|| self.unary(reqwest::Method::GET, url.clone()))
            .await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .send(|| self.unary(reqwest::Method::POST, url.clone()).json(body))
            .await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let response = self
            .send(|| self.unary(reqwest::Method::PATCH, url.clone()).json(body))
            .await?;
        Ok(response.json().await?)
    }

    #[must_use]
    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    #[must_use]
    pub fn dsar(&self) -> DsarApi<'_> {
        DsarApi::new(self)
    }

    #[must_use]
    pub fn billing(&self) -> BillingApi<'_> {
        BillingApi::new(self)
    }

    #[must_use]
    pub fn setup(&self) -> SetupApi<'_> {
        SetupApi::new(self)
    }

    #[must_use]
    pub fn agents(&self) -> AgentApi<'_> {
        AgentApi::new(self)
    }
}
