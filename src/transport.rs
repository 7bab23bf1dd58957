//! Wire contract for the auth endpoints, and the HTTP implementation.
//!
//! The coordinator talks to the backend only through [`AuthBackend`], so
//! tests substitute an in-memory fake and the HTTP details stay here.

use std::future::Future;

use serde::{Deserialize, Serialize};
use url::Url;

/// Credentials posted to the login endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful login payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Refresh payload. `access_token` is optional at the wire level so a 2xx
/// body without it can be rejected as a protocol violation by the
/// coordinator instead of a parse error here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Transport-level failures.
#[derive(Debug)]
pub enum TransportError {
    /// Connection-level failure (DNS, refused connection, TLS, bad body).
    Network(String),
    /// The server answered with a non-2xx status.
    Status(u16),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Network(msg) => write!(f, "Network error: {}", msg),
            TransportError::Status(code) => write!(f, "Server returned status {}", code),
        }
    }
}

impl std::error::Error for TransportError {}

/// The three auth endpoints, as seen by the coordinator.
pub trait AuthBackend: Send + Sync {
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, TransportError>> + Send;

    fn refresh(
        &self,
        request: &RefreshRequest,
    ) -> impl Future<Output = Result<RefreshResponse, TransportError>> + Send;

    /// Best-effort revocation with the current access token. Callers treat
    /// failures as non-blocking.
    fn logout(&self, access_token: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<B: AuthBackend> AuthBackend for std::sync::Arc<B> {
    fn login(
        &self,
        request: &LoginRequest,
    ) -> impl Future<Output = Result<LoginResponse, TransportError>> + Send {
        (**self).login(request)
    }

    fn refresh(
        &self,
        request: &RefreshRequest,
    ) -> impl Future<Output = Result<RefreshResponse, TransportError>> + Send {
        (**self).refresh(request)
    }

    fn logout(&self, access_token: &str) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).logout(access_token)
    }
}

/// reqwest-backed implementation against a dashboard backend base URL.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    client: reqwest::Client,
    login_url: Url,
    refresh_url: Url,
    logout_url: Url,
}

impl HttpAuthBackend {
    /// Build against a base URL; endpoint paths are `auth/login`,
    /// `auth/refresh`, and `auth/logout` under it.
    pub fn new(base: &Url) -> Result<Self, url::ParseError> {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(client: reqwest::Client, base: &Url) -> Result<Self, url::ParseError> {
        let base = if base.path().ends_with('/') {
            base.clone()
        } else {
            Url::parse(&format!("{}/", base))?
        };
        Ok(Self {
            client,
            login_url: base.join("auth/login")?,
            refresh_url: base.join("auth/refresh")?,
            logout_url: base.join("auth/logout")?,
        })
    }

    async fn post_json<T, R>(&self, url: &Url, body: &T) -> Result<R, TransportError>
    where
        T: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}

impl AuthBackend for HttpAuthBackend {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TransportError> {
        self.post_json(&self.login_url, request).await
    }

    async fn refresh(&self, request: &RefreshRequest) -> Result<RefreshResponse, TransportError> {
        self.post_json(&self.refresh_url, request).await
    }

    async fn logout(&self, access_token: &str) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.logout_url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }
}
