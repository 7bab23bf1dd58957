#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gatewarden::claims;
use gatewarden::permissions::{PermissionFlags, TableGrant};
use gatewarden::session::{SessionStore, TokenPair};
use gatewarden::transport::{
    AuthBackend, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, TransportError,
};
use jsonwebtoken::{EncodingKey, Header};

pub const SECRET: &[u8] = b"test-jwt-secret";

/// Reference "now" used by tests driving a ManualClock.
pub const NOW: u64 = 1_700_000_000;

pub fn standard_flags() -> PermissionFlags {
    PermissionFlags {
        is_standard: true,
        ..PermissionFlags::default()
    }
}

pub fn superadmin_flags() -> PermissionFlags {
    PermissionFlags {
        is_superadmin: true,
        ..PermissionFlags::default()
    }
}

/// Mint an access token with full dashboard claims.
pub fn mint_access_token(
    email: &str,
    flags: PermissionFlags,
    grants: &[TableGrant],
    exp: u64,
) -> String {
    let claims = serde_json::json!({
        "exp": exp,
        "iat": exp.saturating_sub(300),
        "id": "42",
        "email": email,
        "name": "Teszt Elek",
        "permissions": flags,
        "tableAccess": grants,
    });
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

/// Mint a refresh token; only its `exp` matters to the client.
pub fn mint_refresh_token(exp: u64) -> String {
    let claims = serde_json::json!({ "exp": exp, "iat": exp.saturating_sub(3600) });
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

/// Seed a store with an authenticated session built from freshly minted
/// tokens.
pub fn seed_session(
    store: &SessionStore,
    email: &str,
    flags: PermissionFlags,
    grants: &[TableGrant],
    access_exp: u64,
    refresh_exp: u64,
) -> TokenPair {
    let tokens = TokenPair {
        access_token: mint_access_token(email, flags, grants, access_exp),
        refresh_token: mint_refresh_token(refresh_exp),
    };
    let principal = claims::decode(&tokens.access_token).unwrap();
    assert!(store.restore(tokens.clone(), Some(principal)));
    tokens
}

/// Scripted refresh endpoint behavior.
#[derive(Debug, Clone)]
pub enum FakeRefresh {
    Succeed {
        access_token: String,
        refresh_token: Option<String>,
    },
    Reject(u16),
    /// 2xx with a body missing the access token.
    MissingAccessToken,
    NetworkDown,
    /// Never answers within any test deadline.
    Hang,
}

/// Scripted login endpoint behavior.
#[derive(Debug, Clone)]
pub enum FakeLogin {
    Succeed {
        access_token: String,
        refresh_token: String,
    },
    Reject(u16),
}

/// In-memory backend with scripted responses and call counters.
pub struct FakeBackend {
    pub refresh_behavior: Mutex<FakeRefresh>,
    pub login_behavior: Mutex<FakeLogin>,
    pub refresh_calls: AtomicUsize,
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Delay before the refresh endpoint answers, to hold the single-flight
    /// window open.
    pub refresh_delay: Duration,
}

impl FakeBackend {
    pub fn new(refresh: FakeRefresh) -> Self {
        Self {
            refresh_behavior: Mutex::new(refresh),
            login_behavior: Mutex::new(FakeLogin::Reject(401)),
            refresh_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
        }
    }

    pub fn with_login(login: FakeLogin) -> Self {
        let backend = Self::new(FakeRefresh::Reject(401));
        *backend.login_behavior.lock().unwrap() = login;
        backend
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn set_refresh(&self, behavior: FakeRefresh) {
        *self.refresh_behavior.lock().unwrap() = behavior;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

impl AuthBackend for FakeBackend {
    async fn login(&self, _request: &LoginRequest) -> Result<LoginResponse, TransportError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.login_behavior.lock().unwrap().clone();
        match behavior {
            FakeLogin::Succeed {
                access_token,
                refresh_token,
            } => Ok(LoginResponse {
                access_token,
                refresh_token,
                id: "42".into(),
                email: "teszt@example.com".into(),
                name: "Teszt Elek".into(),
            }),
            FakeLogin::Reject(code) => Err(TransportError::Status(code)),
        }
    }

    async fn refresh(&self, _request: &RefreshRequest) -> Result<RefreshResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.refresh_behavior.lock().unwrap().clone();
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match behavior {
            FakeRefresh::Succeed {
                access_token,
                refresh_token,
            } => Ok(RefreshResponse {
                access_token: Some(access_token),
                refresh_token,
            }),
            FakeRefresh::Reject(code) => Err(TransportError::Status(code)),
            FakeRefresh::MissingAccessToken => Ok(RefreshResponse::default()),
            FakeRefresh::NetworkDown => {
                Err(TransportError::Network("connection refused".to_string()))
            }
            FakeRefresh::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(TransportError::Network("unreachable".to_string()))
            }
        }
    }

    async fn logout(&self, _access_token: &str) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
