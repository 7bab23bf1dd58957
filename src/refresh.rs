//! Refresh coordination: single-flight, cooldowns, and session transitions.
//!
//! All three network calls (login, refresh, logout) funnel through the
//! coordinator; they are the only suspension points in the crate. Refresh is
//! guarded twice: a synchronous check-and-set flight flag guarantees at most
//! one outstanding call, and a per-trigger cooldown keeps retries from
//! storming the backend. Both gates fail fast with distinguishable errors so
//! callers can back off without treating them as user-facing failures.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::claims::{self, DecodeError};
use crate::clock::{Clock, SystemClock};
use crate::permissions::Principal;
use crate::session::{SessionCache, SessionStore, TokenPair};
use crate::transport::{AuthBackend, LoginRequest, RefreshRequest, TransportError};

/// What prompted a refresh attempt. Every attempt has exactly one trigger,
/// and all four go through the same single-flight + cooldown gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// Explicit user action.
    Manual,
    /// A route change found an expired access token.
    RouteChange,
    /// Periodic sweep noticed the token expiring soon.
    ProactiveSweep,
    /// Longer-interval sweep re-checking expired state.
    SafetySweep,
}

impl RefreshTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Manual => "manual",
            RefreshTrigger::RouteChange => "route_change",
            RefreshTrigger::ProactiveSweep => "proactive_sweep",
            RefreshTrigger::SafetySweep => "safety_sweep",
        }
    }
}

/// Cooldown and timeout knobs. Interactive attempts get short timeouts;
/// background sweeps get long cooldowns.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub manual_cooldown: Duration,
    pub route_cooldown: Duration,
    pub proactive_cooldown: Duration,
    pub safety_cooldown: Duration,
    pub manual_timeout: Duration,
    pub background_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            manual_cooldown: Duration::from_secs(2),
            route_cooldown: Duration::from_secs(30),
            proactive_cooldown: Duration::from_secs(120),
            safety_cooldown: Duration::from_secs(300),
            manual_timeout: Duration::from_secs(5),
            background_timeout: Duration::from_secs(15),
        }
    }
}

impl RefreshConfig {
    fn cooldown(&self, trigger: RefreshTrigger) -> Duration {
        match trigger {
            RefreshTrigger::Manual => self.manual_cooldown,
            RefreshTrigger::RouteChange => self.route_cooldown,
            RefreshTrigger::ProactiveSweep => self.proactive_cooldown,
            RefreshTrigger::SafetySweep => self.safety_cooldown,
        }
    }

    fn timeout(&self, trigger: RefreshTrigger) -> Duration {
        match trigger {
            RefreshTrigger::Manual => self.manual_timeout,
            _ => self.background_timeout,
        }
    }
}

/// Errors from a refresh attempt.
#[derive(Debug)]
pub enum RefreshError {
    /// Another refresh is already outstanding. Back off, do not retry now.
    InFlight,
    /// The trigger's quiet period has not elapsed.
    Cooldown { remaining_secs: u64 },
    /// No session (or no refresh token) to refresh.
    NotAuthenticated,
    /// The attempt exceeded its deadline. Treated as a failure.
    Timeout,
    /// Connection-level failure.
    Transport(TransportError),
    /// The server rejected the refresh token.
    Rejected(u16),
    /// 2xx response violating the wire contract.
    Protocol(&'static str),
    /// The new access token could not be decoded.
    Decode(DecodeError),
}

impl RefreshError {
    /// Fail-fast gate rejections: recoverable, never surfaced to the user as
    /// failures, and they leave the session state untouched.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, RefreshError::InFlight | RefreshError::Cooldown { .. })
    }
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::InFlight => write!(f, "Refresh already in progress"),
            RefreshError::Cooldown { remaining_secs } => {
                write!(f, "Refresh cooldown active ({}s remaining)", remaining_secs)
            }
            RefreshError::NotAuthenticated => write!(f, "No session to refresh"),
            RefreshError::Timeout => write!(f, "Refresh request timed out"),
            RefreshError::Transport(e) => write!(f, "Refresh transport failure: {}", e),
            RefreshError::Rejected(code) => write!(f, "Refresh rejected with status {}", code),
            RefreshError::Protocol(msg) => write!(f, "Refresh protocol violation: {}", msg),
            RefreshError::Decode(e) => write!(f, "Refreshed token unreadable: {}", e),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors from a login attempt.
#[derive(Debug)]
pub enum LoginError {
    /// A session is already active or being established.
    SessionActive,
    Timeout,
    Transport(TransportError),
    /// Non-2xx from the login endpoint (bad credentials and friends).
    Rejected(u16),
    Decode(DecodeError),
}

impl std::fmt::Display for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginError::SessionActive => write!(f, "A session is already active"),
            LoginError::Timeout => write!(f, "Login request timed out"),
            LoginError::Transport(e) => write!(f, "Login transport failure: {}", e),
            LoginError::Rejected(code) => write!(f, "Login rejected with status {}", code),
            LoginError::Decode(e) => write!(f, "Login token unreadable: {}", e),
        }
    }
}

impl std::error::Error for LoginError {}

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    /// Epoch seconds of the last attempt that passed the gate.
    last_attempt: Option<u64>,
}

/// Releases the flight flag on every exit path, including timeouts.
struct FlightGuard<'a> {
    flight: &'a Mutex<FlightState>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight = false;
    }
}

/// Orchestrates the auth endpoints and applies the results to the store.
pub struct RefreshCoordinator<B: AuthBackend> {
    store: Arc<SessionStore>,
    backend: B,
    clock: Arc<dyn Clock>,
    config: RefreshConfig,
    cache: Option<SessionCache>,
    flight: Mutex<FlightState>,
}

impl<B: AuthBackend> RefreshCoordinator<B> {
    pub fn new(store: Arc<SessionStore>, backend: B) -> Self {
        Self {
            store,
            backend,
            clock: Arc::new(SystemClock),
            config: RefreshConfig::default(),
            cache: None,
            flight: Mutex::new(FlightState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: SessionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    fn lock_flight(&self) -> std::sync::MutexGuard<'_, FlightState> {
        self.flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, tokens: &TokenPair) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.save(tokens) {
                warn!(error = %e, "Failed to persist session cache");
            }
        }
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Attempt a token refresh.
    ///
    /// At most one refresh is outstanding at any instant; the flag is checked
    /// and set under one lock on entry, so there is no window between check
    /// and set. Gate rejections ([`RefreshError::is_fail_fast`]) leave the
    /// session untouched. Any real attempt ends in `Authenticated` on
    /// success or `LoggedOut` on failure, never a stuck `Expired`.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<TokenPair, RefreshError> {
        let now = self.clock.now_epoch();
        let refresh_token = {
            let mut flight = self.lock_flight();
            if flight.in_flight {
                return Err(RefreshError::InFlight);
            }
            if let Some(last) = flight.last_attempt {
                let quiet = self.config.cooldown(trigger).as_secs();
                if now < last + quiet {
                    return Err(RefreshError::Cooldown {
                        remaining_secs: last + quiet - now,
                    });
                }
            }
            // Gate passed; take the store into RefreshInProgress before
            // releasing the lock so no second caller can slip through.
            let Some(refresh_token) = self.store.begin_refresh() else {
                return Err(RefreshError::NotAuthenticated);
            };
            flight.in_flight = true;
            flight.last_attempt = Some(now);
            refresh_token
        };
        let _guard = FlightGuard {
            flight: &self.flight,
        };

        let request = RefreshRequest {
            refresh_token: refresh_token.clone(),
        };
        let deadline = self.config.timeout(trigger);
        let result = match timeout(deadline, self.backend.refresh(&request)).await {
            Err(_) => Err(RefreshError::Timeout),
            Ok(Err(TransportError::Status(code))) => Err(RefreshError::Rejected(code)),
            Ok(Err(e)) => Err(RefreshError::Transport(e)),
            Ok(Ok(response)) => {
                let access_token = response
                    .access_token
                    .ok_or(RefreshError::Protocol("response missing accessToken"));
                access_token.and_then(|access_token| {
                    let principal =
                        claims::decode(&access_token).map_err(RefreshError::Decode)?;
                    let tokens = TokenPair {
                        access_token,
                        // Rotation is optional; keep the old refresh token
                        // when the server does not send a new one.
                        refresh_token: response.refresh_token.unwrap_or(refresh_token),
                    };
                    self.store.complete_refresh(tokens.clone(), principal);
                    self.persist(&tokens);
                    Ok(tokens)
                })
            }
        };

        match &result {
            Ok(_) => info!(trigger = trigger.as_str(), "Session tokens refreshed"),
            Err(e) => {
                warn!(trigger = trigger.as_str(), error = %e, "Refresh failed, logging out");
                self.store.fail_refresh();
                self.clear_cache();
            }
        }
        result
    }

    /// Authenticate against the login endpoint and establish the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<Principal, LoginError> {
        if !self.store.begin_login() {
            return Err(LoginError::SessionActive);
        }

        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = match timeout(self.config.manual_timeout, self.backend.login(&request)).await
        {
            Err(_) => Err(LoginError::Timeout),
            Ok(Err(TransportError::Status(code))) => Err(LoginError::Rejected(code)),
            Ok(Err(e)) => Err(LoginError::Transport(e)),
            Ok(Ok(response)) => claims::decode(&response.access_token)
                .map_err(LoginError::Decode)
                .map(|principal| {
                    let tokens = TokenPair {
                        access_token: response.access_token,
                        refresh_token: response.refresh_token,
                    };
                    self.store.complete_login(tokens.clone(), principal.clone());
                    self.persist(&tokens);
                    principal
                }),
        };

        match &result {
            Ok(principal) => info!(email = %principal.email, role = %principal.role, "Logged in"),
            Err(e) => {
                debug!(error = %e, "Login failed");
                self.store.fail_login();
            }
        }
        result
    }

    /// Log out. Local state and the cache are cleared first and always
    /// succeed; the revocation request afterwards is best effort.
    pub async fn logout(&self) {
        let tokens = self.store.tokens();
        self.store.logout();
        self.clear_cache();

        if let Some(tokens) = tokens {
            if let Err(e) = self.backend.logout(&tokens.access_token).await {
                warn!(error = %e, "Logout request failed; local session already cleared");
            }
        }
    }

    /// Seed the store from the persisted cache, if its tokens still hold up.
    ///
    /// Validate-then-trust: a live access token restores `Authenticated`, a
    /// dead access token with a live refresh token restores `Expired` (ready
    /// for refresh), anything else clears the cache and leaves the store
    /// logged out. Returns true when a session was restored.
    pub fn restore_from_cache(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let Some(tokens) = cache.load() else {
            return false;
        };

        let now = self.clock.now_epoch();
        if crate::clock::is_valid(&tokens.access_token, now) {
            match claims::decode(&tokens.access_token) {
                Ok(principal) => {
                    debug!(email = %principal.email, "Restored session from cache");
                    return self.store.restore(tokens, Some(principal));
                }
                Err(e) => {
                    warn!(error = %e, "Cached access token unreadable, discarding");
                    cache.clear();
                    return false;
                }
            }
        }
        if crate::clock::is_valid(&tokens.refresh_token, now) {
            debug!("Cached access token expired; restoring as recoverable");
            return self.store.restore(tokens, None);
        }
        debug!("Cached tokens fully expired, discarding");
        cache.clear();
        false
    }
}
