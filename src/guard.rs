//! Navigation gating over the session store and permission resolver.
//!
//! One guard, thin call sites. Every route change goes through
//! [`AccessGuard::navigate`], which re-runs the permission resolver even for
//! routes already on the advisory accessible-routes list; stale menus are
//! never a security boundary.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{self, Clock};
use crate::permissions::{Access, DenyReason, PermissionResolver};
use crate::refresh::{RefreshCoordinator, RefreshTrigger};
use crate::session::{SessionState, SessionStore};
use crate::transport::AuthBackend;

/// Safe default landing route for denied navigations.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Why the user is being sent to the login screen. Expired sessions render a
/// different message than plain unauthenticated visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRedirectReason {
    NotAuthenticated,
    SessionExpired,
}

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// Render the requested route.
    Render { route: String },
    /// A refresh is settling elsewhere; render a transient loading state and
    /// retry when it resolves.
    Pending { route: String },
    /// Send to login, keeping the attempted route for a post-login retry.
    RedirectToLogin {
        attempted_route: String,
        reason: LoginRedirectReason,
    },
    /// Send to the dashboard, with the denial reason for the banner and the
    /// denial log.
    RedirectToDashboard { reason: DenyReason },
}

/// Gates navigation using the session store and the permission resolver, and
/// triggers refreshes on route changes and periodic sweeps.
pub struct AccessGuard<B: AuthBackend> {
    store: Arc<SessionStore>,
    resolver: PermissionResolver,
    coordinator: Arc<RefreshCoordinator<B>>,
    clock: Arc<dyn Clock>,
    /// Last route whose expiry check ran; re-entering it does not re-trigger
    /// the check.
    last_checked_route: Mutex<Option<String>>,
}

impl<B: AuthBackend> AccessGuard<B> {
    pub fn new(
        store: Arc<SessionStore>,
        resolver: PermissionResolver,
        coordinator: Arc<RefreshCoordinator<B>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolver,
            coordinator,
            clock,
            last_checked_route: Mutex::new(None),
        }
    }

    /// True if the route differs from the last one checked; records it.
    fn note_route(&self, route: &str) -> bool {
        let mut last = self
            .last_checked_route
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(route) {
            false
        } else {
            *last = Some(route.to_string());
            true
        }
    }

    /// Gate a route change.
    pub async fn navigate(&self, route: &str) -> Navigation {
        let state = self.store.state();
        let tokens = match &state {
            SessionState::LoggedOut | SessionState::Authenticating => {
                return Navigation::RedirectToLogin {
                    attempted_route: route.to_string(),
                    reason: LoginRedirectReason::NotAuthenticated,
                };
            }
            SessionState::Authenticated { tokens, .. }
            | SessionState::RefreshInProgress { tokens, .. }
            | SessionState::Expired { tokens } => tokens.clone(),
        };

        let now = self.clock.now_epoch();
        if self.note_route(route) && clock::is_expired(&tokens.access_token, now) {
            if !clock::is_valid(&tokens.refresh_token, now) {
                debug!(route, "Session expired with no usable refresh token");
                self.coordinator.logout().await;
                return Navigation::RedirectToLogin {
                    attempted_route: route.to_string(),
                    reason: LoginRedirectReason::SessionExpired,
                };
            }

            self.store.mark_expired();
            match self.coordinator.refresh(RefreshTrigger::RouteChange).await {
                Ok(_) => {}
                Err(e) if e.is_fail_fast() => {
                    debug!(route, error = %e, "Refresh gate closed, continuing with current state");
                }
                Err(e) => {
                    warn!(route, error = %e, "Route-triggered refresh failed");
                    return Navigation::RedirectToLogin {
                        attempted_route: route.to_string(),
                        reason: LoginRedirectReason::SessionExpired,
                    };
                }
            }
        }

        // Resolve against the (possibly refreshed) acting principal.
        let Some(principal) = self.store.principal() else {
            // A refresh is settling elsewhere (in-flight gate) or the session
            // lapsed between the snapshot and here.
            return match self.store.state() {
                SessionState::RefreshInProgress { .. } => Navigation::Pending {
                    route: route.to_string(),
                },
                _ => Navigation::RedirectToLogin {
                    attempted_route: route.to_string(),
                    reason: LoginRedirectReason::SessionExpired,
                },
            };
        };

        match self.resolver.resolve(&principal, route) {
            Access::Allow => Navigation::Render {
                route: route.to_string(),
            },
            Access::Deny(reason) => Navigation::RedirectToDashboard { reason },
        }
    }

    /// Routes the acting principal may reach. Advisory, for menu rendering;
    /// [`navigate`](Self::navigate) re-resolves on every attempt.
    pub fn accessible_routes(&self) -> Vec<String> {
        match self.store.principal() {
            Some(principal) => self
                .resolver
                .accessible_routes(&principal)
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Refresh ahead of expiry when the access token is expiring soon.
    pub async fn proactive_sweep(&self) {
        let Some(tokens) = self.store.tokens() else {
            return;
        };
        let now = self.clock.now_epoch();
        if !self.store.state().is_authenticated()
            || !clock::is_expiring_soon(&tokens.access_token, now)
        {
            return;
        }
        match self.coordinator.refresh(RefreshTrigger::ProactiveSweep).await {
            Ok(_) => {}
            Err(e) if e.is_fail_fast() => debug!(error = %e, "Proactive refresh skipped"),
            Err(e) => warn!(error = %e, "Proactive refresh failed"),
        }
    }

    /// Longer-interval re-check for sessions stuck with an expired token.
    pub async fn safety_sweep(&self) {
        let Some(tokens) = self.store.tokens() else {
            return;
        };
        let now = self.clock.now_epoch();
        if !clock::is_expired(&tokens.access_token, now) {
            return;
        }
        if !clock::is_valid(&tokens.refresh_token, now) {
            debug!("Safety sweep found a dead refresh token, logging out");
            self.coordinator.logout().await;
            return;
        }
        self.store.mark_expired();
        match self.coordinator.refresh(RefreshTrigger::SafetySweep).await {
            Ok(_) => {}
            Err(e) if e.is_fail_fast() => debug!(error = %e, "Safety refresh skipped"),
            Err(e) => warn!(error = %e, "Safety refresh failed"),
        }
    }

    /// Spawn a background task running both sweeps on their intervals.
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeps(
        self: &Arc<Self>,
        proactive_every: Duration,
        safety_every: Duration,
    ) -> tokio::task::JoinHandle<()>
    where
        B: 'static,
    {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let mut proactive = tokio::time::interval(proactive_every);
            let mut safety = tokio::time::interval(safety_every);
            // Skip the immediate first ticks.
            proactive.tick().await;
            safety.tick().await;

            loop {
                tokio::select! {
                    _ = proactive.tick() => guard.proactive_sweep().await,
                    _ = safety.tick() => guard.safety_sweep().await,
                }
            }
        })
    }
}
