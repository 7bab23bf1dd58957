//! Authoritative in-memory session state.
//!
//! The store is the single source of truth for the current principal, token
//! pair, and impersonation snapshot. It is mutated only through the
//! transition methods below; an illegal transition is a silent no-op (logged
//! at debug), never a panic, so callers either check preconditions or accept
//! rejection.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::permissions::Principal;

/// The access/refresh token pair, owned exclusively by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Snapshot of the superadmin who entered alias mode. Exiting restores it
/// verbatim; it is never re-derived from a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Impersonation {
    pub original: Principal,
}

/// The session state machine. Exactly one variant is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    LoggedOut,
    /// A login call is in flight.
    Authenticating,
    Authenticated {
        /// The acting principal: the impersonated user while alias mode is
        /// active, the token's owner otherwise.
        principal: Principal,
        tokens: TokenPair,
        impersonation: Option<Impersonation>,
    },
    /// A refresh call is in flight.
    RefreshInProgress {
        tokens: TokenPair,
        /// The acting impersonated principal to restore if the refreshed
        /// token still belongs to a superadmin.
        resume_impersonation: Option<Principal>,
    },
    /// Access token expired; recovery depends on the refresh token.
    Expired { tokens: TokenPair },
}

impl SessionState {
    /// The acting principal, present only while authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated { principal, .. } => Some(principal),
            _ => None,
        }
    }

    /// The token pair, in any state that holds one.
    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            SessionState::Authenticated { tokens, .. }
            | SessionState::RefreshInProgress { tokens, .. }
            | SessionState::Expired { tokens } => Some(tokens),
            SessionState::LoggedOut | SessionState::Authenticating => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, SessionState::LoggedOut)
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    /// Principal-specific organizational-unit selection. Cleared on logout
    /// and on impersonation entry.
    selected_school: Option<String>,
}

/// Thread-safe owner of [`SessionState`]. Reads are cloned snapshots, so a
/// consumer never observes a half-applied transition.
#[derive(Debug)]
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::LoggedOut,
                selected_school: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// The acting principal, if authenticated.
    pub fn principal(&self) -> Option<Principal> {
        self.lock().state.principal().cloned()
    }

    /// The current token pair, if any state holds one.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.lock().state.tokens().cloned()
    }

    pub fn selected_school(&self) -> Option<String> {
        self.lock().selected_school.clone()
    }

    /// Record the organizational-unit selection. No-op unless authenticated.
    pub fn select_school(&self, school_id: impl Into<String>) {
        let mut inner = self.lock();
        if inner.state.is_authenticated() {
            inner.selected_school = Some(school_id.into());
        } else {
            debug!("select_school ignored outside an authenticated session");
        }
    }

    /// LoggedOut -> Authenticating. Returns false when rejected.
    pub fn begin_login(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            SessionState::LoggedOut => {
                inner.state = SessionState::Authenticating;
                true
            }
            _ => {
                debug!("begin_login ignored: session already active");
                false
            }
        }
    }

    /// Authenticating -> Authenticated.
    pub fn complete_login(&self, tokens: TokenPair, principal: Principal) -> bool {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Authenticating => {
                inner.state = SessionState::Authenticated {
                    principal,
                    tokens,
                    impersonation: None,
                };
                true
            }
            _ => {
                debug!("complete_login ignored: no login in progress");
                false
            }
        }
    }

    /// Authenticating -> LoggedOut.
    pub fn fail_login(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, SessionState::Authenticating) {
            inner.state = SessionState::LoggedOut;
        }
    }

    /// Authenticated -> Expired. Driven lazily by token clock checks, never
    /// by a timer firing the transition itself. Drops any active
    /// impersonation: an expired token ends alias mode.
    pub fn mark_expired(&self) -> bool {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::LoggedOut) {
            SessionState::Authenticated { tokens, .. } => {
                inner.state = SessionState::Expired { tokens };
                true
            }
            other => {
                inner.state = other;
                false
            }
        }
    }

    /// Authenticated | Expired -> RefreshInProgress. Returns the refresh
    /// token to send, or None when the transition is illegal.
    pub fn begin_refresh(&self) -> Option<String> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::LoggedOut) {
            SessionState::Authenticated {
                principal,
                tokens,
                impersonation,
            } => {
                let refresh_token = tokens.refresh_token.clone();
                inner.state = SessionState::RefreshInProgress {
                    tokens,
                    resume_impersonation: impersonation.map(|_| principal),
                };
                Some(refresh_token)
            }
            SessionState::Expired { tokens } => {
                let refresh_token = tokens.refresh_token.clone();
                inner.state = SessionState::RefreshInProgress {
                    tokens,
                    resume_impersonation: None,
                };
                Some(refresh_token)
            }
            other => {
                inner.state = other;
                debug!("begin_refresh ignored: no refreshable session");
                None
            }
        }
    }

    /// RefreshInProgress -> Authenticated with the re-decoded principal.
    ///
    /// The fresh principal is the token owner; server-side permission changes
    /// take effect here. An active impersonation is resumed only if the owner
    /// is still a superadmin.
    pub fn complete_refresh(&self, tokens: TokenPair, principal: Principal) -> bool {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::LoggedOut) {
            SessionState::RefreshInProgress {
                resume_impersonation,
                ..
            } => {
                inner.state = match resume_impersonation {
                    Some(acting) if principal.is_superadmin() => SessionState::Authenticated {
                        principal: acting,
                        tokens,
                        impersonation: Some(Impersonation {
                            original: principal,
                        }),
                    },
                    _ => SessionState::Authenticated {
                        principal,
                        tokens,
                        impersonation: None,
                    },
                };
                true
            }
            other => {
                inner.state = other;
                debug!("complete_refresh ignored: no refresh in progress");
                false
            }
        }
    }

    /// Any refresh-adjacent state -> LoggedOut. A refresh failure never
    /// leaves the session stuck in Expired.
    pub fn fail_refresh(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::LoggedOut;
        inner.selected_school = None;
    }

    /// Explicit logout. Clears tokens, impersonation, and scoping selections.
    pub fn logout(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::LoggedOut;
        inner.selected_school = None;
    }

    /// Enter alias mode. Legal only while authenticated as a superadmin with
    /// no impersonation already active. Clears the school selection, which is
    /// principal-specific.
    pub fn enable_impersonation(&self, target: Principal) -> bool {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::LoggedOut) {
            SessionState::Authenticated {
                principal,
                tokens,
                impersonation: None,
            } if principal.is_superadmin() => {
                inner.state = SessionState::Authenticated {
                    principal: target,
                    tokens,
                    impersonation: Some(Impersonation {
                        original: principal,
                    }),
                };
                inner.selected_school = None;
                true
            }
            other => {
                inner.state = other;
                debug!("enable_impersonation ignored: requires an idle superadmin session");
                false
            }
        }
    }

    /// Exit alias mode, restoring the stored superadmin snapshot verbatim.
    pub fn disable_impersonation(&self) -> bool {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::LoggedOut) {
            SessionState::Authenticated {
                tokens,
                impersonation: Some(impersonation),
                ..
            } => {
                inner.state = SessionState::Authenticated {
                    principal: impersonation.original,
                    tokens,
                    impersonation: None,
                };
                true
            }
            other => {
                inner.state = other;
                debug!("disable_impersonation ignored: no impersonation active");
                false
            }
        }
    }

    /// Seed the store from a validated persisted token pair. Legal only from
    /// LoggedOut; `principal` present means the access token is still live
    /// (Authenticated), absent means only the refresh token is (Expired).
    pub fn restore(&self, tokens: TokenPair, principal: Option<Principal>) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_logged_out() {
            debug!("restore ignored: session already active");
            return false;
        }
        inner.state = match principal {
            Some(principal) => SessionState::Authenticated {
                principal,
                tokens,
                impersonation: None,
            },
            None => SessionState::Expired { tokens },
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::{PermissionFlags, Role, TableGrant};

    fn tokens() -> TokenPair {
        TokenPair {
            access_token: "access".into(),
            refresh_token: "refresh".into(),
        }
    }

    fn principal(email: &str, superadmin: bool) -> Principal {
        let permissions = PermissionFlags {
            is_superadmin: superadmin,
            ..PermissionFlags::default()
        };
        Principal {
            id: email.to_string(),
            email: email.to_string(),
            name: email.to_string(),
            role: Role::from_flags(&permissions),
            permissions,
            table_access: vec![TableGrant::read_only("tanulo_letszam")],
            school_id: None,
            token_expiry: 0,
        }
    }

    fn authenticated(store: &SessionStore, superadmin: bool) -> Principal {
        let p = principal("eredeti@example.com", superadmin);
        assert!(store.begin_login());
        assert!(store.complete_login(tokens(), p.clone()));
        p
    }

    #[test]
    fn login_happy_path() {
        let store = SessionStore::new();
        assert!(store.state().is_logged_out());
        authenticated(&store, false);
        assert!(store.state().is_authenticated());
        assert_eq!(store.tokens(), Some(tokens()));
    }

    #[test]
    fn login_failure_returns_to_logged_out() {
        let store = SessionStore::new();
        assert!(store.begin_login());
        store.fail_login();
        assert!(store.state().is_logged_out());
    }

    #[test]
    fn double_login_is_rejected() {
        let store = SessionStore::new();
        authenticated(&store, false);
        assert!(!store.begin_login());
        assert!(store.state().is_authenticated());
    }

    #[test]
    fn refresh_cycle_replaces_principal() {
        let store = SessionStore::new();
        authenticated(&store, false);
        assert!(store.mark_expired());

        let refresh_token = store.begin_refresh().unwrap();
        assert_eq!(refresh_token, "refresh");

        let renewed = principal("megujult@example.com", false);
        let new_tokens = TokenPair {
            access_token: "access2".into(),
            refresh_token: "refresh2".into(),
        };
        assert!(store.complete_refresh(new_tokens.clone(), renewed.clone()));
        assert_eq!(store.principal(), Some(renewed));
        assert_eq!(store.tokens(), Some(new_tokens));
    }

    #[test]
    fn refresh_failure_always_logs_out() {
        let store = SessionStore::new();
        authenticated(&store, false);
        store.mark_expired();
        store.begin_refresh().unwrap();
        store.fail_refresh();
        assert!(store.state().is_logged_out());
        assert_eq!(store.tokens(), None);
    }

    #[test]
    fn refresh_while_logged_out_is_a_noop() {
        let store = SessionStore::new();
        assert_eq!(store.begin_refresh(), None);
        assert!(store.state().is_logged_out());
    }

    #[test]
    fn impersonation_restores_original_verbatim() {
        let store = SessionStore::new();
        let original = authenticated(&store, true);
        let target = principal("alias@example.com", false);

        assert!(store.enable_impersonation(target.clone()));
        assert_eq!(store.principal(), Some(target));

        // Mutation attempts during impersonation must not leak into the
        // restored snapshot.
        store.select_school("OM-999999");

        assert!(store.disable_impersonation());
        assert_eq!(store.principal(), Some(original));
    }

    #[test]
    fn impersonation_requires_superadmin() {
        let store = SessionStore::new();
        authenticated(&store, false);
        assert!(!store.enable_impersonation(principal("alias@example.com", false)));
    }

    #[test]
    fn impersonation_does_not_nest() {
        let store = SessionStore::new();
        authenticated(&store, true);
        assert!(store.enable_impersonation(principal("egy@example.com", false)));
        assert!(!store.enable_impersonation(principal("ketto@example.com", false)));
    }

    #[test]
    fn entering_impersonation_clears_school_selection() {
        let store = SessionStore::new();
        authenticated(&store, true);
        store.select_school("OM-111111");
        assert_eq!(store.selected_school().as_deref(), Some("OM-111111"));

        store.enable_impersonation(principal("alias@example.com", false));
        assert_eq!(store.selected_school(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let store = SessionStore::new();
        authenticated(&store, true);
        store.select_school("OM-111111");
        store.enable_impersonation(principal("alias@example.com", false));

        store.logout();
        assert!(store.state().is_logged_out());
        assert_eq!(store.tokens(), None);
        assert_eq!(store.selected_school(), None);
    }

    #[test]
    fn refresh_resumes_impersonation_while_owner_stays_superadmin() {
        let store = SessionStore::new();
        authenticated(&store, true);
        let target = principal("alias@example.com", false);
        store.enable_impersonation(target.clone());

        store.begin_refresh().unwrap();
        store.complete_refresh(tokens(), principal("eredeti@example.com", true));

        assert_eq!(store.principal(), Some(target));
        match store.state() {
            SessionState::Authenticated { impersonation, .. } => {
                assert!(impersonation.is_some());
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn refresh_drops_impersonation_when_owner_loses_superadmin() {
        let store = SessionStore::new();
        authenticated(&store, true);
        store.enable_impersonation(principal("alias@example.com", false));

        store.begin_refresh().unwrap();
        let demoted = principal("eredeti@example.com", false);
        store.complete_refresh(tokens(), demoted.clone());

        assert_eq!(store.principal(), Some(demoted));
    }

    #[test]
    fn restore_seeds_only_a_logged_out_store() {
        let store = SessionStore::new();
        assert!(store.restore(tokens(), None));
        assert!(matches!(store.state(), SessionState::Expired { .. }));
        assert!(!store.restore(tokens(), Some(principal("x@example.com", false))));
    }
}
