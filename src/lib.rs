//! gatewarden - session lifecycle and permission gate for the admin dashboard
//!
//! This crate owns the client side of the dashboard's auth story:
//! - Claims decoding: signed access tokens become a typed [`permissions::Principal`]
//! - Token clock: pure expired / expiring-soon / valid classification with a
//!   clock-skew buffer
//! - Permission resolution: role + table grants + static route table mapped
//!   to an allow/deny decision, with a superadmin impersonation mode
//! - Session store: an explicit state machine owning the token pair; all
//!   mutation goes through its transitions
//! - Refresh coordination: single-flight, per-trigger cooldowns, and a
//!   guaranteed Authenticated-or-LoggedOut outcome
//! - Access guard: route-change gating, login redirects, and periodic
//!   refresh sweeps
//!
//! The HTTP transport is behind the [`transport::AuthBackend`] trait; the
//! bundled [`transport::HttpAuthBackend`] talks to the REST backend, and
//! tests substitute in-memory fakes.

pub mod claims;
pub mod cli;
pub mod clock;
pub mod guard;
pub mod permissions;
pub mod refresh;
pub mod session;
pub mod transport;

pub use claims::DecodeError;
pub use guard::{AccessGuard, LoginRedirectReason, Navigation};
pub use permissions::{Access, DenyReason, PermissionResolver, Principal, RouteTable};
pub use refresh::{LoginError, RefreshConfig, RefreshCoordinator, RefreshError, RefreshTrigger};
pub use session::{SessionState, SessionStore, TokenPair};
