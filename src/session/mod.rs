//! Session state machine and its persisted cache.

mod persist;
mod store;

pub use persist::SessionCache;
pub use store::{Impersonation, SessionState, SessionStore, TokenPair};
