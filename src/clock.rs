//! Token expiry classification.
//!
//! Three pure classifiers over a token's `exp` claim and an injectable time
//! source. Malformed tokens classify as expired/invalid (fail safe).

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::claims;

/// Clock-skew buffer: a token inside this window is already treated as
/// expired, since the server would reject it anyway.
pub const EXPIRY_SKEW_SECS: u64 = 30;

/// Window for offering a proactive refresh. Never forces a logout.
pub const EXPIRING_SOON_WINDOW_SECS: u64 = 5 * 60;

/// Injectable time source (epoch seconds).
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_epoch(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Deserialize)]
struct ExpClaims {
    exp: u64,
}

/// Read the `exp` claim, if the token parses at all.
pub fn token_expiry(token: &str) -> Option<u64> {
    claims::read_claims::<ExpClaims>(token).ok().map(|c| c.exp)
}

/// True if the token is expired, with the 30-second skew buffer applied.
/// Malformed tokens are expired.
pub fn is_expired(token: &str, now: u64) -> bool {
    match token_expiry(token) {
        Some(exp) => exp < now + EXPIRY_SKEW_SECS,
        None => true,
    }
}

/// True if the token expires within the proactive-refresh window.
/// Malformed tokens report true so a refresh gets a chance to replace them.
pub fn is_expiring_soon(token: &str, now: u64) -> bool {
    match token_expiry(token) {
        Some(exp) => exp < now + EXPIRING_SOON_WINDOW_SECS,
        None => true,
    }
}

/// Strict validity check, no buffer. This is the "can this token still be
/// trusted for rendering" question, not the "should we send it" one.
pub fn is_valid(token: &str, now: u64) -> bool {
    match token_expiry(token) {
        Some(exp) => exp > now,
        None => false,
    }
}
