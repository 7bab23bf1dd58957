//! Persisted session cache for page-reload survival.
//!
//! The cache is a copy of the store's token pair, not a second source of
//! truth: `load` hands back the raw pair and the coordinator re-validates it
//! through the token clock and claims codec before trusting it. No other
//! component reads this file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::store::TokenPair;

/// Fixed cache namespace.
const CACHE_FILE_NAME: &str = "gatewarden-session.json";

#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    tokens: TokenPair,
}

/// File-backed token cache under a fixed name in the given directory.
#[derive(Debug)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the token pair. The parent directory is created if missing.
    pub fn save(&self, tokens: &TokenPair) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let cached = CachedSession {
            tokens: tokens.clone(),
        };
        let body = serde_json::to_vec_pretty(&cached).map_err(io::Error::other)?;
        fs::write(&self.path, body)
    }

    /// Read back the persisted pair, if present and parseable. Callers must
    /// validate it before trusting it.
    pub fn load(&self) -> Option<TokenPair> {
        let body = match fs::read(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session cache");
                return None;
            }
        };
        match serde_json::from_slice::<CachedSession>(&body) {
            Ok(cached) => Some(cached.tokens),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt session cache, ignoring");
                None
            }
        }
    }

    /// Remove the cache file. Missing files are fine.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to clear session cache");
            }
        }
    }
}
