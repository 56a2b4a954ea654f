//! Token persistence.
//!
//! The credential store is the only owner of the bearer token pair. The
//! session manager and request gateway read and mutate tokens exclusively
//! through it; it performs no network or UI side effects.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Access/refresh token pair returned by the login endpoint.
///
/// Both tokens are opaque bearer strings. They are persisted and cleared as
/// one record, so a loaded pair always has both present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Storage contract for the token pair.
///
/// Storage failure is not an error condition for callers: `save` and
/// `clear` degrade to no-ops and `load` reports the pair as absent, which
/// downgrades the session to anonymous instead of crashing the host.
pub trait CredentialStore: Send + Sync {
    fn save(&self, pair: &TokenPair);
    fn load(&self) -> Option<TokenPair>;
    fn clear(&self);
}

// ── File-backed store ───────────────────────────────────────────────

/// JSON credential record in the profile directory, durable across runs on
/// the same machine. Written with owner-only permissions.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_secure(path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::io::Write;
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            file.write_all(content.as_bytes())?;
            std::fs::set_permissions(path, Permissions::from_mode(0o600))?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)?;
        }

        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, pair: &TokenPair) {
        let Ok(json) = serde_json::to_string_pretty(pair) else {
            return;
        };
        if let Err(e) = Self::write_secure(&self.path, &json) {
            tracing::debug!("credential store unavailable, save skipped: {e}");
        }
    }

    fn load(&self) -> Option<TokenPair> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("credential store unavailable, treating as absent: {e}");
                }
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::debug!("credential record unreadable, treating as absent: {e}");
                None
            }
        }
    }

    fn clear(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("credential store unavailable, clear skipped: {e}");
            }
        }
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// Ephemeral store for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryCredentialStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, pair: &TokenPair) {
        *self.pair.write() = Some(pair.clone());
    }

    fn load(&self) -> Option<TokenPair> {
        self.pair.read().clone()
    }

    fn clear(&self) {
        *self.pair.write() = None;
    }
}

// ── Tests ───────────────────────────────────────────────────────────
