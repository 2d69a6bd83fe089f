//! Session persistence adapters
//!
//! The persisted session is two pieces: the JSON user object (including the
//! cached permission snapshot) and, in parallel, the bare bearer token. The
//! token file plays the role of the browser cookie: request-time route
//! decisions read only the token, never the user object.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SessionConfig;
use crate::models::UserSession;
use crate::Result;

/// Narrow persistence interface behind the session context
pub trait SessionStore: Send + Sync {
    /// Load the persisted session. `Ok(None)` when nothing is stored.
    fn load(&self) -> Result<Option<UserSession>>;

    /// Persist the session, replacing what was stored
    fn save(&self, session: &UserSession) -> Result<()>;

    /// Remove the persisted session
    fn clear(&self) -> Result<()>;

    /// Read only the bearer token (the cookie half of the session)
    fn load_token(&self) -> Result<Option<String>>;
}

/// File-backed store: `user.json` plus a companion `token` file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    user_path: PathBuf,
    token_path: PathBuf,
}

impl FileSessionStore {
    pub fn new(user_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            user_path: user_path.into(),
            token_path: token_path.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.user_path(), config.token_path())
    }

    #[must_use]
    pub fn user_path(&self) -> &Path {
        &self.user_path
    }

    #[must_use]
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    fn read_optional(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temp file so a crash never leaves half a session
    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn remove_optional(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<UserSession>> {
        let token = self.load_token()?;
        let Some(json) = Self::read_optional(&self.user_path)? else {
            // Token without a user object: signed in, nothing cached yet
            return Ok(token.map(token_only_session));
        };

        let mut session: UserSession = match serde_json::from_str(&json) {
            Ok(session) => session,
            Err(e) => match token {
                // Unreadable cache with a live token: empty permissions, fetch will refill
                Some(token) => {
                    tracing::warn!(
                        path = %self.user_path.display(),
                        error = %e,
                        "Stored user object malformed, keeping token with empty cache"
                    );
                    return Ok(Some(token_only_session(token)));
                }
                None => return Err(e.into()),
            },
        };

        // The token file wins: it is what request-time routing trusted
        if token.is_some() {
            session.token = token;
        }

        Ok(Some(session))
    }

    fn save(&self, session: &UserSession) -> Result<()> {
        let json = serde_json::to_vec_pretty(session)?;
        Self::write_atomic(&self.user_path, &json)?;

        match session.token() {
            Some(token) => Self::write_atomic(&self.token_path, token.as_bytes())?,
            None => Self::remove_optional(&self.token_path)?,
        }

        tracing::debug!(path = %self.user_path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Self::remove_optional(&self.user_path)?;
        Self::remove_optional(&self.token_path)?;
        tracing::debug!(path = %self.user_path.display(), "Session cleared");
        Ok(())
    }

    fn load_token(&self) -> Result<Option<String>> {
        Ok(Self::read_optional(&self.token_path)?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}

fn token_only_session(token: String) -> UserSession {
    UserSession {
        token: Some(token),
        ..UserSession::default()
    }
}

/// In-memory store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<UserSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(session: UserSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    /// Current stored value, bypassing the trait
    #[must_use]
    pub fn stored(&self) -> Option<UserSession> {
        self.session.lock().clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<UserSession>> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &UserSession) -> Result<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.lock() = None;
        Ok(())
    }

    fn load_token(&self) -> Result<Option<String>> {
        Ok(self
            .session
            .lock()
            .as_ref()
            .and_then(|s| s.token().map(str::to_string)))
    }
}
