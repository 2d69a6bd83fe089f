//! Explicit session context
//!
//! Owns the in-memory session and is the only writer of the persisted copy.
//! Consumers read through it; the permission synchronizer updates the cached
//! snapshot through `replace_permissions`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::store::SessionStore;
use crate::models::{PermissionSnapshot, UserProfile, UserSession};
use crate::{Error, Result};

pub struct SessionContext {
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<UserSession>>,
    /// Bumped on login/logout so in-flight results for an old session are dropped
    generation: AtomicU64,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("authenticated", &self.is_authenticated())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Empty context; nothing is read from the store
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Context seeded from the store
    ///
    /// A malformed or unreadable stored session is treated as no session:
    /// every permission check then fails closed.
    pub fn restore(store: Arc<dyn SessionStore>) -> Self {
        let session = match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Stored session unreadable, starting signed out");
                None
            }
        };
        debug!(restored = session.is_some(), "Session context initialized");

        Self {
            store,
            current: RwLock::new(session),
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<UserSession> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|s| s.token().map(str::to_string))
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(UserSession::is_authenticated)
    }

    /// Cached snapshot; empty when signed out
    #[must_use]
    pub fn cached_permissions(&self) -> PermissionSnapshot {
        self.current
            .read()
            .as_ref()
            .map(|s| s.roles_permissions.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a session. The session must carry a token.
    pub fn login(&self, session: UserSession) -> Result<()> {
        if !session.is_authenticated() {
            return Err(Error::Authentication(
                "Cannot start a session without a token".to_string(),
            ));
        }

        self.store.save(&session)?;
        let user_id = session.id;
        {
            let mut guard = self.current.write();
            *guard = Some(session);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        info!(user_id, "Session started");
        Ok(())
    }

    /// Destroy the session in memory and in the store
    pub fn logout(&self) -> Result<()> {
        let previous = {
            let mut guard = self.current.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            guard.take()
        };
        self.store.clear()?;

        if let Some(session) = previous {
            info!(user_id = session.id, "Session ended");
        }
        Ok(())
    }

    /// Overwrite the cached snapshot when it differs
    ///
    /// `generation` is the session generation the snapshot was fetched for;
    /// a snapshot from an ended session is ignored. Returns `true` when the
    /// cache changed. The in-memory copy is updated even if persisting
    /// fails; the persist error is returned.
    pub fn replace_permissions(&self, generation: u64, snapshot: &PermissionSnapshot) -> Result<bool> {
        let updated = {
            let mut guard = self.current.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Ignoring permissions for an ended session");
                return Ok(false);
            }
            let Some(session) = guard.as_mut() else {
                return Ok(false);
            };
            if session.roles_permissions == *snapshot {
                return Ok(false);
            }
            session.roles_permissions = snapshot.clone();
            session.clone()
        };

        info!(
            user_id = updated.id,
            permissions = updated.roles_permissions.len(),
            "Cached permissions replaced"
        );
        self.store.save(&updated)?;
        Ok(true)
    }

    /// Refresh identity fields (names, roles) from an authoritative profile
    pub fn apply_profile(&self, generation: u64, profile: &UserProfile) -> Result<()> {
        let updated = {
            let mut guard = self.current.write();
            if self.generation.load(Ordering::SeqCst) != generation {
                return Ok(());
            }
            let Some(session) = guard.as_mut() else {
                return Ok(());
            };
            let before = session.clone();
            session.apply_profile(profile);
            if *session == before {
                return Ok(());
            }
            session.clone()
        };
        self.store.save(&updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::{FileSessionStore, MemorySessionStore};

    fn session_with(perms: &[&str]) -> UserSession {
        UserSession {
            id: 1,
            roles_permissions: PermissionSnapshot::new(perms.iter().map(|p| p.to_string()).collect()),
            token: Some("tok".to_string()),
            ..UserSession::default()
        }
    }

    #[test]
    fn test_restore_from_store() {
        let store = Arc::new(MemorySessionStore::with_session(session_with(&["list-users"])));
        let ctx = SessionContext::restore(store);
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.cached_permissions().as_slice(), ["list-users"]);
    }

    #[test]
    fn test_malformed_store_is_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("user.json"), dir.path().join("token"));
        std::fs::write(store.user_path(), "garbage").unwrap();

        let ctx = SessionContext::restore(Arc::new(store));
        assert!(!ctx.is_authenticated());
        assert!(ctx.cached_permissions().is_empty());
    }

    #[test]
    fn test_malformed_store_with_token_stays_signed_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("user.json"), dir.path().join("token"));
        std::fs::write(store.user_path(), "garbage").unwrap();
        std::fs::write(store.token_path(), "valid-cookie").unwrap();

        let ctx = SessionContext::restore(Arc::new(store));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.token().as_deref(), Some("valid-cookie"));
        assert!(ctx.cached_permissions().is_empty());
    }

    #[test]
    fn test_login_requires_token() {
        let ctx = SessionContext::new(Arc::new(MemorySessionStore::new()));
        let mut session = session_with(&[]);
        session.token = None;
        let err = ctx.login(session).unwrap_err();
        assert!(err.is_unauthenticated());
        assert_eq!(ctx.generation(), 0);
    }

    #[test]
    fn test_login_logout_bump_generation() {
        let store = Arc::new(MemorySessionStore::new());
        let ctx = SessionContext::new(store.clone());

        ctx.login(session_with(&["list-roles"])).unwrap();
        assert_eq!(ctx.generation(), 1);
        assert!(store.stored().is_some());

        ctx.logout().unwrap();
        assert_eq!(ctx.generation(), 2);
        assert!(!ctx.is_authenticated());
        assert!(store.stored().is_none());
    }

    #[test]
    fn test_replace_permissions_only_on_difference() {
        let store = Arc::new(MemorySessionStore::with_session(session_with(&["a"])));
        let ctx = SessionContext::restore(store.clone());

        let same = PermissionSnapshot::new(vec!["a".to_string()]);
        assert!(!ctx.replace_permissions(0, &same).unwrap());

        let newer = PermissionSnapshot::new(vec!["a".to_string(), "b".to_string()]);
        assert!(ctx.replace_permissions(0, &newer).unwrap());
        assert_eq!(ctx.cached_permissions(), newer);
        assert_eq!(store.stored().unwrap().roles_permissions, newer);
    }

    #[test]
    fn test_replace_permissions_without_session_is_noop() {
        let ctx = SessionContext::new(Arc::new(MemorySessionStore::new()));
        let snapshot = PermissionSnapshot::new(vec!["a".to_string()]);
        assert!(!ctx.replace_permissions(0, &snapshot).unwrap());
    }

    #[test]
    fn test_replace_permissions_for_ended_session_is_ignored() {
        let ctx = SessionContext::new(Arc::new(MemorySessionStore::new()));
        ctx.login(session_with(&["a"])).unwrap();
        let stale_generation = ctx.generation();

        ctx.logout().unwrap();
        ctx.login(session_with(&["x"])).unwrap();

        let snapshot = PermissionSnapshot::new(vec!["a".to_string(), "b".to_string()]);
        assert!(!ctx.replace_permissions(stale_generation, &snapshot).unwrap());
        assert_eq!(ctx.cached_permissions().as_slice(), ["x"]);
    }
}
