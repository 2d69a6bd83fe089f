//! Permission cache synchronizer
//!
//! Serves the effective permission list on every evaluation. The cached
//! snapshot in the session is used until the remote profile fetch resolves;
//! after that a non-empty remote list always wins and is written back to the
//! cache whenever the two differ.
//!
//! Remote fetches are de-duplicated per session (one request no matter how
//! many consumers ask), kept fresh for the configured stale time, retried once
//! on transient failure, and dropped if the session ended while in flight.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::SingleFlight;
use crate::client::{ClientError, ProfileFetcher};
use crate::config::PermissionsConfig;
use crate::models::{Permission, PermissionSnapshot, UserProfile};
use crate::session::SessionContext;

/// Effective permissions as seen by one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PermissionsState {
    pub permissions: PermissionSnapshot,
    /// No permissions from either source and the remote fetch has not settled
    pub is_loading: bool,
    /// Last remote failure for the current session, if the latest fetch failed
    pub error: Option<ClientError>,
}

impl PermissionsState {
    /// State with a known list and nothing pending
    #[must_use]
    pub fn resolved(permissions: PermissionSnapshot) -> Self {
        Self {
            permissions,
            is_loading: false,
            error: None,
        }
    }

    /// Cold start: nothing cached, nothing fetched yet
    #[must_use]
    pub fn loading() -> Self {
        Self {
            permissions: PermissionSnapshot::empty(),
            is_loading: true,
            error: None,
        }
    }

    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.has(permission)
    }

    /// False for an empty `permissions` list
    #[must_use]
    pub fn has_any_permission(&self, permissions: &[Permission]) -> bool {
        self.permissions.has_any(permissions)
    }

    /// True for an empty `permissions` list
    #[must_use]
    pub fn has_all_permissions(&self, permissions: &[Permission]) -> bool {
        self.permissions.has_all(permissions)
    }
}

/// What caused a refresh request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// A consumer (page, sidebar) was mounted
    Mount,
    /// The window regained focus
    Focus,
    /// Explicit request; ignores freshness
    Force,
}

impl RefreshTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mount => "mount",
            Self::Focus => "focus",
            Self::Force => "force",
        }
    }
}

/// Identifies one session's remote result; a new login or a logout changes it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    generation: u64,
    token: String,
}

/// How the latest fetch for a session ended
#[derive(Debug, Clone)]
struct FetchOutcome {
    generation: u64,
    error: Option<ClientError>,
}

/// Keeps the cached snapshot and the live profile in agreement
pub struct PermissionSynchronizer {
    session: Arc<SessionContext>,
    fetcher: Arc<dyn ProfileFetcher>,
    config: PermissionsConfig,
    stale_time: Duration,
    /// Remote snapshots still inside their freshness window
    fresh: moka::sync::Cache<FetchKey, PermissionSnapshot>,
    inflight: SingleFlight<FetchKey, UserProfile, ClientError>,
    outcome: RwLock<Option<FetchOutcome>>,
}

impl std::fmt::Debug for PermissionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionSynchronizer")
            .field("stale_time", &self.stale_time)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl PermissionSynchronizer {
    /// Remote snapshots kept at once; one per live session is enough
    const FRESH_CAPACITY: u64 = 16;

    #[must_use]
    pub fn new(
        session: Arc<SessionContext>,
        fetcher: Arc<dyn ProfileFetcher>,
        config: PermissionsConfig,
    ) -> Self {
        let stale_time = config.stale_time();
        Self {
            session,
            fetcher,
            config,
            stale_time,
            fresh: Self::build_fresh_cache(stale_time),
            inflight: SingleFlight::new(),
            outcome: RwLock::new(None),
        }
    }

    /// Override the freshness window (sub-second windows are useful in tests)
    #[must_use]
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self.fresh = Self::build_fresh_cache(stale_time);
        self
    }

    fn build_fresh_cache(stale_time: Duration) -> moka::sync::Cache<FetchKey, PermissionSnapshot> {
        moka::sync::Cache::builder()
            .max_capacity(Self::FRESH_CAPACITY)
            .time_to_live(stale_time)
            .build()
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    fn current_key(&self) -> Option<FetchKey> {
        let generation = self.session.generation();
        self.session.token().map(|token| FetchKey { generation, token })
    }

    /// Effective permissions right now, without waiting on the network
    ///
    /// Prefers the remote list when it is available and non-empty, falling
    /// back to the cached snapshot otherwise. A remote list that differs from
    /// the cache overwrites it as part of this read.
    pub fn snapshot(&self) -> PermissionsState {
        let key = self.current_key();
        let cached = self.session.cached_permissions();
        let remote = key.as_ref().and_then(|k| self.fresh.get(k));

        let permissions = match (remote, key.as_ref()) {
            (Some(remote), Some(key)) if !remote.is_empty() => {
                if remote != cached {
                    if let Err(e) = self.session.replace_permissions(key.generation, &remote) {
                        warn!(error = %e, "Failed to persist refreshed permissions");
                    }
                }
                remote
            }
            _ => cached,
        };

        let outcome = match key.as_ref() {
            Some(key) => self
                .outcome
                .read()
                .clone()
                .filter(|o| o.generation == key.generation),
            None => None,
        };
        // Signed out means nothing will arrive: resolve so checks fail closed
        let settled = key.is_none() || outcome.is_some();

        PermissionsState {
            is_loading: permissions.is_empty() && !settled,
            error: outcome.and_then(|o| o.error),
            permissions,
        }
    }

    /// True while the current session's remote list is inside its freshness window
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current_key().is_some_and(|key| self.fresh.contains_key(&key))
    }

    /// Drop the remote list so the next trigger fetches again
    pub fn invalidate(&self) {
        if let Some(key) = self.current_key() {
            self.fresh.invalidate(&key);
            debug!(generation = key.generation, "Remote permissions invalidated");
        }
    }

    fn trigger_enabled(&self, trigger: RefreshTrigger) -> bool {
        match trigger {
            RefreshTrigger::Mount => self.config.refetch_on_mount,
            RefreshTrigger::Focus => self.config.refetch_on_focus,
            RefreshTrigger::Force => true,
        }
    }

    /// Fetch the live profile if the remote list is stale, then evaluate
    ///
    /// Concurrent calls for the same session share one request. Failures are
    /// recorded on the returned state; the cached snapshot keeps serving.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> PermissionsState {
        let Some(key) = self.current_key() else {
            debug!(trigger = trigger.as_str(), "No session token, skipping permission fetch");
            return self.snapshot();
        };

        let settled_before = self
            .outcome
            .read()
            .as_ref()
            .is_some_and(|o| o.generation == key.generation);

        if trigger != RefreshTrigger::Force {
            if self.fresh.contains_key(&key) {
                debug!(trigger = trigger.as_str(), "Remote permissions still fresh");
                return self.snapshot();
            }
            // A disabled trigger still performs the first fetch of a session
            if settled_before && !self.trigger_enabled(trigger) {
                return self.snapshot();
            }
        }

        let fetcher = Arc::clone(&self.fetcher);
        let token = key.token.clone();
        let attempts = self.config.retry_attempts;
        let delay = self.config.retry_delay();
        let result = self
            .inflight
            .do_work_with_fallback(
                key.clone(),
                fetch_with_retry(fetcher, token, attempts, delay),
                || ClientError::Abandoned,
            )
            .await;

        self.record(&key, result);
        self.snapshot()
    }

    fn record(&self, key: &FetchKey, result: Result<UserProfile, ClientError>) {
        if self.session.generation() != key.generation {
            debug!(generation = key.generation, "Discarding profile for an ended session");
            return;
        }

        let error = match result {
            Ok(profile) => {
                let snapshot = profile.snapshot();
                info!(
                    user_id = profile.id,
                    permissions = snapshot.len(),
                    "Permissions fetched"
                );
                if let Err(e) = self.session.apply_profile(key.generation, &profile) {
                    warn!(error = %e, "Failed to persist refreshed profile");
                }
                self.fresh.insert(key.clone(), snapshot);
                None
            }
            Err(e) => {
                warn!(error = %e, "Permission fetch failed, serving cached snapshot");
                Some(e)
            }
        };

        *self.outcome.write() = Some(FetchOutcome {
            generation: key.generation,
            error,
        });
    }

    /// Run `refresh` on the runtime without waiting for it
    pub fn spawn_refresh(
        self: &Arc<Self>,
        trigger: RefreshTrigger,
    ) -> tokio::task::JoinHandle<PermissionsState> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.refresh(trigger).await })
    }
}

/// One attempt plus up to `retries` more, only for transient failures
async fn fetch_with_retry(
    fetcher: Arc<dyn ProfileFetcher>,
    token: String,
    retries: usize,
    delay: Duration,
) -> Result<UserProfile, ClientError> {
    let backoff = ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(retries)
        .build();

    let mut last_err = ClientError::Abandoned;
    for (attempt, wait) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        match fetcher.fetch_profile(&token).await {
            Ok(profile) => return Ok(profile),
            Err(e) if e.is_retryable() => {
                debug!(attempt, error = %e, "Profile fetch failed");
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::profile::MockProfileFetcher;
    use crate::models::UserSession;
    use crate::session::MemorySessionStore;

    fn context_with(perms: &[&str]) -> Arc<SessionContext> {
        let session = UserSession {
            id: 7,
            roles_permissions: PermissionSnapshot::new(perms.iter().map(|p| p.to_string()).collect()),
            token: Some("tok".to_string()),
            ..UserSession::default()
        };
        Arc::new(SessionContext::restore(Arc::new(MemorySessionStore::with_session(session))))
    }

    fn profile_with(perms: &[&str]) -> UserProfile {
        UserProfile {
            id: 7,
            roles_permissions: perms.iter().map(|p| p.to_string()).collect(),
            ..UserProfile::default()
        }
    }

    fn config() -> PermissionsConfig {
        PermissionsConfig {
            retry_delay_millis: 1,
            ..PermissionsConfig::default()
        }
    }

    #[test]
    fn test_derived_checks_on_empty_lists() {
        let state = PermissionsState::resolved(PermissionSnapshot::new(vec!["list-users".to_string()]));
        assert!(!state.has_any_permission(&[]));
        assert!(state.has_all_permissions(&[]));
        assert!(state.has_permission(Permission::ListUsers));
        assert!(!state.has_permission(Permission::CreateUser));
    }

    #[tokio::test]
    async fn test_retries_once_on_transient_error() {
        let mut fetcher = MockProfileFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ClientError::Timeout));
        fetcher
            .expect_fetch_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(profile_with(&["list-orders"])));

        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), config());
        let state = sync.refresh(RefreshTrigger::Mount).await;
        assert_eq!(state.permissions.as_slice(), ["list-orders"]);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_gives_up_after_one_retry() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(2)
            .returning(|_| Err(ClientError::Network("reset".to_string())));

        let sync = PermissionSynchronizer::new(context_with(&["list-users"]), Arc::new(fetcher), config());
        let state = sync.refresh(RefreshTrigger::Mount).await;
        assert_eq!(state.permissions.as_slice(), ["list-users"]);
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(ClientError::Network("reset".to_string())));
    }

    #[tokio::test]
    async fn test_unauthenticated_is_not_retried() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(1)
            .returning(|_| Err(ClientError::Unauthenticated));

        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), config());
        let state = sync.refresh(RefreshTrigger::Mount).await;
        assert!(state.permissions.is_empty());
        assert!(!state.is_loading);
        assert_eq!(state.error, Some(ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_fresh_result_is_not_refetched() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(1)
            .returning(|_| Ok(profile_with(&["list-roles"])));

        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), config());
        sync.refresh(RefreshTrigger::Mount).await;
        assert!(sync.is_fresh());
        let state = sync.refresh(RefreshTrigger::Focus).await;
        assert_eq!(state.permissions.as_slice(), ["list-roles"]);
    }

    #[tokio::test]
    async fn test_force_and_invalidate_refetch() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(3)
            .returning(|_| Ok(profile_with(&["list-roles"])));

        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), config());
        sync.refresh(RefreshTrigger::Mount).await;
        sync.refresh(RefreshTrigger::Force).await;
        sync.invalidate();
        assert!(!sync.is_fresh());
        sync.refresh(RefreshTrigger::Focus).await;
    }

    #[tokio::test]
    async fn test_stale_result_refetched_on_focus() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(2)
            .returning(|_| Ok(profile_with(&["list-roles"])));

        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), config())
            .with_stale_time(Duration::from_millis(50));
        sync.refresh(RefreshTrigger::Mount).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!sync.is_fresh());

        // Cache was overwritten, so the stale window still serves the list
        assert_eq!(sync.snapshot().permissions.as_slice(), ["list-roles"]);
        sync.refresh(RefreshTrigger::Focus).await;
    }

    #[tokio::test]
    async fn test_disabled_focus_trigger_skips_after_first_fetch() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .times(1)
            .returning(|_| Ok(profile_with(&["list-roles"])));

        let cfg = PermissionsConfig {
            refetch_on_focus: false,
            ..config()
        };
        let sync = PermissionSynchronizer::new(context_with(&[]), Arc::new(fetcher), cfg)
            .with_stale_time(Duration::from_millis(10));
        sync.refresh(RefreshTrigger::Focus).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        sync.refresh(RefreshTrigger::Focus).await;
    }

    #[tokio::test]
    async fn test_empty_remote_falls_back_to_cache() {
        let mut fetcher = MockProfileFetcher::new();
        fetcher
            .expect_fetch_profile()
            .returning(|_| Ok(profile_with(&[])));

        let ctx = context_with(&["list-vendors"]);
        let sync = PermissionSynchronizer::new(ctx.clone(), Arc::new(fetcher), config());
        let state = sync.refresh(RefreshTrigger::Mount).await;
        assert_eq!(state.permissions.as_slice(), ["list-vendors"]);
        assert_eq!(ctx.cached_permissions().as_slice(), ["list-vendors"]);
    }

    #[tokio::test]
    async fn test_signed_out_never_fetches() {
        let fetcher = MockProfileFetcher::new();
        let ctx = Arc::new(SessionContext::new(Arc::new(MemorySessionStore::new())));
        let sync = PermissionSynchronizer::new(ctx, Arc::new(fetcher), config());

        let state = sync.refresh(RefreshTrigger::Mount).await;
        assert!(state.permissions.is_empty());
        assert!(!state.is_loading);
    }

    #[test]
    fn test_cold_start_is_loading() {
        let sync = PermissionSynchronizer::new(
            context_with(&[]),
            Arc::new(MockProfileFetcher::new()),
            config(),
        );
        assert_eq!(sync.snapshot(), PermissionsState::loading());
    }
}
