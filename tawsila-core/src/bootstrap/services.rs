//! Service initialization and dependency injection

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    client::HttpProfileClient,
    routing::RouteGate,
    service::PermissionSynchronizer,
    session::{FileSessionStore, SessionContext, SessionStore},
    Config,
};

/// Container for the initialized permission layer
#[derive(Clone)]
pub struct Services {
    /// Raw persistence, for request-time token reads
    pub store: Arc<dyn SessionStore>,
    /// Session restored from the store
    pub session: Arc<SessionContext>,
    /// Cached/remote permission reconciliation
    pub permissions: Arc<PermissionSynchronizer>,
    pub route_gate: RouteGate,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("session", &self.session)
            .field("route_gate", &self.route_gate)
            .finish_non_exhaustive()
    }
}

/// Restore the persisted session and wire the synchronizer to the live profile endpoint
pub fn init_services(config: &Config) -> Result<Services> {
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::from_config(&config.session));
    let session = Arc::new(SessionContext::restore(Arc::clone(&store)));

    let locale = config.locale.default_locale;
    let client = HttpProfileClient::new(&config.api, locale)?;
    info!(profile_url = client.profile_url(), "Profile client initialized");

    let permissions = Arc::new(PermissionSynchronizer::new(
        Arc::clone(&session),
        Arc::new(client),
        config.permissions.clone(),
    ));

    Ok(Services {
        store,
        session,
        permissions,
        route_gate: RouteGate::new(locale),
    })
}
