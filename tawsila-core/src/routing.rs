//! Locale-prefixed routing
//!
//! Holds the redirect primitive used by the page guard and the request-time
//! route gate. The gate only looks at the bearer token (the cookie half of the
//! session); permission gating happens later, per page.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::models::Locale;

/// Redirect primitive taking a locale-prefixed path
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}

/// Navigator that only remembers where it was sent
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.redirects.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, location: &str) {
        info!(location, "Redirect");
        self.redirects.lock().push(location.to_string());
    }
}

/// `/{locale}/403`
#[must_use]
pub fn forbidden_path(locale: Locale) -> String {
    locale.prefix("/403")
}

/// `/{locale}`, the dashboard home
#[must_use]
pub fn dashboard_path(locale: Locale) -> String {
    locale.prefix("/")
}

/// `/{locale}/login`
#[must_use]
pub fn login_path(locale: Locale) -> String {
    locale.prefix("/login")
}

/// Outcome of the request-time route gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    /// No session token on a protected page
    RedirectToLogin(String),
    /// Signed-in user on the login page
    RedirectToDashboard(String),
    /// Path without a locale segment
    RedirectToLocale(String),
}

impl RouteDecision {
    /// Redirect target, `None` for `Allow`
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::RedirectToLogin(location)
            | Self::RedirectToDashboard(location)
            | Self::RedirectToLocale(location) => Some(location),
        }
    }
}

/// Request-time authentication gate
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGate {
    default_locale: Locale,
}

impl RouteGate {
    #[must_use]
    pub const fn new(default_locale: Locale) -> Self {
        Self { default_locale }
    }

    /// Decide what to do with a request for `path`
    ///
    /// `token` is the raw cookie value; a blank token counts as none.
    #[must_use]
    pub fn decide(&self, path: &str, token: Option<&str>) -> RouteDecision {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        if is_passthrough(path) {
            return RouteDecision::Allow;
        }

        let Some((locale, rest)) = Locale::split_path(path) else {
            let location = self.default_locale.prefix(path);
            debug!(path, location = %location, "Adding locale prefix");
            return RouteDecision::RedirectToLocale(location);
        };

        let signed_in = token.is_some_and(|t| !t.trim().is_empty());
        let on_login = rest.trim_end_matches('/') == "/login";

        match (signed_in, on_login) {
            (true, true) => RouteDecision::RedirectToDashboard(dashboard_path(locale)),
            (true, false) => RouteDecision::Allow,
            (false, _) if on_login || is_public(rest) => RouteDecision::Allow,
            (false, _) => RouteDecision::RedirectToLogin(login_path(locale)),
        }
    }
}

/// Order tracking is reachable without a session
fn is_public(rest: &str) -> bool {
    rest == "/track" || rest.starts_with("/track/")
}

/// Backend proxy and static files never go through the gate
fn is_passthrough(path: &str) -> bool {
    if path.starts_with("/api/") || path.starts_with("/_next/") {
        return true;
    }
    path.rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'))
}
