//! Page permission guard
//!
//! A page declares the permissions it needs; the guard turns the current
//! permission state into a tri-state decision and sends the user to the
//! localized forbidden page the first time access resolves to denied.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::permission::PermissionsState;
use crate::models::{Locale, Permission};
use crate::routing::{forbidden_path, Navigator};

/// How a multi-permission requirement is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one listed permission
    #[default]
    Any,
    /// Every listed permission
    All,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            _ => Err(format!("Unknown match mode: {s} (expected any or all)")),
        }
    }
}

/// Permissions a page needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageRequirement {
    pub required: Vec<Permission>,
    #[serde(default)]
    pub mode: MatchMode,
}

impl PageRequirement {
    #[must_use]
    pub fn new(required: impl Into<Vec<Permission>>, mode: MatchMode) -> Self {
        Self {
            required: required.into(),
            mode,
        }
    }

    #[must_use]
    pub fn any(required: impl Into<Vec<Permission>>) -> Self {
        Self::new(required, MatchMode::Any)
    }

    #[must_use]
    pub fn all(required: impl Into<Vec<Permission>>) -> Self {
        Self::new(required, MatchMode::All)
    }

    /// An empty requirement is satisfied by anyone
    #[must_use]
    pub fn is_satisfied_by(&self, state: &PermissionsState) -> bool {
        if self.required.is_empty() {
            return true;
        }
        match self.mode {
            MatchMode::Any => state.has_any_permission(&self.required),
            MatchMode::All => state.has_all_permissions(&self.required),
        }
    }
}

/// Guard decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    Pending,
    Granted,
    Denied,
}

impl GuardState {
    /// `None` while pending, otherwise whether access is granted
    #[must_use]
    pub const fn as_option(self) -> Option<bool> {
        match self {
            Self::Pending => None,
            Self::Granted => Some(true),
            Self::Denied => Some(false),
        }
    }
}

/// Guard for one mounted page
///
/// Re-evaluate on every permission change. The forbidden redirect is issued
/// at most once per guard, even if the decision flips back and forth.
#[derive(Debug, Clone)]
pub struct PageGuard {
    requirement: PageRequirement,
    locale: Locale,
    state: GuardState,
    redirected: bool,
}

impl PageGuard {
    #[must_use]
    pub fn new(requirement: PageRequirement, locale: Locale) -> Self {
        Self {
            requirement,
            locale,
            state: GuardState::Pending,
            redirected: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> GuardState {
        self.state
    }

    #[must_use]
    pub const fn has_redirected(&self) -> bool {
        self.redirected
    }

    #[must_use]
    pub const fn requirement(&self) -> &PageRequirement {
        &self.requirement
    }

    /// Evaluate against the current permission state
    ///
    /// Returns `None` while loading (no redirect), `Some(true)` when granted
    /// and `Some(false)` when denied.
    pub fn evaluate(&mut self, permissions: &PermissionsState, navigator: &dyn Navigator) -> Option<bool> {
        if permissions.is_loading {
            debug!("Permissions still loading, guard pending");
            self.state = GuardState::Pending;
            return None;
        }

        self.state = if self.requirement.is_satisfied_by(permissions) {
            GuardState::Granted
        } else {
            GuardState::Denied
        };

        if self.state == GuardState::Denied && !self.redirected {
            self.redirected = true;
            let location = forbidden_path(self.locale);
            info!(
                required = ?self.requirement.required,
                mode = ?self.requirement.mode,
                location = %location,
                "Page access denied"
            );
            navigator.redirect(&location);
        }

        self.state.as_option()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PermissionSnapshot;
    use crate::routing::RecordingNavigator;

    fn state(perms: &[&str]) -> PermissionsState {
        PermissionsState::resolved(PermissionSnapshot::new(perms.iter().map(|p| p.to_string()).collect()))
    }

    #[test]
    fn test_pending_never_redirects() {
        let nav = RecordingNavigator::new();
        let mut guard = PageGuard::new(PageRequirement::any([Permission::CreateRole]), Locale::En);
        assert_eq!(guard.evaluate(&PermissionsState::loading(), &nav), None);
        assert_eq!(guard.state(), GuardState::Pending);
        assert!(nav.redirects().is_empty());
    }

    #[test]
    fn test_any_and_all_modes() {
        let nav = RecordingNavigator::new();
        let perms = state(&["list-users", "show-user"]);

        let mut any = PageGuard::new(
            PageRequirement::any([Permission::ListUsers, Permission::DeleteUser]),
            Locale::En,
        );
        assert_eq!(any.evaluate(&perms, &nav), Some(true));

        let mut all = PageGuard::new(
            PageRequirement::all([Permission::ListUsers, Permission::DeleteUser]),
            Locale::En,
        );
        assert_eq!(all.evaluate(&perms, &nav), Some(false));
        assert_eq!(nav.redirects(), ["/en/403"]);
    }

    #[test]
    fn test_empty_requirement_granted() {
        let nav = RecordingNavigator::new();
        let mut guard = PageGuard::new(PageRequirement::default(), Locale::Ar);
        assert_eq!(guard.evaluate(&state(&[]), &nav), Some(true));
        assert!(!guard.has_redirected());
    }

    #[test]
    fn test_denied_redirects_once() {
        let nav = RecordingNavigator::new();
        let mut guard = PageGuard::new(PageRequirement::any([Permission::CreateRole]), Locale::Ar);
        let perms = state(&["list-roles"]);

        for _ in 0..3 {
            assert_eq!(guard.evaluate(&perms, &nav), Some(false));
        }
        assert_eq!(nav.redirects(), ["/ar/403"]);
    }

    #[test]
    fn test_regrant_after_denial_does_not_redirect_again() {
        let nav = RecordingNavigator::new();
        let mut guard = PageGuard::new(PageRequirement::any([Permission::EditOrder]), Locale::En);

        assert_eq!(guard.evaluate(&state(&[]), &nav), Some(false));
        assert_eq!(guard.evaluate(&state(&["edit-order"]), &nav), Some(true));
        assert_eq!(guard.evaluate(&state(&[]), &nav), Some(false));
        assert_eq!(nav.redirects().len(), 1);
    }

    #[test]
    fn test_match_mode_parse() {
        assert_eq!("ALL".parse::<MatchMode>().unwrap(), MatchMode::All);
        assert_eq!("any".parse::<MatchMode>().unwrap(), MatchMode::Any);
        assert!("some".parse::<MatchMode>().is_err());
    }
}
