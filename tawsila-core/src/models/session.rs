use serde::{Deserialize, Serialize};

use super::locale::{Locale, LocalizedText};
use super::permission::PermissionSnapshot;

/// Authenticated dashboard user, as persisted between page loads
///
/// Field names follow the backend login payload so the stored JSON can be
/// written straight from the login response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSession {
    pub id: u64,
    pub name_en: String,
    pub name_ar: String,
    pub roles: Vec<String>,
    /// Cached permission snapshot (hint, not source of truth)
    pub roles_permissions: PermissionSnapshot,
    pub token: Option<String>,
}

impl UserSession {
    /// A session without a non-blank token is never authenticated
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    #[must_use]
    pub fn display_name(&self, locale: Locale) -> &str {
        match locale {
            Locale::En => &self.name_en,
            Locale::Ar => &self.name_ar,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Refresh the identity fields from an authoritative profile, keeping the token
    pub fn apply_profile(&mut self, profile: &UserProfile) {
        self.id = profile.id;
        self.name_en.clone_from(&profile.name_en);
        self.name_ar.clone_from(&profile.name_ar);
        self.roles = profile.role_names();
    }
}

/// Role entry in a profile response; the backend sends either bare names or objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileRole {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        display_name: Option<LocalizedText>,
    },
}

impl ProfileRole {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }
}

/// Authoritative user profile returned by the profile endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_ar: String,
    #[serde(default)]
    pub roles: Vec<ProfileRole>,
    #[serde(default)]
    pub roles_permissions: Vec<String>,
}

impl UserProfile {
    #[must_use]
    pub fn name(&self) -> LocalizedText {
        LocalizedText::new(self.name_en.clone(), self.name_ar.clone())
    }

    #[must_use]
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name().to_string()).collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> PermissionSnapshot {
        PermissionSnapshot::new(self.roles_permissions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_not_authenticated() {
        let mut session = UserSession::default();
        assert!(!session.is_authenticated());

        session.token = Some("   ".to_string());
        assert!(!session.is_authenticated());

        session.token = Some("abc".to_string());
        assert!(session.is_authenticated());
        assert_eq!(session.token(), Some("abc"));
    }

    #[test]
    fn test_session_json_shape() {
        let json = r#"{
            "id": 7,
            "name_en": "Sara",
            "name_ar": "سارة",
            "roles": ["admin"],
            "roles_permissions": ["list-users", "create-user"],
            "token": "t0k"
        }"#;
        let session: UserSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, 7);
        assert_eq!(session.display_name(Locale::Ar), "سارة");
        assert!(session.has_role("admin"));
        assert_eq!(session.roles_permissions.len(), 2);
    }

    #[test]
    fn test_profile_accepts_role_objects() {
        let json = r#"{
            "id": 3,
            "name_en": "Omar",
            "name_ar": "عمر",
            "roles": ["agent", {"name": "dispatcher"}],
            "roles_permissions": ["list-orders"],
            "email": "omar@example.com"
        }"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name().get(Locale::En), "Omar");
        assert_eq!(profile.role_names(), vec!["agent", "dispatcher"]);
        assert_eq!(profile.snapshot().as_slice(), ["list-orders"]);

        let mut session = UserSession {
            token: Some("keep".to_string()),
            ..UserSession::default()
        };
        session.apply_profile(&profile);
        assert_eq!(session.id, 3);
        assert_eq!(session.token(), Some("keep"));
        assert_eq!(session.roles, vec!["agent", "dispatcher"]);
    }
}
