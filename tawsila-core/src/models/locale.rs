use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Dashboard UI locale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl Locale {
    pub const ALL: &'static [Self] = &[Self::En, Self::Ar];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }

    /// Right-to-left layout
    #[must_use]
    pub const fn is_rtl(&self) -> bool {
        matches!(self, Self::Ar)
    }

    /// Split a locale prefix off a path: `/ar/users` -> `(Ar, "/users")`
    ///
    /// Returns `None` when the first segment is not a known locale.
    #[must_use]
    pub fn split_path(path: &str) -> Option<(Self, &str)> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (first, rest) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, ""),
        };
        let locale = first.parse().ok()?;
        Some((locale, if rest.is_empty() { "/" } else { rest }))
    }

    /// Prefix a locale-less path: `/users` -> `/en/users`
    #[must_use]
    pub fn prefix(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("/{}", self.as_str())
        } else {
            format!("/{}/{path}", self.as_str())
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "en" => Ok(Self::En),
            "ar" => Ok(Self::Ar),
            _ => Err(format!("Unknown locale: {s}")),
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text carried in both dashboard locales
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub en: String,
    pub ar: String,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>, ar: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            ar: ar.into(),
        }
    }

    #[must_use]
    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::En => &self.en,
            Locale::Ar => &self.ar,
        }
    }
}
