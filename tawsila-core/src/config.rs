use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Locale;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub permissions: PermissionsConfig,
    pub session: SessionConfig,
    pub locale: LocaleConfig,
    pub logging: LoggingConfig,
}

/// Backend REST API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub profile_path: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            profile_path: "/api/profile".to_string(),
            connect_timeout_seconds: 5,
            request_timeout_seconds: 15,
        }
    }
}

impl ApiConfig {
    /// Full profile endpoint URL
    #[must_use]
    pub fn profile_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.profile_path.trim_start_matches('/')
        )
    }
}

/// Permission refresh policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// How long a fetched permission list counts as fresh
    pub stale_time_seconds: u64,
    /// Extra attempts after a failed fetch, 0 or 1
    pub retry_attempts: usize,
    pub retry_delay_millis: u64,
    /// Refetch on focus/mount triggers once stale
    pub refetch_on_focus: bool,
    pub refetch_on_mount: bool,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            stale_time_seconds: 30,
            retry_attempts: 1,
            retry_delay_millis: 500,
            refetch_on_focus: true,
            refetch_on_mount: true,
        }
    }
}

impl PermissionsConfig {
    #[must_use]
    pub const fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_seconds)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_millis)
    }
}

/// Session persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding the user object and the token file
    pub storage_dir: PathBuf,
    pub user_file: String,
    pub token_file: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./.tawsila"),
            user_file: "user.json".to_string(),
            token_file: "token".to_string(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn user_path(&self) -> PathBuf {
        self.storage_dir.join(&self.user_file)
    }

    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.storage_dir.join(&self.token_file)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    pub default_locale: Locale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // TAWSILA_API__BASE_URL, TAWSILA_PERMISSIONS__STALE_TIME_SECONDS, ...
        builder = builder.add_source(
            Environment::with_prefix("TAWSILA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Validate the configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.api.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "api.base_url must use http or https, got {}",
                url.scheme()
            )),
            Err(e) => errors.push(format!("api.base_url is not a valid URL: {e}")),
        }

        if self.api.profile_path.trim().is_empty() {
            errors.push("api.profile_path must not be empty".to_string());
        }
        if self.api.request_timeout_seconds == 0 {
            errors.push("api.request_timeout_seconds must be greater than 0".to_string());
        }
        if self.permissions.stale_time_seconds == 0 {
            errors.push("permissions.stale_time_seconds must be greater than 0".to_string());
        }
        if self.permissions.retry_attempts > 1 {
            errors.push(format!(
                "permissions.retry_attempts must be 0 or 1, got {}",
                self.permissions.retry_attempts
            ));
        }
        if self.session.user_file.trim().is_empty() || self.session.token_file.trim().is_empty() {
            errors.push("session.user_file and session.token_file must not be empty".to_string());
        }
        if self.session.user_file == self.session.token_file {
            errors.push("session.user_file and session.token_file must differ".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
