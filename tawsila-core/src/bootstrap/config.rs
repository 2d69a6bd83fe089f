//! Configuration loading

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::Config;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "TAWSILA_CONFIG_PATH";

/// Pick the config file to read
///
/// Search order:
/// 1. `explicit` (command line)
/// 2. `TAWSILA_CONFIG_PATH`
/// 3. ./config.yaml
///
/// `None` means environment variables and defaults only.
#[must_use]
pub fn resolve_config_path(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            let cwd = "config.yaml";
            Path::new(cwd).exists().then(|| cwd.to_string())
        })
}

/// Load and validate configuration
///
/// Runs before logging is initialized, so progress goes to stderr.
pub fn load_config(explicit: Option<&str>) -> Result<Config> {
    if let Some(path) = explicit.filter(|p| !Path::new(p).exists()) {
        anyhow::bail!("Config file {path} does not exist");
    }

    let config = match resolve_config_path(explicit) {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {path}: {e}"))?
        }
        None => Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config from environment: {e}");
            eprintln!("Using default configuration");
            Config::default()
        }),
    };

    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!("Configuration loaded and validated successfully");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tawsila.yaml");
        std::fs::write(&path, "permissions:\n  stale_time_seconds: 5\n").unwrap();

        let path = path.to_str().unwrap();
        assert_eq!(resolve_config_path(Some(path)).as_deref(), Some(path));

        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.permissions.stale_time_seconds, 5);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(load_config(Some(path.to_str().unwrap())).is_err());
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "logging:\n  level: info\n  format: xml\n").unwrap();

        let err = load_config(Some(path.to_str().unwrap())).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }
}
