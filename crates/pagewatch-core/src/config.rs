//! Configuration management for pagewatch.
//!
//! Settings come from three layers, each overriding the previous one:
//!
//! 1. **Built-in defaults** ([`Config::default`])
//! 2. **TOML file**: `$PAGEWATCH_CONFIG`, or `config.toml` in the platform
//!    config directory
//! 3. **Environment variables** ([`Config::apply_env_overrides`])
//!
//! The CLI applies its own flags on top. The change detector itself never
//! reads the environment; it receives a [`DetectionConfig`] explicitly.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [detection]
//! etag_check_enabled = true
//! content_hash_check_enabled = true
//! normalized_hash_check_enabled = true
//!
//! [http]
//! timeout_secs = 30
//! user_agent = "pagewatch/0.4.0"
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [paths]
//! root = "executions"
//! ```

use crate::{Error, Result, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PAGEWATCH_CONFIG";
/// Environment variable overriding the storage root.
pub const DATA_DIR_ENV: &str = "PAGEWATCH_DATA_DIR";
/// Environment toggle for the validator (`ETag`) tier.
pub const ETAG_CHECK_ENV: &str = "ENABLE_ETAG_CHECK";
/// Environment toggle for raw-content hash comparison.
pub const CONTENT_HASH_CHECK_ENV: &str = "ENABLE_CONTENT_HASH_CHECK";
/// Environment toggle for normalized-content hash comparison.
pub const NORMALIZED_HASH_CHECK_ENV: &str = "ENABLE_NORMALIZED_HASH_CHECK";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change detection toggles.
    pub detection: DetectionConfig,
    /// HTTP client settings.
    pub http: HttpConfig,
    /// Retry policy for transport calls.
    pub retry: RetryPolicy,
    /// Storage locations.
    pub paths: PathsConfig,
}

/// Toggles consumed by the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Skip the download when the validator token is unchanged.
    pub etag_check_enabled: bool,
    /// Compare raw-content digests during classification.
    pub content_hash_check_enabled: bool,
    /// Compare normalized-content digests, including the early probe made
    /// when the origin sends no validator token.
    pub normalized_hash_check_enabled: bool,
    /// Always download and classify, bypassing both skip tiers.
    pub force_download: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            etag_check_enabled: true,
            content_hash_check_enabled: true,
            normalized_hash_check_enabled: true,
            force_download: false,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("pagewatch/", env!("CARGO_PKG_VERSION")).to_string(),
            verify_tls: true,
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root directory holding `metadata/` and `content/`.
    pub root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("executions"),
        }
    }
}

impl Config {
    /// Load configuration from `$PAGEWATCH_CONFIG` or the platform config
    /// directory, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            let trimmed = explicit.trim();
            if !trimmed.is_empty() {
                return Self::load_from(Path::new(trimmed));
            }
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config {}: {e}", path.display()))
        })
    }

    /// Write configuration as TOML, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Platform config file location, e.g. `~/.config/pagewatch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "pagewatch", "pagewatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Boolean toggles accept `true`/`false`, `1`/`0` and `yes`/`no`
    /// (case-insensitive). Anything else is a configuration error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ETAG_CHECK_ENV) {
            self.detection.etag_check_enabled = parse_toggle(ETAG_CHECK_ENV, &value)?;
        }
        if let Some(value) = lookup(CONTENT_HASH_CHECK_ENV) {
            self.detection.content_hash_check_enabled =
                parse_toggle(CONTENT_HASH_CHECK_ENV, &value)?;
        }
        if let Some(value) = lookup(NORMALIZED_HASH_CHECK_ENV) {
            self.detection.normalized_hash_check_enabled =
                parse_toggle(NORMALIZED_HASH_CHECK_ENV, &value)?;
        }
        if let Some(dir) = lookup(DATA_DIR_ENV) {
            let trimmed = dir.trim();
            if !trimmed.is_empty() {
                self.paths.root = PathBuf::from(trimmed);
            }
        }
        Ok(())
    }
}

fn parse_toggle(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!(
            "{key} must be true or false, got '{other}'"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert!(config.detection.etag_check_enabled);
        assert!(config.detection.content_hash_check_enabled);
        assert!(config.detection.normalized_hash_check_enabled);
        assert!(!config.detection.force_download);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("pagewatch/"));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.paths.root, PathBuf::from("executions"));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() -> Result<()> {
        let temp_dir = TempDir::new().map_err(|e| Error::Config(e.to_string()))?;
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.detection.etag_check_enabled = false;
        original.retry = RetryPolicy::immediate(1);
        original.paths.root = PathBuf::from("/srv/pagewatch");

        original.save_to(&path)?;
        let loaded = Config::load_from(&path)?;

        assert_eq!(loaded, original);
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp_dir = TempDir::new().map_err(|e| Error::Config(e.to_string()))?;
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[retry]\nbase_delay_ms = 0\n").unwrap();

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.retry.base_delay_ms, 0);
        assert_eq!(loaded.retry.max_retries, 3);
        assert!(loaded.detection.etag_check_enabled);
        Ok(())
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("invalid.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        match Config::load_from(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse config")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Config::load_from(Path::new("/definitely/does/not/exist/config.toml"));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Failed to read config")));
    }

    #[test]
    fn test_env_overrides_toggle_checks() -> Result<()> {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            (ETAG_CHECK_ENV, "false"),
            (CONTENT_HASH_CHECK_ENV, "FALSE"),
            (NORMALIZED_HASH_CHECK_ENV, "0"),
            (DATA_DIR_ENV, " /tmp/pagewatch "),
        ]))?;

        assert!(!config.detection.etag_check_enabled);
        assert!(!config.detection.content_hash_check_enabled);
        assert!(!config.detection.normalized_hash_check_enabled);
        assert_eq!(config.paths.root, PathBuf::from("/tmp/pagewatch"));
        Ok(())
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup_from(&[(ETAG_CHECK_ENV, "maybe")]));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains(ETAG_CHECK_ENV)));
    }
}
