//! Configuration management for Astrochat
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AstroChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Astrochat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend REST API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Chat connection settings
    #[serde(default)]
    pub chat: ChatConfig,
    /// Credential storage settings
    #[serde(default)]
    pub auth: AuthConfig,
    /// Hosted checkout return URLs
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Backend REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the backend (`http://` or `https://`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_api_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_api_timeout(),
        }
    }
}

impl ApiConfig {
    /// Per-request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Chat connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Path of the chat WebSocket endpoint, appended to `api.base_url`
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Reconnect backoff settings
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Optional deadline for an assistant reply (seconds)
    ///
    /// Unset means a pending send waits until a frame arrives or the
    /// connection closes.
    #[serde(default)]
    pub response_timeout_seconds: Option<u64>,
}

fn default_ws_path() -> String {
    "/api/chat/ws".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ws_path: default_ws_path(),
            reconnect: ReconnectConfig::default(),
            response_timeout_seconds: None,
        }
    }
}

impl ChatConfig {
    /// Response timeout as a [`Duration`], if configured
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_seconds.map(Duration::from_secs)
    }
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Attempts allowed before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Which credential backend holds the session tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    /// OS native keyring
    #[default]
    Keyring,
    /// Process memory only (lost on exit).
    ///
    /// Meant for tests and one-shot embedding; a login made by one
    /// `astrochat` invocation is gone by the next.
    Memory,
}

impl TokenStoreKind {
    /// Whether tokens saved by one process are visible to the next.
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Keyring)
    }
}

impl std::str::FromStr for TokenStoreKind {
    type Err = AstroChatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(AstroChatError::Config(format!(
                "Invalid token store: {}. Must be one of: keyring, memory",
                other
            ))),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token store backend
    #[serde(default)]
    pub token_store: TokenStoreKind,

    /// Keyring service name the tokens are filed under
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
}

fn default_keyring_service() -> String {
    "astrochat".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_store: TokenStoreKind::default(),
            keyring_service: default_keyring_service(),
        }
    }
}

/// Hosted checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Where the payment processor sends the user after paying
    #[serde(default = "default_success_url")]
    pub success_url: String,

    /// Where the payment processor sends the user after cancelling
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

fn default_success_url() -> String {
    "http://localhost:3000/billing/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/billing/cancel".to_string()
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

impl Config {
    /// Default location of the config file
    ///
    /// Resolves to `<platform config dir>/astrochat/config.yaml`, falling
    /// back to `config.yaml` in the working directory when no home
    /// directory can be determined.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "astrochat")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml"))
    }

    /// Load configuration from file, env vars, and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML config file
    /// * `cli` - Parsed CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &Path, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AstroChatError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AstroChatError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("ASTROCHAT_API_URL") {
            self.api.base_url = url;
        }

        if let Ok(path) = std::env::var("ASTROCHAT_WS_PATH") {
            self.chat.ws_path = path;
        }

        if let Ok(timeout) = std::env::var("ASTROCHAT_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.api.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid ASTROCHAT_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(attempts) = std::env::var("ASTROCHAT_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(value) = attempts.parse() {
                self.chat.reconnect.max_attempts = value;
            } else {
                tracing::warn!("Invalid ASTROCHAT_MAX_RECONNECT_ATTEMPTS: {}", attempts);
            }
        }

        if let Ok(timeout) = std::env::var("ASTROCHAT_RESPONSE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.chat.response_timeout_seconds = Some(value);
            } else {
                tracing::warn!("Invalid ASTROCHAT_RESPONSE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(kind) = std::env::var("ASTROCHAT_TOKEN_STORE") {
            match kind.parse() {
                Ok(value) => self.auth.token_store = value,
                Err(e) => tracing::warn!("Ignoring ASTROCHAT_TOKEN_STORE: {}", e),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(url) = &cli.api_url {
            self.api.base_url = url.clone();
        }
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url).map_err(|e| {
            AstroChatError::Config(format!("Invalid api.base_url '{}': {}", self.api.base_url, e))
        })?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(AstroChatError::Config(format!(
                "api.base_url must use http or https, got: {}",
                base.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(AstroChatError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if !self.chat.ws_path.starts_with('/') {
            return Err(AstroChatError::Config(format!(
                "chat.ws_path must start with '/', got: {}",
                self.chat.ws_path
            ))
            .into());
        }

        let reconnect = &self.chat.reconnect;
        if reconnect.max_attempts == 0 {
            return Err(AstroChatError::Config(
                "chat.reconnect.max_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if reconnect.base_delay_ms == 0 || reconnect.base_delay_ms > reconnect.max_delay_ms {
            return Err(AstroChatError::Config(format!(
                "chat.reconnect.base_delay_ms must be in 1..={}",
                reconnect.max_delay_ms
            ))
            .into());
        }

        if self.chat.response_timeout_seconds == Some(0) {
            return Err(AstroChatError::Config(
                "chat.response_timeout_seconds must be greater than 0 when set".to_string(),
            )
            .into());
        }

        if self.auth.keyring_service.trim().is_empty() {
            return Err(
                AstroChatError::Config("auth.keyring_service cannot be empty".to_string()).into(),
            );
        }

        if !self.auth.token_store.is_persistent() {
            tracing::warn!(
                "auth.token_store is memory: credentials are not kept between runs, \
                 so `auth login` will not carry over to later commands"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn cli(args: &[&str]) -> crate::cli::Cli {
        let mut full = vec!["astrochat"];
        full.extend_from_slice(args);
        if args.is_empty() {
            full.extend_from_slice(&["auth", "whoami"]);
        }
        crate::cli::Cli::parse_from(full)
    }

    #[test]
    fn test_only_keyring_store_persists() {
        assert!(TokenStoreKind::Keyring.is_persistent());
        assert!(!TokenStoreKind::Memory.is_persistent());
    }

    #[test]
    fn test_memory_token_store_still_validates() {
        let mut config = Config::default();
        config.auth.token_store = TokenStoreKind::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.chat.ws_path, "/api/chat/ws");
        assert_eq!(config.chat.reconnect.max_attempts, 5);
        assert_eq!(config.chat.reconnect.max_delay_ms, 30_000);
        assert!(config.chat.response_timeout_seconds.is_none());
        assert_eq!(config.auth.token_store, TokenStoreKind::Keyring);
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_scheme() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unparseable_url() {
        let mut config = Config::default();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_attempts() {
        let mut config = Config::default();
        config.chat.reconnect.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_base_delay_above_cap() {
        let mut config = Config::default();
        config.chat.reconnect.base_delay_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ws_path_without_slash() {
        let mut config = Config::default();
        config.chat.ws_path = "ws".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
api:
  base_url: https://api.example.com
  timeout_seconds: 10
chat:
  ws_path: /ws/chat
  reconnect:
    base_delay_ms: 500
    max_attempts: 3
  response_timeout_seconds: 90
auth:
  token_store: memory
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.timeout_seconds, 10);
        assert_eq!(config.chat.ws_path, "/ws/chat");
        assert_eq!(config.chat.reconnect.base_delay_ms, 500);
        assert_eq!(config.chat.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.chat.reconnect.max_attempts, 3);
        assert_eq!(config.chat.response_timeout(), Some(Duration::from_secs(90)));
        assert_eq!(config.auth.token_store, TokenStoreKind::Memory);
        assert_eq!(config.auth.keyring_service, "astrochat");
    }

    #[test]
    fn test_token_store_kind_from_str() {
        assert_eq!("KEYRING".parse::<TokenStoreKind>().unwrap(), TokenStoreKind::Keyring);
        assert_eq!("memory".parse::<TokenStoreKind>().unwrap(), TokenStoreKind::Memory);
        assert!("file".parse::<TokenStoreKind>().is_err());
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let config = Config::load(&dir.path().join("absent.yaml"), &cli(&[])).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8000");
    }

    #[test]
    #[serial]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api:\n  base_url: https://stars.example.com\n").unwrap();

        let config = Config::load(&path, &cli(&[])).unwrap();
        assert_eq!(config.api.base_url, "https://stars.example.com");
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api: [unterminated").unwrap();

        let err = Config::load(&path, &cli(&[])).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("ASTROCHAT_API_URL", "https://env.example.com");
        std::env::set_var("ASTROCHAT_MAX_RECONNECT_ATTEMPTS", "7");
        std::env::set_var("ASTROCHAT_RESPONSE_TIMEOUT_SECONDS", "45");
        std::env::set_var("ASTROCHAT_TOKEN_STORE", "memory");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("ASTROCHAT_API_URL");
        std::env::remove_var("ASTROCHAT_MAX_RECONNECT_ATTEMPTS");
        std::env::remove_var("ASTROCHAT_RESPONSE_TIMEOUT_SECONDS");
        std::env::remove_var("ASTROCHAT_TOKEN_STORE");

        assert_eq!(config.api.base_url, "https://env.example.com");
        assert_eq!(config.chat.reconnect.max_attempts, 7);
        assert_eq!(config.chat.response_timeout_seconds, Some(45));
        assert_eq!(config.auth.token_store, TokenStoreKind::Memory);
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_ignored() {
        std::env::set_var("ASTROCHAT_MAX_RECONNECT_ATTEMPTS", "lots");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("ASTROCHAT_MAX_RECONNECT_ATTEMPTS");

        assert_eq!(config.chat.reconnect.max_attempts, 5);
    }

    #[test]
    #[serial]
    fn test_cli_api_url_override_wins() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "api:\n  base_url: https://file.example.com\n").unwrap();

        let config = Config::load(
            &path,
            &cli(&["--api-url", "https://cli.example.com", "auth", "whoami"]),
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://cli.example.com");
    }
}
