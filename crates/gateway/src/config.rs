//! Configuration management for the wsgate server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/wsgate/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workspace::AgentId;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind_addr must be a socket address like 127.0.0.1:7420, got {0}")]
    InvalidBindAddr(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("auth.token must be set (or provided via WSGATE_TOKEN)")]
    MissingToken,

    #[error("max_upload_bytes must be greater than 0")]
    InvalidMaxUploadBytes,

    #[error("max_text_bytes must be greater than 0")]
    InvalidMaxTextBytes,

    #[error("default_agent is not a valid agent id: {0}")]
    InvalidDefaultAgent(String),
}

/// Default cap on a text write body (16MB).
pub const DEFAULT_MAX_TEXT_BYTES: u64 = 16 * 1024 * 1024;

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the wsgate server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Listener and logging configuration.
    pub server: ServerConfig,

    /// Credentials accepted by the static token authority.
    pub auth: AuthConfig,

    /// Workspace storage configuration.
    pub workspace: WorkspaceConfig,
}

/// Listener and logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily-rolling log files. Console only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Static token credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared access token.
    pub token: String,

    /// Required username. Any username is accepted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Workspace storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one workspace per agent.
    pub base_dir: PathBuf,

    /// Agent used when a request carries no `agentId`.
    pub default_agent: String,

    /// Maximum multipart upload body size (default: 1GB).
    pub max_upload_bytes: u64,

    /// Maximum text write body size; text bodies are held in memory.
    pub max_text_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7420".to_string(),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            default_agent: protocol::DEFAULT_AGENT_ID.to_string(),
            max_upload_bytes: 1024 * 1024 * 1024, // 1GB
            max_text_bytes: DEFAULT_MAX_TEXT_BYTES,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wsgate")
        .join("config.toml")
}

/// Returns the default workspace base directory.
fn default_base_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wsgate")
        .join("workspaces")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - WSGATE_BIND_ADDR: Override listen address
    /// - WSGATE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - WSGATE_TOKEN: Override access token
    /// - WSGATE_WORKSPACE_DIR: Override workspace base directory
    pub fn apply_env_overrides(&mut self) {
        if let Some(addr) = non_empty_env("WSGATE_BIND_ADDR") {
            tracing::info!("Overriding bind_addr from environment: {}", addr);
            self.server.bind_addr = addr;
        }

        if let Some(level) = non_empty_env("WSGATE_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.server.log_level = level;
        }

        if let Some(token) = non_empty_env("WSGATE_TOKEN") {
            tracing::info!("Overriding auth token from environment");
            self.auth.token = token;
        }

        if let Some(dir) = non_empty_env("WSGATE_WORKSPACE_DIR") {
            tracing::info!("Overriding workspace base_dir from environment: {}", dir);
            self.workspace.base_dir = PathBuf::from(dir);
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let level = self.server.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.server.log_level.clone()));
        }

        if self.auth.token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if self.workspace.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidMaxUploadBytes);
        }

        if self.workspace.max_text_bytes == 0 {
            return Err(ConfigError::InvalidMaxTextBytes);
        }

        self.default_agent()?;

        Ok(())
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(self.server.bind_addr.clone()))
    }

    /// Parsed default agent id.
    pub fn default_agent(&self) -> Result<AgentId, ConfigError> {
        AgentId::parse(&self.workspace.default_agent)
            .map_err(|_| ConfigError::InvalidDefaultAgent(self.workspace.default_agent.clone()))
    }

    /// Copy of this configuration with the token masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.auth.token.is_empty() {
            config.auth.token = "<redacted>".to_string();
        }
        config
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Generate a random access token (32 bytes, hex encoded).
pub fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "WSGATE_BIND_ADDR",
        "WSGATE_LOG_LEVEL",
        "WSGATE_TOKEN",
        "WSGATE_WORKSPACE_DIR",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.token = "s3cret".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr, "127.0.0.1:7420");
        assert_eq!(config.server.log_level, "info");
        assert!(config.server.log_dir.is_none());
        assert!(config.auth.token.is_empty());
        assert!(config.auth.username.is_none());
        assert_eq!(config.workspace.default_agent, "main");
        assert_eq!(config.workspace.max_upload_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.workspace.max_text_bytes, 16 * 1024 * 1024);
        assert!(config.workspace.base_dir.to_string_lossy().contains("wsgate"));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[auth]
token = "abc"

[workspace]
max_upload_bytes = 1048576
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.auth.token, "abc");
        assert_eq!(config.workspace.max_upload_bytes, 1048576);
        assert_eq!(config.server.bind_addr, "127.0.0.1:7420");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[server]
bind_addr = "0.0.0.0:8080"
log_level = "debug"
log_dir = "/var/log/wsgate"

[auth]
token = "abc"
username = "admin"

[workspace]
base_dir = "/srv/wsgate"
default_agent = "research"
max_upload_bytes = 52428800
max_text_bytes = 65536
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.log_dir, Some(PathBuf::from("/var/log/wsgate")));
        assert_eq!(config.auth.username.as_deref(), Some("admin"));
        assert_eq!(config.workspace.base_dir, PathBuf::from("/srv/wsgate"));
        assert_eq!(config.workspace.default_agent, "research");
        assert_eq!(config.workspace.max_upload_bytes, 52428800);
        assert_eq!(config.workspace.max_text_bytes, 65536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nlog_level = \"debug\"\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[workspace]
max_upload_bytes = "lots"
"#;
        let err = Config::from_toml(toml).unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = valid_config();
        original.server.log_dir = Some(PathBuf::from("/tmp/logs"));
        original.auth.username = Some("admin".to_string());
        original.workspace.max_upload_bytes = 42;

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let original = valid_config();
        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("wsgate"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn test_validate_missing_token() {
        assert_eq!(Config::default().validate(), Err(ConfigError::MissingToken));
    }

    #[test]
    fn test_validate_bind_addr() {
        let mut config = valid_config();
        config.server.bind_addr = "localhost".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBindAddr("localhost".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = valid_config();
        config.server.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );

        config.server.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_upload_cap() {
        let mut config = valid_config();
        config.workspace.max_upload_bytes = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxUploadBytes));
    }

    #[test]
    fn test_validate_text_cap() {
        let mut config = valid_config();
        config.workspace.max_text_bytes = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxTextBytes));
    }

    #[test]
    fn test_validate_default_agent() {
        let mut config = valid_config();
        config.workspace.default_agent = "../root".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDefaultAgent("../root".to_string()))
        );
    }

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_redacted_hides_token() {
        let config = valid_config().redacted();
        assert_eq!(config.auth.token, "<redacted>");
        assert!(!config.to_toml().unwrap().contains("s3cret"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("WSGATE_BIND_ADDR", "0.0.0.0:9000");
        std::env::set_var("WSGATE_LOG_LEVEL", "debug");
        std::env::set_var("WSGATE_TOKEN", "from-env");
        std::env::set_var("WSGATE_WORKSPACE_DIR", "/srv/ws");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.auth.token, "from-env");
        assert_eq!(config.workspace.base_dir, PathBuf::from("/srv/ws"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("WSGATE_TOKEN", "");

        let mut config = valid_config();
        config.apply_env_overrides();

        assert_eq!(config.auth.token, "s3cret");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = valid_config();
        let original = config.clone();
        config.apply_env_overrides();

        assert_eq!(config, original);
    }
}
