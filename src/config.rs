// Configuration management for sourceindex

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "sourceindex.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub analyzers: BTreeMap<String, AnalyzerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("sourceindex.db"),
            pool_size: 4,
            busy_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub allow_self_registration: bool,
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:0".to_string(),
            allow_self_registration: true,
            idle_timeout_secs: 600,
            reap_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// An out-of-process language analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub description: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a directory
    /// Looks for sourceindex.toml in the directory, falls back to defaults
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(CONFIG_FILE_NAME);

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::debug!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Load an explicit config file, or look in the working directory.
    /// An explicit file that fails to load is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path)
                .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e)),
            None => Ok(Self::from_dir(".")),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate store settings
        if self.store.database.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Database path cannot be empty"));
        }
        if self.store.pool_size == 0 {
            return Err(anyhow::anyhow!("Pool size must be greater than 0"));
        }

        // Validate retry settings
        if self.retry.max_attempts == 0 {
            return Err(anyhow::anyhow!("Retry attempts must be greater than 0"));
        }
        if self.retry.initial_backoff_ms == 0 {
            return Err(anyhow::anyhow!("Initial backoff must be greater than 0"));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(anyhow::anyhow!(
                "Max backoff ({}ms) cannot be below initial backoff ({}ms)",
                self.retry.max_backoff_ms,
                self.retry.initial_backoff_ms
            ));
        }

        // Validate server settings
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("Invalid bind address: {}", self.server.bind));
        }
        if self.server.reap_interval_secs == 0 {
            return Err(anyhow::anyhow!("Reap interval must be greater than 0"));
        }

        // Validate logging
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "full"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!("Invalid log format: {}", self.logging.format));
        }

        // Validate analyzers
        for (language, analyzer) in &self.analyzers {
            if language.is_empty() || language.contains(':') {
                return Err(anyhow::anyhow!("Invalid analyzer language name: '{}'", language));
            }
            if analyzer.command.trim().is_empty() {
                return Err(anyhow::anyhow!("Analyzer '{}' has no command", language));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.database, PathBuf::from("sourceindex.db"));
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.server.bind, "127.0.0.1:0");
        assert!(config.server.allow_self_registration);
        assert!(config.analyzers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[retry]
max_attempts = 3

[analyzers.csharp]
command = "csharp-analyzer"
args = ["--fast"]
description = "C# front end"
"#,
        )
        .unwrap();

        let config = Config::from_dir(dir.path());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.store.pool_size, 4);
        let csharp = &config.analyzers["csharp"];
        assert_eq!(csharp.command, "csharp-analyzer");
        assert_eq!(csharp.args, vec!["--fast".to_string()]);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::from_dir(dir.path());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_explicit_file_must_load() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(Some(&missing)).is_err());

        let invalid = dir.path().join("bad.toml");
        std::fs::write(&invalid, "[store]\npool_size = 0\n").unwrap();
        assert!(Config::load(Some(&invalid)).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        config.store.pool_size = 0;
        assert!(config.validate().is_err());
        config.store.pool_size = 4;

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 8;

        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());
        config.retry.max_backoff_ms = 2000;

        config.server.bind = "not an address".to_string();
        assert!(config.validate().is_err());
        config.server.bind = "0.0.0.0:7777".to_string();

        config.server.reap_interval_secs = 0;
        assert!(config.validate().is_err());
        config.server.reap_interval_secs = 30;

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "info".to_string();

        config.logging.format = "json".to_string();
        assert!(config.validate().is_err());
        config.logging.format = "pretty".to_string();

        config.analyzers.insert("cpp".to_string(), AnalyzerConfig::default());
        assert!(config.validate().is_err());
        config.analyzers.get_mut("cpp").unwrap().command = "cpp-analyzer".to_string();

        assert!(config.validate().is_ok());
    }
}
