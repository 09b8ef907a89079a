//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.dreamweaver.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = ".dreamweaver.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// How many recent records each statistic looks at.
    #[serde(default)]
    pub window: WindowConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Journal owner.
    #[serde(default = "default_user")]
    pub user_id: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            user_id: default_user(),
            verbose: false,
        }
    }
}

fn default_user() -> String {
    "local-user".to_string()
}

/// Which record store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON files in a local directory
    #[default]
    Local,
    /// Hosted REST API
    Remote,
}

/// Storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Directory for the local JSON store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the hosted API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    /// API key for the hosted API. Prefer the DREAMWEAVER_API_KEY env var.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Session token of the signed-in user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            data_dir: default_data_dir(),
            remote_url: None,
            api_key: None,
            access_token: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".dreamweaver")
}

fn default_timeout() -> u64 {
    30
}

/// Record windows. The dashboard and coach look at short windows, the
/// sleep tracker at a month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Dreams considered for quality statistics.
    #[serde(default = "default_dream_limit")]
    pub dream_limit: usize,

    /// Sleep records considered for insights.
    #[serde(default = "default_sleep_limit")]
    pub sleep_limit: usize,

    /// Sleep records shown in the tracker summary.
    #[serde(default = "default_tracker_limit")]
    pub tracker_limit: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            dream_limit: default_dream_limit(),
            sleep_limit: default_sleep_limit(),
            tracker_limit: default_tracker_limit(),
        }
    }
}

fn default_dream_limit() -> usize {
    10
}

fn default_sleep_limit() -> usize {
    7
}

fn default_tracker_limit() -> usize {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include emotion and tag distributions.
    #[serde(default = "default_true")]
    pub include_distributions: bool,

    /// Number of recent dreams listed.
    #[serde(default = "default_recent_dreams")]
    pub recent_dreams: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_distributions: true,
            recent_dreams: default_recent_dreams(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_recent_dreams() -> usize {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given explicitly on the command line (or through their
    /// environment variables) override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref user) = args.user {
            self.general.user_id = user.clone();
        }
        if let Some(backend) = args.backend {
            self.storage.backend = backend;
        }
        if let Some(ref dir) = args.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(ref url) = args.remote_url {
            self.storage.remote_url = Some(url.clone());
        }
        if let Some(ref key) = args.api_key {
            self.storage.api_key = Some(key.clone());
        }
        if let Some(ref token) = args.access_token {
            self.storage.access_token = Some(token.clone());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.user_id, "local-user");
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(config.window.dream_limit, 10);
        assert_eq!(config.window.sleep_limit, 7);
        assert_eq!(config.window.tracker_limit, 30);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
user_id = "alice"
verbose = true

[storage]
backend = "remote"
remote_url = "https://example.supabase.co"

[window]
sleep_limit = 14
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.user_id, "alice");
        assert!(config.general.verbose);
        assert_eq!(config.storage.backend, BackendKind::Remote);
        assert_eq!(
            config.storage.remote_url.as_deref(),
            Some("https://example.supabase.co")
        );
        assert_eq!(config.storage.data_dir, PathBuf::from(".dreamweaver"));
        assert_eq!(config.window.sleep_limit, 14);
        assert_eq!(config.window.dream_limit, 10);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config: Config = toml::from_str(
            r#"
[general]
user_id = "alice"

[storage]
data_dir = "/var/lib/dreams"
"#,
        )
        .unwrap();

        let args =
            crate::cli::Args::try_parse_from(["dreamweaver", "--user", "bob", "challenges"])
                .unwrap();
        config.merge_with_args(&args);

        assert_eq!(config.general.user_id, "bob");
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/dreams"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[window]"));
    }
}
