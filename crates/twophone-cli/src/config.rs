//! twophone CLI configuration
//!
//! A single TOML document with one table per layer: `[orchestrator]` (which
//! nests `[orchestrator.session]` and `[orchestrator.retry]`), `[ble]` and
//! `[storage]`. Missing keys fall back to defaults, so an empty file is valid.
//! Command-line flags override what the file says.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twophone_ble::BleTransportConfig;
use twophone_core::OrchestratorConfig;

use crate::error::{CliError, Result};

const APP_DIR: &str = "twophone";
const CONFIG_FILE: &str = "config.toml";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the `twophone` binary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub ble: BleTransportConfig,
    pub storage: StorageConfig,
}

/// Where persistent state lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the device store; defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
    /// File name of the device store inside `data_dir`
    pub store_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            store_file: "devices.json".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            info!(path = %path.display(), "loading configuration");
            return Self::load_from_file(path);
        }

        match Self::default_config_path() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading configuration");
                Self::load_from_file(path)
            }
            _ => {
                info!("using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// `<config dir>/twophone/config.toml`, when the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Replace the data directory, as `--data-dir` does
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.storage.data_dir = Some(dir.into());
        self
    }

    /// Resolved directory for persistent state
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(APP_DIR))
                .ok_or_else(|| CliError::Config("no platform data directory; pass --data-dir".into())),
        }
    }

    /// Full path of the device store file
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.store_file))
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate()?;
        self.ble.validate().map_err(CliError::Config)?;
        if self.storage.store_file.trim().is_empty() {
            return Err(CliError::Config("storage.store_file must not be empty".into()));
        }
        Ok(())
    }

    /// Default configuration rendered as TOML
    pub fn example_config() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use twophone_core::{FailureKind, FrameFormat, OperatingSystem};

    #[test]
    fn test_empty_document_is_default() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_parses_back() {
        let rendered = AppConfig::example_config().unwrap();
        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_nested_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
            [orchestrator]
            rescan_delay_ms = 500

            [orchestrator.session]
            local_os = "android"
            frame_format = "extended"
            max_frame_len = 100000

            [orchestrator.retry]
            retryable = ["timeout"]
            requeue_on_link_loss = true

            [ble]
            write_chunk_size = 20

            [storage]
            store_file = "paired.json"
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.orchestrator.rescan_delay(), Duration::from_millis(500));
        assert_eq!(config.orchestrator.session.local_os, OperatingSystem::Android);
        assert_eq!(config.orchestrator.session.frame_format, FrameFormat::Extended);
        assert!(config.orchestrator.retry.is_retryable(FailureKind::Timeout));
        assert!(!config.orchestrator.retry.is_retryable(FailureKind::ConnectFailed));
        assert_eq!(config.ble.write_chunk_size, 20);
        assert_eq!(config.storage.store_file, "paired.json");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config: AppConfig = toml::from_str("[ble]\nwrite_chunk_size = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        let config: AppConfig =
            toml::from_str("[orchestrator.session]\nreply_timeout_ms = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(CliError::Core(_))));
    }

    #[test]
    fn test_data_dir_override() {
        let config = AppConfig::default().with_data_dir("/var/lib/twophone");
        assert_eq!(
            config.store_path().unwrap(),
            PathBuf::from("/var/lib/twophone/devices.json")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\nstore_file = \"x.json\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.store_file, "x.json");
        assert!(AppConfig::load_from_file(dir.path().join("missing.toml")).is_err());
    }
}
