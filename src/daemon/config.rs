//! Engine configuration
//!
//! Configuration is loaded from JSON, TOML or YAML files, chosen by file
//! extension, and validated before use.

use crate::context::{InterfaceKind, RawOptions};
use crate::{RawError, Result, DEFAULT_MAX_ASSIGNMENTS, RAW_DTIMS_FOR_PRAW_TX};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// General settings
    pub general: GeneralConfig,
    /// RAW engine settings
    pub raw: RawConfig,
}

/// General configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Instance name
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interface the engine is attached to
    pub interface_kind: InterfaceKind,
}

/// RAW engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Enable RAW on start
    pub enabled_on_start: bool,
    /// DTIM period in beacons
    pub dtim_period: u8,
    /// DTIM periods to keep retransmitting PRAWs after a change
    pub praw_dtims_for_tx: u16,
    /// Maximum assignments in one RPS element
    pub max_assignments: usize,
    /// Warning rate limit window (ms)
    pub warn_interval_ms: u64,
    /// Warnings allowed per window
    pub warn_burst: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "s1g-raw".to_string(),
            log_level: "info".to_string(),
            interface_kind: InterfaceKind::AccessPoint,
        }
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            enabled_on_start: true,
            dtim_period: 1,
            praw_dtims_for_tx: RAW_DTIMS_FOR_PRAW_TX,
            max_assignments: DEFAULT_MAX_ASSIGNMENTS,
            warn_interval_ms: 5000,
            warn_burst: 10,
        }
    }
}

impl RawConfig {
    /// Options for a RAW context
    pub fn to_options(&self) -> RawOptions {
        RawOptions {
            enabled: self.enabled_on_start,
            dtim_period: self.dtim_period,
            praw_dtims_for_tx: self.praw_dtims_for_tx,
            max_assignments: self.max_assignments,
            warn_interval: Duration::from_millis(self.warn_interval_ms),
            warn_burst: self.warn_burst,
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether configuration is valid
    pub valid: bool,
    /// Validation errors
    pub errors: Vec<String>,
    /// Validation warnings
    pub warnings: Vec<String>,
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            _ => Err(RawError::Config(format!(
                "Unsupported config file format: {}",
                path.display()
            ))),
        }
    }
}

/// Configuration manager
#[derive(Debug, Default)]
pub struct ConfigManager {
    /// Current configuration
    config: EngineConfig,
    /// Path to configuration file
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager with config
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RawError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EngineConfig = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::from_str(&content)
                .map_err(|e| RawError::Config(format!("Failed to parse JSON config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&content)
                .map_err(|e| RawError::Config(format!("Failed to parse TOML config: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| RawError::Config(format!("Failed to parse YAML config: {}", e)))?,
        };

        let manager = Self {
            config,
            config_path: Some(path.to_path_buf()),
        };
        let validation = manager.validate_config(&manager.config);
        for warning in &validation.warnings {
            log::warn!("{}", warning);
        }
        if !validation.valid {
            return Err(RawError::Config(format!(
                "Configuration validation failed: {}",
                validation.errors.join(", ")
            )));
        }
        Ok(manager)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => self.to_json()?,
            ConfigFormat::Toml => self.to_toml()?,
            ConfigFormat::Yaml => self.to_yaml()?,
        };

        fs::write(path, content)
            .map_err(|e| RawError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Get current configuration
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Path the configuration was loaded from
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Update configuration
    pub fn update_config(&mut self, new_config: EngineConfig) -> Result<()> {
        let validation = self.validate_config(&new_config);
        if !validation.valid {
            return Err(RawError::Config(format!(
                "Configuration validation failed: {}",
                validation.errors.join(", ")
            )));
        }
        self.config = new_config;
        Ok(())
    }

    /// Validate configuration
    pub fn validate_config(&self, config: &EngineConfig) -> ValidationResult {
        let mut result = ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        if config.general.name.is_empty() {
            result.errors.push("Name cannot be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.general.log_level.as_str()) {
            result.errors.push(format!(
                "Invalid log level '{}', must be one of: {}",
                config.general.log_level,
                valid_levels.join(", ")
            ));
        }

        if config.general.interface_kind != InterfaceKind::AccessPoint {
            result.errors.push(format!(
                "RAW requires an access point interface, got {:?}",
                config.general.interface_kind
            ));
        }

        if config.raw.dtim_period == 0 {
            result.errors.push("DTIM period cannot be 0".to_string());
        }

        if config.raw.max_assignments == 0 {
            result.errors.push("Max assignments cannot be 0".to_string());
        } else if config.raw.max_assignments > DEFAULT_MAX_ASSIGNMENTS {
            result.warnings.push(format!(
                "Max assignments {} may exceed the RPS element size limit",
                config.raw.max_assignments
            ));
        }

        if config.raw.praw_dtims_for_tx == 0 {
            result.warnings.push("PRAW retransmission disabled, PRAW-only setups will never be advertised".to_string());
        }

        if config.raw.warn_burst == 0 {
            result.warnings.push("Warning burst is 0, rate limited warnings are suppressed".to_string());
        }

        result.valid = result.errors.is_empty();
        result
    }

    /// Reload configuration from file
    pub fn reload(&mut self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .ok_or_else(|| RawError::Config("No config file path set".to_string()))?;
        let new_manager = Self::load_from_file(path)?;
        self.update_config(new_manager.config)
    }

    /// Get configuration as JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.config)
            .map_err(|e| RawError::Config(format!("Failed to serialize config to JSON: {}", e)))
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config)
            .map_err(|e| RawError::Config(format!("Failed to serialize config to TOML: {}", e)))
    }

    /// Get configuration as YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.config)
            .map_err(|e| RawError::Config(format!("Failed to serialize config to YAML: {}", e)))
    }
}
