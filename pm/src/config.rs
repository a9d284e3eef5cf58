//! projmaker configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the template root directory
pub const TEMPLATES_ENV: &str = "PM_TEMPLATES";

/// Main projmaker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template resolution
    pub templates: TemplatesConfig,

    /// Update workflow knobs
    pub update: UpdateConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .projmaker.yml
        let local_config = PathBuf::from(".projmaker.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/projmaker/projmaker.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("projmaker").join("projmaker.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// The resolved template root: environment override, else the configured directory
    pub fn template_root(&self) -> PathBuf {
        match std::env::var(TEMPLATES_ENV) {
            Ok(value) if !value.is_empty() => PathBuf::from(value),
            _ => self.templates.root.clone(),
        }
    }

    /// How many commits below the creation tag the pre-generation point sits
    ///
    /// The single place the spacer-commit flag turns into a history offset.
    pub fn history_offset(&self) -> u32 {
        if self.update.spacer_commit { 2 } else { 1 }
    }
}

/// Template resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory holding one template tree per generator kind
    pub root: PathBuf,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("templates"),
        }
    }
}

/// Update workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Follow each generation commit with an empty spacer commit
    #[serde(rename = "spacer-commit")]
    pub spacer_commit: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self { spacer_commit: false }
    }
}
