use anyhow::{Context, Result};
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::types::Settings;
use crate::utils::env_adapter::EnvAdapter;

pub const DATA_ROOT_ENV: &str = "GITGYM_DATA_ROOT";
pub const BIND_ENV: &str = "GITGYM_BIND";

/// Builds [`Settings`] from defaults, an optional TOML file and environment
/// overrides, in that order.
pub struct SettingsLoader {
    config_path: Option<PathBuf>,
}

impl SettingsLoader {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self { config_path }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gitgym").join("config.toml"))
    }

    pub fn load(&self) -> Result<Settings> {
        let mut settings = match &self.config_path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.is_file() => Self::read_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Settings::default()
                }
            },
        };

        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    fn read_file(path: &Path) -> Result<Settings> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings = Self::parse(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(settings)
    }

    pub fn parse(raw: &str) -> Result<Settings> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env_overrides(settings: &mut Settings) {
        if let Some(root) = EnvAdapter::override_value(DATA_ROOT_ENV) {
            debug!("{DATA_ROOT_ENV} overrides data root: {root}");
            settings.storage.data_root = PathBuf::from(root);
        }
        if let Some(bind) = EnvAdapter::override_value(BIND_ENV) {
            debug!("{BIND_ENV} overrides bind address: {bind}");
            settings.server.bind = bind;
        }
    }
}
