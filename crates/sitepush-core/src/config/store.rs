//! Settings store for loading and saving sitepush.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Settings, parser, paths::config_path_for_project};

#[derive(Debug, Clone)]
pub struct SettingsStore {
    config_path: PathBuf,
}

impl SettingsStore {
    /// Store for `sitepush.toml` in the current working directory.
    pub fn from_cwd() -> anyhow::Result<Self> {
        let project_root = std::env::current_dir()?;
        Ok(Self::from_path(config_path_for_project(&project_root)))
    }

    pub fn from_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load the settings; a missing file yields defaults.
    pub fn load(&self) -> anyhow::Result<Settings> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "no config file, using defaults");
            return Ok(Settings::new());
        }
        parser::parse_settings_toml(&self.config_path)
    }

    pub fn save(&self, settings: &Settings) -> anyhow::Result<()> {
        let content = parser::to_toml(settings).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })?;
        tracing::debug!(path = %self.config_path.display(), "saved config");
        Ok(())
    }
}
