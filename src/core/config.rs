//! Configuration management for Charter.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the per-project state directory.
pub const PROJECT_DIR: &str = ".charter";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Governance switches
    pub governance: GovernanceConfig,

    /// Forecast tuning
    pub forecast: ForecastConfig,

    /// External plan decomposition
    pub ai: AiConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Actor recorded on journal events (falls back to $USER)
    pub actor: Option<String>,
}

/// Governance settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Refuse to start tasks until the plan is approved
    pub require_approved_plan: bool,
}

/// Forecast settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Recent velocity window, in days
    pub short_window_days: u32,

    /// Baseline velocity window, in days
    pub long_window_days: u32,

    /// Relative difference needed to call a trend
    pub trend_margin: f64,

    /// Completions needed for full confidence
    pub confidence_saturation: u32,

    /// Maximum days projected forward in the burndown
    pub projection_limit_days: u32,

    /// Maximum days of history in the burndown
    pub history_limit_days: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            short_window_days: 7,
            long_window_days: 14,
            trend_margin: 0.10,
            confidence_saturation: 20,
            projection_limit_days: 90,
            history_limit_days: 30,
        }
    }
}

/// External decomposition command settings.
///
/// The command receives the spec as JSON on stdin and prints a JSON
/// object `{"tasks": [...], "tokens_used": N}` on stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Program to run
    pub command: Option<String>,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Timeout in seconds (0 = none)
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration for a project.
    ///
    /// Looks for config in:
    /// 1. `<root>/.charter/config.toml`
    /// 2. `~/.config/charter/config.toml`
    /// 3. Falls back to defaults
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let local_config = Self::project_config_path(project_root);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration into the project directory.
    pub fn save(&self, project_root: &Path) -> anyhow::Result<()> {
        let path = Self::project_config_path(project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the forecast engine cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let f = &self.forecast;
        if f.short_window_days == 0 || f.long_window_days == 0 {
            anyhow::bail!("forecast windows must be at least one day");
        }
        if f.short_window_days > f.long_window_days {
            anyhow::bail!(
                "forecast.short_window_days ({}) must not exceed long_window_days ({})",
                f.short_window_days,
                f.long_window_days
            );
        }
        if !(0.0..1.0).contains(&f.trend_margin) {
            anyhow::bail!("forecast.trend_margin must be within [0, 1)");
        }
        Ok(())
    }

    /// Actor to record on events.
    pub fn actor(&self) -> String {
        self.general
            .actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Path of the project-local config file.
    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(PROJECT_DIR).join("config.toml")
    }

    /// Get the global config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("charter"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.forecast.short_window_days, 7);
        assert_eq!(config.forecast.long_window_days, 14);
        assert!(!config.governance.require_approved_plan);
        assert!(config.ai.command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserialization() {
        let toml_str = r#"
            [general]
            actor = "ana"

            [forecast]
            short_window_days = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.actor(), "ana");
        assert_eq!(config.forecast.short_window_days, 3);
        assert_eq!(config.forecast.long_window_days, 14);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.ai.command = Some("decompose".to_string());
        config.ai.args = vec!["--json".to_string()];

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[ai]"));
        assert!(toml_str.contains("command = \"decompose\""));

        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_inverted_windows() {
        let mut config = Config::default();
        config.forecast.short_window_days = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_project_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.governance.require_approved_plan = true;
        config.save(temp.path()).unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert!(loaded.governance.require_approved_plan);
    }
}
