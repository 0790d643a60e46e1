//! Ember Configuration
//!
//! Handles parsing of the optional ember.toml file and derivation of the
//! directories the module loader searches.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file searched for from the working directory up.
pub const CONFIG_FILE: &str = "ember.toml";

/// Environment variable overriding the secondary installation directory.
pub const TARGET_ENV: &str = "EMBER_TARGET";

/// Directory under `$HOME` used when no override is given.
pub const INSTALL_DIR_NAME: &str = ".ember";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching ember.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmberConfig {
    /// Event loop settings
    #[serde(default)]
    pub runtime: RuntimeSection,

    /// Module loader settings
    #[serde(default)]
    pub modules: ModulesSection,
}

impl EmberConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: EmberConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                return Ok(Self::default());
            }
        }
    }
}

/// Event loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Maximum number of events returned by one readiness wait
    #[serde(default = "default_loop_capacity")]
    pub loop_capacity: usize,
}

fn default_loop_capacity() -> usize {
    128
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            loop_capacity: default_loop_capacity(),
        }
    }
}

/// Module loader settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesSection {
    /// Secondary installation directory, used when EMBER_TARGET is unset
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
}

/// Directories consulted by the module loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    /// Base for top-level requires and for embedded resource names
    pub app_root: PathBuf,
    /// Last-resort location for script and JSON modules
    pub install_dir: PathBuf,
}

impl ModulePaths {
    pub fn new(app_root: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_root: app_root.into(),
            install_dir: install_dir.into(),
        }
    }

    /// Derive the paths from the environment and configuration.
    ///
    /// Precedence for the install dir: `EMBER_TARGET`, then
    /// `modules.install_dir`, then `$HOME/.ember`, then `<app_root>/.ember`.
    pub fn resolve(
        app_root: impl Into<PathBuf>,
        env: &HashMap<String, String>,
        config: &EmberConfig,
    ) -> Self {
        let app_root = app_root.into();
        let install_dir = env
            .get(TARGET_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| config.modules.install_dir.clone())
            .or_else(|| {
                env.get("HOME")
                    .filter(|v| !v.is_empty())
                    .map(|home| Path::new(home).join(INSTALL_DIR_NAME))
            })
            .unwrap_or_else(|| app_root.join(INSTALL_DIR_NAME));
        Self {
            app_root,
            install_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = EmberConfig::default();
        assert_eq!(config.runtime.loop_capacity, 128);
        assert!(config.modules.install_dir.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[runtime]
loop_capacity = 64

[modules]
install_dir = "/opt/ember"
"#;
        let config: EmberConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.runtime.loop_capacity, 64);
        assert_eq!(config.modules.install_dir, Some(PathBuf::from("/opt/ember")));
    }

    #[test]
    fn test_install_dir_precedence() {
        let mut config = EmberConfig::default();

        let paths = ModulePaths::resolve("/app", &env(&[("HOME", "/home/u")]), &config);
        assert_eq!(paths.install_dir, PathBuf::from("/home/u/.ember"));

        config.modules.install_dir = Some(PathBuf::from("/opt/ember"));
        let paths = ModulePaths::resolve("/app", &env(&[("HOME", "/home/u")]), &config);
        assert_eq!(paths.install_dir, PathBuf::from("/opt/ember"));

        let paths = ModulePaths::resolve(
            "/app",
            &env(&[("HOME", "/home/u"), (TARGET_ENV, "/srv/ember")]),
            &config,
        );
        assert_eq!(paths.install_dir, PathBuf::from("/srv/ember"));
    }

    #[test]
    fn test_install_dir_without_home() {
        let paths = ModulePaths::resolve("/app", &HashMap::new(), &EmberConfig::default());
        assert_eq!(paths.install_dir, PathBuf::from("/app/.ember"));
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[runtime]\nloop_capacity = 16\n",
        )
        .unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = EmberConfig::find_and_load(&nested).unwrap();
        assert_eq!(config.runtime.loop_capacity, 16);
    }
}
