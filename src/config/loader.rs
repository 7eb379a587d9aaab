use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::SubshellConfig;

/// Resolves and reads the TOML configuration file
pub struct ConfigLoader {
    default_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        let default_path = ProjectDirs::from("", "", "subshell")
            .map(|dirs| dirs.config_dir().join("config.toml"));
        Self { default_path }
    }

    /// Loader that falls back to `path` when no explicit file is given
    pub fn with_default_path(path: impl Into<PathBuf>) -> Self {
        Self {
            default_path: Some(path.into()),
        }
    }

    pub fn default_path(&self) -> Option<&Path> {
        self.default_path.as_deref()
    }

    /// Load `explicit` if given (it must exist), else the default file if
    /// present, else defaults. Environment overrides are applied last.
    pub async fn load(&self, explicit: Option<&Path>) -> Result<SubshellConfig> {
        let mut config = match explicit {
            Some(path) => Self::read(path).await?,
            None => match self.default_path.as_deref() {
                Some(path) if path.exists() => Self::read(path).await?,
                _ => {
                    tracing::debug!("No configuration file found, using defaults");
                    SubshellConfig::default()
                }
            },
        };

        config.merge_env_vars();
        Ok(config)
    }

    async fn read(path: &Path) -> Result<SubshellConfig> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SubshellConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("subshell.toml");
        std::fs::write(&path, "[run]\ndisplay_lines = 4\ntimeout = \"2s\"\n").unwrap();

        let config = ConfigLoader::new().load(Some(&path)).await.unwrap();
        assert_eq!(config.run.display_lines, 4);
        assert_eq!(config.run.timeout, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.toml");

        let err = ConfigLoader::new().load(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[tokio::test]
    async fn test_missing_default_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_default_path(temp_dir.path().join("config.toml"));

        let config = loader.load(None).await.unwrap();
        assert_eq!(config.run.display_lines, 10);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[run]\ndisplay_lines = \"many\"\n").unwrap();

        let loader = ConfigLoader::with_default_path(&path);
        let err = loader.load(None).await.unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
