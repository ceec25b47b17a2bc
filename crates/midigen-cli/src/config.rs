//! Configuration management for Midigen CLI

use anyhow::{Context, Result};
use midigen_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default generation settings; command-line flags override them
    pub generation: GenerationConfig,

    /// Where results are written
    pub output: OutputConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base directory for relative output paths
    pub directory: PathBuf,

    /// Also write the raw rows next to every generated score
    pub write_rows: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            write_rows: false,
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, the default location, or defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => {
                let path = expand_path(path)?;
                if !path.exists() {
                    anyhow::bail!(
                        "Config file not found: {}\n\
                        Suggestion: Check the --config path or MIDIGEN_CONFIG",
                        path.display()
                    );
                }
                path
            }
            None => Self::default_config_path(),
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .generation
            .validate()
            .with_context(|| format!("Invalid [generation] section in {}", config_path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("midigen")
            .join("config.toml")
    }

    /// Resolve an output path against the configured output directory
    pub fn output_path(&self, path: &Path) -> Result<PathBuf> {
        let path = expand_path(path)?;
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(expand_path(&self.output.directory)?.join(path))
    }
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(&path.to_string_lossy())
        .with_context(|| format!("Failed to expand shell variables in path: {}", path.display()))?
        .into_owned();
    Ok(PathBuf::from(expanded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[generation]\ntop_k = 8\nseed = 42\n\n[output]\nwrite_rows = true\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.generation.top_k, 8);
        assert_eq!(config.generation.seed, Some(42));
        assert_eq!(config.generation.max_rows, 512);
        assert!(config.output.write_rows);
        assert_eq!(config.output.directory, PathBuf::from("."));
    }

    #[test]
    fn test_invalid_generation_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[generation]\ntop_p = 2.0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("TOP_P_OUT_OF_RANGE"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.generation.temperature = 0.8;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.generation, config.generation);
    }

    #[test]
    fn test_output_path_resolution() {
        let mut config = Config::default();
        config.output.directory = PathBuf::from("/tmp/midigen-out");
        assert_eq!(
            config.output_path(Path::new("song.json")).unwrap(),
            PathBuf::from("/tmp/midigen-out/song.json")
        );
        assert_eq!(
            config.output_path(Path::new("/abs/song.json")).unwrap(),
            PathBuf::from("/abs/song.json")
        );
    }
}
