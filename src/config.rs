//! Configuration management
//!
//! Loaded from `config.toml` in the platform config directory; every field
//! has a serde default so a partial file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OpenRouter API settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    /// When and how reflection runs
    #[serde(default)]
    pub reflection: ReflectionConfig,
    /// Where the feedback log lives
    #[serde(default)]
    pub storage: StorageConfig,
    /// Few-shot example retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// API key is stored in keyring, this is just a reference
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Model used for emotion fusion and prompt writing
    #[serde(default = "default_model_str")]
    pub default_model: String,
}

fn default_model_str() -> String {
    crate::llm::DEFAULT_ANALYSIS_MODEL.to_string()
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model_str(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Feedback submissions between reflections
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Entries an emotion needs before it gets a profile
    #[serde(default = "default_min_samples")]
    pub min_samples_per_emotion: usize,
    /// Model used for rule synthesis
    #[serde(default = "default_model_str")]
    pub model: String,
}

fn default_interval() -> u64 {
    10
}

fn default_min_samples() -> usize {
    3
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            min_samples_per_emotion: default_min_samples(),
            model: default_model_str(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (defaults to the data directory)
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("feedback.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Examples per section when building prompts
    #[serde(default = "default_examples")]
    pub examples: usize,
}

fn default_examples() -> usize {
    crate::feedback::DEFAULT_EXAMPLE_COUNT
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { examples: default_examples() }
    }
}

impl Config {
    /// Load configuration from the default file, creating it on first run
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "music2myears", "music2myears")
        .context("Failed to get project directories")
}

/// Get the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
