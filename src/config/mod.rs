//! Configuration management for Lorestore
//!
//! Handles loading, validation, profiles and environment overrides of the
//! TOML configuration file.

use crate::chunking::SplitterConfig;
use crate::error::{LoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Current configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Snapshot bundle directory (defaults to `<data_dir>/index`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "mock" or "fastembed"
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub cache_enabled: bool,
    /// Cache database (defaults to `<data_dir>/embeddings.sqlite`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Where model files are downloaded (defaults to `<data_dir>/models`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            batch_size: 32,
            cache_enabled: true,
            cache_path: None,
            model_dir: None,
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub min_tokens: usize,
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl From<&ChunkingConfig> for SplitterConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            min_tokens: config.min_tokens,
            max_tokens: config.max_tokens,
            overlap_tokens: config.overlap_tokens,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| LoreError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| LoreError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| LoreError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(top_k) = overrides.top_k {
            self.retrieval.top_k = top_k;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: LORESTORE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("LORESTORE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__CACHE_ENABLED" => {
                self.embedding.cache_enabled = parse_value(path, value)?;
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            "RETRIEVAL__TOP_K" => {
                self.retrieval.top_k = parse_value(path, value)?;
            }
            "CHUNKING__MAX_TOKENS" => {
                self.chunking.max_tokens = parse_value(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Bundle directory with `~` expanded
    pub fn index_dir(&self) -> Result<PathBuf> {
        match &self.storage.index_dir {
            Some(dir) => expand_path(dir),
            None => Ok(expand_path(&self.storage.data_dir)?.join("index")),
        }
    }

    /// Embedding cache location, or `None` when caching is disabled
    pub fn cache_path(&self) -> Result<Option<PathBuf>> {
        if !self.embedding.cache_enabled {
            return Ok(None);
        }
        match &self.embedding.cache_path {
            Some(path) => expand_path(path).map(Some),
            None => Ok(Some(
                expand_path(&self.storage.data_dir)?.join("embeddings.sqlite"),
            )),
        }
    }

    /// Model download directory with `~` expanded
    pub fn model_dir(&self) -> Result<PathBuf> {
        match &self.embedding.model_dir {
            Some(dir) => expand_path(dir),
            None => Ok(expand_path(&self.storage.data_dir)?.join("models")),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| LoreError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("lorestore").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| LoreError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".lorestore"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.lorestore"),
                index_dir: None,
            },
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig {
                min_tokens: 40,
                max_tokens: 300,
                overlap_tokens: 40,
            },
            retrieval: RetrievalConfig { top_k: 5 },
            profiles: HashMap::new(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| LoreError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| LoreError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| LoreError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
        assert_eq!(config.meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.embedding.provider = "mock".to_string();
        config.retrieval.top_k = 7;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.embedding.provider, "mock");
        assert_eq!(loaded.retrieval.top_k, 7);
        assert_eq!(loaded.chunking.max_tokens, 300);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/lorestore.toml"));
        assert!(matches!(result, Err(LoreError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_profile_overrides() {
        let mut config = Config::default();
        config.profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                embedding_provider: Some("mock".to_string()),
                top_k: Some(3),
                ..ProfileOverrides::default()
            },
        );

        config.apply_profile("offline").unwrap();
        assert_eq!(config.embedding.provider, "mock");
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_env_value_parsing() {
        let mut config = Config::default();
        config.set_value_from_env("RETRIEVAL__TOP_K", "9").unwrap();
        assert_eq!(config.retrieval.top_k, 9);

        let result = config.set_value_from_env("RETRIEVAL__TOP_K", "nine");
        assert!(matches!(result, Err(LoreError::InvalidConfigValue { .. })));
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/var/lib/lorestore");

        assert_eq!(
            config.index_dir().unwrap(),
            PathBuf::from("/var/lib/lorestore/index")
        );
        assert_eq!(
            config.cache_path().unwrap(),
            Some(PathBuf::from("/var/lib/lorestore/embeddings.sqlite"))
        );

        config.embedding.cache_enabled = false;
        assert_eq!(config.cache_path().unwrap(), None);
    }

    #[test]
    fn test_splitter_config_from_chunking() {
        let config = Config::default();
        let splitter = SplitterConfig::from(&config.chunking);
        assert_eq!(splitter, SplitterConfig::default());
    }
}
