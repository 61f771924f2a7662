use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::chat::MAX_TOP_K;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HeirloomConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub azure: AzureConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub geocoding: GeocodingConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Frontend origin allowed by CORS. `None` allows any origin.
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub index_path: String,
}

/// Shared credentials for the Azure OpenAI resource used by both embeddings and chat.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AzureConfig {
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub deployment: String,
    pub api_version: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub deployment: String,
    pub api_version: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocodingConfig {
    pub api_key: String,
    pub base_url: String,
    pub language: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Hits pulled from the index per question, clamped to `1..=MAX_TOP_K`.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

impl RetrievalConfig {
    pub fn effective_top_k(&self) -> usize {
        if self.top_k > MAX_TOP_K {
            warn!(top_k = self.top_k, max = MAX_TOP_K, "retrieval.top_k clamped");
        }
        self.top_k.clamp(1, MAX_TOP_K)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
            allowed_origin: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_heirloom_dir();
        Self {
            db_path: dir.join("heirloom.db").to_string_lossy().into_owned(),
            index_path: dir.join("vector_store.db").to_string_lossy().into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "azure".into(),
            deployment: "text-embedding-3-large".into(),
            api_version: "2023-05-15".into(),
            dimensions: 3072,
            batch_size: 16,
            timeout_secs: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            deployment: "gpt-4o-mini".into(),
            api_version: "2024-06-01".into(),
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com".into(),
            language: "ja".into(),
            timeout_secs: 10,
        }
    }
}

/// Returns `~/.heirloom/`, or `./.heirloom/` when no home directory is known.
pub fn default_heirloom_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".heirloom")
}

/// Returns the default config file path: `~/.heirloom/config.toml`
pub fn default_config_path() -> PathBuf {
    default_heirloom_dir().join("config.toml")
}

impl HeirloomConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            HeirloomConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. Secrets are expected to arrive this way.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HEIRLOOM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("HEIRLOOM_INDEX") {
            self.storage.index_path = val;
        }
        if let Ok(val) = std::env::var("HEIRLOOM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("AZURE_OPENAI_ENDPOINT") {
            self.azure.endpoint = val;
        }
        if let Ok(val) = std::env::var("AZURE_OPENAI_API_KEY") {
            self.azure.api_key = val;
        }
        if let Ok(val) = std::env::var("AZURE_OPENAI_API_VERSION") {
            self.llm.api_version = val;
        }
        if let Ok(val) = std::env::var("GOOGLE_MAPS_API_KEY") {
            self.geocoding.api_key = val;
        }
        if let Ok(val) = std::env::var("FRONTEND_ORIGIN") {
            self.server.allowed_origin = Some(val);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the semantic index path, expanding `~` if needed.
    pub fn resolved_index_path(&self) -> PathBuf {
        expand_tilde(&self.storage.index_path)
    }
}

impl AzureConfig {
    /// Build `{endpoint}/openai/deployments/{deployment}/{operation}?api-version=...`.
    pub fn deployment_url(
        &self,
        deployment: &str,
        operation: &str,
        api_version: &str,
    ) -> Result<reqwest::Url> {
        anyhow::ensure!(
            !self.endpoint.is_empty(),
            "Azure OpenAI endpoint is not set (AZURE_OPENAI_ENDPOINT)"
        );
        let base = self.endpoint.trim_end_matches('/');
        reqwest::Url::parse_with_params(
            &format!("{base}/openai/deployments/{deployment}/{operation}"),
            &[("api-version", api_version)],
        )
        .with_context(|| format!("invalid Azure OpenAI endpoint: {}", self.endpoint))
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
