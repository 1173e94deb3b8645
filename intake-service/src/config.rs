//! Service configuration.
//!
//! Values are read from an optional `config.{toml,yaml,json}` file and
//! overridden by `INTAKE__SECTION__KEY` environment variables.

use config::{Config as ConfigSource, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    /// Required. There is no fallback database.
    pub database: DatabaseConfig,

    pub ai: AiConfig,

    pub storage: StorageConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_processing")]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// SQLite database location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// OpenAI-compatible provider used for OCR and embeddings
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub base_url: String,

    pub api_key: String,

    #[serde(default = "default_ocr_model")]
    pub ocr_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_ai_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl AiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Object storage and provider-side vector table
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub base_url: String,

    pub api_key: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_vector_table")]
    pub vector_table: String,

    #[serde(default = "default_match_function")]
    pub match_function: String,

    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    #[serde(default = "default_storage_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl StorageConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

/// Pipeline tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Target chunk length in characters
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// How long shutdown waits for in-flight runs
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Language tag recorded in vector metadata
    #[serde(default = "default_language")]
    pub language: String,
}

impl ProcessingConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// API key authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

/// A single API key, stored as the hex SHA-256 digest of the bearer token
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub user_id: String,
    pub key_sha256: String,
}

impl Config {
    /// Load configuration from `config.*` and `INTAKE__*` environment variables
    pub fn load() -> ServiceResult<Self> {
        Self::load_from(
            ConfigSource::builder()
                .add_source(File::with_name("config").required(false))
                .add_source(
                    Environment::with_prefix("INTAKE")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    fn load_from(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> ServiceResult<Self> {
        let config: Config = builder
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject empty required values and unusable limits
    pub fn validate(&self) -> ServiceResult<()> {
        let required = [
            ("database.path", self.database.path.as_os_str().is_empty()),
            ("ai.base_url", self.ai.base_url.trim().is_empty()),
            ("ai.api_key", self.ai.api_key.trim().is_empty()),
            ("storage.base_url", self.storage.base_url.trim().is_empty()),
            ("storage.api_key", self.storage.api_key.trim().is_empty()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(ServiceError::Config {
                message: format!("{} must be set", key),
            });
        }

        if self.processing.max_chunk_size == 0 {
            return Err(ServiceError::Config {
                message: "processing.max_chunk_size must be greater than zero".to_string(),
            });
        }
        if self.processing.max_concurrent_runs == 0 {
            return Err(ServiceError::Config {
                message: "processing.max_concurrent_runs must be greater than zero".to_string(),
            });
        }
        if self.limits.max_upload_bytes == 0 {
            return Err(ServiceError::Config {
                message: "limits.max_upload_bytes must be greater than zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.storage.match_threshold) {
            return Err(ServiceError::Config {
                message: "storage.match_threshold must be between 0 and 1".to_string(),
            });
        }

        for key in &self.auth.api_keys {
            let digest = key.key_sha256.trim();
            if key.user_id.trim().is_empty()
                || digest.len() != 64
                || !digest.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ServiceError::Config {
                    message: format!(
                        "auth.api_keys entry for '{}' needs a user_id and a 64-character hex key_sha256",
                        key.user_id
                    ),
                });
            }
        }

        Ok(())
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ocr_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    120
}

fn default_bucket() -> String {
    "documents".to_string()
}

fn default_vector_table() -> String {
    "document_vectors".to_string()
}

fn default_match_function() -> String {
    "match_documents".to_string()
}

fn default_match_threshold() -> f32 {
    0.7
}

fn default_storage_timeout_secs() -> u64 {
    60
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_processing() -> ProcessingConfig {
    ProcessingConfig {
        max_chunk_size: default_max_chunk_size(),
        max_concurrent_runs: default_max_concurrent_runs(),
        shutdown_grace_secs: default_shutdown_grace_secs(),
        language: default_language(),
    }
}

fn default_max_chunk_size() -> usize {
    500
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_language() -> String {
    "en".to_string()
}
