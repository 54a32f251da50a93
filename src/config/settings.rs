//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for an ingestion run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Embedding service settings.
    pub embedding: EmbeddingSettings,
}

/// Settings for the Azure `OpenAI` embedding deployment.
///
/// Embeddings are enabled only when all four service values are present.
#[derive(Clone)]
pub struct EmbeddingSettings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
    pub deployment: Option<String>,

    /// Expected vector length.
    pub dimensions: usize,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Attempts per text for throttled or failing requests.
    pub max_attempts: usize,
}

/// The complete set of values needed to call the embedding service.
#[derive(Clone)]
pub struct AzureOpenAiSettings {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    pub deployment: String,
    pub dimensions: usize,
    pub timeout: Duration,
    pub max_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/catalog.db"),
            log_level: "info".to_string(),
            embedding: EmbeddingSettings::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::config("database path cannot be empty"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        self.embedding.validate()
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingSettings {
    /// Settings with no service configured and default limits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            api_version: None,
            deployment: None,
            dimensions: crate::storage::EMBEDDING_DIM,
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }

    /// Validate limits. Missing service values are not an error; they
    /// disable embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(Error::config("embedding_dim cannot be 0"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("embedding timeout cannot be 0"));
        }
        if self.max_attempts == 0 {
            return Err(Error::config("embedding max attempts cannot be 0"));
        }
        Ok(())
    }

    /// Names of the service values that are absent or blank.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("AZURE_OPENAI_API_KEY", &self.api_key),
            ("AZURE_OPENAI_ENDPOINT", &self.endpoint),
            ("AZURE_OPENAI_API_VERSION", &self.api_version),
            ("AZURE_OPENAI_EMBEDDING_DEPLOYMENT", &self.deployment),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// All service values, or `None` if any is missing.
    #[must_use]
    pub fn service(&self) -> Option<AzureOpenAiSettings> {
        if !self.missing().is_empty() {
            return None;
        }
        Some(AzureOpenAiSettings {
            api_key: self.api_key.clone()?.trim().to_string(),
            endpoint: self.endpoint.clone()?.trim().to_string(),
            api_version: self.api_version.clone()?.trim().to_string(),
            deployment: self.deployment.clone()?.trim().to_string(),
            dimensions: self.dimensions,
            timeout: self.timeout,
            max_attempts: self.max_attempts,
        })
    }
}

// Keep the API key out of logs.
impl std::fmt::Debug for EmbeddingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("dimensions", &self.dimensions)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl std::fmt::Debug for AzureOpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiSettings")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("deployment", &self.deployment)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}
