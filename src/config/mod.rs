//! Configuration management.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - Built-in defaults (lowest priority)

mod settings;

pub use settings::{AzureOpenAiSettings, Config, EmbeddingSettings};
