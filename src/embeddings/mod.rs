//! Embedding generation for entry summaries.
//!
//! This module provides:
//! - The [`EmbeddingProvider`] capability interface
//! - An Azure `OpenAI` provider and a deterministic offline provider
//! - The [`EmbeddingGateway`], which turns every failure into "no embedding"

mod azure;
mod gateway;
mod provider;

pub use azure::AzureOpenAiProvider;
pub use gateway::{normalize_text, EmbeddingGateway};
pub use provider::{placeholder_embedding, EmbeddingProvider, PlaceholderProvider};
