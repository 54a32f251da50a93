//! Embedding provider abstraction.

use async_trait::async_trait;

use crate::Result;

/// A source of text embeddings.
///
/// Implementations return an error for any failure; the
/// [`EmbeddingGateway`](super::EmbeddingGateway) decides what a failure means
/// for ingestion.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model or deployment identifier, for logs.
    fn model_name(&self) -> &str;

    /// Length of the vectors this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a single, already normalized, non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic offline provider.
///
/// Produces a unit vector derived from a hash of the text, so equal texts
/// map to equal vectors and different texts to different ones.
#[derive(Debug, Clone)]
pub struct PlaceholderProvider {
    dimensions: usize,
}

impl PlaceholderProvider {
    /// Create a provider producing `dimensions`-long vectors.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for PlaceholderProvider {
    fn model_name(&self) -> &str {
        "placeholder"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(placeholder_embedding(text, self.dimensions))
    }
}

/// Create a placeholder embedding.
///
/// Returns a deterministic, L2-normalized embedding based on the text hash.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn placeholder_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut seed = hasher.finish();

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let value = (((seed >> 33) as f32) / (u32::MAX as f32)).mul_add(2.0, -1.0);
        embedding.push(value);
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut embedding {
            *v /= norm;
        }
    }

    embedding
}
