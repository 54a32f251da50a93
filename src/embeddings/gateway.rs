//! Best-effort embedding gateway.
//!
//! The pipeline never sees an embedding failure: missing configuration,
//! blank input, provider errors and malformed vectors all come back as
//! `None`, and the record is persisted without an embedding.

use std::sync::Arc;

use super::azure::AzureOpenAiProvider;
use super::provider::EmbeddingProvider;
use crate::config::EmbeddingSettings;
use crate::error::EmbeddingError;
use crate::telemetry::metrics::EMBEDDINGS_TOTAL;
use crate::Result;

/// Wraps an optional [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingGateway {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    dimensions: usize,
}

impl EmbeddingGateway {
    /// A gateway that never produces embeddings.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            provider: None,
            dimensions: 0,
        }
    }

    /// A gateway over the given provider. Vectors whose length differs from
    /// the provider's declared dimensionality are discarded.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let dimensions = provider.dimensions();
        Self {
            provider: Some(provider),
            dimensions,
        }
    }

    /// Build the production gateway.
    ///
    /// The Azure provider is enabled only when every service value is set.
    /// Otherwise the gateway is disabled for the whole run and one warning
    /// names the missing values.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are complete but the HTTP client
    /// cannot be built.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let Some(service) = settings.service() else {
            tracing::warn!(
                missing = ?settings.missing(),
                "Embedding service not configured, records will be stored without embeddings"
            );
            return Ok(Self::disabled());
        };

        let provider = AzureOpenAiProvider::new(service)?;
        tracing::info!(
            deployment = %provider.model_name(),
            dimensions = provider.dimensions(),
            "Embedding service enabled"
        );
        Ok(Self::new(Arc::new(provider)))
    }

    /// Whether a provider is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Expected vector length, 0 when disabled.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed `text`, or return `None`.
    ///
    /// Failures are logged and counted here and never propagated.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;

        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return None;
        }

        let result = provider.embed(&normalized).await.and_then(|vector| {
            if vector.len() == self.dimensions {
                Ok(vector)
            } else {
                Err(EmbeddingError::Dimension {
                    expected: self.dimensions,
                    actual: vector.len(),
                }
                .into())
            }
        });

        match result {
            Ok(vector) => {
                EMBEDDINGS_TOTAL.with_label_values(&["computed"]).inc();
                Some(vector)
            }
            Err(e) => {
                EMBEDDINGS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(
                    model = %provider.model_name(),
                    error = %e,
                    "Embedding failed, continuing without one"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for EmbeddingGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingGateway")
            .field("provider", &self.provider.as_ref().map(|p| p.model_name()))
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

/// Prepare text for the embedding service: line breaks become spaces and
/// surrounding whitespace is removed.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}
