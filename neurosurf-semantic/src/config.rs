//! Configuration for the semantic service.

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityPolicy;
use crate::error::{Result, SemanticError};

/// Configuration parameters for [`SemanticService`](crate::SemanticService).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticConfig {
    /// `k` used when a request does not specify one.
    pub default_k: usize,
    /// Upper bound applied to a request's `k`.
    pub max_k: usize,
    /// Minimum cosine similarity (in `[-1, 1]`) for retrieved documents.
    pub similarity_threshold: f32,
    /// Timeout and retry policy for embedding calls.
    pub embedding: CapabilityPolicy,
    /// Timeout and retry policy for summarization calls.
    pub summarizer: CapabilityPolicy,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 100,
            similarity_threshold: -1.0,
            embedding: CapabilityPolicy::default(),
            summarizer: CapabilityPolicy::default(),
        }
    }
}

impl SemanticConfig {
    /// Create a new builder for constructing a [`SemanticConfig`].
    pub fn builder() -> SemanticConfigBuilder {
        SemanticConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`SemanticConfig`].
#[derive(Debug, Clone, Default)]
pub struct SemanticConfigBuilder {
    config: SemanticConfig,
}

impl SemanticConfigBuilder {
    /// Set the `k` used when a request does not specify one.
    pub fn default_k(mut self, default_k: usize) -> Self {
        self.config.default_k = default_k;
        self
    }

    /// Set the upper bound applied to a request's `k`.
    pub fn max_k(mut self, max_k: usize) -> Self {
        self.config.max_k = max_k;
        self
    }

    /// Set the minimum similarity threshold for retrieved documents.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the embedding call policy.
    pub fn embedding_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.config.embedding = policy;
        self
    }

    /// Set the summarization call policy.
    pub fn summarizer_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.config.summarizer = policy;
        self
    }

    /// Build the [`SemanticConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`SemanticError::Config`] if:
    /// - `max_k == 0`
    /// - `default_k` is zero or greater than `max_k`
    /// - `similarity_threshold` is outside `[-1, 1]`
    /// - either policy has a zero timeout
    pub fn build(self) -> Result<SemanticConfig> {
        if self.config.max_k == 0 {
            return Err(SemanticError::Config("max_k must be greater than zero".to_string()));
        }
        if self.config.default_k == 0 || self.config.default_k > self.config.max_k {
            return Err(SemanticError::Config(format!(
                "default_k ({}) must be within [1, max_k ({})]",
                self.config.default_k, self.config.max_k
            )));
        }
        if !(-1.0..=1.0).contains(&self.config.similarity_threshold) {
            return Err(SemanticError::Config(format!(
                "similarity_threshold ({}) must be within [-1, 1]",
                self.config.similarity_threshold
            )));
        }
        for (name, policy) in [("embedding", &self.config.embedding), ("summarizer", &self.config.summarizer)]
        {
            if policy.timeout.is_zero() {
                return Err(SemanticError::Config(format!("{name} timeout must be non-zero")));
            }
        }
        Ok(self.config)
    }
}
