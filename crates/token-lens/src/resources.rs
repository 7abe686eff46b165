//! Capabilities the pipeline consumes: tokenizers, feature extractors and
//! the loader that produces them.
//!
//! Implementations:
//! - `HubLoader` (in `hub`) - Downloads from Hugging Face and builds real handles
//! - Stub loaders in tests - Count loads and inject failures

use async_trait::async_trait;
use std::sync::Arc;

use crate::family::TokenizerFamily;

pub use token_embeddings::FeatureBuffer;

/// A loaded tokenizer. Read-only once built.
pub trait TokenizerHandle: Send + Sync {
    /// Surface-form convention of this tokenizer's pieces.
    fn family(&self) -> TokenizerFamily;

    /// Encode text to ids, special tokens included.
    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>>;

    /// Decode ids back to text, special tokens kept.
    fn decode(&self, ids: &[u32]) -> anyhow::Result<String>;
}

/// A loaded feature-extraction model. Read-only once built.
pub trait FeatureExtractor: Send + Sync {
    /// Hidden states for every position of one forward pass over `text`.
    fn extract_features(&self, text: &str) -> anyhow::Result<FeatureBuffer>;
}

/// Loads handles for a model identifier. Slow: may hit the network or disk.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load_tokenizer(&self, model_id: &str) -> anyhow::Result<Arc<dyn TokenizerHandle>>;

    async fn load_embedding_model(&self, model_id: &str)
    -> anyhow::Result<Arc<dyn FeatureExtractor>>;
}
