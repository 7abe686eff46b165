//! Error taxonomy for a single pipeline request.

use std::fmt;
use thiserror::Error;

/// Which cached resource a load was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Tokenizer,
    EmbeddingModel,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Tokenizer => f.write_str("tokenizer"),
            ResourceKind::EmbeddingModel => f.write_str("embedding model"),
        }
    }
}

/// Errors that abort one request and surface as an error response.
///
/// `Clone` because a single failed load is delivered to every request that
/// was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Failed to load {kind} for {model_id}: {message}")]
    ResourceLoad {
        kind: ResourceKind,
        model_id: String,
        message: String,
    },

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Feature extraction failed: {0}")]
    Extraction(String),
}

impl PipelineError {
    pub(crate) fn resource_load(kind: ResourceKind, model_id: &str, err: &anyhow::Error) -> Self {
        // {:#} keeps the context chain on one line
        PipelineError::ResourceLoad {
            kind,
            model_id: model_id.to_string(),
            message: format!("{:#}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
