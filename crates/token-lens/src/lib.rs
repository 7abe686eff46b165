//! token-lens: shows how tokenizer families segment text and colors each
//! token by a 3-component projection of its contextual embedding.
//!
//! Results come back in two stages per request: a fast tokenization-only
//! partial response, then a complete response with embeddings and colors.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod family;
pub mod hub;
pub mod message;
pub mod normalize;
pub mod pipeline;
pub mod projection;
pub mod resources;

// Re-export key types for convenience
pub use cache::ResourceCache;
pub use error::{PipelineError, ResourceKind};
pub use family::TokenizerFamily;
pub use message::{PipelineRequest, PipelineResponse, TokenSequence};
pub use pipeline::Pipeline;
pub use projection::{ColorTriple, FALLBACK_GRAY};
pub use resources::{FeatureBuffer, FeatureExtractor, ResourceLoader, TokenizerHandle};
