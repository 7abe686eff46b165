//! Hugging Face backed resources.
//!
//! This module handles:
//! - Tokenizer and model downloads into a local cache
//! - Tokenizer family detection
//! - Building tokenizer and feature-extractor handles for the pipeline

mod download;
mod loader;

pub use download::{HubClient, HubError};
pub use loader::{EncoderExtractor, HubLoader, HubTokenizer};
