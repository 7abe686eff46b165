#![deny(clippy::all)]

mod buffer;
mod model;

// Re-export for external use
pub use buffer::FeatureBuffer;
pub use model::{EncoderModel, SUPPORTED_ARCHITECTURES, encoder_architecture};

// Auto-initialize logging for debug builds
#[cfg(feature = "debug")]
#[ctor::ctor]
fn init_native_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Per-token feature extraction for a BERT-family encoder.
///
/// Wraps [`EncoderModel`] with helpers for loading from a model directory.
///
/// # Example
/// ```ignore
/// use token_embeddings::TokenEmbeddings;
/// use std::path::Path;
///
/// let model = TokenEmbeddings::load_from_dir(Path::new("models/distilbert-base-uncased"))?;
///
/// let features = model.extract("Hello world")?;
/// println!("{} tokens x {} dims", features.token_count, features.hidden_size);
/// ```
pub struct TokenEmbeddings {
    model: EncoderModel,
}

impl TokenEmbeddings {
    /// Load model from a directory containing config.json, tokenizer.json, and model.safetensors.
    ///
    /// # Expected files
    /// - `config.json` - Model configuration (`model_type` selects the architecture)
    /// - `tokenizer.json` - Tokenizer configuration
    /// - `model.safetensors` - Model weights
    pub fn load_from_dir(model_dir: &std::path::Path) -> anyhow::Result<Self> {
        use std::fs;

        let config_path = model_dir.join("config.json");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let weights_path = model_dir.join("model.safetensors");

        let config_json = fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e))?;

        // Reject unsupported architectures before reading the weights
        encoder_architecture(&config_json)?;

        let tokenizer_json = fs::read_to_string(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", tokenizer_path.display(), e))?;

        let model_weights = fs::read(&weights_path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", weights_path.display(), e))?;

        Self::load(&config_json, &tokenizer_json, &model_weights)
    }

    /// Load model from provided data (for cases where you have the data in memory).
    pub fn load(config_json: &str, tokenizer_json: &str, model_weights: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            model: EncoderModel::load(config_json, tokenizer_json, model_weights)?,
        })
    }

    /// Hidden states for every position of `text`, special tokens included.
    pub fn extract(&self, text: &str) -> anyhow::Result<FeatureBuffer> {
        self.model.extract_hidden_states(text)
    }

    /// Token ids the encoder sees for `text`.
    pub fn token_ids(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        self.model.token_ids(text)
    }
}
