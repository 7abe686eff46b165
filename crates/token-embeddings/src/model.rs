use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use tokenizers::Tokenizer;

use crate::FeatureBuffer;

/// `model_type` values [`EncoderModel`] can load.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["bert", "distilbert"];

/// Read `model_type` from a config.json and check it is loadable.
///
/// Cheap enough to call before fetching or reading any weights. A config
/// without `model_type` is treated as BERT.
pub fn encoder_architecture(config_json: &str) -> Result<String> {
    let config: serde_json::Value =
        serde_json::from_str(config_json).context("Failed to parse config.json")?;
    let model_type = config
        .get("model_type")
        .and_then(|v| v.as_str())
        .unwrap_or("bert");

    if !SUPPORTED_ARCHITECTURES.contains(&model_type) {
        anyhow::bail!("Unsupported encoder architecture: {}", model_type);
    }

    Ok(model_type.to_string())
}

/// Encoder architectures we know how to load from a `config.json`.
enum Encoder {
    Bert(BertModel),
    DistilBert(DistilBertModel),
}

/// Loaded encoder plus the tokenizer it was trained with.
///
/// Immutable once built, so a single instance can be shared across threads
/// behind an `Arc`.
pub struct EncoderModel {
    encoder: Encoder,
    tokenizer: Tokenizer,
    device: Device,
}

impl EncoderModel {
    /// Build the model from in-memory files.
    ///
    /// # Arguments
    /// * `config_json` - JSON string containing model config
    /// * `tokenizer_json` - JSON string containing tokenizer config
    /// * `model_weights` - Byte array containing model weights (safetensors format)
    pub fn load(config_json: &str, tokenizer_json: &str, model_weights: &[u8]) -> Result<Self> {
        // Use CPU for now (Metal/CUDA support can be added later)
        let device = Device::Cpu;

        let model_type = encoder_architecture(config_json)?;

        let tokenizer = Tokenizer::from_bytes(tokenizer_json.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let config: serde_json::Value =
            serde_json::from_str(config_json).context("Failed to parse config.json")?;

        let vb = VarBuilder::from_buffered_safetensors(model_weights.to_vec(), DType::F32, &device)?;

        let encoder = match model_type.as_str() {
            "bert" => {
                let config: BertConfig =
                    serde_json::from_value(config).context("Invalid BERT config")?;
                Encoder::Bert(BertModel::load(vb, &config)?)
            }
            "distilbert" => {
                let config: DistilBertConfig =
                    serde_json::from_value(config).context("Invalid DistilBERT config")?;
                Encoder::DistilBert(DistilBertModel::load(vb, &config)?)
            }
            other => anyhow::bail!("Unsupported encoder architecture: {}", other),
        };

        #[cfg(feature = "debug")]
        log::debug!("Loaded {} encoder", model_type);

        Ok(Self {
            encoder,
            tokenizer,
            device,
        })
    }

    /// Run one forward pass and return the hidden state of every position.
    ///
    /// Special tokens are included, so the buffer lines up with what
    /// `Tokenizer::encode(text, true)` produces for the same text.
    pub fn extract_hidden_states(&self, text: &str) -> Result<FeatureBuffer> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let tokens: Vec<u32> = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            return FeatureBuffer::new(Vec::new(), 0, 0);
        }

        let token_ids = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?; // Add batch dimension

        let output = match &self.encoder {
            Encoder::Bert(model) => {
                let mask: Vec<u32> = encoding.get_attention_mask().to_vec();
                let attention_mask = Tensor::new(&mask[..], &self.device)?.unsqueeze(0)?;
                let token_type_ids = token_ids.zeros_like()?;
                model.forward(&token_ids, &token_type_ids, Some(&attention_mask))?
            }
            Encoder::DistilBert(model) => {
                // Non-zero entries are masked out; a single unpadded sequence masks nothing
                let seq_len = tokens.len();
                let mask = Tensor::zeros((seq_len, seq_len), DType::U8, &self.device)?;
                model.forward(&token_ids, &mask)?
            }
        };

        // output shape: [batch, seq_len, hidden_size]
        let (_, seq_len, hidden_size) = output.dims3()?;

        #[cfg(feature = "debug")]
        log::debug!(
            "Encoder output: {} positions x {} dims for {} input tokens",
            seq_len,
            hidden_size,
            tokens.len()
        );

        let data = output
            .squeeze(0)?
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()
            .context("Failed to convert tensor to vec")?;

        FeatureBuffer::new(data, seq_len, hidden_size)
    }

    /// Token ids the model's own tokenizer produces for `text`.
    pub fn token_ids(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }
}

// Model-backed tests live in tests/ and need real weights

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_architectures() {
        assert_eq!(encoder_architecture(r#"{"model_type": "bert"}"#).unwrap(), "bert");
        assert_eq!(
            encoder_architecture(r#"{"model_type": "distilbert", "dim": 768}"#).unwrap(),
            "distilbert"
        );
    }

    #[test]
    fn test_missing_model_type_defaults_to_bert() {
        assert_eq!(encoder_architecture(r#"{"hidden_size": 384}"#).unwrap(), "bert");
    }

    #[test]
    fn test_decoder_architectures_are_rejected() {
        let err = encoder_architecture(r#"{"model_type": "gpt2"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported encoder architecture: gpt2");

        assert!(encoder_architecture(r#"{"model_type": "llama"}"#).is_err());
    }

    #[test]
    fn test_invalid_config_json() {
        assert!(encoder_architecture("not json").is_err());
    }
}
