//! Resource loader backed by Hugging Face downloads.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use token_embeddings::TokenEmbeddings;
use tokenizers::Tokenizer;

use super::download::{
    CONFIG_FILES, HubClient, MODEL_FILES, OPTIONAL_TOKENIZER_FILES, TOKENIZER_FILES,
};
use crate::family::TokenizerFamily;
use crate::resources::{FeatureBuffer, FeatureExtractor, ResourceLoader, TokenizerHandle};

/// Tokenizer built from a tokenizer.json, tagged with its family.
pub struct HubTokenizer {
    tokenizer: Tokenizer,
    family: TokenizerFamily,
}

impl HubTokenizer {
    /// Build from tokenizer.json contents and the optional tokenizer_config.json.
    pub fn from_json(tokenizer_json: &str, tokenizer_config: Option<&str>) -> Result<Self> {
        let mut data: serde_json::Value =
            serde_json::from_str(tokenizer_json).context("Failed to parse tokenizer.json")?;

        let family = detect_family(&data, tokenizer_config);

        if family == TokenizerFamily::T5 {
            disable_prefix_space(&mut data);
        }

        let bytes = serde_json::to_vec(&data)?;
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        Ok(Self { tokenizer, family })
    }

    pub fn from_dir(model_dir: &Path) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer_json = std::fs::read_to_string(&tokenizer_path)
            .with_context(|| format!("Failed to read {}", tokenizer_path.display()))?;

        // Absent config just means we fall back to the tokenizer model kind
        let tokenizer_config = std::fs::read_to_string(model_dir.join("tokenizer_config.json")).ok();

        Self::from_json(&tokenizer_json, tokenizer_config.as_deref())
    }
}

impl TokenizerHandle for HubTokenizer {
    fn family(&self) -> TokenizerFamily {
        self.family
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

/// Family from `tokenizer_class`, falling back to the tokenizer model kind.
fn detect_family(tokenizer_json: &serde_json::Value, tokenizer_config: Option<&str>) -> TokenizerFamily {
    let class = tokenizer_config
        .and_then(|config| serde_json::from_str::<serde_json::Value>(config).ok())
        .and_then(|config| {
            config
                .get("tokenizer_class")
                .and_then(|c| c.as_str())
                .map(str::to_string)
        });

    if let Some(class) = class {
        return TokenizerFamily::from_class_name(&class);
    }

    match tokenizer_json
        .get("model")
        .and_then(|m| m.get("type"))
        .and_then(|t| t.as_str())
    {
        Some("WordPiece") => TokenizerFamily::WordPiece,
        Some("Unigram") => TokenizerFamily::T5,
        _ => TokenizerFamily::Unknown,
    }
}

/// Stop the Metaspace decoder from re-inserting a leading space.
fn disable_prefix_space(tokenizer_json: &mut serde_json::Value) {
    let Some(decoder) = tokenizer_json.get_mut("decoder").and_then(|d| d.as_object_mut()) else {
        return;
    };

    if decoder.get("type").and_then(|t| t.as_str()) != Some("Metaspace") {
        return;
    }

    if decoder.contains_key("prepend_scheme") {
        decoder.insert("prepend_scheme".into(), "never".into());
    }
    if decoder.contains_key("add_prefix_space") {
        decoder.insert("add_prefix_space".into(), false.into());
    }
}

/// Feature extractor over a loaded encoder.
pub struct EncoderExtractor {
    model: TokenEmbeddings,
}

impl FeatureExtractor for EncoderExtractor {
    fn extract_features(&self, text: &str) -> Result<FeatureBuffer> {
        self.model.extract(text)
    }
}

/// Loads tokenizers and encoders from the local hub cache, downloading
/// whatever is missing.
pub struct HubLoader {
    hub: HubClient,
}

impl HubLoader {
    pub fn new(hub: HubClient) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ResourceLoader for HubLoader {
    async fn load_tokenizer(&self, model_id: &str) -> Result<Arc<dyn TokenizerHandle>> {
        let model_dir = self
            .hub
            .fetch(model_id, TOKENIZER_FILES, OPTIONAL_TOKENIZER_FILES)
            .await?;

        let tokenizer = tokio::task::spawn_blocking(move || HubTokenizer::from_dir(&model_dir)).await??;
        tracing::info!("Tokenizer loaded for {} ({:?})", model_id, tokenizer.family());

        Ok(Arc::new(tokenizer))
    }

    async fn load_embedding_model(&self, model_id: &str) -> Result<Arc<dyn FeatureExtractor>> {
        // The config is small; settle the architecture before pulling weights
        let model_dir = self.hub.fetch(model_id, CONFIG_FILES, &[]).await?;
        let config_json = tokio::fs::read_to_string(model_dir.join("config.json"))
            .await
            .context("Failed to read config.json")?;
        let architecture = token_embeddings::encoder_architecture(&config_json)?;
        tracing::debug!("{} is a {} encoder", model_id, architecture);

        let model_dir = self.hub.fetch(model_id, MODEL_FILES, &[]).await?;

        let model = tokio::task::spawn_blocking(move || TokenEmbeddings::load_from_dir(&model_dir))
            .await?
            .context("Failed to load embedding model")?;
        tracing::info!("Embedding model loaded for {}", model_id);

        Ok(Arc::new(EncoderExtractor { model }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_family_from_tokenizer_class() {
        let tokenizer = json!({ "model": { "type": "BPE" } });
        let family = detect_family(&tokenizer, Some(r#"{"tokenizer_class": "LlamaTokenizerFast"}"#));
        assert_eq!(family, TokenizerFamily::LeadingMarker);
    }

    #[test]
    fn test_family_falls_back_to_model_type() {
        let word_piece = json!({ "model": { "type": "WordPiece" } });
        assert_eq!(detect_family(&word_piece, None), TokenizerFamily::WordPiece);

        let unigram = json!({ "model": { "type": "Unigram" } });
        assert_eq!(detect_family(&unigram, Some("not json")), TokenizerFamily::T5);

        let bpe = json!({ "model": { "type": "BPE" } });
        assert_eq!(detect_family(&bpe, Some("{}")), TokenizerFamily::Unknown);
    }

    #[test]
    fn test_disable_prefix_space_on_metaspace() {
        let mut tokenizer = json!({
            "decoder": { "type": "Metaspace", "replacement": "▁", "prepend_scheme": "always", "split": true }
        });
        disable_prefix_space(&mut tokenizer);
        assert_eq!(tokenizer["decoder"]["prepend_scheme"], json!("never"));
    }

    #[test]
    fn test_disable_prefix_space_ignores_other_decoders() {
        let mut tokenizer = json!({ "decoder": { "type": "WordPiece", "prefix": "##" } });
        let before = tokenizer.clone();
        disable_prefix_space(&mut tokenizer);
        assert_eq!(tokenizer, before);
    }

    #[tokio::test]
    async fn test_unsupported_architecture_skips_weight_download() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let model_dir = temp_dir.path().join("gpt2");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("config.json"), r#"{"model_type": "gpt2"}"#).unwrap();

        // Unroutable hub: any download attempt would fail with an HTTP error
        let hub = HubClient::new("http://127.0.0.1:9", temp_dir.path().to_path_buf()).unwrap();
        let loader = HubLoader::new(hub);

        let Err(err) = loader.load_embedding_model("gpt2").await else {
            panic!("gpt2 should not load as an encoder");
        };

        assert_eq!(format!("{:#}", err), "Unsupported encoder architecture: gpt2");
        assert!(!model_dir.join("model.safetensors").exists());
        assert!(!model_dir.join("model.safetensors.part").exists());
    }

    #[test]
    fn test_word_level_tokenizer_round_trip() {
        let tokenizer_json = json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": { "[UNK]": 0, "hello": 1, "world": 2 },
                "unk_token": "[UNK]"
            }
        })
        .to_string();

        let tokenizer = HubTokenizer::from_json(&tokenizer_json, None).unwrap();
        assert_eq!(tokenizer.family(), TokenizerFamily::Unknown);

        let ids = tokenizer.encode("hello world").unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(tokenizer.decode(&[2]).unwrap(), "world");
    }
}
