use once_cell::sync::Lazy;
use std::path::PathBuf;
use token_embeddings::TokenEmbeddings;

// Shared model instance loaded once for all tests (improves test performance).
// Points at a directory with config.json, tokenizer.json and model.safetensors.
pub static TEST_MODEL: Lazy<Option<TokenEmbeddings>> = Lazy::new(|| {
    let model_dir = PathBuf::from(std::env::var("TOKEN_LENS_TEST_MODEL_DIR").ok()?);

    Some(TokenEmbeddings::load_from_dir(&model_dir).expect("Failed to load model"))
});
