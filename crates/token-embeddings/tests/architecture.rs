use std::fs;
use tempfile::TempDir;
use token_embeddings::TokenEmbeddings;

#[test]
fn test_unsupported_architecture_rejected_before_weights() {
    let model_dir = TempDir::new().unwrap();
    fs::write(model_dir.path().join("config.json"), r#"{"model_type": "gpt2"}"#).unwrap();

    // No tokenizer.json or model.safetensors: the config alone must decide
    let Err(err) = TokenEmbeddings::load_from_dir(model_dir.path()) else {
        panic!("gpt2 should not load as an encoder");
    };

    assert_eq!(err.to_string(), "Unsupported encoder architecture: gpt2");
}

#[test]
fn test_supported_architecture_still_needs_weights() {
    let model_dir = TempDir::new().unwrap();
    fs::write(model_dir.path().join("config.json"), r#"{"model_type": "bert"}"#).unwrap();

    let Err(err) = TokenEmbeddings::load_from_dir(model_dir.path()) else {
        panic!("Loading without weights should fail");
    };

    assert!(err.to_string().starts_with("Failed to read"), "got {}", err);
}
