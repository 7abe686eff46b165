//! Request and response messages exchanged with the caller.
//!
//! Responses are a tagged enum in memory. On the wire they keep the flag
//! style the UI consumes: `partial: true` / `complete: true` or an `error`.

use serde::{Deserialize, Serialize, Serializer};

use crate::projection::ColorTriple;

/// One tokenize-and-embed request.
///
/// Missing or empty `text` only pre-warms the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    #[serde(alias = "model_id")]
    pub model_identifier: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl PipelineRequest {
    pub fn new(model_identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            text: Some(text.into()),
        }
    }

    /// A request that only loads the tokenizer.
    pub fn prewarm(model_identifier: impl Into<String>) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            text: None,
        }
    }

    /// The text to tokenize, if there is any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// Tokenization result shared by the partial and complete stages.
///
/// `margins` is either empty (default layout) or one entry per token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSequence {
    pub decoded: Vec<String>,
    pub margins: Vec<u32>,
    pub ids: Vec<u32>,
}

impl TokenSequence {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A message sent back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResponse {
    /// Stage 1: tokenization only.
    Partial {
        model_identifier: String,
        tokens: TokenSequence,
    },
    /// Stage 2: tokenization plus embeddings and colors. `embeddings` is
    /// `None` for families that skip the embedding stage.
    Complete {
        model_identifier: String,
        tokens: TokenSequence,
        embeddings: Option<Vec<Vec<f32>>>,
        token_colors: Vec<ColorTriple>,
    },
    Error {
        model_identifier: String,
        error: String,
    },
}

impl PipelineResponse {
    pub fn model_identifier(&self) -> &str {
        match self {
            PipelineResponse::Partial {
                model_identifier, ..
            }
            | PipelineResponse::Complete {
                model_identifier, ..
            }
            | PipelineResponse::Error {
                model_identifier, ..
            } => model_identifier,
        }
    }

    /// Token sequence carried by partial and complete responses.
    pub fn tokens(&self) -> Option<&TokenSequence> {
        match self {
            PipelineResponse::Partial { tokens, .. } | PipelineResponse::Complete { tokens, .. } => {
                Some(tokens)
            }
            PipelineResponse::Error { .. } => None,
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse<'a> {
    model_identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(flatten)]
    tokens: Option<&'a TokenSequence>,
    // Outer None omits the key; inner None writes `null`
    #[serde(skip_serializing_if = "Option::is_none")]
    embeddings: Option<Option<&'a Vec<Vec<f32>>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_colors: Option<&'a [ColorTriple]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    complete: Option<bool>,
}

impl Serialize for PipelineResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            PipelineResponse::Partial {
                model_identifier,
                tokens,
            } => WireResponse {
                model_identifier,
                error: None,
                tokens: Some(tokens),
                embeddings: None,
                token_colors: None,
                partial: Some(true),
                complete: None,
            },
            PipelineResponse::Complete {
                model_identifier,
                tokens,
                embeddings,
                token_colors,
            } => WireResponse {
                model_identifier,
                error: None,
                tokens: Some(tokens),
                embeddings: Some(embeddings.as_ref()),
                token_colors: Some(token_colors.as_slice()),
                partial: None,
                complete: Some(true),
            },
            PipelineResponse::Error {
                model_identifier,
                error,
            } => WireResponse {
                model_identifier,
                error: Some(error.as_str()),
                tokens: None,
                embeddings: None,
                token_colors: None,
                partial: None,
                complete: None,
            },
        };
        wire.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tokens() -> TokenSequence {
        TokenSequence {
            decoded: vec!["[CLS]".into(), "ing".into()],
            margins: vec![0, 0],
            ids: vec![101, 2075],
        }
    }

    #[test]
    fn test_request_accepts_both_key_styles() {
        let a: PipelineRequest =
            serde_json::from_str(r#"{"modelIdentifier": "gpt2", "text": "hi"}"#).unwrap();
        let b: PipelineRequest = serde_json::from_str(r#"{"model_id": "gpt2", "text": "hi"}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.text(), Some("hi"));
    }

    #[test]
    fn test_request_without_text_is_prewarm() {
        let req: PipelineRequest = serde_json::from_str(r#"{"modelIdentifier": "gpt2"}"#).unwrap();
        assert_eq!(req.text(), None);

        let req: PipelineRequest =
            serde_json::from_str(r#"{"modelIdentifier": "gpt2", "text": ""}"#).unwrap();
        assert_eq!(req.text(), None);
    }

    #[test]
    fn test_partial_wire_format() {
        let response = PipelineResponse::Partial {
            model_identifier: "bert-base-uncased".into(),
            tokens: sample_tokens(),
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "modelIdentifier": "bert-base-uncased",
                "decoded": ["[CLS]", "ing"],
                "margins": [0, 0],
                "ids": [101, 2075],
                "partial": true
            })
        );
    }

    #[test]
    fn test_complete_wire_format_with_null_embeddings() {
        let response = PipelineResponse::Complete {
            model_identifier: "t5-small".into(),
            tokens: sample_tokens(),
            embeddings: None,
            token_colors: vec![[128, 128, 128]; 2],
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["embeddings"], serde_json::Value::Null);
        assert!(value.as_object().unwrap().contains_key("embeddings"));
        assert_eq!(value["tokenColors"], json!([[128, 128, 128], [128, 128, 128]]));
        assert_eq!(value["complete"], json!(true));
        assert!(value.get("partial").is_none());
    }

    #[test]
    fn test_error_wire_format() {
        let response = PipelineResponse::Error {
            model_identifier: "gpt2".into(),
            error: "boom".into(),
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "modelIdentifier": "gpt2", "error": "boom" })
        );
    }
}
