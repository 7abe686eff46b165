//! Tokenizer families and how they are recognized.

/// Surface-form convention a tokenizer uses for its decoded pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenizerFamily {
    /// BERT/DeBERTa style: `##` marks a piece that continues the previous word.
    WordPiece,
    /// Llama/Phi style SentencePiece: `▁` marks a piece that starts a new word.
    LeadingMarker,
    /// T5 SentencePiece, rendered without the leading-marker convention.
    T5,
    /// Anything else (GPT-2 byte-level BPE, ...). Pieces pass through untouched.
    Unknown,
}

impl TokenizerFamily {
    /// Map a `tokenizer_class` from tokenizer_config.json to a family.
    ///
    /// The `Fast` suffix used by the Rust-backed tokenizer classes is ignored.
    pub fn from_class_name(class: &str) -> Self {
        let class = class.strip_suffix("Fast").unwrap_or(class);
        match class {
            "BertTokenizer" | "DistilBertTokenizer" | "DebertaTokenizer" | "DebertaV2Tokenizer"
            | "ElectraTokenizer" | "MobileBertTokenizer" | "SqueezeBertTokenizer" => {
                TokenizerFamily::WordPiece
            }
            "LlamaTokenizer" | "CodeLlamaTokenizer" | "PhiTokenizer" | "Phi3Tokenizer" => {
                TokenizerFamily::LeadingMarker
            }
            "T5Tokenizer" => TokenizerFamily::T5,
            _ => TokenizerFamily::Unknown,
        }
    }

    /// Whether requests for this family go on to the embedding stage.
    pub fn supports_embeddings(self) -> bool {
        !matches!(self, TokenizerFamily::T5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_class_name() {
        assert_eq!(TokenizerFamily::from_class_name("BertTokenizer"), TokenizerFamily::WordPiece);
        assert_eq!(
            TokenizerFamily::from_class_name("DistilBertTokenizerFast"),
            TokenizerFamily::WordPiece
        );
        assert_eq!(
            TokenizerFamily::from_class_name("LlamaTokenizerFast"),
            TokenizerFamily::LeadingMarker
        );
        assert_eq!(TokenizerFamily::from_class_name("T5Tokenizer"), TokenizerFamily::T5);
        assert_eq!(TokenizerFamily::from_class_name("GPT2Tokenizer"), TokenizerFamily::Unknown);
    }

    #[test]
    fn test_only_t5_opts_out_of_embeddings() {
        assert!(!TokenizerFamily::T5.supports_embeddings());
        assert!(TokenizerFamily::WordPiece.supports_embeddings());
        assert!(TokenizerFamily::LeadingMarker.supports_embeddings());
        assert!(TokenizerFamily::Unknown.supports_embeddings());
    }
}
