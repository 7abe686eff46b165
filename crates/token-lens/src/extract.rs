//! Per-token embedding vectors from a feature-extraction model.

use crate::error::{PipelineError, Result};
use crate::resources::{FeatureBuffer, FeatureExtractor};

/// Run the extractor on `text` and return one vector per token, in order.
///
/// The extractor may emit extra leading positions (padding, special tokens
/// the caller did not count), so only the trailing `token_count` rows are kept.
pub fn extract(
    extractor: &dyn FeatureExtractor,
    text: &str,
    token_count: usize,
) -> Result<Vec<Vec<f32>>> {
    let buffer = extractor
        .extract_features(text)
        .map_err(|e| PipelineError::Extraction(format!("{:#}", e)))?;

    trailing_vectors(&buffer, token_count)
}

/// Partition the last `token_count * hidden_size` values of `buffer` into
/// `token_count` vectors.
pub fn trailing_vectors(buffer: &FeatureBuffer, token_count: usize) -> Result<Vec<Vec<f32>>> {
    let hidden_size = buffer.hidden_size;
    let needed = token_count * hidden_size;

    if buffer.data.len() < needed {
        return Err(PipelineError::Extraction(format!(
            "expected at least {} values ({} tokens x {} dims), got {}",
            needed,
            token_count,
            hidden_size,
            buffer.data.len()
        )));
    }

    if hidden_size == 0 {
        return Ok(vec![Vec::new(); token_count]);
    }

    let tail = &buffer.data[buffer.data.len() - needed..];
    Ok(tail.chunks_exact(hidden_size).map(<[f32]>::to_vec).collect())
}
