use anyhow::Result;

/// Flattened hidden states for one forward pass.
///
/// `data` is laid out row-major as `[token_count, hidden_size]`. The token
/// count covers every position the encoder saw, special tokens included.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBuffer {
    pub data: Vec<f32>,
    pub token_count: usize,
    pub hidden_size: usize,
}

impl FeatureBuffer {
    /// Wrap a flat buffer, checking that it matches the declared shape.
    pub fn new(data: Vec<f32>, token_count: usize, hidden_size: usize) -> Result<Self> {
        if data.len() != token_count * hidden_size {
            anyhow::bail!(
                "Feature buffer has {} values, expected {} tokens x {} dims",
                data.len(),
                token_count,
                hidden_size
            );
        }

        Ok(Self {
            data,
            token_count,
            hidden_size,
        })
    }

    /// Hidden state for a single position.
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.token_count {
            return None;
        }
        let start = index * self.hidden_size;
        Some(&self.data[start..start + self.hidden_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let result = FeatureBuffer::new(vec![0.0; 5], 2, 3);
        assert!(result.is_err(), "5 values cannot be 2 x 3");
    }

    #[test]
    fn test_row_slices_by_hidden_size() {
        let buffer = FeatureBuffer::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(buffer.row(0), Some(&[1.0, 2.0][..]));
        assert_eq!(buffer.row(2), Some(&[5.0, 6.0][..]));
        assert_eq!(buffer.row(3), None);
    }
}
