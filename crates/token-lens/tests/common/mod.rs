//! Stub resources for driving the pipeline without real models.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use token_lens::{
    FeatureBuffer, FeatureExtractor, Pipeline, PipelineRequest, PipelineResponse, ResourceCache,
    ResourceLoader, TokenizerFamily, TokenizerHandle,
};

/// Tokenizer that always yields the same pieces, one id per piece.
pub struct StubTokenizer {
    family: TokenizerFamily,
    pieces: Vec<String>,
}

impl TokenizerHandle for StubTokenizer {
    fn family(&self) -> TokenizerFamily {
        self.family
    }

    fn encode(&self, text: &str) -> anyhow::Result<Vec<u32>> {
        if text.contains("\u{0}") {
            anyhow::bail!("unsupported character");
        }
        Ok((0..self.pieces.len() as u32).collect())
    }

    fn decode(&self, ids: &[u32]) -> anyhow::Result<String> {
        ids.iter()
            .map(|&id| {
                self.pieces
                    .get(id as usize)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("unknown id {}", id))
            })
            .collect()
    }
}

/// Extractor producing `positions` rows of `hidden_size` values.
///
/// Row `i` is spread along a different direction so PCA has real variance.
pub struct StubExtractor {
    pub positions: usize,
    pub hidden_size: usize,
}

impl FeatureExtractor for StubExtractor {
    fn extract_features(&self, _text: &str) -> anyhow::Result<FeatureBuffer> {
        let data = (0..self.positions)
            .flat_map(|i| {
                (0..self.hidden_size).map(move |j| ((i * 7 + j * 3) % 11) as f32 + (i * j) as f32 * 0.1)
            })
            .collect();
        FeatureBuffer::new(data, self.positions, self.hidden_size)
    }
}

/// Model definition served by [`StubLoader`].
#[derive(Clone)]
pub struct StubModel {
    pub family: TokenizerFamily,
    pub pieces: Vec<String>,
    /// Rows the extractor returns; defaults to one per piece
    pub positions: Option<usize>,
    pub hidden_size: usize,
}

impl StubModel {
    pub fn new(family: TokenizerFamily, pieces: &[&str]) -> Self {
        Self {
            family,
            pieces: pieces.iter().map(|s| s.to_string()).collect(),
            positions: None,
            hidden_size: 8,
        }
    }

    pub fn with_positions(mut self, positions: usize) -> Self {
        self.positions = Some(positions);
        self
    }
}

/// Loader that counts loads and can fail the first few tokenizer loads.
#[derive(Default)]
pub struct StubLoader {
    models: HashMap<String, StubModel>,
    pub tokenizer_loads: AtomicUsize,
    pub model_loads: AtomicUsize,
    tokenizer_failures: AtomicUsize,
}

impl StubLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model_id: &str, model: StubModel) -> Self {
        self.models.insert(model_id.to_string(), model);
        self
    }

    /// Fail the next `count` tokenizer loads.
    pub fn failing_tokenizer_loads(self, count: usize) -> Self {
        self.tokenizer_failures.store(count, Ordering::SeqCst);
        self
    }

    fn model(&self, model_id: &str) -> anyhow::Result<&StubModel> {
        self.models
            .get(model_id)
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", model_id))
    }
}

#[async_trait]
impl ResourceLoader for StubLoader {
    async fn load_tokenizer(&self, model_id: &str) -> anyhow::Result<Arc<dyn TokenizerHandle>> {
        self.tokenizer_loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let remaining = self.tokenizer_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.tokenizer_failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("network unreachable");
        }

        let model = self.model(model_id)?;
        Ok(Arc::new(StubTokenizer {
            family: model.family,
            pieces: model.pieces.clone(),
        }))
    }

    async fn load_embedding_model(
        &self,
        model_id: &str,
    ) -> anyhow::Result<Arc<dyn FeatureExtractor>> {
        self.model_loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let model = self.model(model_id)?;
        Ok(Arc::new(StubExtractor {
            positions: model.positions.unwrap_or(model.pieces.len()),
            hidden_size: model.hidden_size,
        }))
    }
}

pub fn pipeline_with(loader: Arc<StubLoader>) -> Pipeline {
    Pipeline::new(Arc::new(ResourceCache::new(loader)))
}

/// Run a single request and collect everything it emitted.
pub async fn run_one(pipeline: &Pipeline, request: PipelineRequest) -> Vec<PipelineResponse> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    pipeline.handle(request, &tx).await;
    drop(tx);

    let mut responses = Vec::new();
    while let Some(response) = rx.recv().await {
        responses.push(response);
    }
    responses
}
