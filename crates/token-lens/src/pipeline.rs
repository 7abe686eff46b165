//! Per-request state machine and the worker loop that drives it.
//!
//! A request moves through tokenizer resolution, tokenization and the
//! partial response, then (unless the family opts out) embedding model
//! resolution, extraction, projection and the complete response. Any failure
//! ends the request with a single error response.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::ResourceCache;
use crate::error::{PipelineError, Result};
use crate::extract::extract;
use crate::message::{PipelineRequest, PipelineResponse, TokenSequence};
use crate::normalize::normalize;
use crate::projection::{self, FALLBACK_GRAY};
use crate::resources::TokenizerHandle;

/// Channel half the pipeline writes responses to.
pub type ResponseSender = mpsc::UnboundedSender<PipelineResponse>;

/// Tokenize-and-embed pipeline over a shared resource cache.
pub struct Pipeline {
    cache: Arc<ResourceCache>,
}

impl Pipeline {
    pub fn new(cache: Arc<ResourceCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// Worker loop: accept requests in arrival order and run each on its own
    /// task so slow loads for one model do not hold up another.
    ///
    /// Returns once the request channel closes and every accepted request has
    /// finished.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::UnboundedReceiver<PipelineRequest>,
        responses: ResponseSender,
    ) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    let pipeline = self.clone();
                    let responses = responses.clone();
                    tasks.spawn(async move { pipeline.handle(request, &responses).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Request task failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Request task failed: {}", e);
            }
        }

        debug!("Request channel closed, pipeline stopped");
    }

    /// Run one request to completion, sending its responses on `responses`.
    pub async fn handle(&self, request: PipelineRequest, responses: &ResponseSender) {
        let model_id = request.model_identifier.as_str();

        let Some(text) = request.text() else {
            // Pre-warm: load the tokenizer, never respond
            match self.cache.resolve_tokenizer(model_id).await {
                Ok(_) => debug!("Pre-warmed tokenizer for {}", model_id),
                Err(e) => warn!("Pre-warm failed for {}: {}", model_id, e),
            }
            return;
        };

        if let Err(e) = self.process(model_id, text, responses).await {
            error!("Request for {} failed: {}", model_id, e);
            send(
                responses,
                PipelineResponse::Error {
                    model_identifier: model_id.to_string(),
                    error: e.to_string(),
                },
            );
        }
    }

    async fn process(&self, model_id: &str, text: &str, responses: &ResponseSender) -> Result<()> {
        let tokenizer = self.cache.resolve_tokenizer(model_id).await?;
        let family = tokenizer.family();

        let tokens = tokenize(tokenizer.as_ref(), text)?;
        debug!("Tokenized {} into {} tokens ({:?})", model_id, tokens.len(), family);

        send(
            responses,
            PipelineResponse::Partial {
                model_identifier: model_id.to_string(),
                tokens: tokens.clone(),
            },
        );

        if !family.supports_embeddings() {
            let token_colors = vec![FALLBACK_GRAY; tokens.len()];
            send(
                responses,
                PipelineResponse::Complete {
                    model_identifier: model_id.to_string(),
                    tokens,
                    embeddings: None,
                    token_colors,
                },
            );
            return Ok(());
        }

        let model = self.cache.resolve_embedding_model(model_id).await?;

        let start = Instant::now();
        let token_count = tokens.len();
        let owned_text = text.to_string();
        let (embeddings, token_colors) = tokio::task::spawn_blocking(move || -> Result<_> {
            let vectors = extract(model.as_ref(), &owned_text, token_count)?;
            let colors = projection::project(&vectors);
            Ok((vectors, colors))
        })
        .await
        .map_err(|e| PipelineError::Extraction(format!("extraction task failed: {}", e)))??;

        info!(
            "Embedded {} tokens for {} in {:.2}ms",
            token_count,
            model_id,
            start.elapsed().as_secs_f64() * 1000.0
        );

        send(
            responses,
            PipelineResponse::Complete {
                model_identifier: model_id.to_string(),
                tokens,
                embeddings: Some(embeddings),
                token_colors,
            },
        );

        Ok(())
    }
}

/// Encode `text`, decode each id on its own and normalize for display.
pub fn tokenize(tokenizer: &dyn TokenizerHandle, text: &str) -> Result<TokenSequence> {
    let start = Instant::now();
    let ids = tokenizer
        .encode(text)
        .map_err(|e| PipelineError::Tokenization(format!("{:#}", e)))?;
    info!(
        "Tokenized {} characters in {:.2}ms",
        text.chars().count(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let raw = ids
        .iter()
        .map(|&id| tokenizer.decode(&[id]))
        .collect::<anyhow::Result<Vec<String>>>()
        .map_err(|e| PipelineError::Tokenization(format!("{:#}", e)))?;

    let normalized = normalize(tokenizer.family(), raw);

    Ok(TokenSequence {
        decoded: normalized.decoded,
        margins: normalized.margins,
        ids,
    })
}

fn send(responses: &ResponseSender, response: PipelineResponse) {
    if responses.send(response).is_err() {
        debug!("Response receiver dropped");
    }
}
