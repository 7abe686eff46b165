//! Memoized, deduplicated loads of tokenizers and embedding models.
//!
//! Each entry holds the shared in-flight load, inserted before the load
//! completes, so concurrent callers for the same key await one load. Entries
//! that resolve successfully live for the life of the cache. Failed entries
//! are evicted so the next request retries instead of replaying the failure.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, ResourceKind, Result};
use crate::resources::{FeatureExtractor, ResourceLoader, TokenizerHandle};

type PendingLoad<T> = Shared<BoxFuture<'static, Result<Arc<T>>>>;

/// One keyed map of pending/resolved loads for a single resource kind.
struct LoadMap<T: ?Sized> {
    kind: ResourceKind,
    entries: Mutex<HashMap<String, PendingLoad<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> LoadMap<T> {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn resolve<F>(&self, model_id: &str, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<Arc<T>>>,
    {
        let pending = {
            let mut entries = self.entries.lock().await;
            match entries.get(model_id) {
                Some(existing) => {
                    debug!("Reusing {} load for {}", self.kind, model_id);
                    existing.clone()
                }
                None => {
                    info!("Loading {} for {}", self.kind, model_id);
                    let kind = self.kind;
                    let id = model_id.to_string();
                    let pending = load()
                        .map(move |result| {
                            result.map_err(|e| PipelineError::resource_load(kind, &id, &e))
                        })
                        .boxed()
                        .shared();
                    entries.insert(model_id.to_string(), pending.clone());
                    pending
                }
            }
        };

        match pending.clone().await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                let mut entries = self.entries.lock().await;
                // A retry may already have replaced the failed entry
                if entries.get(model_id).is_some_and(|entry| entry.ptr_eq(&pending)) {
                    entries.remove(model_id);
                    warn!("Evicted failed {} load for {}: {}", self.kind, model_id, e);
                }
                Err(e)
            }
        }
    }

    async fn contains(&self, model_id: &str) -> bool {
        self.entries.lock().await.contains_key(model_id)
    }
}

/// Process-wide cache of tokenizer and embedding-model handles.
///
/// Constructed once and shared by reference with the pipeline.
pub struct ResourceCache {
    loader: Arc<dyn ResourceLoader>,
    tokenizers: LoadMap<dyn TokenizerHandle>,
    models: LoadMap<dyn FeatureExtractor>,
}

impl ResourceCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            tokenizers: LoadMap::new(ResourceKind::Tokenizer),
            models: LoadMap::new(ResourceKind::EmbeddingModel),
        }
    }

    /// Resolve the tokenizer for `model_id`, loading it at most once.
    pub async fn resolve_tokenizer(&self, model_id: &str) -> Result<Arc<dyn TokenizerHandle>> {
        let loader = self.loader.clone();
        let id = model_id.to_string();
        self.tokenizers
            .resolve(model_id, move || {
                async move { loader.load_tokenizer(&id).await }.boxed()
            })
            .await
    }

    /// Resolve the embedding model for `model_id`, loading it at most once.
    pub async fn resolve_embedding_model(
        &self,
        model_id: &str,
    ) -> Result<Arc<dyn FeatureExtractor>> {
        let loader = self.loader.clone();
        let id = model_id.to_string();
        self.models
            .resolve(model_id, move || {
                async move { loader.load_embedding_model(&id).await }.boxed()
            })
            .await
    }

    /// Whether an entry (pending or resolved) exists for this key.
    pub async fn contains(&self, kind: ResourceKind, model_id: &str) -> bool {
        match kind {
            ResourceKind::Tokenizer => self.tokenizers.contains(model_id).await,
            ResourceKind::EmbeddingModel => self.models.contains(model_id).await,
        }
    }
}
