//! Tokenizer and model downloads from Hugging Face.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[cfg(feature = "download-model")]
use futures::StreamExt;
#[cfg(feature = "download-model")]
use tokio::io::AsyncWriteExt;

/// Files a tokenizer needs.
pub const TOKENIZER_FILES: &[&str] = &["tokenizer.json"];

/// Tokenizer files used when present (family detection).
pub const OPTIONAL_TOKENIZER_FILES: &[&str] = &["tokenizer_config.json"];

/// Fetched ahead of the weights to check the architecture.
pub const CONFIG_FILES: &[&str] = &["config.json"];

/// Files an embedding model needs (its own tokenizer included).
pub const MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid model identifier: {0:?}")]
    InvalidModelId(String),

    #[error("{file} for {model_id} is not cached and downloads are disabled")]
    NotCached { model_id: String, file: String },

    #[cfg(feature = "download-model")]
    #[error("HTTP error downloading {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid tokenizer.json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Local mirror of Hugging Face repositories under a cache root.
pub struct HubClient {
    base_url: String,
    cache_dir: PathBuf,
    #[cfg(feature = "download-model")]
    client: reqwest::Client,
}

impl HubClient {
    pub fn new(base_url: &str, cache_dir: PathBuf) -> Result<Self, HubError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_dir,
            #[cfg(feature = "download-model")]
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .map_err(|source| HubError::Http {
                    url: base_url.to_string(),
                    source,
                })?,
        })
    }

    /// Directory holding the files for `model_id`.
    ///
    /// Ids like `org/name` map to nested directories. Absolute paths and `..`
    /// segments are rejected.
    pub fn model_dir(&self, model_id: &str) -> Result<PathBuf, HubError> {
        let relative = Path::new(model_id);
        let valid = !model_id.is_empty()
            && !model_id.contains('\\')
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !valid {
            return Err(HubError::InvalidModelId(model_id.to_string()));
        }

        Ok(self.cache_dir.join(relative))
    }

    /// Make sure `required` (and, where the hub has them, `optional`) files
    /// for `model_id` are present locally. Returns the model directory.
    pub async fn fetch(
        &self,
        model_id: &str,
        required: &[&str],
        optional: &[&str],
    ) -> Result<PathBuf, HubError> {
        let model_dir = self.model_dir(model_id)?;

        if !model_dir.exists() {
            fs::create_dir_all(&model_dir).await?;
            tracing::info!("Created model directory: {}", model_dir.display());
        }

        let mut downloaded_tokenizer = false;

        for file in required {
            if self.ensure_file(model_id, &model_dir, file, true).await? && *file == "tokenizer.json" {
                downloaded_tokenizer = true;
            }
        }

        for file in optional {
            self.ensure_file(model_id, &model_dir, file, false).await?;
        }

        if downloaded_tokenizer {
            optimize_tokenizer(&model_dir).await?;
        }

        Ok(model_dir)
    }

    /// Returns whether the file was freshly downloaded.
    async fn ensure_file(
        &self,
        model_id: &str,
        model_dir: &Path,
        file: &str,
        required: bool,
    ) -> Result<bool, HubError> {
        let dest_path = model_dir.join(file);

        if is_present(&dest_path).await {
            tracing::debug!("{} for {} already cached", file, model_id);
            return Ok(false);
        }

        let url = format!("{}/{}/resolve/main/{}", self.base_url, model_id, file);
        self.download(model_id, file, &url, &dest_path, required).await
    }

    #[cfg(feature = "download-model")]
    async fn download(
        &self,
        _model_id: &str,
        file: &str,
        url: &str,
        dest: &Path,
        required: bool,
    ) -> Result<bool, HubError> {
        tracing::info!("Downloading {}...", url);

        let http_error = |source| HubError::Http {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(http_error)?;

        if !required && response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("{} not published, skipping", file);
            return Ok(false);
        }

        let response = response.error_for_status().map_err(http_error)?;

        let total_size = response.content_length();
        let mut stream = response.bytes_stream();

        // Write to a side file so an interrupted download never looks complete
        let partial_path = dest.with_file_name(format!("{}.part", file));
        let mut out = fs::File::create(&partial_path).await?;
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            out.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            // Log progress for large files
            if let Some(total) = total_size {
                if total > 1_000_000 && downloaded % 10_000_000 < chunk.len() as u64 {
                    let percent = (downloaded as f64 / total as f64) * 100.0;
                    tracing::info!("  Progress: {:.1}%", percent);
                }
            }
        }

        out.flush().await?;
        drop(out);
        fs::rename(&partial_path, dest).await?;

        Ok(true)
    }

    #[cfg(not(feature = "download-model"))]
    async fn download(
        &self,
        model_id: &str,
        file: &str,
        _url: &str,
        _dest: &Path,
        required: bool,
    ) -> Result<bool, HubError> {
        if required {
            return Err(HubError::NotCached {
                model_id: model_id.to_string(),
                file: file.to_string(),
            });
        }
        Ok(false)
    }
}

/// A cached file counts once it exists and is non-empty.
async fn is_present(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.len() > 0)
}

/// Remove fixed padding configuration from tokenizer.json.
///
/// Some published tokenizer.json files pad every sequence to a fixed length,
/// which would add pad tokens to every tokenization we display.
pub(crate) async fn optimize_tokenizer(model_dir: &Path) -> Result<(), HubError> {
    let tokenizer_path = model_dir.join("tokenizer.json");

    let content = fs::read_to_string(&tokenizer_path).await?;
    let mut data: serde_json::Value = serde_json::from_str(&content)?;

    if data.get("padding").is_some_and(|p| !p.is_null()) {
        tracing::info!("Removing fixed padding from {}", tokenizer_path.display());

        if let Some(obj) = data.as_object_mut() {
            obj.remove("padding");
        }

        let optimized = serde_json::to_string_pretty(&data)?;
        fs::write(&tokenizer_path, optimized).await?;
    } else {
        tracing::debug!("Tokenizer has no fixed padding");
    }

    Ok(())
}
