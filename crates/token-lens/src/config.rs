use std::path::PathBuf;

/// Default hub the tokenizers and models are fetched from.
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

/// Models pre-warmed at startup when nothing else is configured.
pub const DEFAULT_PREWARM: &[&str] = &["distilbert-base-uncased", "gpt2", "t5-small"];

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root directory of the local model cache
    pub cache_dir: PathBuf,
    /// Base URL of the model hub
    pub hub_url: String,
    /// Model identifiers whose tokenizers are loaded at startup
    pub prewarm: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `TOKEN_LENS_CACHE_DIR`: Model cache root (supports ~ for home directory)
    /// - `TOKEN_LENS_HUB_URL`: Hub base URL
    /// - `TOKEN_LENS_PREWARM`: Comma-separated model identifiers
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cache_dir = match lookup("TOKEN_LENS_CACHE_DIR") {
            Some(path) if path.trim().is_empty() => {
                return Err(ConfigError::Empty("TOKEN_LENS_CACHE_DIR"));
            }
            Some(path) => expand_tilde(path.trim()),
            None => default_cache_dir()?,
        };

        let hub_url = match lookup("TOKEN_LENS_HUB_URL") {
            Some(url) => parse_hub_url(&url)?,
            None => DEFAULT_HUB_URL.to_string(),
        };

        let prewarm = match lookup("TOKEN_LENS_PREWARM") {
            Some(list) => parse_model_list(&list),
            None => DEFAULT_PREWARM.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            cache_dir,
            hub_url,
            prewarm,
        })
    }
}

/// Split a comma-separated model list, dropping blanks.
pub fn parse_model_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accept only http(s) hub URLs.
pub fn parse_hub_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidHubUrl(url.to_string()))
    }
}

fn default_cache_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".cache/token-lens"))
        .ok_or(ConfigError::NoHomeDir)
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is set but empty")]
    Empty(&'static str),

    #[error("Hub URL must start with http:// or https://, got {0:?}")]
    InvalidHubUrl(String),

    #[error("Could not determine home directory for the default cache; set TOKEN_LENS_CACHE_DIR")]
    NoHomeDir,
}
