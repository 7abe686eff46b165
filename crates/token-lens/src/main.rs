//! token-lens worker: newline-delimited JSON requests on stdin, one JSON
//! response per line on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use token_lens::config::{self, Config};
use token_lens::hub::{HubClient, HubLoader};
use token_lens::{Pipeline, PipelineRequest, ResourceCache};

#[derive(Parser, Debug)]
#[command(name = "token-lens")]
#[command(about = "Tokenize text and color tokens by contextual embedding")]
struct Args {
    /// Model cache directory (overrides TOKEN_LENS_CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Model hub base URL (overrides TOKEN_LENS_HUB_URL)
    #[arg(long)]
    hub_url: Option<String>,

    /// Comma-separated models to pre-warm (overrides TOKEN_LENS_PREWARM)
    #[arg(long)]
    prewarm: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,token_lens=debug"
    } else {
        "info,token_lens=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env()?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }
    if let Some(hub_url) = args.hub_url {
        config.hub_url = config::parse_hub_url(&hub_url)?;
    }
    if let Some(prewarm) = args.prewarm {
        config.prewarm = config::parse_model_list(&prewarm);
    }

    info!("Starting token-lens");
    info!("Model cache: {}", config.cache_dir.display());
    info!("Hub: {}", config.hub_url);

    let hub = HubClient::new(&config.hub_url, config.cache_dir.clone())
        .context("Failed to create hub client")?;
    let cache = Arc::new(ResourceCache::new(Arc::new(HubLoader::new(hub))));
    let pipeline = Arc::new(Pipeline::new(cache));

    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, mut response_rx) = mpsc::unbounded_channel();

    let worker = tokio::spawn(pipeline.run(request_rx, response_tx));

    // Pre-load tokenizers so first requests skip the download
    for model_id in &config.prewarm {
        debug!("Pre-warming {}", model_id);
        request_tx.send(PipelineRequest::prewarm(model_id.as_str()))?;
    }

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = response_rx.recv().await {
            let line = response.to_json_line()?;
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PipelineRequest>(&line) {
            Ok(request) => request_tx.send(request)?,
            Err(e) => warn!("Skipping malformed request: {}", e),
        }
    }

    info!("Input closed, finishing outstanding requests");
    drop(request_tx);
    worker.await?;
    writer.await??;

    info!("Shutting down");
    Ok(())
}
