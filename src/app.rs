use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::llm::LlmClient;
use crate::storage::{jobs, Database};
use crate::sync::SyncEngine;
use crate::tokens::TokenManager;
use crate::vector::VectorStore;
use crate::worker::Processor;
use crate::EMBEDDING_DIMENSION;

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let db = Database::new_default().await?;
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Using SQLite store");
    }
    jobs::ensure_jobs_table(db.pool()).await?;

    let cipher = Arc::new(
        TokenCipher::from_hex(&config.token_key_hex).context("loading token cipher key")?,
    );
    let llm = Arc::new(LlmClient::new(&config)?);
    let vectors = Arc::new(VectorStore::new(&config.vector_url)?);

    // The vector store may come up after we do; retrieval already degrades
    // gracefully, so a failed bootstrap is not fatal.
    if let Err(e) = vectors.ensure_collections(EMBEDDING_DIMENSION).await {
        warn!(error = %e, "Vector store not reachable at startup");
    }

    let provider_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider_timeout_secs))
        .build()
        .context("building provider HTTP client")?;

    let tokens = Arc::new(TokenManager::new(
        db.clone(),
        cipher.clone(),
        provider_http.clone(),
        config.clone(),
    ));

    let engine = SyncEngine::new(db.clone(), tokens.clone(), provider_http.clone());
    let processor = Processor::new(db.clone(), llm.clone(), vectors.clone());

    if cli.sync_once {
        engine.sync_all_accounts().await?;
        return Ok(());
    }

    if cli.drain_jobs {
        let completed = processor.drain_pending().await?;
        info!(completed, "Drained pending jobs");
        return Ok(());
    }

    run_daemon(config, engine, processor).await
}

/// Fixed-interval sync loop plus job-queue worker. Runs until the process
/// is stopped.
async fn run_daemon(config: Config, engine: SyncEngine, processor: Processor) -> Result<()> {
    info!(
        sync_interval_secs = config.sync_interval_secs,
        "Starting mailbot daemon"
    );

    let mut sync_tick = tokio::time::interval(Duration::from_secs(config.sync_interval_secs));
    let mut job_tick = tokio::time::interval(Duration::from_secs(config.job_poll_interval_secs));

    loop {
        tokio::select! {
            _ = sync_tick.tick() => {
                if let Err(e) = engine.sync_all_accounts().await {
                    warn!(error = %e, "Sync run failed");
                }
            }
            _ = job_tick.tick() => {
                match processor.drain_pending().await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Processed messages"),
                    Err(e) => warn!(error = %e, "Job drain failed"),
                }
            }
        }
    }
}
