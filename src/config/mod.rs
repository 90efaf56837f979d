use std::env;

use anyhow::{Context, Result};
use url::Url;

/// Application configuration, read from the environment once at startup.
/// Every knob has a default except provider OAuth credentials and the
/// token-cipher key, which have no sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub gmail_client_id: String,
    pub gmail_client_secret: String,
    pub outlook_client_id: String,
    pub outlook_client_secret: String,
    pub outlook_tenant_id: String,

    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_embed_model: String,
    pub vector_url: String,

    /// 64 hex chars (32 bytes) for AES-256-GCM token encryption.
    pub token_key_hex: String,

    pub sync_interval_secs: u64,
    pub job_poll_interval_secs: u64,
    pub provider_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let llm_base_url = env::var("MAILBOT_LLM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        Url::parse(&llm_base_url)
            .with_context(|| format!("invalid MAILBOT_LLM_BASE_URL '{llm_base_url}'"))?;

        let vector_url = env::var("MAILBOT_VECTOR_URL")
            .unwrap_or_else(|_| "http://localhost:6333".to_string());
        Url::parse(&vector_url)
            .with_context(|| format!("invalid MAILBOT_VECTOR_URL '{vector_url}'"))?;

        Ok(Self {
            gmail_client_id: env::var("MAILBOT_GMAIL_CLIENT_ID").unwrap_or_default(),
            gmail_client_secret: env::var("MAILBOT_GMAIL_CLIENT_SECRET").unwrap_or_default(),
            outlook_client_id: env::var("MAILBOT_OUTLOOK_CLIENT_ID").unwrap_or_default(),
            outlook_client_secret: env::var("MAILBOT_OUTLOOK_CLIENT_SECRET").unwrap_or_default(),
            outlook_tenant_id: env::var("MAILBOT_OUTLOOK_TENANT_ID")
                .unwrap_or_else(|_| "common".to_string()),
            llm_base_url,
            llm_model: env::var("MAILBOT_LLM_MODEL")
                .unwrap_or_else(|_| "mistral:7b-instruct".to_string()),
            llm_embed_model: env::var("MAILBOT_LLM_EMBED_MODEL")
                .unwrap_or_else(|_| "nomic-embed-text".to_string()),
            vector_url,
            token_key_hex: env::var("MAILBOT_TOKEN_KEY").unwrap_or_default(),
            sync_interval_secs: env_u64("MAILBOT_SYNC_INTERVAL_SECONDS", 60),
            job_poll_interval_secs: env_u64("MAILBOT_JOB_POLL_SECONDS", 5),
            provider_timeout_secs: env_u64("MAILBOT_PROVIDER_TIMEOUT_SECONDS", 30),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}
