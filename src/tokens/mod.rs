//! Token lifecycle management.
//!
//! Accounts store their provider tokens encrypted at rest. `get_valid_token`
//! hands out a usable bearer token, refreshing through the provider's
//! refresh-token grant when the stored expiry has passed. Refreshes for the
//! same account are single-flighted so two flows cannot race the grant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::crypto::TokenCipher;
use crate::errors::{AppError, AppResult};
use crate::storage::Database;
use crate::types::{Account, Provider};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GRAPH_SCOPES: &str =
    "https://graph.microsoft.com/Mail.ReadWrite https://graph.microsoft.com/Mail.Send offline_access";

/// Refresh slightly before the recorded expiry so a token is never handed
/// out with only seconds of life left.
const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

pub struct TokenManager {
    db: Database,
    cipher: Arc<TokenCipher>,
    http: Client,
    config: Config,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(db: Database, cipher: Arc<TokenCipher>, http: Client, config: Config) -> Self {
        Self {
            db,
            cipher,
            http,
            config,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a non-expired bearer token for the account, refreshing it
    /// through the provider if needed.
    pub async fn get_valid_token(&self, account: &Account) -> AppResult<String> {
        if let Some(token) = self.cached_token(account)? {
            return Ok(token);
        }

        let lock = self.lock_for(&account.id);
        let _guard = lock.lock().await;

        // Another flow may have refreshed while we waited for the lock.
        let fresh = self
            .db
            .get_account(&account.id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("account {}", account.id)))?;
        if let Some(token) = self.cached_token(&fresh)? {
            debug!(account = %account.id, "Token refreshed by concurrent flow");
            return Ok(token);
        }

        self.refresh(&fresh).await
    }

    fn cached_token(&self, account: &Account) -> AppResult<Option<String>> {
        let valid_until = Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS);
        match (&account.token_expires_at, &account.encrypted_access_token) {
            (Some(expires_at), Some(encrypted)) if *expires_at > valid_until => {
                Ok(Some(self.cipher.decrypt(encrypted)?))
            }
            _ => Ok(None),
        }
    }

    async fn refresh(&self, account: &Account) -> AppResult<String> {
        let encrypted_refresh = account
            .encrypted_refresh_token
            .as_deref()
            .ok_or(AppError::AuthExpired)?;
        let refresh_token = self.cipher.decrypt(encrypted_refresh)?;

        info!(account = %account.id, provider = %account.provider, "Refreshing access token");

        let response = match account.provider {
            Provider::Gmail => self.refresh_gmail(&refresh_token).await?,
            Provider::Outlook => self.refresh_outlook(&refresh_token).await?,
        };

        let expires_at = Utc::now() + Duration::seconds(response.expires_in);
        let encrypted_access = self.cipher.encrypt(&response.access_token)?;
        // Providers may rotate the refresh token; keep the old one otherwise.
        let encrypted_refresh = match &response.refresh_token {
            Some(rotated) => self.cipher.encrypt(rotated)?,
            None => encrypted_refresh.to_string(),
        };

        self.db
            .update_account_tokens(&account.id, &encrypted_access, &encrypted_refresh, expires_at)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(account = %account.id, "Access token refreshed");
        Ok(response.access_token)
    }

    async fn refresh_gmail(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let params = [
            ("client_id", self.config.gmail_client_id.as_str()),
            ("client_secret", self.config.gmail_client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.request_token(GOOGLE_TOKEN_URL, &params).await
    }

    async fn refresh_outlook(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        let token_url = format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.config.outlook_tenant_id
        );
        let params = [
            ("client_id", self.config.outlook_client_id.as_str()),
            ("client_secret", self.config.outlook_client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
            ("scope", GRAPH_SCOPES),
        ];
        self.request_token(&token_url, &params).await
    }

    async fn request_token(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> AppResult<TokenResponse> {
        let response = self
            .http
            .post(token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("token refresh request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Token refresh rejected");
            return Err(AppError::AuthExpired);
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::Unexpected(format!("decoding token response: {e}")))
    }

    fn lock_for(&self, account_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
