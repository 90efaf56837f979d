//! Mail sync orchestrator.
//!
//! Walks every active account, asks the provider adapter for messages newer
//! than the account's cursor, deduplicates against the store with one
//! batched lookup, and commits new rows together with the advanced cursor.
//! Downstream classification is decoupled through the durable job queue —
//! ingestion never waits on the generative-text service.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::providers;
use crate::storage::{jobs, Database};
use crate::tokens::TokenManager;
use crate::types::{Account, FetchOutcome, MessageRecord};

pub struct SyncEngine {
    db: Database,
    tokens: Arc<TokenManager>,
    http: Client,
}

impl SyncEngine {
    pub fn new(db: Database, tokens: Arc<TokenManager>, http: Client) -> Self {
        Self { db, tokens, http }
    }

    /// Sync every active account sequentially. A failure on one account is
    /// logged and does not abort the remaining accounts.
    pub async fn sync_all_accounts(&self) -> Result<()> {
        let accounts = self.db.list_active_accounts().await?;
        if accounts.is_empty() {
            debug!("No active mail accounts to sync");
            return Ok(());
        }

        let mut total_new = 0usize;
        for account in &accounts {
            match self.sync_account(account).await {
                Ok(count) => total_new += count,
                Err(e) => {
                    warn!(account = %account.id, error = %e, "Account sync failed");
                }
            }
        }

        info!(
            accounts = accounts.len(),
            new_messages = total_new,
            "Sync run complete"
        );
        Ok(())
    }

    /// Sync one account. Returns the number of newly persisted messages.
    /// An unreachable provider leaves the ground state untouched and counts
    /// as zero.
    pub async fn sync_account(&self, account: &Account) -> Result<usize> {
        info!(account = %account.id, provider = %account.provider, "Starting mail sync");

        let outcome = match providers::fetch(&self.http, &self.tokens, account).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(account = %account.id, error = %e, "Provider fetch failed");
                return Ok(0);
            }
        };

        let fetched = outcome.messages.len();
        let new_messages = persist_fetched(&self.db, account, outcome).await?;

        for message in &new_messages {
            jobs::enqueue_job(self.db.pool(), &message.id).await?;
        }

        info!(
            account = %account.id,
            new = new_messages.len(),
            fetched,
            duplicates = fetched - new_messages.len(),
            "Mail sync complete"
        );
        Ok(new_messages.len())
    }
}

/// Deduplicate a fetch result against the store and persist the remainder,
/// committing new rows and the advanced cursor atomically. Returns the
/// newly inserted records.
///
/// Dedup relies on the batched `(account, provider_id)` existence check —
/// not on unique-constraint violations — so a re-run after a partial
/// success simply skips what is already there.
pub async fn persist_fetched(
    db: &Database,
    account: &Account,
    outcome: FetchOutcome,
) -> Result<Vec<MessageRecord>> {
    let FetchOutcome { messages, cursor } = outcome;

    let incoming_ids: Vec<String> = messages.iter().map(|m| m.provider_id.clone()).collect();
    let existing = db
        .load_existing_provider_ids(&account.id, &incoming_ids)
        .await?;

    // The same provider id can also appear twice within one fetch batch.
    let mut seen_in_batch: HashSet<String> = HashSet::new();
    let new_records: Vec<MessageRecord> = messages
        .into_iter()
        .filter(|m| !existing.contains(&m.provider_id))
        .filter(|m| seen_in_batch.insert(m.provider_id.clone()))
        .map(|m| MessageRecord::from_raw(&account.id, m))
        .collect();

    db.insert_messages_with_cursor(&account.id, &new_records, cursor.as_deref())
        .await?;

    Ok(new_records)
}
