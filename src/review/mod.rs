//! Human review of reply suggestions.
//!
//! A suggestion leaves `pending` exactly once — into approved, edited, or
//! rejected. Approved/edited suggestions feed the learning loop and may
//! then be dispatched through the owning account's provider.

use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::feedback;
use crate::llm::LlmClient;
use crate::providers;
use crate::storage::Database;
use crate::tokens::TokenManager;
use crate::types::{Account, MessageRecord, Suggestion, SuggestionStatus};
use crate::vector::VectorStore;

#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve,
    Edit { text: String },
    Reject,
}

pub struct ReviewService {
    db: Database,
    llm: Arc<LlmClient>,
    vectors: Arc<VectorStore>,
    tokens: Arc<TokenManager>,
    http: Client,
}

impl ReviewService {
    pub fn new(
        db: Database,
        llm: Arc<LlmClient>,
        vectors: Arc<VectorStore>,
        tokens: Arc<TokenManager>,
        http: Client,
    ) -> Self {
        Self {
            db,
            llm,
            vectors,
            tokens,
            http,
        }
    }

    /// Apply a human decision to a pending suggestion, then log feedback
    /// (and index the final text) for approved/edited outcomes.
    pub async fn review_suggestion(
        &self,
        suggestion_id: &str,
        action: ReviewAction,
    ) -> AppResult<Suggestion> {
        let suggestion = self.load_suggestion(suggestion_id).await?;

        if suggestion.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "suggestion {} already reviewed as {}",
                suggestion.id,
                suggestion.status.as_str()
            )));
        }

        let (status, edited_text) = match action {
            ReviewAction::Approve => (
                SuggestionStatus::Approved,
                Some(suggestion.suggested_text.clone()),
            ),
            ReviewAction::Edit { text } => {
                if text.trim().is_empty() {
                    return Err(AppError::InvalidState(
                        "edited text required for edit action".into(),
                    ));
                }
                (SuggestionStatus::Edited, Some(text))
            }
            ReviewAction::Reject => (SuggestionStatus::Rejected, None),
        };

        self.db
            .update_suggestion_review(&suggestion.id, status, edited_text.as_deref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let reviewed = Suggestion {
            status,
            edited_text,
            ..suggestion
        };

        info!(
            suggestion = %reviewed.id,
            status = reviewed.status.as_str(),
            "Suggestion reviewed"
        );

        if matches!(
            reviewed.status,
            SuggestionStatus::Approved | SuggestionStatus::Edited
        ) {
            let (message, account) = self.load_message_chain(&reviewed.message_id).await?;
            feedback::log_feedback(
                &self.db,
                &self.vectors,
                &self.llm,
                &reviewed,
                &message,
                &account.user_id,
                reviewed.final_text(),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        Ok(reviewed)
    }

    /// Send an approved/edited suggestion as a threaded reply to the
    /// original sender. A provider-side rejection surfaces as an explicit
    /// error for the caller to present.
    pub async fn send_suggestion(&self, suggestion_id: &str) -> AppResult<Suggestion> {
        let suggestion = self.load_suggestion(suggestion_id).await?;

        if !matches!(
            suggestion.status,
            SuggestionStatus::Approved | SuggestionStatus::Edited
        ) {
            return Err(AppError::InvalidState(
                "suggestion must be approved or edited before sending".into(),
            ));
        }

        let (message, account) = self.load_message_chain(&suggestion.message_id).await?;

        let subject = providers::reply_subject(message.subject.as_deref().unwrap_or_default());
        let thread_ref = match account.provider {
            crate::types::Provider::Gmail => message.thread_id.clone(),
            crate::types::Provider::Outlook => Some(message.provider_id.clone()),
        };

        let sent = providers::send(
            &self.http,
            &self.tokens,
            &account,
            &message.from_address,
            &subject,
            suggestion.final_text(),
            thread_ref.as_deref(),
        )
        .await?;

        if !sent {
            return Err(AppError::Network("failed to send reply".into()));
        }

        let sent_at = Utc::now();
        self.db
            .mark_suggestion_sent(&suggestion.id, sent_at)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        self.db
            .mark_message_replied(&message.id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        info!(suggestion = %suggestion.id, to = %message.from_address, "Suggestion sent");

        Ok(Suggestion {
            sent_at: Some(sent_at),
            ..suggestion
        })
    }

    async fn load_suggestion(&self, suggestion_id: &str) -> AppResult<Suggestion> {
        self.db
            .get_suggestion(suggestion_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("suggestion {suggestion_id}")))
    }

    async fn load_message_chain(
        &self,
        message_id: &str,
    ) -> AppResult<(MessageRecord, Account)> {
        let message = self
            .db
            .get_message(message_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))?;
        let account = self
            .db
            .get_account(&message.account_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .ok_or_else(|| AppError::NotFound(format!("account {}", message.account_id)))?;
        Ok((message, account))
    }
}
