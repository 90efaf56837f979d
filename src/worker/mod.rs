//! Background message processing.
//!
//! Consumes the durable job queue written by the sync orchestrator: each
//! job classifies one message and, unless it is spam, generates a reply
//! suggestion pending human review. Delivery is at-least-once, so the
//! handler checks the message's `processed` flag before doing any work.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::ai::{classify, ReplyGenerator};
use crate::llm::LlmClient;
use crate::storage::{jobs, Database};
use crate::types::{Category, Suggestion};
use crate::vector::VectorStore;

const DRAIN_BATCH_SIZE: usize = 20;

pub struct Processor {
    db: Database,
    llm: Arc<LlmClient>,
    generator: ReplyGenerator,
}

impl Processor {
    pub fn new(db: Database, llm: Arc<LlmClient>, vectors: Arc<VectorStore>) -> Self {
        let generator = ReplyGenerator::new(db.clone(), llm.clone(), vectors);
        Self { db, llm, generator }
    }

    /// Drain one batch of pending jobs. Returns how many completed.
    pub async fn drain_pending(&self) -> Result<usize> {
        let pending = jobs::claim_jobs(self.db.pool(), DRAIN_BATCH_SIZE).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut completed = 0usize;
        for job in pending {
            match self.process_message(&job.message_id).await {
                Ok(()) => {
                    jobs::complete_job(self.db.pool(), job.id).await?;
                    completed += 1;
                }
                Err(e) => {
                    warn!(
                        message = %job.message_id,
                        attempts = job.attempts + 1,
                        error = %e,
                        "Message processing failed; job left for redelivery"
                    );
                    jobs::record_job_attempt(self.db.pool(), job.id).await?;
                }
            }
        }

        Ok(completed)
    }

    /// Classify a message and generate its reply suggestion. Idempotent:
    /// already-processed messages are a no-op.
    pub async fn process_message(&self, message_id: &str) -> Result<()> {
        let Some(message) = self.db.get_message(message_id).await? else {
            // The row is gone (account disconnect, cascade delete); there is
            // nothing left to process.
            warn!(message = %message_id, "Job references a missing message; dropping");
            return Ok(());
        };

        if message.processed {
            debug!(message = %message_id, "Message already processed; skipping");
            return Ok(());
        }

        let outcome = classify(
            &self.llm,
            message.subject.as_deref().unwrap_or_default(),
            message.body_text.as_deref().unwrap_or_default(),
        )
        .await;
        if outcome.is_degraded() {
            warn!(message = %message_id, "Classification degraded to default");
        }
        let classification = outcome.into_inner();

        self.db
            .update_message_classification(&message.id, &classification)
            .await?;

        if classification.category != Category::Spam {
            let account = self
                .db
                .get_account(&message.account_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("account {} not found", message.account_id))?;
            let user = self
                .db
                .get_user(&account.user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("user {} not found", account.user_id))?;

            // The prompt reads the classification off the record.
            let mut message = message;
            message.category = Some(classification.category);
            message.urgency = Some(classification.urgency);

            let reply_text = self.generator.generate_reply(&message, &user).await?;
            let suggestion = Suggestion::new_pending(&message.id, reply_text);
            self.db.insert_suggestion(&suggestion).await?;

            info!(
                message = %message.id,
                suggestion = %suggestion.id,
                category = %classification.category,
                "Stored reply suggestion for review"
            );
        } else {
            info!(message = %message.id, "Classified as spam; no suggestion generated");
        }

        self.db.mark_message_processed(message_id).await?;
        Ok(())
    }
}
