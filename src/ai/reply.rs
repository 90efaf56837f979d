//! Retrieval-augmented reply generation.
//!
//! Three context sources feed the generation prompt: nearby knowledge
//! entries, similar previously approved replies, and the owner's templates.
//! Each retrieval stage is independently fault-tolerant — a failure logs
//! and contributes an empty context. Only the generation call itself is
//! fatal, because a suggestion with no text is not useful.

use std::sync::Arc;

use tracing::warn;

use super::prompts::{build_refine_prompt, build_reply_prompt};
use crate::errors::{AppError, AppResult, Outcome};
use crate::llm::LlmClient;
use crate::storage::Database;
use crate::types::{MessageRecord, Template, User};
use crate::vector::{SearchHit, VectorStore, KNOWLEDGE_COLLECTION, REPLIES_COLLECTION};

const CONTEXT_TOP_K: usize = 3;
const TEMPLATE_LIMIT: usize = 3;

pub struct ReplyGenerator {
    db: Database,
    llm: Arc<LlmClient>,
    vectors: Arc<VectorStore>,
}

impl ReplyGenerator {
    pub fn new(db: Database, llm: Arc<LlmClient>, vectors: Arc<VectorStore>) -> Self {
        Self { db, llm, vectors }
    }

    /// Generate a reply draft for a message. Context retrieval degrades
    /// silently; generation failure surfaces as [`AppError::Generation`].
    pub async fn generate_reply(&self, message: &MessageRecord, user: &User) -> AppResult<String> {
        let query_text = format!(
            "{} {}",
            message.subject.as_deref().unwrap_or_default(),
            message.body_text.as_deref().unwrap_or_default()
        );

        let query_embedding = match self.llm.embed(&query_text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(message = %message.id, error = %e, "Query embedding failed; skipping similarity context");
                None
            }
        };

        let knowledge = match &query_embedding {
            Some(embedding) => {
                self.search_collection(KNOWLEDGE_COLLECTION, embedding, &user.id)
                    .await
            }
            None => Vec::new(),
        };
        let similar_replies = match &query_embedding {
            Some(embedding) => {
                self.search_collection(REPLIES_COLLECTION, embedding, &user.id)
                    .await
            }
            None => Vec::new(),
        };

        let templates = self.fetch_templates(message, user).await;

        let prompt = build_reply_prompt(message, user, &knowledge, &similar_replies, &templates);

        let reply = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| AppError::Generation(e.to_string()))?;

        Ok(reply.trim().to_string())
    }

    /// Revise a draft according to a human instruction. Refinement is
    /// optional, so failure degrades to the previous text instead of
    /// propagating.
    pub async fn refine_reply(&self, previous: &str, instruction: &str) -> Outcome<String> {
        let prompt = build_refine_prompt(previous, instruction);
        match self.llm.generate(&prompt).await {
            Ok(revised) => {
                let revised = revised.trim().to_string();
                if revised.is_empty() {
                    Outcome::Degraded(previous.to_string())
                } else {
                    Outcome::Value(revised)
                }
            }
            Err(e) => {
                warn!(error = %e, "Refinement failed; keeping previous draft");
                Outcome::Degraded(previous.to_string())
            }
        }
    }

    async fn search_collection(
        &self,
        collection: &str,
        embedding: &[f32],
        owner: &str,
    ) -> Vec<SearchHit> {
        match self
            .vectors
            .search(collection, embedding, CONTEXT_TOP_K, owner)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(collection, error = %e, "Context search failed; continuing without it");
                Vec::new()
            }
        }
    }

    async fn fetch_templates(&self, message: &MessageRecord, user: &User) -> Vec<Template> {
        match self
            .db
            .list_templates(&user.id, message.category, TEMPLATE_LIMIT)
            .await
        {
            Ok(templates) => templates,
            Err(e) => {
                warn!(user = %user.id, error = %e, "Template fetch failed; continuing without them");
                Vec::new()
            }
        }
    }
}
