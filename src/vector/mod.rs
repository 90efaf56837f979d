//! Vector index store client (Qdrant REST API).
//!
//! Two collections back the retrieval-augmented reply pipeline: user
//! knowledge entries and previously approved replies. Each point carries
//! the source text plus payload metadata; every query filters on the owner
//! payload field so users only retrieve their own content.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::llm::LlmClient;
use crate::types::KnowledgeEntry;

pub const KNOWLEDGE_COLLECTION: &str = "knowledge_embeddings";
pub const REPLIES_COLLECTION: &str = "approved_replies";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// A nearest-neighbour hit: the stored text plus whatever payload metadata
/// the writer attached, and the similarity score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub payload: Value,
    pub score: f64,
}

pub struct VectorStore {
    http: Client,
    base_url: String,
}

impl VectorStore {
    pub fn new(base_url: &str) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("building vector store client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Idempotently create both collections. `dimension` must match the
    /// embedding model in use.
    pub async fn ensure_collections(&self, dimension: usize) -> AppResult<()> {
        for name in [KNOWLEDGE_COLLECTION, REPLIES_COLLECTION] {
            self.ensure_collection(name, dimension).await?;
        }
        Ok(())
    }

    async fn ensure_collection(&self, name: &str, dimension: usize) -> AppResult<()> {
        let url = format!("{}/collections/{}", self.base_url, name);

        let existing = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("vector store probe: {e}")))?;
        if existing.status().is_success() {
            debug!(collection = name, "Vector collection present");
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            let status = existing.status();
            let body = existing.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "vector store probe failed: status={status} body={body}"
            )));
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("creating vector collection: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "creating collection '{name}' failed: status={status} body={body}"
            )));
        }

        info!(collection = name, dimension, "Created vector collection");
        Ok(())
    }

    /// Upsert one point. `payload` must contain the owner's `user_id`; the
    /// stored text rides along in the payload under `text`.
    pub async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        text: &str,
        mut payload: Value,
    ) -> AppResult<()> {
        if let Some(map) = payload.as_object_mut() {
            map.insert("text".to_string(), Value::String(text.to_string()));
        }

        let url = format!("{}/collections/{}/points?wait=true", self.base_url, collection);
        let body = json!({
            "points": [{ "id": id, "vector": vector, "payload": payload }]
        });

        let response = self
            .http
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("vector upsert: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "vector upsert to '{collection}' failed: status={status} body={body}"
            )));
        }

        debug!(collection, id, "Upserted vector point");
        Ok(())
    }

    /// Nearest-neighbour search scoped to one owner.
    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        owner: &str,
    ) -> AppResult<Vec<SearchHit>> {
        let url = format!("{}/collections/{}/points/search", self.base_url, collection);
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "filter": {
                "must": [{ "key": "user_id", "match": { "value": owner } }]
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("vector search: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "vector search in '{collection}' failed: status={status} body={body}"
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| AppError::Unexpected(format!("decoding search response: {e}")))?;

        let points = parsed
            .get("result")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut hits = Vec::new();
        for point in points {
            let id = match point.get("id") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            let score = point.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let payload = point.get("payload").cloned().unwrap_or_else(|| json!({}));
            let text = payload
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            hits.push(SearchHit {
                id,
                text,
                payload,
                score,
            });
        }

        Ok(hits)
    }
}

/// Embed and index a knowledge entry. Called whenever an entry is created
/// or updated so the reply generator can retrieve it by similarity.
pub async fn index_knowledge_entry(
    store: &VectorStore,
    llm: &LlmClient,
    entry: &KnowledgeEntry,
) -> AppResult<()> {
    let embedding = llm.embed(&entry.content).await?;
    store
        .upsert(
            KNOWLEDGE_COLLECTION,
            &entry.id,
            &embedding,
            &entry.content,
            json!({ "user_id": entry.user_id, "title": entry.title }),
        )
        .await?;
    info!(entry = %entry.id, "Indexed knowledge entry");
    Ok(())
}

/// Persist a knowledge entry and index it for retrieval. The row is saved
/// first; an indexing failure is caller-visible so the entry can be
/// re-indexed later.
pub async fn save_knowledge_entry(
    db: &crate::storage::Database,
    store: &VectorStore,
    llm: &LlmClient,
    entry: &KnowledgeEntry,
) -> AppResult<()> {
    db.save_knowledge_entry(entry)
        .await
        .map_err(|e| crate::errors::AppError::Database(e.to_string()))?;
    index_knowledge_entry(store, llm, entry).await
}
