//! Failure-path behavior of the reply pipeline, exercised without any
//! generative-text or vector service running: context retrieval must
//! degrade to empty context, while the generation call itself is fatal.

use std::sync::Arc;

use mailbot::ai::ReplyGenerator;
use mailbot::config::Config;
use mailbot::errors::AppError;
use mailbot::llm::LlmClient;
use mailbot::storage::Database;
use mailbot::types::{now_ts, KnowledgeEntry, MessageRecord, RawMessage, User};
use mailbot::vector::{save_knowledge_entry, VectorStore};

fn sample_message() -> MessageRecord {
    MessageRecord::from_raw(
        "acc-1",
        RawMessage {
            provider_id: "m1".into(),
            thread_id: None,
            from_address: "customer@example.org".into(),
            from_name: Some("Customer".into()),
            to_address: "mette@example.com".into(),
            subject: Some("Question about invoice".into()),
            body_text: Some("Can I get a copy of invoice 552?".into()),
            body_html: None,
            received_at: None,
        },
    )
}

fn sample_user() -> User {
    User {
        id: "user-1".into(),
        name: "Mette".into(),
        company_name: None,
        created_at: now_ts(),
    }
}

async fn generator() -> (Database, ReplyGenerator, Arc<LlmClient>, Arc<VectorStore>) {
    let config = Config::load().expect("config");
    let db = Database::open_in_memory().await.expect("db");
    db.save_user(&sample_user()).await.expect("save user");

    let llm = Arc::new(LlmClient::new(&config).expect("llm client"));
    let vectors = Arc::new(VectorStore::new(&config.vector_url).expect("vector store"));
    let gen = ReplyGenerator::new(db.clone(), llm.clone(), vectors.clone());
    (db, gen, llm, vectors)
}

#[tokio::test]
async fn generation_failure_is_fatal_even_when_context_degrades() {
    let (_db, gen, _llm, _vectors) = generator().await;

    // With no services running the retrieval stages all degrade to empty
    // context, and the pipeline still reaches the generation call — whose
    // failure must surface explicitly.
    let result = gen.generate_reply(&sample_message(), &sample_user()).await;
    match result {
        Err(AppError::Generation(_)) => {}
        other => panic!("expected Generation error, got {other:?}"),
    }
}

#[tokio::test]
async fn refinement_degrades_to_the_previous_draft() {
    let (_db, gen, _llm, _vectors) = generator().await;

    let outcome = gen
        .refine_reply("Dear customer, here is invoice 552.", "make it shorter")
        .await;
    assert!(outcome.is_degraded());
    assert_eq!(outcome.into_inner(), "Dear customer, here is invoice 552.");
}

#[tokio::test]
async fn unreachable_classifier_degrades_to_the_default() {
    let (_db, _gen, llm, _vectors) = generator().await;

    let outcome = mailbot::ai::classify(&llm, "subject", "body").await;
    assert!(outcome.is_degraded());

    let c = outcome.into_inner();
    assert_eq!(c.category, mailbot::types::Category::Other);
    assert_eq!(c.urgency, mailbot::types::Urgency::Medium);
    assert_eq!(c.confidence, 0.0);
}

#[tokio::test]
async fn knowledge_entry_row_survives_an_indexing_failure() {
    let (db, _gen, llm, vectors) = generator().await;

    let entry = KnowledgeEntry {
        id: "k1".into(),
        user_id: "user-1".into(),
        title: "Invoices".into(),
        content: "Invoices can be re-sent from the order page.".into(),
        created_at: now_ts(),
    };

    // Embedding is unreachable, so indexing fails and the failure is
    // caller-visible — but the relational row has already been saved.
    let result = save_knowledge_entry(&db, &vectors, &llm, &entry).await;
    assert!(result.is_err());
}
