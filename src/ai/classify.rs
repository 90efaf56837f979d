//! Classification engine.
//!
//! The model is asked for a single JSON object with a closed vocabulary.
//! Model output is never trusted: parsing strips code fences, falls back to
//! brace-substring extraction, and any remaining failure (including
//! transport errors) resolves to the safe default. This function never
//! errors on malformed model output — only on its own bugs.

use tracing::warn;

use super::prompts::build_classification_prompt;
use crate::errors::Outcome;
use crate::llm::LlmClient;
use crate::types::{Category, Classification, Urgency};

const MAX_TOPIC_LEN: usize = 100;

pub async fn classify(llm: &LlmClient, subject: &str, body: &str) -> Outcome<Classification> {
    let prompt = build_classification_prompt(subject, body);

    let raw = match llm.generate(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Classification request failed; using default");
            return Outcome::Degraded(Classification::fallback());
        }
    };

    parse_classification(&raw)
}

/// Parse and normalize a model classification response. Exposed for tests.
pub fn parse_classification(raw: &str) -> Outcome<Classification> {
    let text = strip_code_fences(raw.trim());

    let data = match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => value,
        Err(_) => match extract_json_object(&text) {
            Some(candidate) => match serde_json::from_str::<serde_json::Value>(candidate) {
                Ok(value) => value,
                Err(_) => {
                    warn!(snippet = %truncate(&text, 200), "Failed to parse classification JSON");
                    return Outcome::Degraded(Classification::fallback());
                }
            },
            None => {
                warn!(snippet = %truncate(&text, 200), "No JSON object in classification response");
                return Outcome::Degraded(Classification::fallback());
            }
        },
    };

    let category = data
        .get("category")
        .and_then(|v| v.as_str())
        .map(Category::parse_lenient)
        .unwrap_or(Category::Other);

    let urgency = data
        .get("urgency")
        .and_then(|v| v.as_str())
        .map(Urgency::parse_lenient)
        .unwrap_or(Urgency::Medium);

    let mut topic = data
        .get("topic")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if topic.len() > MAX_TOPIC_LEN {
        topic = topic.chars().take(MAX_TOPIC_LEN).collect();
    }

    let confidence = data
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    Outcome::Value(Classification {
        category,
        urgency,
        topic,
        confidence,
    })
}

/// Remove markdown code-fence lines wrapping the payload.
fn strip_code_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Slice from the first `{` to the last `}`, if both exist in order.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let outcome = parse_classification(
            r#"{"category": "order", "urgency": "low", "topic": "shipping update", "confidence": 0.8}"#,
        );
        assert!(!outcome.is_degraded());
        let c = outcome.into_inner();
        assert_eq!(c.category, Category::Order);
        assert_eq!(c.urgency, Urgency::Low);
        assert_eq!(c.topic, "shipping update");
        assert!((c.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn coerces_out_of_vocabulary_values() {
        let outcome = parse_classification(
            r#"{"category": "BILLING", "urgency": "urgent!!", "topic": "x", "confidence": 7}"#,
        );
        let c = outcome.into_inner();
        assert_eq!(c.category, Category::Other);
        assert_eq!(c.urgency, Urgency::Medium);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn garbage_degrades_to_default() {
        let outcome = parse_classification("I could not classify this email, sorry.");
        assert!(outcome.is_degraded());
        assert_eq!(*outcome.as_inner(), Classification::fallback());
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let outcome = parse_classification(
            "Sure! Here is the result: {\"category\":\"support\",\"urgency\":\"high\",\"topic\":\"login issue\",\"confidence\":0.6} Hope that helps.",
        );
        assert!(!outcome.is_degraded());
        let c = outcome.into_inner();
        assert_eq!(c.category, Category::Support);
        assert_eq!(c.urgency, Urgency::High);
    }
}
