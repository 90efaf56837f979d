//! Prompt construction for classification and reply generation.

use crate::types::{MessageRecord, Template, User};
use crate::vector::SearchHit;

pub fn build_classification_prompt(subject: &str, body: &str) -> String {
    format!(
        r#"You are an email classification assistant. Analyze the following email and return a JSON object with exactly these four fields:

- "category": one of "inquiry", "complaint", "order", "support", "spam", "other"
- "urgency": one of "high", "medium", "low"
- "topic": a short description of the email topic (max 10 words)
- "confidence": a float between 0.0 and 1.0 indicating your confidence

Return ONLY valid JSON. No explanations, no markdown formatting, no code fences.

Email subject: {subject}

Email body:
{body}

JSON response:"#
    )
}

/// Compose the reply-generation prompt. Each context block is omitted
/// entirely when it has nothing to contribute.
pub fn build_reply_prompt(
    message: &MessageRecord,
    user: &User,
    knowledge: &[SearchHit],
    similar_replies: &[SearchHit],
    templates: &[Template],
) -> String {
    let company_section = match &user.company_name {
        Some(company) => format!("\nCompany: {company}"),
        None => String::new(),
    };

    let knowledge_section = if knowledge.is_empty() {
        String::new()
    } else {
        let entries: Vec<String> = knowledge
            .iter()
            .map(|hit| {
                match hit.payload.get("title").and_then(|v| v.as_str()) {
                    Some(title) if !title.is_empty() => format!("- {title}: {}", hit.text),
                    _ => format!("- {}", hit.text),
                }
            })
            .collect();
        format!(
            "\n\n## Relevant knowledge base entries\n{}",
            entries.join("\n")
        )
    };

    let replies_section = if similar_replies.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = similar_replies
            .iter()
            .map(|hit| format!("- {}", hit.text))
            .collect();
        format!(
            "\n\n## Previously approved similar replies (use as style/content reference)\n{}",
            items.join("\n")
        )
    };

    let templates_section = if templates.is_empty() {
        String::new()
    } else {
        let items: Vec<String> = templates
            .iter()
            .map(|tmpl| {
                format!(
                    "- Template '{}' (category: {}):\n  {}",
                    tmpl.name, tmpl.category, tmpl.body
                )
            })
            .collect();
        format!("\n\n## Available reply templates\n{}", items.join("\n"))
    };

    let from_display = match &message.from_name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => message.from_address.clone(),
    };
    let category = message
        .category
        .map(|c| c.as_str())
        .unwrap_or("unknown");
    let urgency = message.urgency.map(|u| u.as_str()).unwrap_or("unknown");

    format!(
        r#"You are a professional email reply assistant. Write a reply to the email below.

## Instructions
- Maximum 150 words.
- Professional and friendly tone.
- Use the provided context (knowledge base, previous replies, templates) to craft an accurate and helpful response.
- Do NOT include a subject line. Write only the reply body.
- Sign off with the sender's name: {name}

## Sender information
Name: {name}{company_section}

## Original email
From: {from_display} <{from_address}>
Subject: {subject}
Category: {category}
Urgency: {urgency}

Body:
{body}{knowledge_section}{replies_section}{templates_section}

## Reply:"#,
        name = user.name,
        from_address = message.from_address,
        subject = message.subject.as_deref().unwrap_or("(no subject)"),
        body = message.body_text.as_deref().unwrap_or("(empty)"),
    )
}

/// Prompt for refining a previously generated reply with a human
/// instruction.
pub fn build_refine_prompt(previous: &str, instruction: &str) -> String {
    format!(
        r#"You are a professional email reply assistant. Revise the draft reply below according to the instruction. Return only the revised reply body, nothing else.

## Instruction
{instruction}

## Draft reply
{previous}

## Revised reply:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_ts, Category, MessageRecord, RawMessage, User};
    use serde_json::json;

    fn sample_message() -> MessageRecord {
        MessageRecord::from_raw(
            "acc-1",
            RawMessage {
                provider_id: "m1".into(),
                thread_id: None,
                from_address: "jane@example.com".into(),
                from_name: Some("Jane".into()),
                to_address: "support@shop.example".into(),
                subject: Some("Broken item".into()),
                body_text: Some("The lamp arrived shattered.".into()),
                body_html: None,
                received_at: None,
            },
        )
    }

    fn sample_user() -> User {
        User {
            id: "u1".into(),
            name: "Mette".into(),
            company_name: Some("Lampehuset".into()),
            created_at: now_ts(),
        }
    }

    #[test]
    fn omits_empty_context_sections() {
        let prompt = build_reply_prompt(&sample_message(), &sample_user(), &[], &[], &[]);
        assert!(!prompt.contains("## Relevant knowledge base entries"));
        assert!(!prompt.contains("## Previously approved similar replies"));
        assert!(!prompt.contains("## Available reply templates"));
        assert!(prompt.contains("Company: Lampehuset"));
        assert!(prompt.contains("The lamp arrived shattered."));
    }

    #[test]
    fn includes_populated_context_sections() {
        let knowledge = vec![crate::vector::SearchHit {
            id: "k1".into(),
            text: "Returns are free within 30 days.".into(),
            payload: json!({"title": "Return policy"}),
            score: 0.9,
        }];
        let replies = vec![crate::vector::SearchHit {
            id: "r1".into(),
            text: "We are sorry to hear that...".into(),
            payload: json!({}),
            score: 0.8,
        }];
        let templates = vec![crate::types::Template {
            id: "t1".into(),
            user_id: "u1".into(),
            name: "Apology".into(),
            category: Category::Complaint,
            body: "We apologize for the inconvenience.".into(),
            usage_count: 4,
            created_at: now_ts(),
        }];

        let prompt =
            build_reply_prompt(&sample_message(), &sample_user(), &knowledge, &replies, &templates);
        assert!(prompt.contains("- Return policy: Returns are free within 30 days."));
        assert!(prompt.contains("We are sorry to hear that..."));
        assert!(prompt.contains("Template 'Apology' (category: complaint)"));
    }
}
