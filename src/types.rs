use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Mail providers this crate can talk to. Unknown provider tags are
/// rejected when an account row is loaded, never at call time.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Provider {
    Gmail,
    Outlook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Outlook => "outlook",
        }
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "gmail" => Ok(Provider::Gmail),
            "outlook" => Ok(Provider::Outlook),
            other => Err(AppError::Config(format!("unknown provider '{other}'"))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected mailbox. Tokens are stored encrypted; the sync cursor is
/// opaque and provider-specific (Gmail history id, Outlook ISO timestamp).
#[derive(Clone, Debug)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub provider: Provider,
    pub email_address: String,
    pub encrypted_access_token: Option<String>,
    pub encrypted_refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub sync_cursor: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
}

/// Mailbox owner identity, used when composing replies.
#[derive(Clone, Debug)]
pub struct User {
    pub id: String,
    pub name: String,
    pub company_name: Option<String>,
    pub created_at: i64,
}

/// A provider message normalized into the canonical flat shape, before it
/// is persisted.
#[derive(Clone, Debug)]
pub struct RawMessage {
    pub provider_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: String,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Everything a provider fetch produced: the new messages plus the cursor
/// position that must be committed together with them.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    pub messages: Vec<RawMessage>,
    pub cursor: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Inquiry,
    Complaint,
    Order,
    Support,
    Spam,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Inquiry => "inquiry",
            Category::Complaint => "complaint",
            Category::Order => "order",
            Category::Support => "support",
            Category::Spam => "spam",
            Category::Other => "other",
        }
    }

    /// Parse a model- or user-supplied value; anything outside the closed
    /// vocabulary coerces to `Other`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "inquiry" => Category::Inquiry,
            "complaint" => Category::Complaint,
            "order" => Category::Order,
            "support" => Category::Support,
            "spam" => Category::Spam,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
        }
    }

    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Urgency::High,
            "low" => Urgency::Low,
            _ => Urgency::Medium,
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated output of the classification engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub urgency: Urgency,
    pub topic: String,
    pub confidence: f64,
}

impl Classification {
    /// The safe default used whenever the model output is unusable.
    pub fn fallback() -> Self {
        Self {
            category: Category::Other,
            urgency: Urgency::Medium,
            topic: String::new(),
            confidence: 0.0,
        }
    }
}

/// Canonical persisted email record. `(account_id, provider_id)` is unique
/// and is the dedup boundary for sync.
#[derive(Clone, Debug)]
pub struct MessageRecord {
    pub id: String,
    pub account_id: String,
    pub provider_id: String,
    pub thread_id: Option<String>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub to_address: String,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_replied: bool,
    pub category: Option<Category>,
    pub urgency: Option<Urgency>,
    pub topic: Option<String>,
    pub confidence: Option<f64>,
    pub processed: bool,
    pub created_at: i64,
}

impl MessageRecord {
    pub fn from_raw(account_id: &str, raw: RawMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            provider_id: raw.provider_id,
            thread_id: raw.thread_id,
            from_address: raw.from_address,
            from_name: raw.from_name,
            to_address: raw.to_address,
            subject: raw.subject,
            body_text: raw.body_text,
            body_html: raw.body_html,
            received_at: raw.received_at,
            is_read: false,
            is_replied: false,
            category: None,
            urgency: None,
            topic: None,
            confidence: None,
            processed: false,
            created_at: now_ts(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Edited,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Edited => "edited",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

impl FromStr for SuggestionStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(SuggestionStatus::Pending),
            "approved" => Ok(SuggestionStatus::Approved),
            "edited" => Ok(SuggestionStatus::Edited),
            "rejected" => Ok(SuggestionStatus::Rejected),
            other => Err(AppError::Database(format!(
                "unknown suggestion status '{other}'"
            ))),
        }
    }
}

/// One generated reply draft for a message, awaiting human review.
#[derive(Clone, Debug)]
pub struct Suggestion {
    pub id: String,
    pub message_id: String,
    pub suggested_text: String,
    pub status: SuggestionStatus,
    pub edited_text: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: i64,
}

impl Suggestion {
    pub fn new_pending(message_id: &str, suggested_text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            suggested_text,
            status: SuggestionStatus::Pending,
            edited_text: None,
            sent_at: None,
            created_at: now_ts(),
        }
    }

    /// The text a human signed off on (falls back to the generated text for
    /// plain approvals).
    pub fn final_text(&self) -> &str {
        self.edited_text.as_deref().unwrap_or(&self.suggested_text)
    }
}

/// Immutable record of how far a human edit moved a suggestion.
#[derive(Clone, Debug)]
pub struct FeedbackRecord {
    pub id: String,
    pub suggestion_id: String,
    pub original_text: String,
    pub edited_text: String,
    pub edit_distance: i64,
    pub created_at: i64,
}

/// User-authored reply template, consumed read-only by the reply generator.
#[derive(Clone, Debug)]
pub struct Template {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub category: Category,
    pub body: String,
    pub usage_count: i64,
    pub created_at: i64,
}

/// User-authored knowledge base entry, indexed into the vector store.
#[derive(Clone, Debug)]
pub struct KnowledgeEntry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: i64,
}

pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}
