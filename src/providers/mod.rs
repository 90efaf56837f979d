//! Provider mail API adapters.
//!
//! Each provider translates its own message representation into the
//! canonical [`RawMessage`] shape and maintains an opaque incremental sync
//! cursor (Gmail: history id, Outlook: ISO receivedDateTime). Dispatch is a
//! closed match over [`Provider`] — unknown tags were already rejected when
//! the account row was loaded.

pub mod gmail;
pub mod outlook;

use reqwest::Client;

use crate::errors::AppResult;
use crate::tokens::TokenManager;
use crate::types::{Account, FetchOutcome, Provider};

/// Cursor-less first fetch is bounded to this many recent messages.
pub const BOOTSTRAP_LIMIT: usize = 50;

/// Fetch messages newer than the account's sync cursor (or a bounded
/// bootstrap window when no cursor exists). The returned cursor must be
/// committed together with the persisted messages.
pub async fn fetch(
    http: &Client,
    tokens: &TokenManager,
    account: &Account,
) -> AppResult<FetchOutcome> {
    let token = tokens.get_valid_token(account).await?;
    match account.provider {
        Provider::Gmail => gmail::fetch_messages(http, &token, account).await,
        Provider::Outlook => outlook::fetch_messages(http, &token, account).await,
    }
}

/// Send a reply through the account's provider. Returns `false` (never an
/// error) on any non-success provider response; the failure is logged with
/// status and body.
pub async fn send(
    http: &Client,
    tokens: &TokenManager,
    account: &Account,
    to: &str,
    subject: &str,
    body: &str,
    thread_ref: Option<&str>,
) -> AppResult<bool> {
    let token = tokens.get_valid_token(account).await?;
    match account.provider {
        Provider::Gmail => gmail::send_reply(http, &token, account, to, subject, body, thread_ref).await,
        Provider::Outlook => {
            outlook::send_reply(http, &token, account, to, subject, body, thread_ref).await
        }
    }
}

/// Prefix a subject with "Re: " exactly once. Already-prefixed subjects
/// (any case) pass through unchanged.
pub fn reply_subject(subject: &str) -> String {
    if subject.trim_start().to_ascii_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Parse `Display Name <user@example.com>` into (name, address).
pub(crate) fn parse_mailbox(raw: &str) -> (Option<String>, String) {
    let raw = raw.trim();
    if let (Some(start), Some(end)) = (raw.rfind('<'), raw.rfind('>')) {
        if start < end {
            let address = raw[start + 1..end].trim().to_string();
            let name = raw[..start].trim().trim_matches('"').trim().to_string();
            let name = if name.is_empty() { None } else { Some(name) };
            return (name, address);
        }
    }
    (None, raw.to_string())
}

/// Derive a plain-text body from HTML when a message carries no text part.
pub(crate) fn html_to_plain(html: &str) -> Option<String> {
    let rendered = html2text::from_read(html.as_bytes(), 120).ok()?;
    let text = rendered
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Order status"), "Re: Order status");
        assert_eq!(reply_subject("Re: Order status"), "Re: Order status");
        assert_eq!(reply_subject("RE: Order status"), "RE: Order status");
        assert_eq!(reply_subject("re: order"), "re: order");
    }

    #[test]
    fn parse_mailbox_handles_display_names() {
        let (name, addr) = parse_mailbox("Jane Doe <jane@example.com>");
        assert_eq!(name.as_deref(), Some("Jane Doe"));
        assert_eq!(addr, "jane@example.com");

        let (name, addr) = parse_mailbox("\"Doe, Jane\" <jane@example.com>");
        assert_eq!(name.as_deref(), Some("Doe, Jane"));
        assert_eq!(addr, "jane@example.com");

        let (name, addr) = parse_mailbox("jane@example.com");
        assert_eq!(name, None);
        assert_eq!(addr, "jane@example.com");
    }
}
