//! Gmail REST adapter.
//!
//! Incremental sync rides the history API: the cursor is the mailbox
//! `historyId`, advanced on every successful fetch. A 404 from
//! `history.list` means the stored id has expired server-side; the adapter
//! then discards the cursor and performs exactly one bootstrap fetch — the
//! fallback cannot recurse.

use std::collections::HashSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{html_to_plain, parse_mailbox, reply_subject, BOOTSTRAP_LIMIT};
use crate::errors::{AppError, AppResult};
use crate::types::{Account, FetchOutcome, RawMessage};

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

pub async fn fetch_messages(
    http: &Client,
    token: &str,
    account: &Account,
) -> AppResult<FetchOutcome> {
    if let Some(cursor) = account.sync_cursor.as_deref() {
        match fetch_incremental(http, token, cursor).await? {
            Some(outcome) => {
                info!(
                    account = %account.id,
                    count = outcome.messages.len(),
                    "Gmail incremental fetch complete"
                );
                return Ok(outcome);
            }
            None => {
                warn!(
                    account = %account.id,
                    "Gmail history cursor expired; falling back to bootstrap fetch"
                );
            }
        }
    }

    let outcome = fetch_bootstrap(http, token).await?;
    info!(
        account = %account.id,
        count = outcome.messages.len(),
        "Gmail bootstrap fetch complete"
    );
    Ok(outcome)
}

/// History-based fetch of everything newer than `cursor`. Returns `None`
/// when the server reports the cursor invalid (HTTP 404), which signals the
/// caller to bootstrap instead.
async fn fetch_incremental(
    http: &Client,
    token: &str,
    cursor: &str,
) -> AppResult<Option<FetchOutcome>> {
    let mut message_ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut page_token: Option<String> = None;
    let mut latest_history_id: Option<String> = None;

    loop {
        let mut request = http
            .get(format!("{GMAIL_API}/history"))
            .bearer_auth(token)
            .query(&[
                ("startHistoryId", cursor),
                ("historyTypes", "messageAdded"),
            ]);
        if let Some(pt) = &page_token {
            request = request.query(&[("pageToken", pt.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Network(format!("gmail history request: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let data: HistoryList = decode_success(response, "gmail history").await?;

        for record in data.history.unwrap_or_default() {
            for added in record.messages_added.unwrap_or_default() {
                if seen.insert(added.message.id.clone()) {
                    message_ids.push(added.message.id);
                }
            }
        }

        // Every page reports the mailbox's current history id; the last one
        // becomes the new cursor even when no messages matched, preventing
        // server-side cursor expiry drift.
        if let Some(history_id) = data.history_id {
            latest_history_id = Some(history_id);
        }

        page_token = data.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    let mut messages = Vec::new();
    for id in message_ids {
        if let Some(full) = get_message(http, token, &id).await? {
            messages.push(parse_message(full));
        }
    }

    Ok(Some(FetchOutcome {
        messages,
        cursor: latest_history_id.or_else(|| Some(cursor.to_string())),
    }))
}

/// Cursor-less fetch of the most recent inbox messages, bounded to
/// [`BOOTSTRAP_LIMIT`]. Initializes the cursor from the profile's current
/// history id.
async fn fetch_bootstrap(http: &Client, token: &str) -> AppResult<FetchOutcome> {
    let response = http
        .get(format!("{GMAIL_API}/messages"))
        .bearer_auth(token)
        .query(&[
            ("maxResults", BOOTSTRAP_LIMIT.to_string().as_str()),
            ("labelIds", "INBOX"),
        ])
        .send()
        .await
        .map_err(|e| AppError::Network(format!("gmail message list: {e}")))?;
    let listing: MessageList = decode_success(response, "gmail message list").await?;

    let mut messages = Vec::new();
    for stub in listing.messages.unwrap_or_default() {
        if let Some(full) = get_message(http, token, &stub.id).await? {
            messages.push(parse_message(full));
        }
    }

    let response = http
        .get(format!("{GMAIL_API}/profile"))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| AppError::Network(format!("gmail profile request: {e}")))?;
    let profile: Profile = decode_success(response, "gmail profile").await?;

    Ok(FetchOutcome {
        messages,
        cursor: Some(profile.history_id),
    })
}

/// Full message fetch; a 404 (deleted between list and get) is skipped.
async fn get_message(http: &Client, token: &str, id: &str) -> AppResult<Option<GmailMessage>> {
    let response = http
        .get(format!("{GMAIL_API}/messages/{id}"))
        .bearer_auth(token)
        .query(&[("format", "full")])
        .send()
        .await
        .map_err(|e| AppError::Network(format!("gmail message get: {e}")))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let message: GmailMessage = decode_success(response, "gmail message").await?;
    Ok(Some(message))
}

pub async fn send_reply(
    http: &Client,
    token: &str,
    account: &Account,
    to: &str,
    subject: &str,
    body: &str,
    thread_id: Option<&str>,
) -> AppResult<bool> {
    let subject = if thread_id.is_some() {
        reply_subject(subject)
    } else {
        subject.to_string()
    };

    let mime = format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
        account.email_address, to, subject, body
    );
    let raw = URL_SAFE_NO_PAD.encode(mime.as_bytes());

    let mut payload = json!({ "raw": raw });
    if let Some(thread_id) = thread_id {
        payload["threadId"] = json!(thread_id);
    }

    let response = http
        .post(format!("{GMAIL_API}/messages/send"))
        .bearer_auth(token)
        .json(&payload)
        .send()
        .await
        .map_err(|e| AppError::Network(format!("gmail send request: {e}")))?;

    let status = response.status();
    if status.is_success() {
        info!(account = %account.id, to, "Gmail: sent message");
        Ok(true)
    } else {
        let body = response.text().await.unwrap_or_default();
        error!(account = %account.id, status = %status, body = %body, "Gmail send failed");
        Ok(false)
    }
}

async fn decode_success<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> AppResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Network(format!(
            "{what} failed: status={status} body={body}"
        )));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AppError::Unexpected(format!("decoding {what}: {e}")))
}

// ---- message normalization ----

pub(crate) fn parse_message(message: GmailMessage) -> RawMessage {
    let headers = message
        .payload
        .as_ref()
        .and_then(|p| p.headers.as_deref())
        .unwrap_or_default();

    let from_raw = header_value(headers, "From").unwrap_or_default();
    let (from_name, from_address) = parse_mailbox(&from_raw);
    let to_address = header_value(headers, "To")
        .map(|raw| parse_mailbox(&raw).1)
        .unwrap_or_default();
    let subject = header_value(headers, "Subject");
    let date_header = header_value(headers, "Date");

    let (mut body_text, body_html) = message
        .payload
        .as_ref()
        .map(extract_bodies)
        .unwrap_or((None, None));
    if body_text.is_none() {
        if let Some(html) = &body_html {
            body_text = html_to_plain(html);
        }
    }

    let received_at = date_header
        .as_deref()
        .and_then(parse_rfc2822)
        .or_else(|| parse_internal_date(message.internal_date.as_deref()));

    RawMessage {
        provider_id: message.id,
        thread_id: message.thread_id,
        from_address,
        from_name,
        to_address,
        subject,
        body_text,
        body_html,
        received_at,
    }
}

fn header_value(headers: &[GmailHeader], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}

/// Walk the MIME part tree. The first non-empty `text/plain` part wins;
/// HTML is collected independently.
fn extract_bodies(payload: &GmailPayload) -> (Option<String>, Option<String>) {
    let mut text = None;
    let mut html = None;
    collect_bodies(payload, &mut text, &mut html);
    (text, html)
}

fn collect_bodies(payload: &GmailPayload, text: &mut Option<String>, html: &mut Option<String>) {
    let mime_type = payload.mime_type.as_deref().unwrap_or("");

    if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        if !data.is_empty() {
            if let Some(decoded) = decode_body_data(data) {
                if !decoded.is_empty() {
                    if mime_type.eq_ignore_ascii_case("text/plain") && text.is_none() {
                        *text = Some(decoded);
                    } else if mime_type.eq_ignore_ascii_case("text/html") && html.is_none() {
                        *html = Some(decoded);
                    }
                }
            }
        }
    }

    for part in payload.parts.as_deref().unwrap_or_default() {
        collect_bodies(part, text, html);
    }
}

fn decode_body_data(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(trimmed).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_rfc2822(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_internal_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

// ---- Gmail API response types ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    messages: Option<Vec<MessageStub>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    history_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub payload: Option<GmailPayload>,
    pub internal_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailPayload {
    pub mime_type: Option<String>,
    pub headers: Option<Vec<GmailHeader>>,
    pub body: Option<GmailBody>,
    pub parts: Option<Vec<GmailPayload>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GmailBody {
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryList {
    history: Option<Vec<HistoryRecord>>,
    next_page_token: Option<String>,
    history_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord {
    messages_added: Option<Vec<HistoryMessageAdded>>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessageAdded {
    message: MessageStub,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_from_json(raw: serde_json::Value) -> GmailMessage {
        serde_json::from_value(raw).expect("gmail message fixture")
    }

    fn b64(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    #[test]
    fn parses_multipart_message_preferring_first_plain_part() {
        let msg = message_from_json(serde_json::json!({
            "id": "m-100",
            "threadId": "t-7",
            "internalDate": "1722470400000",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "From", "value": "Jane Doe <jane@example.com>"},
                    {"name": "To", "value": "support@shop.example"},
                    {"name": "Subject", "value": "Where is my order?"},
                    {"name": "Date", "value": "Thu, 01 Aug 2024 09:00:00 +0200"}
                ],
                "parts": [
                    {
                        "mimeType": "text/plain",
                        "body": {"data": b64("")}
                    },
                    {
                        "mimeType": "text/plain",
                        "body": {"data": b64("Hi, order 1234 has not arrived.")}
                    },
                    {
                        "mimeType": "text/html",
                        "body": {"data": b64("<p>Hi, order 1234 has not arrived.</p>")}
                    }
                ]
            }
        }));

        let raw = parse_message(msg);
        assert_eq!(raw.provider_id, "m-100");
        assert_eq!(raw.thread_id.as_deref(), Some("t-7"));
        assert_eq!(raw.from_address, "jane@example.com");
        assert_eq!(raw.from_name.as_deref(), Some("Jane Doe"));
        assert_eq!(raw.to_address, "support@shop.example");
        assert_eq!(
            raw.body_text.as_deref(),
            Some("Hi, order 1234 has not arrived.")
        );
        assert!(raw.body_html.as_deref().unwrap_or_default().contains("<p>"));
        assert!(raw.received_at.is_some());
    }

    #[test]
    fn derives_text_from_html_only_message() {
        let msg = message_from_json(serde_json::json!({
            "id": "m-101",
            "threadId": "t-8",
            "payload": {
                "mimeType": "text/html",
                "headers": [
                    {"name": "From", "value": "noreply@example.com"},
                    {"name": "To", "value": "me@shop.example"}
                ],
                "body": {"data": b64("<html><body><b>Invoice attached</b></body></html>")}
            }
        }));

        let raw = parse_message(msg);
        assert!(raw
            .body_text
            .as_deref()
            .unwrap_or_default()
            .contains("Invoice attached"));
        assert!(raw.body_html.is_some());
    }

    #[test]
    fn falls_back_to_internal_date_without_date_header() {
        let msg = message_from_json(serde_json::json!({
            "id": "m-102",
            "internalDate": "1722470400000",
            "payload": {
                "mimeType": "text/plain",
                "headers": [
                    {"name": "From", "value": "a@b.example"},
                    {"name": "To", "value": "c@d.example"}
                ],
                "body": {"data": b64("hello")}
            }
        }));

        let raw = parse_message(msg);
        let received = raw.received_at.expect("received_at");
        assert_eq!(received.timestamp_millis(), 1_722_470_400_000);
    }
}
