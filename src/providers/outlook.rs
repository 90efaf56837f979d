//! Microsoft Graph (Outlook) adapter.
//!
//! The sync cursor is the ISO 8601 `receivedDateTime` of the newest message
//! seen. Incremental fetches filter strictly newer messages in ascending
//! order; timestamps never expire server-side, so a fetch that matches
//! nothing simply keeps the cursor it already had.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::{html_to_plain, reply_subject, BOOTSTRAP_LIMIT};
use crate::errors::{AppError, AppResult};
use crate::types::{Account, FetchOutcome, RawMessage};

const GRAPH_API: &str = "https://graph.microsoft.com/v1.0";

const SELECT_FIELDS: &str =
    "id,conversationId,from,toRecipients,subject,body,receivedDateTime,isRead";

pub async fn fetch_messages(
    http: &Client,
    token: &str,
    account: &Account,
) -> AppResult<FetchOutcome> {
    let mut params: Vec<(&str, String)> = vec![
        ("$select", SELECT_FIELDS.to_string()),
        ("$top", BOOTSTRAP_LIMIT.to_string()),
    ];

    if let Some(cursor) = account.sync_cursor.as_deref() {
        params.push(("$filter", format!("receivedDateTime gt {cursor}")));
        params.push(("$orderby", "receivedDateTime asc".to_string()));
    } else {
        params.push(("$orderby", "receivedDateTime desc".to_string()));
    }

    let mut messages = Vec::new();
    let mut latest_dt: Option<String> = None;
    let mut url = format!("{GRAPH_API}/me/messages");
    let mut first_page = true;

    loop {
        let mut request = http.get(&url).bearer_auth(token);
        // @odata.nextLink already carries the query; only the first request
        // gets explicit parameters.
        if first_page {
            request = request.query(&params);
            first_page = false;
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Network(format!("graph message list: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "graph message list failed: status={status} body={body}"
            )));
        }

        let page: GraphMessageList = response
            .json()
            .await
            .map_err(|e| AppError::Unexpected(format!("decoding graph message list: {e}")))?;

        for msg in page.value {
            if let Some(received) = &msg.received_date_time {
                // ISO 8601 UTC strings order lexicographically.
                if latest_dt.as_deref().map_or(true, |cur| received.as_str() > cur) {
                    latest_dt = Some(received.clone());
                }
            }
            messages.push(parse_message(msg));
        }

        match page.next_link {
            Some(next) => url = next,
            None => break,
        }
    }

    // Advance to the newest fetched position; with nothing fetched, a
    // cursor-less account initializes to "now" and an existing cursor is
    // kept as-is.
    let cursor = latest_dt
        .or_else(|| account.sync_cursor.clone())
        .or_else(|| Some(Utc::now().to_rfc3339()));

    info!(
        account = %account.id,
        count = messages.len(),
        "Outlook fetch complete"
    );

    Ok(FetchOutcome { messages, cursor })
}

pub async fn send_reply(
    http: &Client,
    token: &str,
    account: &Account,
    to: &str,
    subject: &str,
    body: &str,
    thread_ref: Option<&str>,
) -> AppResult<bool> {
    let subject = if thread_ref.is_some() {
        reply_subject(subject)
    } else {
        subject.to_string()
    };

    let payload = json!({
        "message": {
            "subject": subject,
            "body": { "contentType": "Text", "content": body },
            "toRecipients": [ { "emailAddress": { "address": to } } ],
        },
        "saveToSentItems": true,
    });

    let response = http
        .post(format!("{GRAPH_API}/me/sendMail"))
        .bearer_auth(token)
        .json(&payload)
        .send()
        .await
        .map_err(|e| AppError::Network(format!("graph send request: {e}")))?;

    let status = response.status();
    if status.is_success() {
        info!(account = %account.id, to, "Outlook: sent message");
        Ok(true)
    } else {
        let body = response.text().await.unwrap_or_default();
        error!(account = %account.id, status = %status, body = %body, "Outlook send failed");
        Ok(false)
    }
}

pub(crate) fn parse_message(msg: GraphMessage) -> RawMessage {
    let from = msg
        .from
        .as_ref()
        .and_then(|r| r.email_address.as_ref());
    let from_address = from
        .and_then(|e| e.address.clone())
        .unwrap_or_default();
    let from_name = from.and_then(|e| e.name.clone()).filter(|n| !n.is_empty());

    let to_address = msg
        .to_recipients
        .as_deref()
        .unwrap_or_default()
        .first()
        .and_then(|r| r.email_address.as_ref())
        .and_then(|e| e.address.clone())
        .unwrap_or_default();

    let received_at = msg
        .received_date_time
        .as_deref()
        .and_then(parse_graph_datetime);

    // Graph returns exactly one body content type per message.
    let (mut body_text, body_html) = match &msg.body {
        Some(body) => {
            let content = body.content.clone().unwrap_or_default();
            match body
                .content_type
                .as_deref()
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str()
            {
                "text" => (Some(content), None),
                "html" => (None, Some(content)),
                _ => (None, None),
            }
        }
        None => (None, None),
    };
    if body_text.is_none() {
        if let Some(html) = &body_html {
            body_text = html_to_plain(html);
        }
    }

    RawMessage {
        provider_id: msg.id,
        thread_id: msg.conversation_id,
        from_address,
        from_name,
        to_address,
        subject: msg.subject,
        body_text,
        body_html,
        received_at,
    }
}

fn parse_graph_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---- Graph API response types ----

#[derive(Debug, Deserialize)]
struct GraphMessageList {
    #[serde(default)]
    value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphMessage {
    pub id: String,
    pub conversation_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<GraphRecipient>,
    pub to_recipients: Option<Vec<GraphRecipient>>,
    pub body: Option<GraphBody>,
    pub received_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphRecipient {
    pub email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphEmailAddress {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphBody {
    pub content_type: Option<String>,
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_from_json(raw: serde_json::Value) -> GraphMessage {
        serde_json::from_value(raw).expect("graph message fixture")
    }

    #[test]
    fn parses_html_body_message() {
        let msg = message_from_json(serde_json::json!({
            "id": "AAMk-1",
            "conversationId": "conv-5",
            "subject": "Complaint about delivery",
            "from": {"emailAddress": {"name": "Lars", "address": "lars@example.dk"}},
            "toRecipients": [
                {"emailAddress": {"address": "help@shop.example"}},
                {"emailAddress": {"address": "cc@shop.example"}}
            ],
            "body": {"contentType": "html", "content": "<p>The parcel arrived broken.</p>"},
            "receivedDateTime": "2024-08-01T07:30:00Z"
        }));

        let raw = parse_message(msg);
        assert_eq!(raw.provider_id, "AAMk-1");
        assert_eq!(raw.thread_id.as_deref(), Some("conv-5"));
        assert_eq!(raw.from_address, "lars@example.dk");
        assert_eq!(raw.to_address, "help@shop.example");
        assert!(raw
            .body_text
            .as_deref()
            .unwrap_or_default()
            .contains("parcel arrived broken"));
        assert!(raw.body_html.is_some());
        assert_eq!(
            raw.received_at.map(|dt| dt.to_rfc3339()),
            Some("2024-08-01T07:30:00+00:00".to_string())
        );
    }

    #[test]
    fn parses_text_body_message() {
        let msg = message_from_json(serde_json::json!({
            "id": "AAMk-2",
            "body": {"contentType": "text", "content": "plain content"},
            "receivedDateTime": "2024-08-02T10:00:00Z"
        }));

        let raw = parse_message(msg);
        assert_eq!(raw.body_text.as_deref(), Some("plain content"));
        assert!(raw.body_html.is_none());
        assert_eq!(raw.from_address, "");
    }
}
