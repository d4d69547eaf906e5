//! Gmail API v1 mailbox implementation.
//!
//! Speaks label NAMES at the trait boundary and resolves them to Gmail
//! label ids internally. Message bodies come from a MIME walk preferring
//! text/plain; HTML-only messages are flattened to text.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{get_valid_access_token, send_with_retry, GoogleApiError, RetryPolicy};
use crate::mailbox::{Mailbox, MailboxError, ThreadDetail, ThreadPage};
use crate::types::RawMessage;

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LabelListResponse {
    #[serde(default)]
    labels: Vec<GmailLabel>,
}

#[derive(Debug, Deserialize)]
struct GmailLabel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ThreadStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailThread {
    #[serde(default)]
    id: String,
    #[serde(default)]
    messages: Vec<GmailMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    /// Epoch milliseconds as a string.
    #[serde(default)]
    internal_date: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

// ============================================================================
// Mailbox implementation
// ============================================================================

/// Gmail-backed mailbox. Caches the label name↔id table per run.
pub struct GmailMailbox {
    client: reqwest::Client,
    policy: RetryPolicy,
    labels: Mutex<Option<HashMap<String, String>>>,
}

impl GmailMailbox {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            policy,
            labels: Mutex::new(None),
        }
    }

    async fn label_table(&self) -> Result<HashMap<String, String>, GoogleApiError> {
        let mut cache = self.labels.lock().await;
        if let Some(table) = cache.as_ref() {
            return Ok(table.clone());
        }

        let access_token = get_valid_access_token().await?;
        let resp = send_with_retry(
            self.client
                .get(format!("{}/labels", GMAIL_BASE))
                .bearer_auth(&access_token),
            &self.policy,
        )
        .await?;
        let resp = check_status(resp).await?;
        let list: LabelListResponse = resp.json().await?;

        let table: HashMap<String, String> = list
            .labels
            .into_iter()
            .map(|l| (l.name, l.id))
            .collect();
        *cache = Some(table.clone());
        Ok(table)
    }

    async fn label_id(&self, name: &str) -> Result<String, MailboxError> {
        let table = self
            .label_table()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        table
            .get(name)
            .cloned()
            .ok_or_else(|| MailboxError(format!("label {:?} does not exist", name)))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_labels(&self) -> Result<Vec<String>, MailboxError> {
        let table = self
            .label_table()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        Ok(table.into_keys().collect())
    }

    async fn threads_with_label(
        &self,
        label: &str,
        page_token: Option<&str>,
        limit: u32,
    ) -> Result<ThreadPage, MailboxError> {
        let label_id = self.label_id(label).await?;
        let access_token = get_valid_access_token()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;

        let mut query: Vec<(&str, String)> = vec![
            ("labelIds", label_id),
            ("maxResults", limit.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let resp = send_with_retry(
            self.client
                .get(format!("{}/threads", GMAIL_BASE))
                .bearer_auth(&access_token)
                .query(&query),
            &self.policy,
        )
        .await
        .map_err(|e| MailboxError(e.to_string()))?;
        let resp = check_status(resp)
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        let list: ThreadListResponse = resp
            .json()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;

        Ok(ThreadPage {
            thread_ids: list.threads.into_iter().map(|t| t.id).collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn thread(&self, thread_id: &str) -> Result<ThreadDetail, MailboxError> {
        let access_token = get_valid_access_token()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;

        let resp = send_with_retry(
            self.client
                .get(format!("{}/threads/{}", GMAIL_BASE, thread_id))
                .bearer_auth(&access_token)
                .query(&[("format", "full")]),
            &self.policy,
        )
        .await
        .map_err(|e| MailboxError(e.to_string()))?;
        let resp = check_status(resp)
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        let thread: GmailThread = resp
            .json()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;

        let table = self
            .label_table()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        let id_to_name: HashMap<&str, &str> = table
            .iter()
            .map(|(name, id)| (id.as_str(), name.as_str()))
            .collect();

        // Thread-level labels are the union across messages.
        let mut labels: Vec<String> = Vec::new();
        for message in &thread.messages {
            for label_id in &message.label_ids {
                if let Some(name) = id_to_name.get(label_id.as_str()) {
                    if !labels.iter().any(|l| l == name) {
                        labels.push(name.to_string());
                    }
                }
            }
        }

        let mut messages: Vec<RawMessage> = thread
            .messages
            .iter()
            .filter_map(to_raw_message)
            .collect();
        messages.sort_by_key(|m| m.received_at);

        Ok(ThreadDetail {
            id: thread.id,
            labels,
            messages,
        })
    }

    async fn modify_thread_labels(
        &self,
        thread_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), MailboxError> {
        if add.is_empty() && remove.is_empty() {
            return Ok(());
        }

        let mut add_ids = Vec::with_capacity(add.len());
        for name in add {
            add_ids.push(self.label_id(name).await?);
        }
        let mut remove_ids = Vec::with_capacity(remove.len());
        for name in remove {
            remove_ids.push(self.label_id(name).await?);
        }

        let access_token = get_valid_access_token()
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        let body = serde_json::json!({
            "addLabelIds": add_ids,
            "removeLabelIds": remove_ids,
        });

        let resp = send_with_retry(
            self.client
                .post(format!("{}/threads/{}/modify", GMAIL_BASE, thread_id))
                .bearer_auth(&access_token)
                .json(&body),
            &self.policy,
        )
        .await
        .map_err(|e| MailboxError(e.to_string()))?;
        check_status(resp)
            .await
            .map_err(|e| MailboxError(e.to_string()))?;
        Ok(())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

// ============================================================================
// Message conversion
// ============================================================================

fn to_raw_message(message: &GmailMessage) -> Option<RawMessage> {
    let payload = message.payload.as_ref()?;

    let get_header = |name: &str| -> String {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
            .unwrap_or_default()
    };

    let received_at = message
        .internal_date
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Some(RawMessage {
        id: message.id.clone(),
        thread_id: message.thread_id.clone(),
        subject: get_header("Subject"),
        sender: get_header("From"),
        body_text: extract_text(payload).unwrap_or_default(),
        received_at,
    })
}

/// Body text from the MIME tree: text/plain preferred, text/html
/// flattened as a fallback.
fn extract_text(payload: &MessagePayload) -> Option<String> {
    if let Some(text) = find_part(payload, "text/plain") {
        return Some(text);
    }
    if let Some(html) = find_part(payload, "text/html") {
        return html2text::from_read(html.as_bytes(), 100).ok();
    }
    None
}

/// Recursively walk MIME parts to find decoded body data of one type.
fn find_part(payload: &MessagePayload, target_mime: &str) -> Option<String> {
    if payload.mime_type == target_mime {
        if let Some(body) = &payload.body {
            if let Some(data) = &body.data {
                return decode_url_safe_base64(data);
            }
        }
    }
    for part in &payload.parts {
        if let Some(text) = find_part(part, target_mime) {
            return Some(text);
        }
    }
    None
}

/// URL-safe base64 (no padding) as used by the Gmail API.
fn decode_url_safe_base64(data: &str) -> Option<String> {
    use base64::Engine;
    match base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(data) {
        Ok(bytes) => String::from_utf8(bytes).ok(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn encode(text: &str) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(text)
    }

    #[test]
    fn test_thread_list_deserialization() {
        let json = r#"{
            "threads": [{"id": "t1"}, {"id": "t2"}],
            "nextPageToken": "page2"
        }"#;
        let resp: ThreadListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.threads.len(), 2);
        assert_eq!(resp.next_page_token.as_deref(), Some("page2"));
    }

    #[test]
    fn test_thread_list_empty() {
        let resp: ThreadListResponse =
            serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(resp.threads.is_empty());
    }

    #[test]
    fn test_message_conversion_plain_text() {
        let json = format!(
            r#"{{
                "id": "m1",
                "threadId": "t1",
                "labelIds": ["Label_7"],
                "internalDate": "1751371200000",
                "payload": {{
                    "mimeType": "text/plain",
                    "headers": [
                        {{"name": "From", "value": "Acme <no-reply@acme.com>"}},
                        {{"name": "Subject", "value": "Application received"}}
                    ],
                    "body": {{"data": "{}"}}
                }}
            }}"#,
            encode("Thank you for applying.")
        );
        let message: GmailMessage = serde_json::from_str(&json).unwrap();
        let raw = to_raw_message(&message).unwrap();
        assert_eq!(raw.subject, "Application received");
        assert_eq!(raw.sender, "Acme <no-reply@acme.com>");
        assert_eq!(raw.body_text, "Thank you for applying.");
        assert_eq!(raw.received_at.timestamp_millis(), 1_751_371_200_000);
    }

    #[test]
    fn test_multipart_prefers_plain_text() {
        let json = format!(
            r#"{{
                "id": "m1",
                "threadId": "t1",
                "internalDate": "1751371200000",
                "payload": {{
                    "mimeType": "multipart/alternative",
                    "headers": [],
                    "parts": [
                        {{"mimeType": "text/html", "body": {{"data": "{}"}}}},
                        {{"mimeType": "text/plain", "body": {{"data": "{}"}}}}
                    ]
                }}
            }}"#,
            encode("<p>html body</p>"),
            encode("plain body")
        );
        let message: GmailMessage = serde_json::from_str(&json).unwrap();
        let raw = to_raw_message(&message).unwrap();
        assert_eq!(raw.body_text, "plain body");
    }

    #[test]
    fn test_html_only_flattened() {
        let json = format!(
            r#"{{
                "id": "m1",
                "threadId": "t1",
                "internalDate": "1751371200000",
                "payload": {{
                    "mimeType": "text/html",
                    "headers": [],
                    "body": {{"data": "{}"}}
                }}
            }}"#,
            encode("<html><body><p>We received your application.</p></body></html>")
        );
        let message: GmailMessage = serde_json::from_str(&json).unwrap();
        let raw = to_raw_message(&message).unwrap();
        assert!(raw.body_text.contains("We received your application."));
    }

    #[test]
    fn test_message_without_payload_skipped() {
        let message: GmailMessage =
            serde_json::from_str(r#"{"id": "m1", "threadId": "t1"}"#).unwrap();
        assert!(to_raw_message(&message).is_none());
    }

    #[test]
    fn test_decode_bad_base64() {
        assert!(decode_url_safe_base64("!!!not-base64!!!").is_none());
    }
}
