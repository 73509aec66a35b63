use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::time::Duration;

use crate::auth::token_manager::TokenManager;
use crate::domain::email::EmailSummary;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const METADATA_HEADERS: [&str; 3] = ["From", "Subject", "Date"];

/// Seam between the poll loop and the mail provider, so the loop can be
/// driven by fakes in tests.
pub trait MailQuery {
    /// Every message from `@domain` with an internal date after `after_epoch`.
    /// An empty vec means no new mail this cycle.
    fn check_new(&self, domain: &str, after_epoch: i64) -> Result<Vec<EmailSummary>>;
}

pub struct GmailClient {
    http: reqwest::blocking::Client,
    token_mgr: TokenManager,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageMetadata {
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

/// Gmail search expression selecting new mail from the monitored domain.
/// `after:` takes epoch seconds and is exclusive, so the provider enforces
/// the start-time cutoff for us.
pub fn build_query(domain: &str, after_epoch: i64) -> String {
    format!("from:*@{domain} after:{after_epoch}")
}

fn summarize(meta: MessageMetadata) -> EmailSummary {
    let mut from = String::new();
    let mut subject = String::new();
    let mut date = String::new();

    for h in meta.payload.map(|p| p.headers).unwrap_or_default() {
        match h.name.as_str() {
            "From" => from = h.value,
            "Subject" => subject = h.value,
            "Date" => date = h.value,
            _ => {}
        }
    }

    EmailSummary {
        from,
        subject,
        date,
    }
}

impl GmailClient {
    pub fn new(token_mgr: TokenManager) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            token_mgr,
            base_url: GMAIL_API_BASE.to_string(),
        })
    }

    fn list_message_ids(&self, access_token: &str, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/users/me/messages", self.base_url);
        log::debug!("listing messages with query {query:?}");

        let resp: ListResponse = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("q", query)])
            .send()?
            .error_for_status()
            .map_err(|e| anyhow!("message list request failed: {e}"))?
            .json()?;

        Ok(resp.messages.into_iter().map(|m| m.id).collect())
    }

    fn fetch_metadata(&self, access_token: &str, id: &str) -> Result<EmailSummary> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);

        let mut params: Vec<(&str, &str)> = vec![("format", "metadata")];
        for h in METADATA_HEADERS {
            params.push(("metadataHeaders", h));
        }

        let meta: MessageMetadata = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&params)
            .send()?
            .error_for_status()
            .map_err(|e| anyhow!("metadata request for message {id} failed: {e}"))?
            .json()?;

        Ok(summarize(meta))
    }
}

impl MailQuery for GmailClient {
    fn check_new(&self, domain: &str, after_epoch: i64) -> Result<Vec<EmailSummary>> {
        let access_token = self.token_mgr.get_access_token()?;
        let query = build_query(domain, after_epoch);

        let ids = self.list_message_ids(&access_token, &query)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.fetch_metadata(&access_token, &id)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_domain_and_cutoff() {
        assert_eq!(
            build_query("example.com", 1700000000),
            "from:*@example.com after:1700000000"
        );
    }

    #[test]
    fn list_response_tolerates_missing_messages_array() {
        let resp: ListResponse = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(resp.messages.is_empty());
    }

    #[test]
    fn summarize_populates_all_three_headers() {
        let meta: MessageMetadata = serde_json::from_str(
            r#"{
                "id": "18c",
                "payload": {
                    "headers": [
                        {"name": "From", "value": "Alice <alice@example.com>"},
                        {"name": "Subject", "value": "hello"},
                        {"name": "Date", "value": "Mon, 1 Jan 2024 00:00:00 +0000"},
                        {"name": "Message-ID", "value": "<x@y>"}
                    ]
                }
            }"#,
        )
        .unwrap();
        let s = summarize(meta);
        assert_eq!(s.from, "Alice <alice@example.com>");
        assert_eq!(s.subject, "hello");
        assert_eq!(s.date, "Mon, 1 Jan 2024 00:00:00 +0000");
    }

    #[test]
    fn summarize_defaults_absent_headers_to_empty() {
        let meta: MessageMetadata = serde_json::from_str(
            r#"{"payload": {"headers": [{"name": "From", "value": "bob@example.com"}]}}"#,
        )
        .unwrap();
        let s = summarize(meta);
        assert_eq!(s.from, "bob@example.com");
        assert_eq!(s.subject, "");
        assert_eq!(s.date, "");
    }

    #[test]
    fn summarize_handles_missing_payload() {
        let meta: MessageMetadata = serde_json::from_str(r#"{"id": "18c"}"#).unwrap();
        let s = summarize(meta);
        assert_eq!(s, EmailSummary::new("", "", ""));
    }
}
