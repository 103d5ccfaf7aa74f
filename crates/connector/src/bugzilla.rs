//! Bugzilla REST client.
//!
//! Both calls go to `{base}/rest/bug`. Bugzilla reports some failures as a
//! 200 response with `{"error": true, "message": ...}`, so the body is
//! checked for an error payload regardless of the HTTP status.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use bugwatch_core::config::BugzillaConfig;

use crate::query::search_params;
use crate::traits::{RemoteError, RemoteRecord, RemoteTracker};

/// Ids per detail request; keeps the query string well under server URL limits.
pub const MAX_IDS_PER_REQUEST: usize = 500;

/// Fields requested by `search`; only the ids are used.
const SEARCH_FIELDS: &str = "id,summary";

pub struct BugzillaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct BugList {
    #[serde(default)]
    bugs: Vec<RemoteRecord>,
}

impl BugzillaClient {
    /// Build a client with a bounded per-request timeout.
    pub fn new(config: &BugzillaConfig) -> Result<Self, RemoteError> {
        let timeout = config.timeout();
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/bug", self.base_url)
    }

    async fn get_bugs(&self, mut params: Vec<(String, String)>) -> Result<Vec<RemoteRecord>, RemoteError> {
        if let Some(key) = &self.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }

        let response = self
            .client
            .get(self.endpoint())
            .query(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            return Err(RemoteError::Api {
                status: Some(status.as_u16()),
                message: error_message(status.as_u16(), &body),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| RemoteError::Malformed(format!("invalid JSON from {}: {e}", self.endpoint())))?;
        if let Some(message) = error_payload(&value) {
            return Err(RemoteError::Api { status: Some(status.as_u16()), message });
        }

        let list: BugList = serde_json::from_value(value)
            .map_err(|e| RemoteError::Malformed(format!("unexpected bug list shape: {e}")))?;
        Ok(list.bugs)
    }

    fn classify(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Http(e)
        }
    }
}

#[async_trait]
impl RemoteTracker for BugzillaClient {
    async fn search(&self, query: &str) -> Result<Vec<i64>, RemoteError> {
        let mut params = search_params(query)?;
        params.push(("include_fields".to_string(), SEARCH_FIELDS.to_string()));

        let bugs = self.get_bugs(params).await?;
        let ids = bugs
            .iter()
            .filter_map(|bug| bug.get("id").and_then(Value::as_i64))
            .collect::<Vec<_>>();

        tracing::debug!(url = %self.base_url, matches = ids.len(), "bugzilla search finished");
        Ok(ids)
    }

    async fn fetch_fields(
        &self,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let include_fields = fields.join(",");
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let id_list = chunk.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            let params = vec![
                ("id".to_string(), id_list),
                ("include_fields".to_string(), include_fields.clone()),
            ];
            records.extend(self.get_bugs(params).await?);
        }

        tracing::debug!(
            url = %self.base_url,
            requested = ids.len(),
            returned = records.len(),
            "bugzilla detail fetch finished"
        );
        Ok(records)
    }
}

/// Extract `message` from a Bugzilla error payload (`{"error": true, ...}`).
fn error_payload(value: &Value) -> Option<String> {
    let flagged = match value.get("error") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => return Some(s.clone()),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    if !flagged {
        return None;
    }
    Some(
        value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("remote API reported an error")
            .to_string(),
    )
}

/// Best-effort message for a non-2xx response.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        return format!("failed to execute request (status {status})");
    }
    let snippet: String = body.chars().take(200).collect();
    format!("received non-JSON response from server (status {status}): {snippet}")
}
