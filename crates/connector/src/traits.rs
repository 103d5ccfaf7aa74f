//! Remote tracker trait definition and shared error types.

use std::time::Duration;

use async_trait::async_trait;

/// One item as returned by a batched detail fetch: field key -> raw value.
pub type RemoteRecord = serde_json::Map<String, serde_json::Value>;

/// Errors from either remote call. The pipeline treats every variant as
/// "this run failed"; the variants only exist for logging and HTTP mapping.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{message}")]
    Api { status: Option<u16>, message: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api { status: None, message: message.into() }
    }
}

/// The two remote capabilities the ingestion pipeline needs.
#[async_trait]
pub trait RemoteTracker: Send + Sync {
    /// Resolve a stored query descriptor to the matching remote item ids.
    async fn search(&self, query: &str) -> Result<Vec<i64>, RemoteError>;

    /// Fetch the given fields for many items in as few calls as possible.
    async fn fetch_fields(
        &self,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Field key that carries the remote item id in fetched records.
    fn identity_field(&self) -> &str {
        "id"
    }
}
