//! Scripted in-memory tracker for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{RemoteError, RemoteRecord, RemoteTracker};

/// A [`RemoteTracker`] whose answers are set up by the test.
///
/// Searches resolve by exact descriptor; unknown descriptors match nothing.
/// Detail fetches return the stored record of every requested id that has
/// one, reduced to the requested fields like the real API does.
#[derive(Default)]
pub struct MockTracker {
    searches: Mutex<HashMap<String, Result<Vec<i64>, String>>>,
    records: Mutex<HashMap<i64, RemoteRecord>>,
    fetch_error: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    search_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    last_fields: Mutex<Vec<String>>,
}

impl MockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_search(&self, query: &str, ids: Vec<i64>) {
        lock(&self.searches).insert(query.to_string(), Ok(ids));
    }

    pub fn fail_search(&self, query: &str, message: &str) {
        lock(&self.searches).insert(query.to_string(), Err(message.to_string()));
    }

    /// Store (or replace) an item's fields; `value` must be a JSON object.
    pub fn set_record(&self, id: i64, value: Value) {
        let mut record = match value {
            Value::Object(map) => map,
            _ => RemoteRecord::new(),
        };
        record.insert("id".to_string(), Value::from(id));
        lock(&self.records).insert(id, record);
    }

    pub fn fail_fetch(&self, message: Option<&str>) {
        *lock(&self.fetch_error) = message.map(str::to_string);
    }

    /// Delay every call, to observe work that runs in the background.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Field list of the most recent detail fetch.
    pub fn last_fields(&self) -> Vec<String> {
        lock(&self.last_fields).clone()
    }

    async fn wait(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteTracker for MockTracker {
    async fn search(&self, query: &str) -> Result<Vec<i64>, RemoteError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        let result = lock(&self.searches).get(query).cloned();
        match result {
            Some(Ok(ids)) => Ok(ids),
            Some(Err(message)) => Err(RemoteError::api(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_fields(
        &self,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_fields) = fields.to_vec();
        self.wait().await;

        if let Some(message) = lock(&self.fetch_error).clone() {
            return Err(RemoteError::api(message));
        }

        let records = lock(&self.records);
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id))
            .map(|record| {
                record
                    .iter()
                    .filter(|(key, _)| fields.iter().any(|f| f == *key))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect())
    }
}
