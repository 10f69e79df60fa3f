//! Offline cache types

use serde::{Deserialize, Serialize};

use crate::db::StoreError;

/// Response stored in a cache region (and returned by the fetcher)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Answer when neither the cache nor the network can serve a request
    pub fn service_unavailable() -> Self {
        Self::new(503, "text/html", "<h1>Service unavailable</h1>")
    }
}

/// Request identity as seen by the cache: method plus path with query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub method: String,
    /// Path including the query string, e.g. `/pad/md.js?v=2`
    pub path: String,
    pub body: Vec<u8>,
}

impl AssetRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            body: Vec::new(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Key of the entry this request maps to within a region
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    #[error("Fetch failed for {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("Install of {version} failed: {reason}")]
    Install { version: String, reason: String },

    #[error("Worker for {0} is not installed")]
    NotInstalled(String),

    #[error("Cache storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<rusqlite::Error> for OfflineError {
    fn from(e: rusqlite::Error) -> Self {
        OfflineError::Storage(StoreError::Sqlite(e))
    }
}
