//! Network side of the offline cache

use async_trait::async_trait;
use std::time::Duration;

use super::types::{AssetRequest, CachedResponse, OfflineError};

/// Response headers that describe the connection rather than the asset
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
];

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `request` from the network. Any HTTP status is `Ok`; only
    /// transport failures are errors.
    async fn fetch(&self, request: &AssetRequest) -> Result<CachedResponse, OfflineError>;
}

/// Fetches assets from a fixed origin over HTTP
pub struct HttpFetcher {
    origin: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(origin: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn url_for(&self, request: &AssetRequest) -> String {
        if request.path.starts_with('/') {
            format!("{}{}", self.origin, request.path)
        } else {
            format!("{}/{}", self.origin, request.path)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<CachedResponse, OfflineError> {
        let url = self.url_for(request);
        let fetch_error = |reason: String| OfflineError::Fetch {
            path: request.path.clone(),
            reason,
        };

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|e| fetch_error(e.to_string()))?;
        let mut builder = self.client.request(method, &url);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let resp = builder.send().await.map_err(|e| fetch_error(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?
            .to_vec();

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_origin_and_path() {
        let fetcher = HttpFetcher::new("http://127.0.0.1:8000/");
        assert_eq!(fetcher.origin(), "http://127.0.0.1:8000");
        assert_eq!(
            fetcher.url_for(&AssetRequest::get("/pad/md.js?v=1")),
            "http://127.0.0.1:8000/pad/md.js?v=1"
        );
        assert_eq!(
            fetcher.url_for(&AssetRequest::get("pad")),
            "http://127.0.0.1:8000/pad"
        );
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_fetch_error() {
        // Port 9 (discard) is not served on loopback in test environments
        let fetcher = HttpFetcher::new("http://127.0.0.1:9");
        let err = fetcher.fetch(&AssetRequest::get("/")).await.unwrap_err();
        assert!(matches!(err, OfflineError::Fetch { .. }));
    }
}
