//! Pass-through proxy for the cadastral map search API.
//!
//! The front-end cannot call the map service directly (CORS, browser-only
//! access), so the server forwards `?query=` to the upstream endpoint and
//! relays whatever comes back. The payload is never parsed.

use axum::body::Bytes;
use std::time::Duration;

use crate::config::MapProxyConfig;
use crate::error::{ServiceError, ServiceResult};

/// Content type used when the upstream response does not declare one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Raw upstream response.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub body: Bytes,
    pub content_type: String,
}

pub struct MapProxy {
    http: reqwest::Client,
    endpoint: String,
}

impl MapProxy {
    pub fn new(config: &MapProxyConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Forwards `query` (trimmed) to the upstream search endpoint.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidInput`] if the trimmed query is empty.
    /// - [`ServiceError::Upstream`] on transport failure or a non-2xx status.
    pub async fn search(&self, query: &str) -> ServiceResult<ProxiedResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::invalid("Missing query param"));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| ServiceError::upstream(format!("Proxy error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::upstream(format!(
                "Proxy error: upstream returned {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::upstream(format!("Proxy error: {}", e)))?;

        tracing::debug!(query, bytes = body.len(), "map search relayed");
        Ok(ProxiedResponse { body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::{Query, RawQuery};
    use axum::http::{header, StatusCode};
    use axum::response::Response;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    /// Starts a local stand-in for the map service and returns its base URL.
    async fn upstream() -> String {
        let app = Router::new()
            .route(
                "/api/kad/search",
                get(
                    |RawQuery(raw): RawQuery, Query(params): Query<HashMap<String, String>>| async move {
                        (
                            [(header::CONTENT_TYPE, "text/plain; charset=x")],
                            format!(
                                "got[{}] raw[{}]",
                                params.get("query").cloned().unwrap_or_default(),
                                raw.unwrap_or_default()
                            ),
                        )
                    },
                ),
            )
            .route(
                "/untyped",
                get(|| async { Response::new(Body::from(r#"{"features":[]}"#)) }),
            )
            .route(
                "/down",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn proxy_to(endpoint: String) -> MapProxy {
        MapProxy::new(&MapProxyConfig {
            endpoint,
            timeout_secs: 2,
            ..MapProxyConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_blank_query_rejected_without_network() {
        let proxy = proxy_to("http://127.0.0.1:9/never-called".to_string());
        let err = proxy.search("   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_upstream_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let proxy = proxy_to(format!("http://127.0.0.1:{}/api/kad/search", port));
        let err = proxy.search("77:01:0001:23").await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert!(err.to_string().starts_with("Proxy error"));
    }

    #[tokio::test]
    async fn test_body_and_content_type_pass_through() {
        let base = upstream().await;
        let proxy = proxy_to(format!("{base}/api/kad/search"));

        let response = proxy.search("  a&b  ").await.unwrap();
        assert_eq!(response.content_type, "text/plain; charset=x");
        assert_eq!(&response.body[..], b"got[a&b] raw[query=a%26b]");
    }

    #[tokio::test]
    async fn test_missing_content_type_uses_fallback() {
        let base = upstream().await;
        let proxy = proxy_to(format!("{base}/untyped"));

        let response = proxy.search("77:01:0001:23").await.unwrap();
        assert_eq!(response.content_type, FALLBACK_CONTENT_TYPE);
        assert_eq!(&response.body[..], br#"{"features":[]}"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let base = upstream().await;
        let proxy = proxy_to(format!("{base}/down"));

        let err = proxy.search("77:01:0001:23").await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("503"));
    }
}
