//! Outbound client for the external AI analysis service.
//!
//! The provider owns transport details only: request serialisation, timeout,
//! HTTP status mapping and JSON decoding. What a failure means for a job is
//! decided by the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::AiConfig;

const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOptions {
    pub detect_landmarks: bool,
}

/// Body of `POST {AI_BASE_URL}/analysis`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub image_url: String,
    pub options: AnalysisOptions,
}

impl AnalysisRequest {
    pub fn for_image(image_id: &str) -> Self {
        Self {
            image_url: image_id.to_string(),
            options: AnalysisOptions {
                detect_landmarks: true,
            },
        }
    }
}

/// Successful provider response. `body` is kept verbatim as the job result.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub body: Value,
    pub overlay_url: Option<String>,
    pub duration_ms: Option<i64>,
}

impl AnalysisOutcome {
    pub fn from_body(body: Value) -> Self {
        let overlay_url = body
            .get("overlay_url")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let duration_ms = body.get("duration_ms").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().map(|f| f.round() as i64))
        });
        Self {
            body,
            overlay_url,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned an invalid body: {0}")]
    Decode(String),
    #[error("provider call aborted: {0}")]
    Aborted(String),
}

impl ProviderError {
    /// Transport-level failures and 5xx responses may succeed on a later try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status >= 500,
            ProviderError::Decode(_) | ProviderError::Aborted(_) => false,
        }
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, ProviderError>;
}

/// Provider backed by a reqwest client with an explicit request timeout.
pub struct HttpAnalysisProvider {
    client: Client,
    endpoint: String,
}

impl HttpAnalysisProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/analysis", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(cfg: &AiConfig) -> Result<Self, reqwest::Error> {
        Self::new(&cfg.base_url, cfg.timeout())
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, ProviderError> {
        debug!(endpoint = %self.endpoint, image_url = %request.image_url, "calling provider");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body)
                    .chars()
                    .take(MAX_ERROR_BODY_CHARS)
                    .collect(),
            });
        }

        let decoded: Value = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        Ok(AnalysisOutcome::from_body(decoded))
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        format!("http://{addr}")
    }

    #[test]
    fn outcome_extracts_optional_fields() {
        let outcome = AnalysisOutcome::from_body(json!({
            "overlay_url": "http://x/o.png",
            "duration_ms": 250,
            "landmarks": [1, 2]
        }));
        assert_eq!(outcome.overlay_url.as_deref(), Some("http://x/o.png"));
        assert_eq!(outcome.duration_ms, Some(250));

        let bare = AnalysisOutcome::from_body(json!({"overlay_url": 5}));
        assert!(bare.overlay_url.is_none());
        assert!(bare.duration_ms.is_none());
    }

    #[test]
    fn retryability() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!ProviderError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!ProviderError::Decode("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn posts_image_and_landmark_option() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let app = Router::new().route(
            "/analysis",
            post(move |Json(body): Json<Value>| {
                let captured = captured.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({"overlay_url": "http://x/o.png", "duration_ms": 250}))
                }
            }),
        );
        let base = spawn_server(app).await;

        let provider = HttpAnalysisProvider::new(&base, Duration::from_secs(5)).unwrap();
        let outcome = provider
            .analyze(&AnalysisRequest::for_image("img-42"))
            .await
            .expect("provider call");

        assert_eq!(outcome.overlay_url.as_deref(), Some("http://x/o.png"));
        assert_eq!(outcome.duration_ms, Some(250));
        let sent = seen.lock().unwrap().clone().expect("request captured");
        assert_eq!(
            sent,
            json!({"image_url": "img-42", "options": {"detect_landmarks": true}})
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let app = Router::new().route(
            "/analysis",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let base = spawn_server(app).await;
        let provider = HttpAnalysisProvider::new(&base, Duration::from_secs(5)).unwrap();

        let err = provider
            .analyze(&AnalysisRequest::for_image("img"))
            .await
            .unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let app = Router::new().route(
            "/analysis",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({}))
            }),
        );
        let base = spawn_server(app).await;
        let provider = HttpAnalysisProvider::new(&base, Duration::from_millis(100)).unwrap();

        let err = provider
            .analyze(&AnalysisRequest::for_image("img"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            HttpAnalysisProvider::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = provider
            .analyze(&AnalysisRequest::for_image("img"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
