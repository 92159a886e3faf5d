//! HTTP reporting client

use reqwest::StatusCode;
use tracing::debug;

use crate::{CloudConfig, CloudError, FocusReport};

const API_KEY_HEADER: &str = "API-Key";

/// Ingestion API client
#[derive(Clone)]
pub struct CloudClient {
    config: CloudConfig,
    http_client: reqwest::Client,
}

impl CloudClient {
    /// Create new cloud client
    pub fn new(config: CloudConfig) -> Result<Self, CloudError> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CloudError::Client(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &CloudConfig {
        &self.config
    }

    /// Post one report. Never waits longer than the configured timeout.
    pub async fn send(&self, report: &FocusReport) -> Result<(), CloudError> {
        let response = self
            .http_client
            .post(&self.config.api_url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(report)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CloudError::Timeout
                } else {
                    CloudError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        debug!("Ingestion responded {}", status);
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, body))
    }
}

/// Map a non-2xx backend answer to its meaning
fn classify_failure(status: StatusCode, body: String) -> CloudError {
    match status {
        StatusCode::UNAUTHORIZED => CloudError::Unauthorized,
        StatusCode::FORBIDDEN => CloudError::NoActiveSession,
        StatusCode::CONFLICT => CloudError::SessionConflict,
        StatusCode::BAD_REQUEST => CloudError::Rejected(body),
        other => CloudError::Server(other.as_u16()),
    }
}


#[cfg(test)]
mod tests {
    use super::stub::serve;
    use super::*;
    use axum::http::StatusCode as Status;
    use focus_monitor::{Emotion, EmotionLabel, FocusStatus};
    use std::time::Duration;

    fn client(url: String, timeout_ms: u64) -> CloudClient {
        CloudClient::new(CloudConfig {
            api_url: url,
            api_key: "device-key".to_string(),
            timeout_ms,
            ..Default::default()
        })
        .unwrap()
    }

    fn report() -> FocusReport {
        FocusReport::new(
            FocusStatus::Focused,
            EmotionLabel::Emotion(Emotion::Happy),
            Some(22.4),
            Some(41.0),
        )
    }

    #[tokio::test]
    async fn test_created_is_accepted_with_key_header() {
        let (url, seen) = serve(Status::CREATED, Duration::ZERO).await;
        client(url, 2000).send(&report()).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("device-key"));
        assert_eq!(seen[0].1["status"], "FOCUSED");
        assert_eq!(seen[0].1["emotion_detected"], "Happy");
    }

    #[tokio::test]
    async fn test_backend_refusals_are_classified() {
        let (url, _) = serve(Status::UNAUTHORIZED, Duration::ZERO).await;
        assert!(matches!(client(url, 2000).send(&report()).await, Err(CloudError::Unauthorized)));

        let (url, _) = serve(Status::FORBIDDEN, Duration::ZERO).await;
        assert!(matches!(client(url, 2000).send(&report()).await, Err(CloudError::NoActiveSession)));

        let (url, _) = serve(Status::CONFLICT, Duration::ZERO).await;
        assert!(matches!(client(url, 2000).send(&report()).await, Err(CloudError::SessionConflict)));

        let (url, _) = serve(Status::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        assert!(matches!(client(url, 2000).send(&report()).await, Err(CloudError::Server(500))));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let (url, _) = serve(Status::CREATED, Duration::from_millis(1500)).await;
        let started = std::time::Instant::now();
        let result = client(url, 100).send(&report()).await;
        assert!(matches!(result, Err(CloudError::Timeout)));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/api/log_focus/", addr);
        assert!(matches!(
            client(url, 2000).send(&report()).await,
            Err(CloudError::Network(_))
        ));
    }

    #[test]
    fn test_bad_request_keeps_body() {
        match classify_failure(StatusCode::BAD_REQUEST, "bad status".into()) {
            CloudError::Rejected(body) => assert_eq!(body, "bad status"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, String::new()),
            CloudError::Server(502)
        ));
    }
}
