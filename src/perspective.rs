//! Client for the Perspective comment-analysis service.
//!
//! The service assigns each message a toxicity score. The response body is
//! kept as opaque JSON; only the summary score is ever looked at downstream.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the scoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Service base URL
    pub endpoint: String,
    /// Attribute requested for every message
    pub attribute: String,
    /// Ask the service not to retain submitted text
    pub do_not_store: bool,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://commentanalyzer.googleapis.com".to_string(),
            attribute: "TOXICITY".to_string(),
            do_not_store: true,
            timeout_secs: 30,
        }
    }
}

impl PerspectiveConfig {
    /// Get the analyze endpoint URL.
    pub fn analyze_url(&self) -> String {
        format!(
            "{}/v1alpha1/comments:analyze",
            self.endpoint.trim_end_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Request body for one message.
    pub fn request_body(&self, text: &str) -> serde_json::Value {
        let mut attributes = serde_json::Map::new();
        attributes.insert(self.attribute.clone(), serde_json::json!({}));

        serde_json::json!({
            "comment": { "text": text },
            "requestedAttributes": attributes,
            "doNotStore": self.do_not_store,
        })
    }
}

/// Scoring service errors.
#[derive(Debug, thiserror::Error)]
pub enum PerspectiveError {
    #[error("Perspective config error: {0}")]
    Config(String),

    #[error("Perspective network error: {0}")]
    Network(String),

    #[error("Perspective server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Perspective serialization error: {0}")]
    Serialization(String),
}

/// Anything that turns a message into a score response.
pub trait ToxicityScorer {
    /// Reply written to the output as-is
    type Response: Serialize;

    fn score(&self, text: &str) -> Result<Self::Response, PerspectiveError>;
}

/// Async client for the analyze endpoint.
pub struct PerspectiveClient {
    config: PerspectiveConfig,
    api_key: String,
    client: reqwest::Client,
}

impl PerspectiveClient {
    pub fn new(config: PerspectiveConfig, api_key: impl Into<String>) -> Result<Self, PerspectiveError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PerspectiveError::Config("API key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PerspectiveError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    /// Score one message.
    pub async fn analyze(&self, text: &str) -> Result<serde_json::Value, PerspectiveError> {
        let response = self
            .client
            .post(self.config.analyze_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&self.config.request_body(text))
            .send()
            .await
            .map_err(|e| PerspectiveError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PerspectiveError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| PerspectiveError::Serialization(e.to_string()))
    }
}

/// Blocking client for use in synchronous contexts.
pub struct BlockingPerspectiveClient {
    inner: PerspectiveClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingPerspectiveClient {
    pub fn new(config: PerspectiveConfig, api_key: impl Into<String>) -> Result<Self, PerspectiveError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PerspectiveError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: PerspectiveClient::new(config, api_key)?,
            runtime,
        })
    }

    pub fn analyze(&self, text: &str) -> Result<serde_json::Value, PerspectiveError> {
        self.runtime.block_on(self.inner.analyze(text))
    }
}

impl ToxicityScorer for BlockingPerspectiveClient {
    type Response = serde_json::Value;

    fn score(&self, text: &str) -> Result<serde_json::Value, PerspectiveError> {
        self.analyze(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_url() {
        let config = PerspectiveConfig {
            endpoint: "http://127.0.0.1:8080/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.analyze_url(),
            "http://127.0.0.1:8080/v1alpha1/comments:analyze"
        );
        assert_eq!(
            PerspectiveConfig::default().analyze_url(),
            "https://commentanalyzer.googleapis.com/v1alpha1/comments:analyze"
        );
    }

    #[test]
    fn test_request_body() {
        let body = PerspectiveConfig::default().request_body("hello there");
        assert_eq!(
            body,
            serde_json::json!({
                "comment": { "text": "hello there" },
                "requestedAttributes": { "TOXICITY": {} },
                "doNotStore": true,
            })
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = PerspectiveClient::new(PerspectiveConfig::default(), "  ");
        assert!(matches!(result, Err(PerspectiveError::Config(_))));
    }

    #[test]
    fn test_unreachable_service_is_network_error() {
        let config = PerspectiveConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = BlockingPerspectiveClient::new(config, "test-key").unwrap();
        assert!(matches!(
            client.score("anything"),
            Err(PerspectiveError::Network(_))
        ));
    }

    #[test]
    fn test_server_error_display() {
        let err = PerspectiveError::Server {
            status: 429,
            message: "quota".to_string(),
        };
        assert_eq!(err.to_string(), "Perspective server error (429): quota");
    }
}
