//! Retrying HTTP client for the billing platform.
//!
//! Transient failures (429, 5xx, network errors) are retried with exponential
//! backoff; other 4xx responses surface immediately as terminal errors for
//! the item being processed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{BillingGateway, GatewayError, GatewayResponse};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const BASE_BACKOFF_MS: u64 = 500;

/// Connection settings for the billing API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL, e.g. "https://acme.billing.example.com/v2"
    pub base_url: String,
    /// Private API key; sent as HTTP basic auth username
    pub api_key: String,
    pub max_retries: u32,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

pub struct HttpGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Transport {
                method: "INIT".to_string(),
                path: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = self
            .http_client
            .request(method.clone(), self.url_for(path))
            .basic_auth(&self.config.api_key, Option::<&str>::None)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }
}

#[async_trait]
impl BillingGateway for HttpGateway {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut attempt = 0u32;
        loop {
            let result = self.send_once(&method, path, body.as_ref()).await;

            let retry_after = match &result {
                Ok(response) if Self::is_retryable_status(response.status()) => {
                    Some(format!("status {}", response.status()))
                }
                Err(err) if err.is_connect() || err.is_timeout() => Some(err.to_string()),
                _ => None,
            };

            if let Some(cause) = retry_after {
                if attempt < self.config.max_retries {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS << attempt);
                    warn!(
                        %method, path, attempt, cause,
                        "transient billing API failure, backing off {:?}", backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
            }

            let response = result.map_err(|err| GatewayError::Transport {
                method: method.to_string(),
                path: path.to_string(),
                message: err.to_string(),
            })?;

            let status = response.status();
            let status_code = status.as_u16();
            let text = response
                .text()
                .await
                .map_err(|err| GatewayError::Transport {
                    method: method.to_string(),
                    path: path.to_string(),
                    message: err.to_string(),
                })?;

            if !status.is_success() {
                return Err(GatewayError::Api {
                    status: status_code,
                    method: method.to_string(),
                    path: path.to_string(),
                    message: extract_api_message(&text),
                });
            }

            debug!(%method, path, status = status_code, "billing API call succeeded");

            let data = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).map_err(|err| GatewayError::Decode {
                    method: method.to_string(),
                    path: path.to_string(),
                    message: err.to_string(),
                })?
            };

            return Ok(GatewayResponse { data, status_code });
        }
    }
}

/// Pull the human-readable error out of an API error body, falling back to
/// the raw text.
fn extract_api_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["error", "message", "description"] {
            if let Some(message) = value.get(key).and_then(Value::as_str) {
                return message.to_string();
            }
            if let Some(message) = value
                .get("error")
                .and_then(|e| e.get(key))
                .and_then(Value::as_str)
            {
                return message.to_string();
            }
        }
    }
    body.trim().to_string()
}
