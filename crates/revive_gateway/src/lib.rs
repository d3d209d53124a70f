//! Billing platform API boundary.
//!
//! The rest of the tool talks to the billing platform exclusively through the
//! [`BillingGateway`] trait, so engines can be driven against a recording
//! mock in tests and the retry policy lives in exactly one place.

pub mod client;

pub use client::{GatewayConfig, HttpGateway};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use reqwest::Method;

/// A successful gateway response: parsed body plus the HTTP status.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub data: Value,
    pub status_code: u16,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-2xx response from the billing API, after retries.
    #[error("billing API returned {status} for {method} {path}: {message}")]
    Api {
        status: u16,
        method: String,
        path: String,
        message: String,
    },

    /// Network-level failure, after retries.
    #[error("transport error for {method} {path}: {message}")]
    Transport {
        method: String,
        path: String,
        message: String,
    },

    /// 2xx response whose body was not valid JSON.
    #[error("invalid response body for {method} {path}: {message}")]
    Decode {
        method: String,
        path: String,
        message: String,
    },
}

impl GatewayError {
    /// HTTP status code, when the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Error message as reported by the remote, for pattern classification.
    pub fn message(&self) -> &str {
        match self {
            GatewayError::Api { message, .. }
            | GatewayError::Transport { message, .. }
            | GatewayError::Decode { message, .. } => message,
        }
    }
}

/// Black-box interface to the billing platform.
///
/// Implementations retry transient failures internally; callers see either a
/// response or a terminal [`GatewayError`].
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<GatewayResponse, GatewayError>;
}
