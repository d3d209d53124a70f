//! Environment-based settings for the billing gateway and run identity.

use anyhow::Result;
use revive_gateway::GatewayConfig;

use crate::cli::error::HelpfulError;

/// Connection and identity settings, read from the environment so API keys
/// never appear on a command line or in shell history.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub api_key: String,
    /// Project identifier used in state/results file names
    pub project: String,
    /// Environment label recorded in artifacts ("production", "sandbox", ...)
    pub environment: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: require("REVIVE_API_BASE", "the billing API base URL")?,
            api_key: require("REVIVE_API_KEY", "the billing API private key")?,
            project: require("REVIVE_PROJECT", "the project identifier for state files")?,
            environment: std::env::var("REVIVE_ENVIRONMENT")
                .unwrap_or_else(|_| "sandbox".to_string()),
        })
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::new(self.base_url.clone(), self.api_key.clone())
    }
}

fn require(name: &str, purpose: &str) -> Result<String> {
    let value = std::env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        return Err(HelpfulError::missing_env(name, purpose).into());
    }
    Ok(value)
}
