// Outbound transport configuration
//
// Every provider builds its HTTP client from one of these. TLS verification is
// relaxed only on the clients that were handed a config asking for it.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::retry::RetryPolicy;
use crate::config::TransportSettings;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub skip_ssl_verification: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_settings(&TransportSettings::default())
    }
}

impl TransportConfig {
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self {
            skip_ssl_verification: settings.skip_ssl_verification,
            timeout: Duration::from_secs(settings.request_timeout_secs),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder().timeout(self.timeout);
        if self.skip_ssl_verification {
            tracing::warn!("TLS certificate verification disabled for provider client");
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build().context("Failed to create HTTP client")
    }
}
