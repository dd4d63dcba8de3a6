use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{CircuitBreaker, Notice};
use crate::config::CircuitBreakerConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("circuit breaker is open - notification endpoint temporarily unavailable")]
    CircuitOpen,
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("notification endpoint answered {0}")]
    Status(u16),
}

/// Outbound customer notification dispatch.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// POSTs each notice as JSON to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    breaker: CircuitBreaker,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, breaker: &CircuitBreakerConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            breaker: CircuitBreaker::new(breaker.failure_threshold, breaker.timeout_seconds),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        if !self.breaker.can_execute() {
            return Err(NotifyError::CircuitOpen);
        }

        let result = self.client.post(&self.url).json(notice).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                self.breaker.record_success();
                debug!(url = %self.url, "notification delivered");
                Ok(())
            }
            Ok(response) => {
                self.breaker.record_failure();
                Err(NotifyError::Status(response.status().as_u16()))
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(NotifyError::Http(e))
            }
        }
    }
}

/// Logs notices instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        info!(notice = ?notice, "📨 notification (no webhook configured)");
        Ok(())
    }
}
