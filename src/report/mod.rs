//! Failure reporting
//!
//! Reporting is best-effort by contract: a reporter never returns an error
//! and never retries, so a broken webhook cannot turn a data problem into a
//! hang or mask the original failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Reporter construction errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// One run failure, as handed to a reporter.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Rendered error text
    pub error_text: String,
    /// Component the failure originated in (e.g. "collector")
    pub component: String,
    /// When the failure was observed, unix seconds
    pub event_unix_time: i64,
}

impl FailureReport {
    pub fn new(component: impl Into<String>, error_text: impl Into<String>) -> Self {
        Self {
            error_text: error_text.into(),
            component: component.into(),
            event_unix_time: Utc::now().timestamp(),
        }
    }
}

/// Best-effort failure notification channel.
#[async_trait]
pub trait FailureReporter: Send + Sync {
    async fn report(&self, report: &FailureReport);
}

/// Reporter that only writes to the log. Used when no webhook is configured.
#[derive(Default)]
pub struct LogReporter;

#[async_trait]
impl FailureReporter for LogReporter {
    async fn report(&self, report: &FailureReport) {
        error!(
            component = %report.component,
            event_unix_time = report.event_unix_time,
            "run failure: {}",
            report.error_text
        );
    }
}

/// Reporter that posts a formatted message to an incoming webhook.
pub struct WebhookReporter {
    client: Client,
    webhook_url: String,
}

impl WebhookReporter {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ReportError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    fn payload(report: &FailureReport) -> serde_json::Value {
        let observed = DateTime::from_timestamp(report.event_unix_time, 0)
            .unwrap_or_default()
            .to_rfc3339();

        json!({
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": format!(":rotating_light: {} failure", report.component),
                    }
                },
                {
                    "type": "section",
                    "fields": [
                        {
                            "type": "mrkdwn",
                            "text": format!("*Component:*\n{}", report.component),
                        },
                        {
                            "type": "mrkdwn",
                            "text": format!("*Observed:*\n{}", observed),
                        }
                    ]
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!("```{}```", report.error_text),
                    }
                }
            ]
        })
    }
}

#[async_trait]
impl FailureReporter for WebhookReporter {
    async fn report(&self, report: &FailureReport) {
        let payload = Self::payload(report);

        match self.client.post(&self.webhook_url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    status = response.status().as_u16(),
                    "failure webhook rejected the report"
                );
            }
            Err(e) => {
                warn!("failure webhook unreachable: {}", e);
            }
            Ok(_) => {}
        }
    }
}
