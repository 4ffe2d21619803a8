use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

/// Live-refresh channel for clients. Delivery is best effort relative to the
/// state change that produced the event; failures are retried by the outbox.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, course_id: &str, payload: &Value) -> Result<()>;
}

/// Posts each event as JSON to a configured endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid webhook url {}", url))?;
        let http = Client::builder()
            .user_agent("lectern/0.1")
            .timeout(timeout)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { http, url })
    }

    pub fn build_request(&self, course_id: &str, payload: &Value) -> Result<reqwest::Request> {
        self.http
            .post(self.url.clone())
            .json(&json!({ "course_id": course_id, "event": payload }))
            .build()
            .context("failed to build webhook request")
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, course_id: &str, payload: &Value) -> Result<()> {
        let request = self.build_request(course_id, payload)?;
        let resp = self
            .http
            .execute(request)
            .await
            .context("webhook request failed")?;
        resp.error_for_status()
            .context("webhook rejected event")?;
        Ok(())
    }
}

/// Sink used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, course_id: &str, payload: &Value) -> Result<()> {
        info!(course_id, %payload, "event");
        Ok(())
    }
}

pub fn from_config(cfg: &Config) -> Result<Arc<dyn Notifier>> {
    match cfg.webhook_url() {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_millis(cfg.notify.timeout_ms),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
