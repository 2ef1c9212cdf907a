//! Webhook fan-out notifier.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;

use genguard_core::Severity;

use super::notifier::{NotifyError, NotifyReport, OperatorNotifier};
use crate::config::NotifierConfig;
use crate::providers::ApiCredential;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    severity: Severity,
    message: &'a str,
    source: &'a str,
}

/// POSTs every alert to each configured URL concurrently.
pub struct WebhookNotifier {
    urls: Vec<String>,
    token: Option<ApiCredential>,
    source: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotifyError::Failed(e.to_string()))?;

        Ok(Self {
            urls: config.webhook_urls.clone(),
            token: ApiCredential::resolve(
                config.auth_token.as_deref(),
                config.auth_token_env.as_deref(),
                "Webhook token",
            ),
            source: config.source.clone(),
            client,
        })
    }

    pub fn recipients(&self) -> usize {
        self.urls.len()
    }

    async fn post(&self, url: &str, payload: &WebhookPayload<'_>) -> bool {
        let mut request = self.client.post(url).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(url, status = %response.status(), "Operator webhook rejected alert");
                false
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Operator webhook unreachable");
                false
            }
        }
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("urls", &self.urls)
            .field("token", &self.token)
            .field("source", &self.source)
            .finish()
    }
}

#[async_trait]
impl OperatorNotifier for WebhookNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Result<NotifyReport, NotifyError> {
        let payload = WebhookPayload {
            severity,
            message,
            source: &self.source,
        };

        let results = join_all(self.urls.iter().map(|url| self.post(url, &payload))).await;
        let sent_count = results.into_iter().filter(|ok| *ok).count();

        if sent_count < self.urls.len() {
            tracing::warn!(
                sent = sent_count,
                attempted = self.urls.len(),
                "Alert reached only some operators"
            );
        }

        Ok(NotifyReport::delivered(self.urls.len(), sent_count))
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
