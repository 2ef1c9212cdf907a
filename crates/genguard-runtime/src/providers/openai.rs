//! OpenAI-compatible chat-completions provider.
//!
//! Works against any endpoint that speaks `POST {base_url}/chat/completions`
//! with bearer authentication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use crate::config::ProviderConfig;

/// Default environment variable for the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI-compatible provider.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let credential = ApiCredential::new(api_key, CredentialSource::Programmatic, "AI API key");
        Self::with_credential(credential, "https://api.openai.com/v1")
    }

    /// Build from configuration; the key comes from config or its env var.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let credential =
            ApiCredential::require(config.api_key.as_deref(), &config.api_key_env, "AI API key")?;
        Self::with_credential(credential, &config.base_url)
    }

    fn with_credential(credential: ApiCredential, base_url: &str) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response has no choices".to_string()))?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiProvider::new("test-key")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
        assert!(!format!("{:?}", provider).contains("test-key"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = ProviderConfig {
            api_key: None,
            api_key_env: "GENGUARD_NO_SUCH_KEY_98765".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(
            OpenAiProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "{}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let body: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("{}"));
        assert_eq!(body.usage.unwrap().completion_tokens, 3);
    }
}
