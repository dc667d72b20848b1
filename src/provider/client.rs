use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::{ProviderSettings, RequestConfig};
use crate::error::{ProviderError, ProviderResult};

/// HTTP client for OpenAI-compatible chat-completions endpoints
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
    label: &'static str,
}

impl ChatClient {
    /// Create a new client. `label` names the backend in logs and errors.
    pub fn new(
        label: &'static str,
        settings: &ProviderSettings,
        request_config: &RequestConfig,
    ) -> ProviderResult<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey {
                provider: label.to_string(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_ms: request_config.timeout_ms,
            label,
        })
    }

    /// Send a chat completion request. Throttling and failures are not retried.
    pub async fn chat(&self, request: &ChatCompletionRequest) -> ProviderResult<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let start = Instant::now();

        debug!(
            provider = self.label,
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completions"
        );

        match self.execute_request(&url, request).await {
            Ok(response) => {
                info!(
                    provider = self.label,
                    model = %request.model,
                    latency_ms = start.elapsed().as_millis(),
                    "Chat completion succeeded"
                );
                Ok(response)
            }
            Err(e) => {
                error!(
                    provider = self.label,
                    model = %request.model,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Chat completion failed"
                );
                Err(e)
            }
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletionResponse> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RateLimited { message: body });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
