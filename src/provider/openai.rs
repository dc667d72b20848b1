use async_trait::async_trait;

use super::client::ChatClient;
use super::types::{ChatCompletionRequest, ChatMessage};
use super::{InferenceProvider, ProviderKind};
use crate::config::{ProviderSettings, RequestConfig};
use crate::error::{ProviderError, ProviderResult};
use crate::prompts::ASSISTANT_SYSTEM_PROMPT;

/// OpenAI chat completions backend
#[derive(Clone)]
pub struct OpenAiProvider {
    client: ChatClient,
}

impl OpenAiProvider {
    /// Create a provider from its settings
    pub fn new(settings: &ProviderSettings, request: &RequestConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: ChatClient::new(ProviderKind::OpenAi.as_str(), settings, request)?,
        })
    }

    fn build_request(prompt: &str, model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest::new(
            model,
            vec![
                ChatMessage::system(ASSISTANT_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
        )
        .with_top_p(1.0)
    }
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn complete(&self, prompt: &str, model: &str) -> ProviderResult<String> {
        let request = Self::build_request(prompt, model);
        let response = self.client.chat(&request).await?;

        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "Response contained no completion".to_string(),
            })
    }
}
