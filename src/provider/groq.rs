use async_trait::async_trait;
use tracing::warn;

use super::client::ChatClient;
use super::types::{ChatCompletionRequest, ChatMessage};
use super::{InferenceProvider, ProviderKind};
use crate::config::{ProviderSettings, RequestConfig};
use crate::error::ProviderResult;

/// Groq backend (OpenAI-compatible endpoint, user message only)
#[derive(Clone)]
pub struct GroqProvider {
    client: ChatClient,
}

impl GroqProvider {
    /// Create a provider from its settings
    pub fn new(settings: &ProviderSettings, request: &RequestConfig) -> ProviderResult<Self> {
        Ok(Self {
            client: ChatClient::new(ProviderKind::Groq.as_str(), settings, request)?,
        })
    }
}

#[async_trait]
impl InferenceProvider for GroqProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    async fn complete(&self, prompt: &str, model: &str) -> ProviderResult<String> {
        let request = ChatCompletionRequest::new(model, vec![ChatMessage::user(prompt)]);
        let response = self.client.chat(&request).await?;

        match response.first_content() {
            Some(content) => Ok(content.to_string()),
            None => {
                warn!(model = %model, "Groq returned no completion content");
                Ok(String::new())
            }
        }
    }
}
