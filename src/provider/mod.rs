//! Inference providers.
//!
//! The pipeline and the change monitor only see the [`InferenceProvider`]
//! capability. Two backends implement it: [`OpenAiProvider`] and
//! [`GroqProvider`], both speaking the chat-completions protocol through
//! [`ChatClient`].

mod client;
mod groq;
mod openai;
mod types;

pub use client::ChatClient;
pub use groq::GroqProvider;
pub use openai::OpenAiProvider;
pub use types::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ProviderConfig, RequestConfig};
use crate::error::ProviderResult;

/// A remote text-completion capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Complete `prompt` with `model` and return the generated text.
    async fn complete(&self, prompt: &str, model: &str) -> ProviderResult<String>;
}

/// Supported inference backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions.
    #[default]
    OpenAi,
    /// Groq's OpenAI-compatible endpoint.
    Groq,
}

const OPENAI_MODELS: &[&str] = &["gpt-4o", "gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"];

const GROQ_MODELS: &[&str] = &[
    "llama3-8b-8192",
    "llama3-70b-8192",
    "mixtral-8x7b-32768",
    "gemma-7b-it",
    "whisper-large-v3",
];

impl ProviderKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Groq => "groq",
        }
    }

    /// Models a user may select for this backend.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => OPENAI_MODELS,
            ProviderKind::Groq => GROQ_MODELS,
        }
    }

    /// Model used when none has been selected.
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-3.5-turbo",
            ProviderKind::Groq => "llama3-8b-8192",
        }
    }

    /// Whether `model` belongs to this backend's catalog.
    pub fn supports_model(&self, model: &str) -> bool {
        self.models().contains(&model)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "groq" => Ok(ProviderKind::Groq),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Build the configured active provider.
pub fn from_config(
    config: &ProviderConfig,
    request: &RequestConfig,
) -> ProviderResult<Arc<dyn InferenceProvider>> {
    let provider: Arc<dyn InferenceProvider> = match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(&config.openai, request)?),
        ProviderKind::Groq => Arc::new(GroqProvider::new(&config.groq, request)?),
    };
    Ok(provider)
}
