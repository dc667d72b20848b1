use thiserror::Error;

use crate::pipeline::PipelineStage;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Analysis failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("History entry already exists: {entry_id}")]
    DuplicateEntry { entry_id: String },

    #[error("Base prompt not found: {prompt_id}")]
    PromptNotFound { prompt_id: String },

    #[error("Base prompt text cannot be empty")]
    EmptyPrompt,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Inference provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Missing API key for provider {provider}")]
    MissingApiKey { provider: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether the backend signalled throttling (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Errors surfaced by the analysis pipeline.
///
/// Stage failures collapse into two user-facing kinds: rate limited and
/// everything else.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("There is nothing to analyze.")]
    EmptyInput,

    #[error("An analysis is already in progress.")]
    Busy,

    #[error("Parent entry not found: {parent_id}")]
    UnknownParent { parent_id: String },

    #[error("Too many requests. Please try again later.")]
    RateLimited { stage: PipelineStage },

    #[error("An unexpected error occurred.")]
    Inference { stage: PipelineStage, message: String },

    #[error("Failed to record history: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Map a provider failure at `stage` to its coarse pipeline kind.
    pub fn from_provider(stage: PipelineStage, err: ProviderError) -> Self {
        if err.is_rate_limited() {
            PipelineError::RateLimited { stage }
        } else {
            PipelineError::Inference {
                stage,
                message: err.to_string(),
            }
        }
    }

    /// The stage that failed, if the failure came from a provider call.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::RateLimited { stage } | PipelineError::Inference { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for pipeline runs
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::DuplicateEntry {
            entry_id: "entry-1".to_string(),
        };
        assert_eq!(err.to_string(), "History entry already exists: entry-1");

        let err = StorageError::PromptNotFound {
            prompt_id: "p-9".to_string(),
        };
        assert_eq!(err.to_string(), "Base prompt not found: p-9");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = ProviderError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");

        let err = ProviderError::MissingApiKey {
            provider: "groq".to_string(),
        };
        assert_eq!(err.to_string(), "Missing API key for provider groq");
    }

    #[test]
    fn test_rate_limit_maps_to_pipeline_rate_limited() {
        let err = ProviderError::RateLimited {
            message: "slow down".to_string(),
        };
        assert!(err.is_rate_limited());

        let mapped = PipelineError::from_provider(PipelineStage::Summarizing, err);
        assert!(matches!(
            mapped,
            PipelineError::RateLimited {
                stage: PipelineStage::Summarizing
            }
        ));
        assert_eq!(mapped.to_string(), "Too many requests. Please try again later.");
    }

    #[test]
    fn test_other_provider_errors_map_to_generic_kind() {
        let err = ProviderError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!err.is_rate_limited());

        let mapped = PipelineError::from_provider(PipelineStage::Analyzing, err);
        assert_eq!(mapped.stage(), Some(PipelineStage::Analyzing));
        assert_eq!(mapped.to_string(), "An unexpected error occurred.");
        match mapped {
            PipelineError::Inference { message, .. } => assert!(message.contains("500")),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::DuplicateEntry {
            entry_id: "test-123".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_pipeline_error_conversion_to_app_error() {
        let app_err: AppError = PipelineError::EmptyInput.into();
        assert!(matches!(app_err, AppError::Pipeline(_)));
        assert_eq!(app_err.to_string(), "Analysis failed: There is nothing to analyze.");
    }
}
