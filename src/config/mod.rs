use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::context::ContextSettings;
use crate::error::AppError;
use crate::provider::ProviderKind;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub analysis: AnalysisConfig,
}

/// Inference backend selection and per-backend settings
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub openai: ProviderSettings,
    pub groq: ProviderSettings,
}

/// Settings for one inference backend
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
}

/// Analysis behavior: base prompt, context composition and edit debouncing
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub base_prompt: Option<String>,
    pub context: ContextSettings,
    pub debounce_ms: u64,
}

impl ProviderConfig {
    /// Settings of the active backend
    pub fn active(&self) -> &ProviderSettings {
        match self.kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Groq => &self.groq,
        }
    }

    /// Model selected for the active backend
    pub fn active_model(&self) -> &str {
        &self.active().model
    }
}

impl ProviderSettings {
    /// Default endpoint and model for `kind`, without an API key
    pub fn defaults_for(kind: ProviderKind) -> Self {
        let base_url = match kind {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Groq => "https://api.groq.com/openai/v1",
        };
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            model: kind.default_model().to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Quiescence window before an edit is evaluated
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let kind = match env::var("INFERENCE_PROVIDER") {
            Ok(v) => v
                .parse::<ProviderKind>()
                .map_err(|message| AppError::Config { message })?,
            Err(_) => ProviderKind::default(),
        };

        let provider = ProviderConfig {
            kind,
            openai: provider_from_env(ProviderKind::OpenAi, "OPENAI", kind)?,
            groq: provider_from_env(ProviderKind::Groq, "GROQ", kind)?,
        };

        if provider.active().api_key.is_none() {
            return Err(AppError::Config {
                message: format!(
                    "{}_API_KEY is required when INFERENCE_PROVIDER={}",
                    kind.as_str().to_uppercase(),
                    kind
                ),
            });
        }

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/history.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: parse_var("REQUEST_TIMEOUT_MS").unwrap_or(60000),
        };

        let defaults = ContextSettings::default();
        let analysis = AnalysisConfig {
            base_prompt: env::var("BASE_PROMPT").ok().filter(|p| !p.trim().is_empty()),
            context: ContextSettings {
                include_prompt: flag_var("CONTEXT_INCLUDE_PROMPT"),
                include_text: flag_var("CONTEXT_INCLUDE_TEXT"),
                include_past_results: flag_var("CONTEXT_INCLUDE_PAST_RESULTS"),
                max_history: parse_var("CONTEXT_MAX_HISTORY").unwrap_or(defaults.max_history),
            },
            debounce_ms: parse_var("DEBOUNCE_MS").unwrap_or(2000),
        };

        Ok(Config {
            provider,
            database,
            logging,
            request,
            analysis,
        })
    }
}

/// Settings for `kind`. Only the active backend's model is checked against its catalog.
fn provider_from_env(
    kind: ProviderKind,
    prefix: &str,
    active: ProviderKind,
) -> Result<ProviderSettings, AppError> {
    let defaults = ProviderSettings::defaults_for(kind);

    let model = env::var(format!("{prefix}_MODEL")).unwrap_or(defaults.model);
    if kind == active && !kind.supports_model(&model) {
        return Err(AppError::Config {
            message: format!(
                "{prefix}_MODEL={model} is not a {kind} model (expected one of: {})",
                kind.models().join(", ")
            ),
        });
    }

    Ok(ProviderSettings {
        api_key: env::var(format!("{prefix}_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty()),
        base_url: env::var(format!("{prefix}_BASE_URL")).unwrap_or(defaults.base_url),
        model,
    })
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

fn flag_var(name: &str) -> bool {
    matches!(
        env::var(name).map(|v| v.to_lowercase()).as_deref(),
        Ok("1" | "true" | "yes" | "on")
    )
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self { timeout_ms: 60000 }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_prompt: None,
            context: ContextSettings::default(),
            debounce_ms: 2000,
        }
    }
}
