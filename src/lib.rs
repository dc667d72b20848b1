//! # Text Insight
//!
//! Staged LLM text analysis with a persistent, branching history.
//!
//! A piece of text is sent through three dependent provider calls (a full
//! analysis, a short summary, and a list of follow-up questions) and the
//! combined result is recorded as a node in a forest of analyses. Follow-ups
//! become children of the entry they came from, and their requests can carry
//! the ancestor chain as context.
//!
//! ## Features
//!
//! - **Analysis pipeline**: analyze, summarize and generate follow-ups in one run
//! - **History graph**: parent-linked entries persisted in SQLite
//! - **Context composition**: ancestor prompts, texts and results as a prompt suffix
//! - **Change monitoring**: debounced edits with a provider-judged significance check
//! - **Text delta**: word-level additions between two revisions
//! - **Providers**: OpenAI and Groq chat-completions backends
//!
//! ## Architecture
//!
//! ```text
//! edits → ChangeSignificanceMonitor → AnalysisPipeline → InferenceProvider (HTTP)
//!                                            ↓
//!                                 HistoryGraph → SQLite
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use text_insight::{provider, AnalysisPipeline, Config, HistoryGraph};
//! use text_insight::context::ContextSettings;
//! use text_insight::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let graph = Arc::new(HistoryGraph::load(store).await?);
//!     let provider = provider::from_config(&config.provider, &config.request)?;
//!     let pipeline = AnalysisPipeline::new(provider, config.provider.active_model(), graph);
//!
//!     let entry = pipeline
//!         .run(Some("Please be helpful."), "Draft text", None, &ContextSettings::default())
//!         .await?;
//!     println!("{}", entry.summary);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration loaded from the environment.
pub mod config;
/// Ancestor context composition.
pub mod context;
/// Word-level text deltas.
pub mod delta;
/// Error types and result aliases for the application.
pub mod error;
/// In-memory history index backed by storage.
pub mod history;
/// Persisted base prompt library.
pub mod library;
/// Debounced change-significance monitoring.
pub mod monitor;
/// The three-stage analysis pipeline.
pub mod pipeline;
/// Fixed prompt wording sent to providers.
pub mod prompts;
/// Inference provider backends.
pub mod provider;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use history::HistoryGraph;
pub use monitor::ChangeSignificanceMonitor;
pub use pipeline::AnalysisPipeline;
pub use provider::InferenceProvider;
