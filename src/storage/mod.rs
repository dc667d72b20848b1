//! Storage layer for analysis history persistence.
//!
//! This module provides SQLite-based storage for history entries, singleton
//! text documents and the base prompt library.

mod sqlite;


pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::provider::ProviderKind;

/// Document key under which the editor text is persisted.
pub const MAIN_TEXT_KEY: &str = "main_text";

/// Document key holding the id of the selected base prompt.
pub const SELECTED_PROMPT_KEY: &str = "selected_prompt_id";

/// One completed analysis, a node in the history forest.
///
/// Entries are created once by the analysis pipeline and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique entry identifier.
    pub id: String,
    /// Entry this one follows up on, if any.
    pub parent_id: Option<String>,
    /// Instruction used for the analysis stage. `None` for user follow-ups.
    pub prompt: Option<String>,
    /// The subject text analyzed.
    pub text: String,
    /// Short provider-generated summary.
    pub summary: String,
    /// Full provider-generated analysis.
    pub full_analysis: String,
    /// Generated follow-up questions, possibly empty.
    pub follow_up_questions: Vec<String>,
    /// Backend that produced the entry.
    pub provider: ProviderKind,
    /// Model that produced the entry.
    pub model: String,
    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

/// A keyed text document stored outside the history forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Document key.
    pub key: String,
    /// Document body.
    pub content: String,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

/// A user-editable base prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePrompt {
    /// Unique prompt identifier.
    pub id: String,
    /// Prompt text.
    pub text: String,
    /// Display position, ascending.
    pub position: i64,
    /// When the prompt was created.
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create a new entry for `text` produced by `provider`/`model`
    pub fn new(text: impl Into<String>, provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            prompt: None,
            text: text.into(),
            summary: String::new(),
            full_analysis: String::new(),
            follow_up_questions: Vec::new(),
            provider,
            model: model.into(),
            created_at: now_micros(),
        }
    }

    /// Set the parent entry
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the analysis prompt
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Set the full analysis
    pub fn with_full_analysis(mut self, full_analysis: impl Into<String>) -> Self {
        self.full_analysis = full_analysis.into();
        self
    }

    /// Set the summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Set the follow-up questions
    pub fn with_follow_ups(mut self, questions: Vec<String>) -> Self {
        self.follow_up_questions = questions;
        self
    }

    /// Whether this entry starts a tree in the forest.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl BasePrompt {
    /// Create a new prompt at `position`
    pub fn new(text: impl Into<String>, position: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            position,
            created_at: now_micros(),
        }
    }
}

/// Current time at the precision timestamps are stored with.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Storage trait for database operations.
#[async_trait]
pub trait Storage: Send + Sync {
    // History operations

    /// Append a history entry. Fails if the id already exists.
    async fn add_entry(&self, entry: &HistoryEntry) -> StorageResult<()>;
    /// Get a history entry by ID.
    async fn get_entry(&self, id: &str) -> StorageResult<Option<HistoryEntry>>;
    /// Get all history entries, newest first.
    async fn list_entries(&self) -> StorageResult<Vec<HistoryEntry>>;

    // Document operations

    /// Create or replace the document stored under `key`.
    async fn set_document(&self, key: &str, content: &str) -> StorageResult<()>;
    /// Get the document stored under `key`.
    async fn get_document(&self, key: &str) -> StorageResult<Option<StoredDocument>>;

    // Base prompt operations

    /// Get all base prompts in display order.
    async fn list_base_prompts(&self) -> StorageResult<Vec<BasePrompt>>;
    /// Insert or update a base prompt.
    async fn save_base_prompt(&self, prompt: &BasePrompt) -> StorageResult<()>;
    /// Delete a base prompt. Returns whether a row was removed.
    async fn delete_base_prompt(&self, id: &str) -> StorageResult<bool>;
}
