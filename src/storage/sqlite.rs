use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::{BasePrompt, HistoryEntry, Storage, StoredDocument};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::provider::ProviderKind;

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a private in-memory database (single connection)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?;

        // One connection that never idles out, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(value = %raw, error = %e, "Unparseable stored timestamp, using now");
            Utc::now()
        })
}

fn parse_follow_ups(entry_id: &str, raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(entry_id = %entry_id, error = %e, "Unparseable stored follow-up questions, using none");
        Vec::new()
    })
}

fn parse_provider(entry_id: &str, raw: &str) -> ProviderKind {
    raw.parse().unwrap_or_else(|e: String| {
        warn!(entry_id = %entry_id, error = %e, "Unknown stored provider, using default");
        ProviderKind::default()
    })
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn add_entry(&self, entry: &HistoryEntry) -> StorageResult<()> {
        let follow_ups = serde_json::to_string(&entry.follow_up_questions)?;

        let result = sqlx::query(
            r#"
            INSERT INTO history_entries
                (id, parent_id, prompt, text, summary, full_analysis, follow_up_questions, provider, model, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.parent_id)
        .bind(&entry.prompt)
        .bind(&entry.text)
        .bind(&entry.summary)
        .bind(&entry.full_analysis)
        .bind(&follow_ups)
        .bind(entry.provider.as_str())
        .bind(&entry.model)
        .bind(format_timestamp(&entry.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(entry_id = %entry.id, "History entry stored");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::DuplicateEntry {
                    entry_id: entry.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_entry(&self, id: &str) -> StorageResult<Option<HistoryEntry>> {
        let row: Option<HistoryEntryRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, prompt, text, summary, full_analysis, follow_up_questions, provider, model, created_at
            FROM history_entries
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_entries(&self) -> StorageResult<Vec<HistoryEntry>> {
        let rows: Vec<HistoryEntryRow> = sqlx::query_as(
            r#"
            SELECT id, parent_id, prompt, text, summary, full_analysis, follow_up_questions, provider, model, created_at
            FROM history_entries
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn set_document(&self, key: &str, content: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (key, content, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(content)
        .bind(format_timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_document(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            r#"
            SELECT key, content, updated_at
            FROM documents
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list_base_prompts(&self) -> StorageResult<Vec<BasePrompt>> {
        let rows: Vec<BasePromptRow> = sqlx::query_as(
            r#"
            SELECT id, text, position, created_at
            FROM base_prompts
            ORDER BY position ASC, created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn save_base_prompt(&self, prompt: &BasePrompt) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO base_prompts (id, text, position, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET text = excluded.text, position = excluded.position
            "#,
        )
        .bind(&prompt.id)
        .bind(&prompt.text)
        .bind(prompt.position)
        .bind(format_timestamp(&prompt.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_base_prompt(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM base_prompts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct HistoryEntryRow {
    id: String,
    parent_id: Option<String>,
    prompt: Option<String>,
    text: String,
    summary: String,
    full_analysis: String,
    follow_up_questions: String,
    provider: String,
    model: String,
    created_at: String,
}

impl From<HistoryEntryRow> for HistoryEntry {
    fn from(row: HistoryEntryRow) -> Self {
        let follow_up_questions = parse_follow_ups(&row.id, &row.follow_up_questions);
        let provider = parse_provider(&row.id, &row.provider);

        Self {
            id: row.id,
            parent_id: row.parent_id,
            prompt: row.prompt,
            text: row.text,
            summary: row.summary,
            full_analysis: row.full_analysis,
            follow_up_questions,
            provider,
            model: row.model,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    key: String,
    content: String,
    updated_at: String,
}

impl From<DocumentRow> for StoredDocument {
    fn from(row: DocumentRow) -> Self {
        Self {
            key: row.key,
            content: row.content,
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct BasePromptRow {
    id: String,
    text: String,
    position: i64,
    created_at: String,
}

impl From<BasePromptRow> for BasePrompt {
    fn from(row: BasePromptRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            position: row.position,
            created_at: parse_timestamp(&row.created_at),
        }
    }
}
