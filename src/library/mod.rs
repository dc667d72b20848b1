//! Persisted base prompt library.
//!
//! Prompts are kept in storage in display order. The library is seeded with
//! [`DEFAULT_BASE_PROMPTS`] the first time it is used, and the current
//! selection is stored as a document under [`SELECTED_PROMPT_KEY`].

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::prompts::DEFAULT_BASE_PROMPTS;
use crate::storage::{BasePrompt, Storage, SELECTED_PROMPT_KEY};

/// Marks that defaults were written once, so an emptied library stays empty.
const SEEDED_KEY: &str = "base_prompts_seeded";

/// User-editable list of base prompts with a persisted selection.
#[derive(Clone)]
pub struct PromptLibrary {
    store: Arc<dyn Storage>,
}

impl PromptLibrary {
    /// Library backed by `store`.
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// All prompts in display order.
    pub async fn list(&self) -> StorageResult<Vec<BasePrompt>> {
        self.ensure_seeded().await?;
        self.store.list_base_prompts().await
    }

    /// Append a prompt at the end of the list.
    pub async fn add(&self, text: &str) -> StorageResult<BasePrompt> {
        let text = validated(text)?;
        let prompts = self.list().await?;
        let position = prompts.iter().map(|p| p.position).max().map_or(0, |p| p + 1);

        let prompt = BasePrompt::new(text, position);
        self.store.save_base_prompt(&prompt).await?;
        info!(prompt_id = %prompt.id, position, "Base prompt added");
        Ok(prompt)
    }

    /// Replace the text of an existing prompt.
    pub async fn update(&self, id: &str, text: &str) -> StorageResult<BasePrompt> {
        let text = validated(text)?;
        let mut prompt = self.find(id).await?;
        prompt.text = text.to_string();
        self.store.save_base_prompt(&prompt).await?;
        debug!(prompt_id = %id, "Base prompt updated");
        Ok(prompt)
    }

    /// Remove a prompt. Removing the selected one selects the first remaining
    /// prompt, or clears the selection when none is left.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        self.ensure_seeded().await?;
        let was_selected = self.selected_id().await?.as_deref() == Some(id);

        if !self.store.delete_base_prompt(id).await? {
            return Err(StorageError::PromptNotFound {
                prompt_id: id.to_string(),
            });
        }
        info!(prompt_id = %id, "Base prompt deleted");

        if was_selected {
            let next = self.store.list_base_prompts().await?.into_iter().next();
            let next_id = next.map(|p| p.id).unwrap_or_default();
            self.store.set_document(SELECTED_PROMPT_KEY, &next_id).await?;
        }
        Ok(())
    }

    /// Make `id` the selected prompt.
    pub async fn select(&self, id: &str) -> StorageResult<BasePrompt> {
        let prompt = self.find(id).await?;
        self.store.set_document(SELECTED_PROMPT_KEY, &prompt.id).await?;
        Ok(prompt)
    }

    /// The selected prompt, falling back to the first one.
    pub async fn selected(&self) -> StorageResult<Option<BasePrompt>> {
        let prompts = self.list().await?;
        let selected = self.selected_id().await?;

        let found = selected
            .as_deref()
            .and_then(|id| prompts.iter().find(|p| p.id == id).cloned());
        Ok(found.or_else(|| prompts.into_iter().next()))
    }

    async fn find(&self, id: &str) -> StorageResult<BasePrompt> {
        self.list()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StorageError::PromptNotFound {
                prompt_id: id.to_string(),
            })
    }

    async fn selected_id(&self) -> StorageResult<Option<String>> {
        Ok(self
            .store
            .get_document(SELECTED_PROMPT_KEY)
            .await?
            .map(|doc| doc.content)
            .filter(|id| !id.is_empty()))
    }

    async fn ensure_seeded(&self) -> StorageResult<()> {
        if self.store.get_document(SEEDED_KEY).await?.is_some() {
            return Ok(());
        }

        if self.store.list_base_prompts().await?.is_empty() {
            for (position, text) in DEFAULT_BASE_PROMPTS.iter().enumerate() {
                self.store
                    .save_base_prompt(&BasePrompt::new(*text, position as i64))
                    .await?;
            }
            info!(count = DEFAULT_BASE_PROMPTS.len(), "Seeded default base prompts");
        }

        self.store.set_document(SEEDED_KEY, "true").await
    }
}

fn validated(text: &str) -> StorageResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        Err(StorageError::EmptyPrompt)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use pretty_assertions::assert_eq;

    async fn library() -> PromptLibrary {
        let store = SqliteStorage::new_in_memory().await.unwrap();
        PromptLibrary::new(Arc::new(store))
    }

    fn texts(prompts: &[BasePrompt]) -> Vec<&str> {
        prompts.iter().map(|p| p.text.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_use_seeds_defaults_in_order() {
        let lib = library().await;
        let prompts = lib.list().await.unwrap();
        assert_eq!(texts(&prompts), DEFAULT_BASE_PROMPTS.to_vec());

        // Seeding happens once.
        assert_eq!(lib.list().await.unwrap().len(), DEFAULT_BASE_PROMPTS.len());
    }

    #[tokio::test]
    async fn test_selected_defaults_to_first_prompt() {
        let lib = library().await;
        let selected = lib.selected().await.unwrap().unwrap();
        assert_eq!(selected.text, "Please be helpful.");
    }

    #[tokio::test]
    async fn test_add_appends_and_trims() {
        let lib = library().await;
        let added = lib.add("  Be concise  ").await.unwrap();
        assert_eq!(added.text, "Be concise");

        let prompts = lib.list().await.unwrap();
        assert_eq!(prompts.last().unwrap().id, added.id);
    }

    #[tokio::test]
    async fn test_blank_prompt_rejected() {
        let lib = library().await;
        assert!(matches!(lib.add("   ").await, Err(StorageError::EmptyPrompt)));
    }

    #[tokio::test]
    async fn test_select_persists_choice() {
        let lib = library().await;
        let third = lib.list().await.unwrap()[2].clone();
        lib.select(&third.id).await.unwrap();

        assert_eq!(lib.selected().await.unwrap().unwrap().id, third.id);
    }

    #[tokio::test]
    async fn test_update_keeps_position() {
        let lib = library().await;
        let second = lib.list().await.unwrap()[1].clone();
        let updated = lib.update(&second.id, "Rewritten").await.unwrap();
        assert_eq!(updated.position, second.position);

        let prompts = lib.list().await.unwrap();
        assert_eq!(prompts[1].text, "Rewritten");
    }

    #[tokio::test]
    async fn test_unknown_prompt_errors() {
        let lib = library().await;
        assert!(matches!(
            lib.select("missing").await,
            Err(StorageError::PromptNotFound { .. })
        ));
        assert!(matches!(
            lib.delete("missing").await,
            Err(StorageError::PromptNotFound { .. })
        ));
        assert!(matches!(
            lib.update("missing", "x").await,
            Err(StorageError::PromptNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_deleting_selected_selects_first_remaining() {
        let lib = library().await;
        let prompts = lib.list().await.unwrap();
        lib.select(&prompts[4].id).await.unwrap();

        lib.delete(&prompts[4].id).await.unwrap();

        let selected = lib.selected().await.unwrap().unwrap();
        assert_eq!(selected.id, prompts[0].id);
        assert_eq!(lib.list().await.unwrap().len(), DEFAULT_BASE_PROMPTS.len() - 1);
    }

    #[tokio::test]
    async fn test_deleting_everything_leaves_no_selection() {
        let lib = library().await;
        for prompt in lib.list().await.unwrap() {
            lib.delete(&prompt.id).await.unwrap();
        }

        assert!(lib.list().await.unwrap().is_empty());
        assert!(lib.selected().await.unwrap().is_none());
    }
}
