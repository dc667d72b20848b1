//! Staged analysis pipeline.
//!
//! A run makes three dependent provider calls (analysis, summary, follow-up
//! questions) and, only if all three succeed, records a single
//! [`HistoryEntry`] in the [`HistoryGraph`]. Progress is published on a
//! [`watch`] channel as a [`PipelineStage`].

mod extract;

pub use extract::extract_follow_ups;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::context::{self, ContextSettings};
use crate::error::{PipelineError, PipelineResult};
use crate::history::HistoryGraph;
use crate::prompts;
use crate::provider::InferenceProvider;
use crate::storage::HistoryEntry;

/// Progress of the current (or last) pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// No run has started.
    #[default]
    Idle,
    /// Stage 1: full analysis.
    Analyzing,
    /// Stage 2: summary of the analysis.
    Summarizing,
    /// Stage 3: follow-up question generation.
    GeneratingFollowUps,
    /// The last run recorded an entry.
    Finished,
    /// The last run failed.
    Failed,
}

impl PipelineStage {
    /// Human-readable status line.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "",
            PipelineStage::Analyzing => "Analyzing...",
            PipelineStage::Summarizing => "Generating summary...",
            PipelineStage::GeneratingFollowUps => "Generating follow up questions",
            PipelineStage::Finished => "Finished analyzing.",
            PipelineStage::Failed => "Analysis failed.",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Summarizing => "summarizing",
            PipelineStage::GeneratingFollowUps => "generating_follow_ups",
            PipelineStage::Finished => "finished",
            PipelineStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Orchestrates analysis runs against one provider and model.
pub struct AnalysisPipeline {
    provider: Arc<dyn InferenceProvider>,
    model: String,
    graph: Arc<HistoryGraph>,
    status: watch::Sender<PipelineStage>,
    /// Held for the duration of a run; a second run fails with `Busy`.
    in_flight: Mutex<()>,
    last_processed: Mutex<String>,
}

impl AnalysisPipeline {
    /// Create a pipeline that records results in `graph`.
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        model: impl Into<String>,
        graph: Arc<HistoryGraph>,
    ) -> Self {
        let (status, _) = watch::channel(PipelineStage::Idle);
        Self {
            provider,
            model: model.into(),
            graph,
            status,
            in_flight: Mutex::new(()),
            last_processed: Mutex::new(String::new()),
        }
    }

    /// The provider used for every stage.
    pub fn provider(&self) -> &Arc<dyn InferenceProvider> {
        &self.provider
    }

    /// The model used for every stage.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The history graph runs are recorded in.
    pub fn graph(&self) -> &Arc<HistoryGraph> {
        &self.graph
    }

    /// Subscribe to stage updates.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStage> {
        self.status.subscribe()
    }

    /// The most recently published stage.
    pub fn stage(&self) -> PipelineStage {
        *self.status.borrow()
    }

    /// Whether a run is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Subject text of the last successful run.
    pub async fn last_processed_text(&self) -> String {
        self.last_processed.lock().await.clone()
    }

    /// Run all three stages and record the result.
    ///
    /// Fails without calling the provider if `text` is blank, if `parent_id`
    /// names no known entry, or if another run is in flight. A stage failure
    /// aborts the remaining stages and nothing is recorded.
    pub async fn run(
        &self,
        prompt: Option<&str>,
        text: &str,
        parent_id: Option<&str>,
        settings: &ContextSettings,
    ) -> PipelineResult<HistoryEntry> {
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let _guard = self.in_flight.try_lock().map_err(|_| PipelineError::Busy)?;

        let start = Instant::now();
        let result = self.run_stages(prompt, text, parent_id, settings).await;

        match &result {
            Ok(entry) => {
                self.status.send_replace(PipelineStage::Finished);
                *self.last_processed.lock().await = text.to_string();
                info!(
                    entry_id = %entry.id,
                    parent_id = entry.parent_id.as_deref().unwrap_or("-"),
                    follow_ups = entry.follow_up_questions.len(),
                    latency_ms = start.elapsed().as_millis(),
                    "Analysis recorded"
                );
            }
            Err(e) => {
                self.status.send_replace(PipelineStage::Failed);
                warn!(
                    error = %e,
                    stage = ?e.stage(),
                    latency_ms = start.elapsed().as_millis(),
                    "Analysis failed"
                );
            }
        }

        result
    }

    /// Run a generated follow-up question against `entry`.
    pub async fn ask_follow_up(
        &self,
        entry: &HistoryEntry,
        question: &str,
        settings: &ContextSettings,
    ) -> PipelineResult<HistoryEntry> {
        let subject = prompts::follow_up_subject(&entry.full_analysis);
        self.run(Some(question), &subject, Some(&entry.id), settings)
            .await
    }

    /// Run a free-form user question as a child of `entry`.
    pub async fn ask_user_follow_up(
        &self,
        entry: &HistoryEntry,
        question: &str,
        settings: &ContextSettings,
    ) -> PipelineResult<HistoryEntry> {
        self.run(None, question, Some(&entry.id), settings).await
    }

    async fn run_stages(
        &self,
        prompt: Option<&str>,
        text: &str,
        parent_id: Option<&str>,
        settings: &ContextSettings,
    ) -> PipelineResult<HistoryEntry> {
        let context = {
            let index = self.graph.read().await;
            if let Some(parent) = parent_id {
                if !index.contains(parent) {
                    return Err(PipelineError::UnknownParent {
                        parent_id: parent.to_string(),
                    });
                }
            }
            context::compose(&*index, parent_id, settings)
        };

        debug!(context_len = context.len(), "Context composed");

        let full_analysis = self
            .call(
                PipelineStage::Analyzing,
                &prompts::analysis_request(prompt, text, &context),
            )
            .await?;

        let summary = self
            .call(
                PipelineStage::Summarizing,
                &prompts::summary_request(&full_analysis),
            )
            .await?;

        let raw_follow_ups = self
            .call(
                PipelineStage::GeneratingFollowUps,
                &prompts::follow_up_request(text, &context),
            )
            .await?;
        let follow_ups = extract_follow_ups(&raw_follow_ups);

        let mut entry = HistoryEntry::new(text, self.provider.kind(), &self.model)
            .with_full_analysis(full_analysis)
            .with_summary(summary)
            .with_follow_ups(follow_ups);
        if let Some(prompt) = prompt {
            entry = entry.with_prompt(prompt);
        }
        if let Some(parent) = parent_id {
            entry = entry.with_parent(parent);
        }

        self.graph.insert(entry.clone()).await?;
        Ok(entry)
    }

    async fn call(&self, stage: PipelineStage, request: &str) -> PipelineResult<String> {
        self.status.send_replace(stage);
        debug!(stage = %stage, model = %self.model, "Running stage");

        self.provider
            .complete(request, &self.model)
            .await
            .map_err(|e| PipelineError::from_provider(stage, e))
    }
}
