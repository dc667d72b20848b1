//! Change-significance monitor.
//!
//! Every edit restarts a quiescence timer. When the timer elapses the current
//! text is persisted, and if it differs from the last analyzed text the
//! provider is asked whether the change is significant. A "yes" triggers a
//! root analysis with the current base prompt.
//!
//! ```text
//! Idle -(edit)-> Debouncing -(quiet)-> CheckingSignificance -(yes)-> Analyzing -> Idle
//!                                                           -(no)--> Idle
//! ```
//!
//! Only the timer is cancellable. Once a revision has gone quiet it is saved
//! right away by the timer task and then handed to a single worker, so saving
//! never waits on a check or analysis, and an in-flight check or analysis
//! always runs to completion. Revisions that go quiet meanwhile are coalesced
//! and only the newest is evaluated.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::ContextSettings;
use crate::delta;
use crate::error::ProviderResult;
use crate::pipeline::AnalysisPipeline;
use crate::prompts;
use crate::storage::{HistoryEntry, Storage, MAIN_TEXT_KEY};

/// Observable monitor state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Nothing pending.
    #[default]
    Idle,
    /// Waiting for edits to go quiet.
    Debouncing,
    /// Asking the provider whether the change matters.
    CheckingSignificance,
    /// Running the analysis pipeline.
    Analyzing,
}

/// What happened to one quiescent revision.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    /// Blank, or identical to the last analyzed text.
    Skipped,
    /// The provider judged the change insignificant.
    NotSignificant,
    /// The significance check itself failed.
    CheckFailed(String),
    /// The change was analyzed and recorded.
    Analyzed(HistoryEntry),
    /// The change was significant but the analysis failed.
    AnalysisFailed(String),
}

struct MonitorInner {
    pipeline: Arc<AnalysisPipeline>,
    store: Arc<dyn Storage>,
    base_prompt: Mutex<Option<String>>,
    quiescence: Duration,
    state: watch::Sender<MonitorState>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Debounces edits and decides whether they warrant re-analysis.
///
/// Must be created inside a Tokio runtime; it spawns its worker task.
pub struct ChangeSignificanceMonitor {
    inner: Arc<MonitorInner>,
    tx: Option<mpsc::UnboundedSender<String>>,
    worker: Option<JoinHandle<()>>,
}

impl ChangeSignificanceMonitor {
    /// Create a monitor that evaluates text after `quiescence` without edits.
    pub fn new(
        pipeline: Arc<AnalysisPipeline>,
        store: Arc<dyn Storage>,
        base_prompt: Option<String>,
        quiescence: Duration,
    ) -> Self {
        let (state, _) = watch::channel(MonitorState::Idle);
        let inner = Arc::new(MonitorInner {
            pipeline,
            store,
            base_prompt: Mutex::new(base_prompt),
            quiescence,
            state,
            pending: Mutex::new(None),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(inner.clone(), rx));

        Self {
            inner,
            tx: Some(tx),
            worker: Some(worker),
        }
    }

    /// Record an edit. Restarts the quiescence timer with `text`.
    pub async fn on_edit(&self, text: impl Into<String>) {
        let Some(tx) = self.tx.clone() else {
            return;
        };
        let text = text.into();
        let quiescence = self.inner.quiescence;
        let store = self.inner.store.clone();

        let mut pending = self.inner.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        self.inner.state.send_if_modified(|state| {
            if *state == MonitorState::Idle {
                *state = MonitorState::Debouncing;
                true
            } else {
                false
            }
        });

        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiescence).await;
            persist_text(store.as_ref(), &text).await;
            let _ = tx.send(text);
        }));
    }

    /// Replace the base prompt used for triggered analyses.
    pub async fn set_base_prompt(&self, prompt: Option<String>) {
        *self.inner.base_prompt.lock().await = prompt;
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.inner.state.subscribe()
    }

    /// Ask the provider whether going from `old_text` to `new_text` matters.
    ///
    /// Any "yes" in the answer, in any case, counts as significant.
    pub async fn check_significance(&self, old_text: &str, new_text: &str) -> ProviderResult<bool> {
        self.inner.check_significance(old_text, new_text).await
    }

    /// Evaluate a quiescent revision immediately, bypassing the timer.
    pub async fn evaluate(&self, text: &str) -> MonitorOutcome {
        self.inner.evaluate(text).await
    }

    /// Let the pending timer fire, drain queued revisions and stop the worker.
    pub async fn shutdown(mut self) {
        let pending = self.inner.pending.lock().await.take();
        if let Some(handle) = pending {
            let _ = handle.await;
        }

        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for ChangeSignificanceMonitor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Ok(mut pending) = self.inner.pending.try_lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
    }
}

async fn persist_text(store: &dyn Storage, text: &str) {
    match store.set_document(MAIN_TEXT_KEY, text).await {
        Ok(()) => debug!(len = text.len(), "Current text saved"),
        Err(e) => warn!(error = %e, "Failed to persist current text"),
    }
}

async fn run_worker(inner: Arc<MonitorInner>, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(mut text) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            text = newer;
        }

        let outcome = inner.evaluate(&text).await;
        match &outcome {
            MonitorOutcome::Analyzed(entry) => {
                info!(entry_id = %entry.id, "Significant change analyzed")
            }
            MonitorOutcome::NotSignificant => info!("Text seems about the same as before"),
            MonitorOutcome::Skipped => debug!("Nothing new to evaluate"),
            MonitorOutcome::CheckFailed(e) => warn!(error = %e, "Significance check failed"),
            MonitorOutcome::AnalysisFailed(e) => warn!(error = %e, "Triggered analysis failed"),
        }

        let debouncing = inner
            .pending
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        inner.state.send_replace(if debouncing {
            MonitorState::Debouncing
        } else {
            MonitorState::Idle
        });
    }
}

impl MonitorInner {
    async fn check_significance(&self, old_text: &str, new_text: &str) -> ProviderResult<bool> {
        let request = prompts::significance_request(old_text, new_text);
        let answer = self
            .pipeline
            .provider()
            .complete(&request, self.pipeline.model())
            .await?;

        let significant = answer.to_lowercase().contains("yes");
        debug!(significant, answer = %answer.trim(), "Significance check answered");
        Ok(significant)
    }

    async fn evaluate(&self, text: &str) -> MonitorOutcome {
        let last = self.pipeline.last_processed_text().await;
        if text.trim().is_empty() || text == last {
            return MonitorOutcome::Skipped;
        }

        debug!(additions = ?delta::diff(&last, text), "Evaluating change");

        self.state.send_replace(MonitorState::CheckingSignificance);
        match self.check_significance(&last, text).await {
            Ok(false) => return MonitorOutcome::NotSignificant,
            Err(e) => return MonitorOutcome::CheckFailed(e.to_string()),
            Ok(true) => {}
        }

        self.state.send_replace(MonitorState::Analyzing);
        let prompt = self.base_prompt.lock().await.clone();
        match self
            .pipeline
            .run(prompt.as_deref(), text, None, &ContextSettings::default())
            .await
        {
            Ok(entry) => MonitorOutcome::Analyzed(entry),
            Err(e) => MonitorOutcome::AnalysisFailed(e.to_string()),
        }
    }
}
