//! End-to-end pipeline tests
//!
//! Drives the analysis pipeline, history graph and change monitor against a
//! wiremock chat-completions backend and an in-memory SQLite database.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use text_insight::config::{ProviderSettings, RequestConfig};
use text_insight::context::ContextSettings;
use text_insight::error::PipelineError;
use text_insight::pipeline::PipelineStage;
use text_insight::provider::OpenAiProvider;
use text_insight::storage::{SqliteStorage, Storage, MAIN_TEXT_KEY};
use text_insight::{AnalysisPipeline, ChangeSignificanceMonitor, HistoryGraph};

const SUMMARY_MARKER: &str = "Please summarize this in one or two sentences";
const FOLLOW_UP_MARKER: &str = "generate 5 follow up prompts";
const SIGNIFICANCE_MARKER: &str = "Is the change in text significant";

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    }))
}

async fn mount_stage(server: &MockServer, marker: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(marker))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts summary and follow-up stages first so the analysis catch-all only
/// answers what they do not match.
async fn mount_happy_path(server: &MockServer) {
    mount_stage(server, SUMMARY_MARKER, completion("A short summary.")).await;
    mount_stage(
        server,
        FOLLOW_UP_MARKER,
        completion(r#"Sure! ["What next?", "Why now?", "Who else?"]"#),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("The detailed analysis."))
        .mount(server)
        .await;
}

struct Harness {
    store: Arc<SqliteStorage>,
    graph: Arc<HistoryGraph>,
    pipeline: Arc<AnalysisPipeline>,
}

async fn harness(server: &MockServer) -> Harness {
    let store = Arc::new(SqliteStorage::new_in_memory().await.unwrap());
    let graph = Arc::new(HistoryGraph::load(store.clone()).await.unwrap());

    let settings = ProviderSettings {
        api_key: Some("test-api-key".to_string()),
        base_url: server.uri(),
        model: "gpt-4o".to_string(),
    };
    let provider = Arc::new(
        OpenAiProvider::new(&settings, &RequestConfig { timeout_ms: 5000 }).unwrap(),
    );
    let pipeline = Arc::new(AnalysisPipeline::new(provider, "gpt-4o", graph.clone()));

    Harness {
        store,
        graph,
        pipeline,
    }
}

async fn request_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

#[tokio::test]
async fn test_root_analysis_is_recorded() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let h = harness(&server).await;

    let entry = h
        .pipeline
        .run(
            Some("Please be helpful."),
            "My essay draft",
            None,
            &ContextSettings::default(),
        )
        .await
        .unwrap();

    assert_eq!(entry.full_analysis, "The detailed analysis.");
    assert_eq!(entry.summary, "A short summary.");
    assert_eq!(
        entry.follow_up_questions,
        vec!["What next?", "Why now?", "Who else?"]
    );
    assert!(entry.is_root());
    assert_eq!(h.pipeline.stage(), PipelineStage::Finished);
    assert_eq!(h.pipeline.last_processed_text().await, "My essay draft");

    let stored = h.store.get_entry(&entry.id).await.unwrap();
    assert_eq!(stored, Some(entry));

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].contains("Please be helpful.: My essay draft"));
    assert!(bodies[1].contains("The detailed analysis."));
}

#[tokio::test]
async fn test_follow_up_carries_ancestor_context() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let h = harness(&server).await;

    let root = h
        .pipeline
        .run(Some("P1"), "Root text", None, &ContextSettings::default())
        .await
        .unwrap();

    let settings = ContextSettings {
        include_text: true,
        ..ContextSettings::default()
    };
    let child = h
        .pipeline
        .ask_follow_up(&root, "What next?", &settings)
        .await
        .unwrap();

    assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
    assert_eq!(child.prompt.as_deref(), Some("What next?"));
    assert_eq!(child.text, "Context: The detailed analysis.");
    assert_eq!(h.graph.children(&root.id).await.len(), 1);

    let bodies = request_bodies(&server).await;
    assert!(bodies[3].contains(
        "What next?: Context: The detailed analysis.Context History: Root text "
    ));
    assert!(bodies[5].contains("Context History: Root text "));
}

#[tokio::test]
async fn test_user_follow_up_has_no_prompt() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let h = harness(&server).await;

    let root = h
        .pipeline
        .run(Some("P1"), "Root text", None, &ContextSettings::default())
        .await
        .unwrap();
    let child = h
        .pipeline
        .ask_user_follow_up(&root, "Is this clear?", &ContextSettings::default())
        .await
        .unwrap();

    assert!(child.prompt.is_none());
    assert_eq!(child.text, "Is this clear?");

    let empty = h
        .pipeline
        .ask_user_follow_up(&root, "  ", &ContextSettings::default())
        .await;
    assert!(matches!(empty, Err(PipelineError::EmptyInput)));
}

#[tokio::test]
async fn test_rate_limited_summary_records_nothing() {
    let server = MockServer::start().await;
    mount_stage(&server, SUMMARY_MARKER, ResponseTemplate::new(429)).await;
    Mock::given(method("POST"))
        .respond_with(completion("The detailed analysis."))
        .mount(&server)
        .await;
    let h = harness(&server).await;

    let err = h
        .pipeline
        .run(Some("P"), "Some text", None, &ContextSettings::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::RateLimited {
            stage: PipelineStage::Summarizing
        }
    ));
    assert_eq!(err.to_string(), "Too many requests. Please try again later.");
    assert_eq!(h.pipeline.stage(), PipelineStage::Failed);
    assert!(h.graph.is_empty().await);
    assert!(h.store.list_entries().await.unwrap().is_empty());

    // Stage 3 never ran
    assert_eq!(request_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn test_history_reloads_from_storage() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;
    let h = harness(&server).await;

    let root = h
        .pipeline
        .run(Some("P"), "Root", None, &ContextSettings::default())
        .await
        .unwrap();
    let child = h
        .pipeline
        .ask_user_follow_up(&root, "Question", &ContextSettings::default())
        .await
        .unwrap();

    let reloaded = HistoryGraph::load(h.store.clone()).await.unwrap();
    assert_eq!(reloaded.len().await, 2);
    assert_eq!(reloaded.roots().await.len(), 1);

    let ancestors = reloaded.ancestors(&child.id, 10).await;
    assert_eq!(ancestors.len(), 1);
    assert_eq!(ancestors[0].id, root.id);

    let newest = reloaded.recent(1, 10).await;
    assert_eq!(newest[0].id, child.id);
}

#[tokio::test]
async fn test_monitor_analyzes_significant_edit() {
    let server = MockServer::start().await;
    mount_stage(&server, SIGNIFICANCE_MARKER, completion("Yes")).await;
    mount_happy_path(&server).await;
    let h = harness(&server).await;

    let monitor = ChangeSignificanceMonitor::new(
        h.pipeline.clone(),
        h.store.clone(),
        Some("Please be helpful.".to_string()),
        Duration::from_millis(20),
    );
    monitor.on_edit("A brand new paragraph").await;
    monitor.shutdown().await;

    let recent = h.graph.recent(1, 10).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].text, "A brand new paragraph");
    assert_eq!(recent[0].prompt.as_deref(), Some("Please be helpful."));

    let saved = h.store.get_document(MAIN_TEXT_KEY).await.unwrap().unwrap();
    assert_eq!(saved.content, "A brand new paragraph");
}

#[tokio::test]
async fn test_monitor_skips_insignificant_edit() {
    let server = MockServer::start().await;
    mount_stage(&server, SIGNIFICANCE_MARKER, completion("no")).await;
    let h = harness(&server).await;

    let monitor = ChangeSignificanceMonitor::new(
        h.pipeline.clone(),
        h.store.clone(),
        None,
        Duration::from_millis(20),
    );
    monitor.on_edit("Tiny tweak").await;
    monitor.shutdown().await;

    assert!(h.graph.is_empty().await);
    assert_eq!(request_bodies(&server).await.len(), 1);
    assert_eq!(
        h.store.get_document(MAIN_TEXT_KEY).await.unwrap().unwrap().content,
        "Tiny tweak"
    );
}
