//! Centralized prompt definitions for the analysis pipeline
//!
//! Every fixed instruction sent to a provider lives here so the wording can be
//! maintained and tested in one place.

/// System message sent ahead of every OpenAI request.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

/// Instruction prepended to the full analysis in the summary stage.
pub const SUMMARY_INSTRUCTION: &str =
    "Please summarize this in one or two sentences (friendly tone): ";

/// Instruction for the follow-up stage. Asks for a bare JSON array.
pub const FOLLOW_UP_INSTRUCTION: &str = r#"Can you please (only provide a JSON array of strings like ["prompt 1", "prompt 2"]) generate 5 follow up prompts:"#;

/// Base prompts seeded into an empty prompt library.
pub const DEFAULT_BASE_PROMPTS: &[&str] = &[
    "Please be helpful.",
    "Please provide useful actionable feedback or points to consider",
    "Provide a detailed analysis of the text",
    "Summarize the main points",
    "Offer suggestions for improvement",
    "Highlight the strengths of the text",
    "Highlight the weaknesses of the text",
    "Highlight the weaknesses of the text, use a friendly tone",
    "Can you please break down each task into more manageable actionable sub-tasks",
];

/// Stage 1 request: `prompt: text` followed by the composed context.
pub fn analysis_request(prompt: Option<&str>, text: &str, context: &str) -> String {
    match prompt {
        Some(prompt) => format!("{prompt}: {text}{context}"),
        None => format!("{text}{context}"),
    }
}

/// Stage 2 request.
pub fn summary_request(full_analysis: &str) -> String {
    format!("{SUMMARY_INSTRUCTION}{full_analysis}")
}

/// Stage 3 request.
pub fn follow_up_request(text: &str, context: &str) -> String {
    format!("{FOLLOW_UP_INSTRUCTION}, Context: {text}{context}")
}

/// Yes/no question deciding whether an edit warrants re-analysis.
pub fn significance_request(old_text: &str, new_text: &str) -> String {
    format!(
        "Is the change in text significant (respond with \"yes\" or \"no\")? Old Text: \"{}\" New Text: \"{}\"",
        old_text.trim(),
        new_text.trim()
    )
}

/// Subject text for a run on a generated follow-up question.
pub fn follow_up_subject(full_analysis: &str) -> String {
    format!("Context: {full_analysis}")
}
