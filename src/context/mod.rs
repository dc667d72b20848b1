//! Context composition over the history forest.
//!
//! [`compose`] walks from an entry up through its parent links and gathers the
//! fields enabled in [`ContextSettings`] into a single prompt suffix. The walk
//! is bounded by `max_history` hops, which is also what stops it on a corrupt,
//! cyclic graph. A missing ancestor ends the walk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::storage::HistoryEntry;

/// Prefix placed before a non-empty composed context.
pub const CONTEXT_PREFIX: &str = "Context History: ";

/// Which ancestor fields to include and how far to walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Include each ancestor's subject text.
    pub include_text: bool,
    /// Include each ancestor's prompt.
    pub include_prompt: bool,
    /// Include each ancestor's full analysis.
    pub include_past_results: bool,
    /// Maximum number of entries visited, starting entry included.
    pub max_history: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            include_text: false,
            include_prompt: false,
            include_past_results: false,
            max_history: 10,
        }
    }
}

impl ContextSettings {
    /// Whether any field is selected for inclusion.
    pub fn any_enabled(&self) -> bool {
        self.include_text || self.include_prompt || self.include_past_results
    }
}

/// Read-only, id-indexed view of history entries.
pub trait EntryLookup {
    /// Find the entry with `id`.
    fn lookup(&self, id: &str) -> Option<&HistoryEntry>;
}

impl EntryLookup for HashMap<String, HistoryEntry> {
    fn lookup(&self, id: &str) -> Option<&HistoryEntry> {
        self.get(id)
    }
}

impl EntryLookup for [HistoryEntry] {
    fn lookup(&self, id: &str) -> Option<&HistoryEntry> {
        self.iter().find(|e| e.id == id)
    }
}

/// Compose the context string for a run whose parent is `start_id`.
///
/// The walk starts at `start_id` itself. Returns `""` when no flag is set,
/// when `start_id` is `None`, or when nothing was collected.
pub fn compose<L>(lookup: &L, start_id: Option<&str>, settings: &ContextSettings) -> String
where
    L: EntryLookup + ?Sized,
{
    if !settings.any_enabled() {
        return String::new();
    }

    let mut accumulated = String::new();
    let mut current = start_id.map(str::to_string);
    let mut hops = 0;

    while let Some(id) = current.take() {
        if hops >= settings.max_history {
            break;
        }

        let Some(entry) = lookup.lookup(&id) else {
            debug!(entry_id = %id, hops, "Ancestor missing, context truncated");
            break;
        };

        if settings.include_prompt {
            accumulated.push_str(entry.prompt.as_deref().unwrap_or_default());
            accumulated.push(' ');
        }
        if settings.include_text {
            accumulated.push_str(&entry.text);
            accumulated.push(' ');
        }
        if settings.include_past_results {
            accumulated.push_str(&entry.full_analysis);
            accumulated.push(' ');
        }

        current = entry.parent_id.clone();
        hops += 1;
    }

    if accumulated.is_empty() {
        String::new()
    } else {
        format!("{CONTEXT_PREFIX}{accumulated}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use pretty_assertions::assert_eq;

    fn entry(id: &str, parent: Option<&str>, text: &str, prompt: &str, result: &str) -> HistoryEntry {
        let mut e = HistoryEntry::new(text, ProviderKind::OpenAi, "gpt-4o")
            .with_prompt(prompt)
            .with_full_analysis(result);
        e.id = id.to_string();
        e.parent_id = parent.map(str::to_string);
        e
    }

    fn graph(entries: Vec<HistoryEntry>) -> HashMap<String, HistoryEntry> {
        entries.into_iter().map(|e| (e.id.clone(), e)).collect()
    }

    fn text_only(max_history: usize) -> ContextSettings {
        ContextSettings {
            include_text: true,
            max_history,
            ..ContextSettings::default()
        }
    }

    fn two_level() -> HashMap<String, HistoryEntry> {
        graph(vec![
            entry("r", None, "A", "P1", "R1"),
            entry("c", Some("r"), "B", "P2", "R2"),
        ])
    }

    #[test]
    fn test_no_flags_returns_empty() {
        let g = two_level();
        assert_eq!(compose(&g, Some("c"), &ContextSettings::default()), "");
    }

    #[test]
    fn test_text_chain_from_child() {
        let g = two_level();
        assert_eq!(compose(&g, Some("c"), &text_only(10)), "Context History: B A ");
    }

    #[test]
    fn test_field_order_is_prompt_text_results() {
        let g = two_level();
        let settings = ContextSettings {
            include_text: true,
            include_prompt: true,
            include_past_results: true,
            max_history: 10,
        };
        assert_eq!(
            compose(&g, Some("c"), &settings),
            "Context History: P2 B R2 P1 A R1 "
        );
    }

    #[test]
    fn test_missing_prompt_contributes_empty_field() {
        let mut child = entry("c", None, "B", "", "R2");
        child.prompt = None;
        let g = graph(vec![child]);
        let settings = ContextSettings {
            include_prompt: true,
            ..ContextSettings::default()
        };
        assert_eq!(compose(&g, Some("c"), &settings), "Context History:  ");
    }

    #[test]
    fn test_hop_limit_bounds_walk() {
        let g = graph(vec![
            entry("root", None, "root", "", ""),
            entry("c", Some("root"), "c", "", ""),
            entry("b", Some("c"), "b", "", ""),
            entry("a", Some("b"), "a", "", ""),
        ]);
        assert_eq!(compose(&g, Some("a"), &text_only(2)), "Context History: a b ");
    }

    #[test]
    fn test_zero_hops_yields_empty() {
        let g = two_level();
        assert_eq!(compose(&g, Some("c"), &text_only(0)), "");
    }

    #[test]
    fn test_dangling_parent_truncates() {
        let g = graph(vec![entry("c", Some("deleted"), "B", "", "")]);
        assert_eq!(compose(&g, Some("c"), &text_only(10)), "Context History: B ");
    }

    #[test]
    fn test_unknown_start_yields_empty() {
        let g = two_level();
        assert_eq!(compose(&g, Some("nope"), &text_only(10)), "");
        assert_eq!(compose(&g, None, &text_only(10)), "");
    }

    #[test]
    fn test_cycle_terminates_at_hop_limit() {
        let g = graph(vec![
            entry("x", Some("y"), "x", "", ""),
            entry("y", Some("x"), "y", "", ""),
        ]);
        assert_eq!(
            compose(&g, Some("x"), &text_only(5)),
            "Context History: x y x y x "
        );

        let self_loop = graph(vec![entry("s", Some("s"), "s", "", "")]);
        assert_eq!(compose(&self_loop, Some("s"), &text_only(3)), "Context History: s s s ");
    }

    #[test]
    fn test_slice_lookup() {
        let entries = vec![
            entry("r", None, "A", "P1", "R1"),
            entry("c", Some("r"), "B", "P2", "R2"),
        ];
        assert_eq!(
            compose(entries.as_slice(), Some("c"), &text_only(10)),
            "Context History: B A "
        );
    }
}
