//! Word-level additions between two text revisions.
//!
//! This is a greedy, order-preserving matcher, not a general diff: it only
//! reports runs of words in the new text that cannot be matched, in order,
//! against the old text. Deletions and reorderings are not reported.

use std::collections::HashMap;

/// Maximal runs of words present in `new_text` but not matchable forward in
/// `old_text`, in the order they appear.
///
/// Each word of `new_text` is matched to the earliest occurrence in
/// `old_text` after the previously matched position. Unmatched words
/// accumulate into a run, space-joined, which is flushed at the next match
/// and at the end.
pub fn diff(old_text: &str, new_text: &str) -> Vec<String> {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, word) in old_text.split_whitespace().enumerate() {
        positions.entry(word).or_default().push(i);
    }

    let mut additions = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut cursor: Option<usize> = None;

    for word in new_text.split_whitespace() {
        let matched = positions.get(word).and_then(|list| {
            list.iter()
                .copied()
                .find(|&pos| cursor.map_or(true, |c| pos > c))
        });

        match matched {
            Some(pos) => {
                cursor = Some(pos);
                if !run.is_empty() {
                    additions.push(run.join(" "));
                    run.clear();
                }
            }
            None => run.push(word),
        }
    }

    if !run.is_empty() {
        additions.push(run.join(" "));
    }

    additions
}
