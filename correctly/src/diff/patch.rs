use serde::Serialize;

use super::{DiffKind, DiffMode, WordDiff, diff, tokenize};

/// Pending correction for one field.
///
/// `diffs` always describes the remaining work from the field's current text to
/// `corrected`; `cursor` counts how many single-diff steps were applied so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRecord {
    pub original: String,
    pub corrected: String,
    pub diffs: Vec<WordDiff>,
    pub cursor: usize,
}

impl CorrectionRecord {
    /// Returns `None` when the correction does not change anything.
    pub fn new(original: &str, corrected: &str, mode: DiffMode) -> Option<Self> {
        let diffs = diff(original, corrected, mode);
        if diffs.is_empty() {
            return None;
        }

        Some(Self {
            original: original.to_string(),
            corrected: corrected.to_string(),
            diffs,
            cursor: 0,
        })
    }

    pub fn count(&self) -> usize {
        self.diffs.len()
    }

    pub fn current(&self) -> Option<&WordDiff> {
        self.diffs.first()
    }

    pub fn is_complete(&self) -> bool {
        self.diffs.is_empty()
    }

    /// Applies the first pending diff to `current_text` and recomputes what is
    /// left against the target correction. Returns the spliced text.
    pub fn apply_next(&mut self, current_text: &str, mode: DiffMode) -> Option<String> {
        let next = self.diffs.first()?.clone();
        let updated = splice(current_text, &next);
        self.diffs = diff(&updated, &self.corrected, mode);
        self.cursor += 1;
        Some(updated)
    }
}

/// Splices one token change into the whitespace-tokenized `text`.
///
/// The result is re-joined with single spaces.
pub fn splice(text: &str, change: &WordDiff) -> String {
    let mut tokens = tokenize(text)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let position = change.position;

    match change.kind {
        DiffKind::Replace => {
            let replacement = change.corrected_word.clone().unwrap_or_default();
            if position < tokens.len() {
                tokens[position] = replacement;
            } else {
                tokens.push(replacement);
            }
        }
        DiffKind::Insert => {
            if let Some(word) = change.corrected_word.clone() {
                tokens.insert(position.min(tokens.len()), word);
            }
        }
        DiffKind::Delete => {
            if position < tokens.len() {
                tokens.remove(position);
            }
        }
    }

    tokens.retain(|token| !token.is_empty());
    tokens.join(" ")
}
