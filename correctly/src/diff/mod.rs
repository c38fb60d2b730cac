//! Word-level differences between a checked text and its correction.
//!
//! The default [`DiffMode::Positional`] compares tokens index by index, so one
//! inserted or removed word turns every later token into a `replace`.
//! [`DiffMode::Aligned`] runs an LCS alignment instead and is opt-in.

pub mod align;
pub mod patch;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Insert,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDiff {
    pub position: usize,
    pub original_word: Option<String>,
    pub corrected_word: Option<String>,
    pub kind: DiffKind,
}

impl WordDiff {
    pub fn insert(position: usize, corrected_word: &str) -> Self {
        Self {
            position,
            original_word: None,
            corrected_word: Some(corrected_word.to_string()),
            kind: DiffKind::Insert,
        }
    }

    pub fn delete(position: usize, original_word: &str) -> Self {
        Self {
            position,
            original_word: Some(original_word.to_string()),
            corrected_word: None,
            kind: DiffKind::Delete,
        }
    }

    pub fn replace(position: usize, original_word: &str, corrected_word: &str) -> Self {
        Self {
            position,
            original_word: Some(original_word.to_string()),
            corrected_word: Some(corrected_word.to_string()),
            kind: DiffKind::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    #[default]
    Positional,
    Aligned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightedToken {
    pub text: String,
    pub changed: bool,
}

pub fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

pub(crate) fn same_word(left: &str, right: &str) -> bool {
    left.to_lowercase() == right.to_lowercase()
}

pub fn diff(original: &str, corrected: &str, mode: DiffMode) -> Vec<WordDiff> {
    let original_tokens = tokenize(original);
    let corrected_tokens = tokenize(corrected);
    match mode {
        DiffMode::Positional => positional_diff(&original_tokens, &corrected_tokens),
        DiffMode::Aligned => align::aligned_diff(&original_tokens, &corrected_tokens),
    }
}

pub fn count_differences(original: &str, corrected: &str, mode: DiffMode) -> usize {
    diff(original, corrected, mode).len()
}

fn positional_diff(original: &[&str], corrected: &[&str]) -> Vec<WordDiff> {
    let longest = original.len().max(corrected.len());
    (0..longest)
        .filter_map(|position| {
            match (original.get(position), corrected.get(position)) {
                (Some(old), Some(new)) if same_word(old, new) => None,
                (Some(old), Some(new)) => Some(WordDiff::replace(position, old, new)),
                (None, Some(new)) => Some(WordDiff::insert(position, new)),
                (Some(old), None) => Some(WordDiff::delete(position, old)),
                (None, None) => None,
            }
        })
        .collect()
}

/// Splits `corrected` into tokens and marks the ones that differ from `original`.
pub fn highlight(original: &str, corrected: &str, mode: DiffMode) -> Vec<HighlightedToken> {
    let original_tokens = tokenize(original);
    let corrected_tokens = tokenize(corrected);
    let changed = match mode {
        DiffMode::Positional => corrected_tokens
            .iter()
            .enumerate()
            .map(|(index, token)| {
                original_tokens
                    .get(index)
                    .is_none_or(|old| !same_word(old, token))
            })
            .collect::<Vec<_>>(),
        DiffMode::Aligned => align::changed_corrected_tokens(&original_tokens, &corrected_tokens),
    };

    corrected_tokens
        .into_iter()
        .zip(changed)
        .map(|(text, changed)| HighlightedToken {
            text: text.to_string(),
            changed,
        })
        .collect()
}
