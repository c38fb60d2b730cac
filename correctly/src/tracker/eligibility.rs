use std::sync::LazyLock;

use regex::Regex;

use super::dom::{ElementId, ElementInfo, ElementKind, PageDom};
use crate::utils::is_sentence_punctuation;

const EXCLUDED_INPUT_TYPES: &[&str] = &[
    "password", "checkbox", "radio", "submit", "button", "file", "hidden", "image", "reset",
    "color", "range",
];
const MIN_WORDS: usize = 2;

const PLACEHOLDER_REGEX: &str = r"(?i)^(start writing|type here|enter text|write something)";

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_REGEX).expect("placeholder pattern is valid"));

/// Resolves an event target to the element that owns its text.
///
/// Inputs and textareas are their own root. Inside an editable region the
/// topmost editable ancestor is returned.
pub fn editable_root(dom: &dyn PageDom, target: ElementId) -> Option<ElementId> {
    let info = dom.element(target)?;
    if matches!(info.kind, ElementKind::Input { .. } | ElementKind::TextArea) {
        return Some(target);
    }
    if !info.content_editable {
        return None;
    }

    let mut current = target;
    while let Some(parent) = dom.parent(current) {
        if !dom.element(parent).is_some_and(|parent| parent.content_editable) {
            break;
        }
        current = parent;
    }
    Some(current)
}

pub fn is_valid_text_field(info: &ElementInfo) -> bool {
    match &info.kind {
        ElementKind::TextArea => true,
        ElementKind::Input { input_type } => {
            let input_type = input_type.to_ascii_lowercase();
            !EXCLUDED_INPUT_TYPES.contains(&input_type.as_str())
        }
        ElementKind::Other { .. } => info.content_editable,
    }
}

/// Whether `text` is worth sending for correction.
pub fn has_enough_text(text: &str) -> bool {
    let trimmed = text.trim();
    if PLACEHOLDER_PATTERN.is_match(trimmed) {
        return false;
    }

    trimmed
        .split_whitespace()
        .filter(|word| !word.chars().all(is_sentence_punctuation))
        .count()
        >= MIN_WORDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeDom;

    #[test]
    fn short_or_boilerplate_text_is_rejected() {
        assert!(!has_enough_text("ok"));
        assert!(!has_enough_text("   "));
        assert!(!has_enough_text("... !? …"));
        assert!(!has_enough_text("Hello ..."));
        assert!(!has_enough_text("Type here to start"));
        assert!(!has_enough_text("start writing your story"));
    }

    #[test]
    fn placeholder_pattern_compiles_and_matches_prompts() {
        assert!(Regex::new(PLACEHOLDER_REGEX).is_ok());
        assert!(PLACEHOLDER_PATTERN.is_match("Enter text here"));
        assert!(PLACEHOLDER_PATTERN.is_match("WRITE SOMETHING nice"));
        assert!(!PLACEHOLDER_PATTERN.is_match("Please type here"));
    }

    #[test]
    fn two_real_words_are_enough() {
        assert!(has_enough_text("This is fine."));
        assert!(has_enough_text("hello\nworld"));
        assert!(has_enough_text("  My name are Naimur  "));
    }

    #[test]
    fn password_and_non_text_inputs_are_excluded() {
        assert!(is_valid_text_field(&ElementInfo::input("text")));
        assert!(is_valid_text_field(&ElementInfo::input("email")));
        assert!(is_valid_text_field(&ElementInfo::textarea()));
        assert!(!is_valid_text_field(&ElementInfo::input("password")));
        assert!(!is_valid_text_field(&ElementInfo::input("PASSWORD")));
        assert!(!is_valid_text_field(&ElementInfo::input("checkbox")));
        assert!(!is_valid_text_field(&ElementInfo::input("file")));
        assert!(!is_valid_text_field(&ElementInfo::other("div", false)));
        assert!(is_valid_text_field(&ElementInfo::other("div", true)));
    }

    #[test]
    fn nested_editable_resolves_to_topmost_root() {
        let dom = FakeDom::new();
        let body = dom.add(ElementInfo::other("body", false), None, "");
        let editor = dom.add(ElementInfo::other("div", true), Some(body), "Some text here");
        let paragraph = dom.add(ElementInfo::other("p", true), Some(editor), "");
        let span = dom.add(ElementInfo::other("span", true), Some(paragraph), "");
        let plain = dom.add(ElementInfo::other("span", false), Some(body), "");
        let input = dom.add(ElementInfo::input("text"), Some(editor), "");

        assert_eq!(editable_root(&dom, span), Some(editor));
        assert_eq!(editable_root(&dom, editor), Some(editor));
        assert_eq!(editable_root(&dom, input), Some(input));
        assert_eq!(editable_root(&dom, plain), None);
        assert_eq!(editable_root(&dom, ElementId(999)), None);
    }
}
