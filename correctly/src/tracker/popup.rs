use std::fmt::Write as _;

use serde::Serialize;

use crate::diff::patch::CorrectionRecord;
use crate::diff::{DiffMode, HighlightedToken, WordDiff, highlight};

/// User input on an open suggestion popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupAction {
    Close,
    Skip,
    ApplyAll,
    Next,
    OutsideClick,
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupView {
    pub original: String,
    pub corrected: String,
    pub current: Option<WordDiff>,
    pub highlighted: Vec<HighlightedToken>,
    pub remaining: usize,
}

impl PopupView {
    pub fn new(record: &CorrectionRecord, current_text: &str, mode: DiffMode) -> Self {
        Self {
            original: current_text.to_string(),
            corrected: record.corrected.clone(),
            current: record.current().cloned(),
            highlighted: highlight(current_text, &record.corrected, mode),
            remaining: record.count(),
        }
    }

    /// Incremental application only makes sense with more than one change left.
    pub fn allows_next(&self) -> bool {
        self.remaining > 1
    }

    pub fn render_html(&self) -> String {
        let mut html = String::new();
        html.push_str(r#"<div class="grammar-popup">"#);
        html.push_str(
            r#"<div class="grammar-popup-header"><span>Suggestion</span><span class="grammar-popup-close">&times;</span></div>"#,
        );
        html.push_str(r#"<div class="grammar-popup-content">"#);
        push_row(&mut html, "Original", "grammar-popup-original", &escape_html(&self.original));
        push_row(&mut html, "Corrected", "grammar-popup-corrected", &self.highlighted_html());
        if let Some(change) = self.current.as_ref().filter(|_| self.allows_next()) {
            let from = change.original_word.as_deref().unwrap_or("");
            let to = change.corrected_word.as_deref().unwrap_or("");
            let body = format!(
                r#"<del>{}</del> &rarr; <ins>{}</ins>"#,
                escape_html(from),
                escape_html(to)
            );
            push_row(&mut html, "Next change", "grammar-popup-change", &body);
        }
        html.push_str("</div>");

        html.push_str(r#"<div class="grammar-popup-actions">"#);
        html.push_str(r#"<button class="grammar-popup-btn grammar-popup-btn-skip">Skip</button>"#);
        if self.allows_next() {
            html.push_str(
                r#"<button class="grammar-popup-btn grammar-popup-btn-next">Next</button>"#,
            );
        }
        html.push_str(
            r#"<button class="grammar-popup-btn grammar-popup-btn-apply">Apply All</button>"#,
        );
        html.push_str("</div></div>");
        html
    }

    fn highlighted_html(&self) -> String {
        self.highlighted
            .iter()
            .map(|token| {
                let text = escape_html(&token.text);
                if token.changed {
                    format!(r#"<mark class="grammar-popup-changed">{text}</mark>"#)
                } else {
                    text
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn push_row(html: &mut String, label: &str, class: &str, body: &str) {
    let _ = write!(
        html,
        r#"<div class="grammar-popup-row"><div class="grammar-popup-label">{label}</div><div class="grammar-popup-text {class}">{body}</div></div>"#
    );
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(original: &str, corrected: &str) -> PopupView {
        let record = CorrectionRecord::new(original, corrected, DiffMode::Positional)
            .expect("texts should differ");
        PopupView::new(&record, original, DiffMode::Positional)
    }

    #[test]
    fn single_change_offers_no_next() {
        let popup = view("My name are Naimur", "My name is Naimur");
        assert!(!popup.allows_next());

        let html = popup.render_html();
        assert!(html.contains(r#"<mark class="grammar-popup-changed">is</mark>"#));
        assert!(html.contains("grammar-popup-btn-skip"));
        assert!(html.contains("grammar-popup-btn-apply"));
        assert!(!html.contains("grammar-popup-btn-next"));
    }

    #[test]
    fn several_changes_show_the_next_one() {
        let popup = view("He go to school yesterday", "He went to the school yesterday");
        assert!(popup.allows_next());
        assert_eq!(popup.current.as_ref().map(|diff| diff.position), Some(1));

        let html = popup.render_html();
        assert!(html.contains("grammar-popup-btn-next"));
        assert!(html.contains("<del>go</del> &rarr; <ins>went</ins>"));
    }

    #[test]
    fn page_text_is_escaped() {
        let popup = view("<b>me</b> are here", "<b>me</b> is here");
        let html = popup.render_html();
        assert!(html.contains("&lt;b&gt;me&lt;/b&gt;"));
        assert!(!html.contains("<b>me</b>"));
    }
}
