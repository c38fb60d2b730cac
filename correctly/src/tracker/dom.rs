use std::fmt;

use super::badge::Badge;
use super::popup::PopupView;

/// Identity of one element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Input { input_type: String },
    TextArea,
    Other { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    pub kind: ElementKind,
    pub content_editable: bool,
}

impl ElementInfo {
    pub fn input(input_type: &str) -> Self {
        Self {
            kind: ElementKind::Input {
                input_type: input_type.to_string(),
            },
            content_editable: false,
        }
    }

    pub fn textarea() -> Self {
        Self {
            kind: ElementKind::TextArea,
            content_editable: false,
        }
    }

    pub fn other(tag: &str, content_editable: bool) -> Self {
        Self {
            kind: ElementKind::Other {
                tag: tag.to_string(),
            },
            content_editable,
        }
    }
}

/// Viewport-relative bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// The slice of a page document the tracker reads and writes.
///
/// Text of inputs and textareas is their value; text of an editable region is
/// its rendered text.
pub trait PageDom: Send + Sync {
    fn element(&self, id: ElementId) -> Option<ElementInfo>;

    fn parent(&self, id: ElementId) -> Option<ElementId>;

    fn text(&self, id: ElementId) -> Option<String>;

    fn set_text(&self, id: ElementId, text: &str);

    /// Fires the element's native input/change notifications.
    fn dispatch_change(&self, id: ElementId);

    fn bounds(&self, id: ElementId) -> Option<Rect>;

    fn render_badge(&self, id: ElementId, badge: &Badge);

    /// Shows the popup for `id`, or removes any open popup when `None`.
    fn render_popup(&self, id: ElementId, popup: Option<&PopupView>);
}
