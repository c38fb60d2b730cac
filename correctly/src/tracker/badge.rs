use serde::Serialize;

use super::dom::Rect;

pub const BADGE_SIZE: f64 = 20.0;
const BADGE_PADDING: f64 = 8.0;
const MAX_DISPLAYED_COUNT: usize = 9;

const COLOR_GRAY: &str = "#6c757d";
const COLOR_RED: &str = "#dc3545";
const COLOR_GREEN: &str = "#28a745";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "count", rename_all = "lowercase")]
pub enum BadgeState {
    #[default]
    Hidden,
    Loading,
    Errors(usize),
    Success,
}

impl BadgeState {
    pub fn is_visible(self) -> bool {
        self != BadgeState::Hidden
    }

    /// Text shown inside the badge. The loading spinner has none.
    pub fn label(self) -> Option<String> {
        match self {
            BadgeState::Hidden => None,
            BadgeState::Loading => Some(String::new()),
            BadgeState::Errors(count) if count > MAX_DISPLAYED_COUNT => {
                Some(format!("{MAX_DISPLAYED_COUNT}+"))
            }
            BadgeState::Errors(count) => Some(count.to_string()),
            BadgeState::Success => Some("✓".to_string()),
        }
    }

    pub fn color(self) -> Option<&'static str> {
        match self {
            BadgeState::Hidden => None,
            BadgeState::Loading => Some(COLOR_GRAY),
            BadgeState::Errors(_) => Some(COLOR_RED),
            BadgeState::Success => Some(COLOR_GREEN),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BadgePosition {
    pub top: f64,
    pub left: f64,
}

/// Bottom-right corner, inside the field.
pub fn position_for(rect: Rect) -> BadgePosition {
    BadgePosition {
        top: rect.bottom() - BADGE_SIZE - BADGE_PADDING,
        left: rect.right() - BADGE_SIZE - BADGE_PADDING,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Badge {
    pub state: BadgeState,
    pub position: Option<BadgePosition>,
}

impl Badge {
    pub fn label(&self) -> Option<String> {
        self.state.label()
    }
}
