use serde::Serialize;

use crate::state::{ProgressPhase, ProgressSnapshot};

const COLOR_ORANGE: &str = "#FFA500";
const COLOR_PURPLE: &str = "#9C27B0";
const COLOR_GREEN: &str = "#28A745";
const COLOR_RED: &str = "#DC3545";

/// Text, color and tooltip of the extension's toolbar badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBadge {
    pub text: String,
    pub color: &'static str,
    pub title: String,
}

impl ActionBadge {
    pub fn idle() -> Self {
        Self {
            text: String::new(),
            color: COLOR_ORANGE,
            title: String::new(),
        }
    }

    pub fn starting() -> Self {
        Self {
            text: "...".to_string(),
            color: COLOR_ORANGE,
            title: "Loading grammar model...".to_string(),
        }
    }

    /// Badge for a progress update; `None` when the update should not change it.
    pub fn for_progress(snapshot: ProgressSnapshot) -> Option<Self> {
        match snapshot.phase {
            ProgressPhase::Testing => Some(Self {
                text: "…".to_string(),
                color: COLOR_PURPLE,
                title: "Testing model...".to_string(),
            }),
            ProgressPhase::Downloading if snapshot.percent < 100 => Some(Self {
                text: format!("{}%", snapshot.percent),
                color: COLOR_ORANGE,
                title: format!("Loading model: {}%", snapshot.percent),
            }),
            ProgressPhase::Downloading => None,
        }
    }

    pub fn ready() -> Self {
        Self {
            text: "✓".to_string(),
            color: COLOR_GREEN,
            title: "Grammar model ready!".to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            text: "!".to_string(),
            color: COLOR_RED,
            title: format!("Error: {message}"),
        }
    }
}
