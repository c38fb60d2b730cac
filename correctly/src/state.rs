use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};

use crate::coordinator::action_badge::ActionBadge;
use crate::coordinator::throttle::ProgressThrottle;
use crate::metrics::RuntimeMetrics;

/// Lifecycle of the model host.
///
/// `Unloaded -> Loading -> Testing -> Ready`, with `Failed` reachable from the
/// loading and testing phases. A failed host goes back to `Loading` on the next
/// initialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostPhase {
    #[default]
    Unloaded,
    Loading,
    Testing,
    Ready,
    Failed,
}

impl HostPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HostPhase::Unloaded => "unloaded",
            HostPhase::Loading => "loading",
            HostPhase::Testing => "testing",
            HostPhase::Ready => "ready",
            HostPhase::Failed => "failed",
        }
    }

    pub fn is_loading(self) -> bool {
        matches!(self, HostPhase::Loading | HostPhase::Testing)
    }
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressPhase {
    Downloading,
    Testing,
}

impl ProgressPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressPhase::Downloading => "downloading",
            ProgressPhase::Testing => "testing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub phase: ProgressPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    pub ready: bool,
    pub loading: bool,
    pub phase: HostPhase,
    pub percent: u8,
}

impl HostStatus {
    pub fn new(phase: HostPhase, percent: u8) -> Self {
        Self {
            ready: phase == HostPhase::Ready,
            loading: phase.is_loading(),
            phase,
            percent: percent.min(100),
        }
    }
}

/// Process-wide state owned by the coordinator.
pub struct RuntimeState {
    pub progress: Mutex<Option<ProgressSnapshot>>,
    pub throttle: Mutex<ProgressThrottle>,
    pub load_requested: AtomicBool,
    pub action_badge: watch::Sender<ActionBadge>,
    pub metrics: Mutex<RuntimeMetrics>,
}

#[derive(Clone)]
pub struct AppState {
    runtime: Arc<RuntimeState>,
}

impl AppState {
    pub fn new(progress_step: u8) -> Self {
        let (action_badge, _) = watch::channel(ActionBadge::idle());
        let runtime = RuntimeState {
            progress: Mutex::new(None),
            throttle: Mutex::new(ProgressThrottle::new(progress_step)),
            load_requested: AtomicBool::new(false),
            action_badge,
            metrics: Mutex::new(RuntimeMetrics::new()),
        };
        Self {
            runtime: Arc::new(runtime),
        }
    }

    pub fn runtime(&self) -> Arc<RuntimeState> {
        Arc::clone(&self.runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags_follow_phase() {
        let loading = HostStatus::new(HostPhase::Testing, 100);
        assert!(loading.loading);
        assert!(!loading.ready);

        let ready = HostStatus::new(HostPhase::Ready, 100);
        assert!(ready.ready);
        assert!(!ready.loading);

        let failed = HostStatus::new(HostPhase::Failed, 40);
        assert!(!failed.ready && !failed.loading);
    }

    #[test]
    fn status_percent_is_clamped() {
        assert_eq!(HostStatus::new(HostPhase::Loading, 250).percent, 100);
    }

    #[test]
    fn progress_phase_serializes_lowercase() {
        let json = serde_json::to_string(&ProgressPhase::Testing).expect("phase should serialize");
        assert_eq!(json, "\"testing\"");
    }
}
