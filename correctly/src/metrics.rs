use std::collections::VecDeque;

use serde::Serialize;

use crate::utils::now_epoch_ms;

const LATENCY_WINDOW: usize = 64;
const SLOW_INFERENCE_MS: u64 = 5_000;

/// Latency over the most recent samples of one operation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub samples: usize,
    pub last_ms: u64,
    pub average_ms: u64,
    pub slowest_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub generated_at_ms: u64,
    pub inference: LatencySummary,
    pub model_load: LatencySummary,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub throttled_progress: u64,
    pub host_unavailable: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct LatencyWindow(VecDeque<u64>);

impl LatencyWindow {
    fn push(&mut self, elapsed_ms: u64) {
        if self.0.len() == LATENCY_WINDOW {
            self.0.pop_front();
        }
        self.0.push_back(elapsed_ms);
    }

    fn summary(&self) -> LatencySummary {
        let Some(&last_ms) = self.0.back() else {
            return LatencySummary::default();
        };
        let samples = self.0.len();
        LatencySummary {
            samples,
            last_ms,
            average_ms: self.0.iter().sum::<u64>() / samples as u64,
            slowest_ms: self.0.iter().copied().max().unwrap_or(last_ms),
        }
    }
}

/// Diagnostics collected by the coordinator.
#[derive(Debug)]
pub struct RuntimeMetrics {
    inference_ms: LatencyWindow,
    model_load_ms: LatencyWindow,
    broadcasts: u64,
    deliveries: u64,
    dropped_deliveries: u64,
    throttled_progress: u64,
    host_unavailable: u64,
}

impl RuntimeMetrics {
    pub fn new() -> Self {
        Self {
            inference_ms: LatencyWindow::default(),
            model_load_ms: LatencyWindow::default(),
            broadcasts: 0,
            deliveries: 0,
            dropped_deliveries: 0,
            throttled_progress: 0,
            host_unavailable: 0,
        }
    }

    pub fn record_inference(&mut self, latency_ms: u64) {
        self.inference_ms.push(latency_ms);
    }

    pub fn record_model_load(&mut self, duration_ms: u64) {
        self.model_load_ms.push(duration_ms);
    }

    pub fn record_broadcast(&mut self, delivered: usize, dropped: usize) {
        self.broadcasts += 1;
        self.deliveries += delivered as u64;
        self.dropped_deliveries += dropped as u64;
    }

    pub fn record_throttled_progress(&mut self) {
        self.throttled_progress += 1;
    }

    pub fn record_host_unavailable(&mut self) {
        self.host_unavailable += 1;
    }

    pub fn report(&self) -> DiagnosticsReport {
        let inference = self.inference_ms.summary();
        let model_load = self.model_load_ms.summary();

        let mut warnings = Vec::new();
        if self.host_unavailable > 0 {
            warnings.push(format!(
                "Model host was unreachable for {} requests.",
                self.host_unavailable
            ));
        }
        if self.dropped_deliveries > 0 {
            warnings.push(format!(
                "Dropped {} notifications for pages without a listener.",
                self.dropped_deliveries
            ));
        }
        if inference.average_ms > SLOW_INFERENCE_MS {
            warnings.push(format!(
                "Corrections average {}ms, slower than {}ms.",
                inference.average_ms, SLOW_INFERENCE_MS
            ));
        }

        DiagnosticsReport {
            generated_at_ms: now_epoch_ms(),
            inference,
            model_load,
            broadcasts: self.broadcasts,
            deliveries: self.deliveries,
            dropped_deliveries: self.dropped_deliveries,
            throttled_progress: self.throttled_progress,
            host_unavailable: self.host_unavailable,
            warnings,
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
