use std::collections::BTreeMap;

use tokio::sync::mpsc;

const ENCODER_MARKER: &str = "encoder_model";
const DECODER_MARKER: &str = "decoder_model";
const AUXILIARY_WEIGHT: f64 = 0.05;
const ENCODER_WEIGHT: f64 = 0.25;
const DECODER_WEIGHT: f64 = 0.70;

/// Download progress of one named model resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceProgress {
    pub resource: String,
    pub percent: f64,
    pub status: Option<String>,
}

/// Handed to a [`super::ModelLoader`] so it can report per-resource progress.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::UnboundedSender<ResourceProgress>,
}

impl ProgressSink {
    pub fn report(&self, resource: impl Into<String>, percent: f64, status: Option<&str>) {
        let update = ResourceProgress {
            resource: resource.into(),
            percent: percent.clamp(0.0, 100.0),
            status: status.map(str::to_string),
        };
        // The receiver is gone once the load attempt finished; late reports are moot.
        let _ = self.tx.send(update);
    }
}

pub fn channel() -> (ProgressSink, mpsc::UnboundedReceiver<ResourceProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSink { tx }, rx)
}

/// Folds per-resource progress into one overall percentage.
///
/// One resource reports its own percent. With several, the decoder weights 70%,
/// the encoder 25% and the averaged remaining files 5% (counted as done when
/// none reported yet).
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    resources: BTreeMap<String, f64>,
    last_reported: Option<u8>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an update and returns the overall percent when it changed.
    pub fn record(&mut self, update: &ResourceProgress) -> Option<u8> {
        let key = if update.resource.is_empty() {
            "default".to_string()
        } else {
            update.resource.clone()
        };
        self.resources.insert(key, update.percent);

        let overall = self.overall();
        if self.last_reported == Some(overall) {
            return None;
        }
        self.last_reported = Some(overall);
        Some(overall)
    }

    pub fn overall(&self) -> u8 {
        if self.resources.len() == 1 {
            let only = self.resources.values().next().copied().unwrap_or(0.0);
            return to_percent(only);
        }

        let mut encoder = 0.0;
        let mut decoder = 0.0;
        let mut auxiliary = Vec::new();
        for (name, percent) in &self.resources {
            if name.contains(ENCODER_MARKER) {
                encoder = *percent;
            } else if name.contains(DECODER_MARKER) {
                decoder = *percent;
            } else {
                auxiliary.push(*percent);
            }
        }

        let auxiliary_average = if auxiliary.is_empty() {
            100.0
        } else {
            auxiliary.iter().sum::<f64>() / auxiliary.len() as f64
        };

        to_percent(
            auxiliary_average * AUXILIARY_WEIGHT + encoder * ENCODER_WEIGHT + decoder * DECODER_WEIGHT,
        )
    }
}

fn to_percent(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}
