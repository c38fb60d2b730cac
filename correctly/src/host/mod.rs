//! The model host owns the grammar model and is the only component that runs it.

pub mod context;
pub mod progress;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::protocol::HostEvent;
use crate::settings::CheckerSettings;
use crate::state::{HostPhase, HostStatus, ProgressPhase};
use crate::utils::truncate_chars;
use progress::{ProgressAggregator, ProgressSink, ResourceProgress};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("model download timed out after {0} seconds")]
    LoadTimeout(u64),
    #[error("grammar correction timed out after {0} seconds")]
    InferenceTimeout(u64),
    #[error("{0}")]
    Model(String),
    #[error("model not ready yet ({phase}, {percent}%)")]
    NotReady { phase: HostPhase, percent: u8 },
    #[error("text too short: at least {min} characters required")]
    InputTooShort { min: usize },
}

/// Failure reported by the external model capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ModelError(pub String);

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A loaded sequence-to-sequence grammar model.
#[async_trait]
pub trait GrammarModel: Send + Sync {
    async fn generate(&self, text: &str) -> Result<String, ModelError>;
}

/// Acquires the model, reporting per-resource download progress.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, progress: ProgressSink) -> Result<Arc<dyn GrammarModel>, ModelError>;
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub load_timeout: Duration,
    pub inference_timeout: Duration,
    pub min_input_chars: usize,
    pub max_input_chars: usize,
    pub self_test_text: String,
}

impl From<&CheckerSettings> for HostConfig {
    fn from(settings: &CheckerSettings) -> Self {
        Self {
            load_timeout: settings.model_load_timeout(),
            inference_timeout: settings.inference_timeout(),
            min_input_chars: settings.min_input_chars,
            max_input_chars: settings.max_input_chars,
            self_test_text: settings.self_test_text.clone(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from(&CheckerSettings::default())
    }
}

type LoadAttempt = Shared<BoxFuture<'static, Result<(), HostError>>>;

pub struct ModelHost {
    loader: Arc<dyn ModelLoader>,
    config: HostConfig,
    model: Mutex<Option<Arc<dyn GrammarModel>>>,
    in_flight: Mutex<Option<LoadAttempt>>,
    status_tx: watch::Sender<HostStatus>,
    events: mpsc::UnboundedSender<HostEvent>,
}

impl ModelHost {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        config: HostConfig,
        events: mpsc::UnboundedSender<HostEvent>,
    ) -> Self {
        let (status_tx, _) = watch::channel(HostStatus::default());
        Self {
            loader,
            config,
            model: Mutex::new(None),
            in_flight: Mutex::new(None),
            status_tx,
            events,
        }
    }

    pub fn status(&self) -> HostStatus {
        *self.status_tx.borrow()
    }

    /// Loads and self-tests the model.
    ///
    /// Concurrent callers share one attempt. The attempt runs on its own task,
    /// so dropping every caller does not abort it.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), HostError> {
        let attempt = {
            let mut in_flight = self.in_flight.lock().await;
            if self.status().ready {
                return Ok(());
            }

            match in_flight.as_ref() {
                Some(attempt) => {
                    debug!("model load already in flight; joining existing attempt");
                    attempt.clone()
                }
                None => {
                    self.set_status(HostPhase::Loading, 0);
                    let host = Arc::clone(self);
                    let task = tokio::spawn(async move { host.run_load().await });
                    let attempt = async move {
                        task.await.unwrap_or_else(|err| {
                            Err(HostError::Model(format!("model load task failed: {err}")))
                        })
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    pub async fn correct(&self, text: &str) -> Result<String, HostError> {
        let status = self.status();
        let model = if status.ready {
            self.model.lock().await.clone()
        } else {
            None
        };
        let Some(model) = model else {
            return Err(HostError::NotReady {
                phase: status.phase,
                percent: status.percent,
            });
        };

        let trimmed = text.trim();
        if trimmed.chars().count() < self.config.min_input_chars {
            return Err(HostError::InputTooShort {
                min: self.config.min_input_chars,
            });
        }

        let input = truncate_chars(trimmed, self.config.max_input_chars);
        if input.len() < trimmed.len() {
            debug!(
                max_chars = self.config.max_input_chars,
                "truncated correction input"
            );
        }

        let started = Instant::now();
        let result = tokio::time::timeout(self.config.inference_timeout, model.generate(input)).await;
        match result {
            Ok(Ok(corrected)) => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "grammar correction finished"
                );
                Ok(corrected)
            }
            Ok(Err(err)) => {
                warn!("grammar correction failed: {err}");
                Err(HostError::Model(err.to_string()))
            }
            Err(_) => {
                warn!("grammar correction timed out");
                Err(HostError::InferenceTimeout(
                    self.config.inference_timeout.as_secs(),
                ))
            }
        }
    }

    async fn run_load(self: Arc<Self>) -> Result<(), HostError> {
        let started = Instant::now();
        info!("loading grammar correction model");
        let outcome = self.load_and_test().await;

        let mut in_flight = self.in_flight.lock().await;
        match &outcome {
            Ok(()) => {
                self.set_status(HostPhase::Ready, 100);
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "grammar model is ready"
                );
                self.emit(HostEvent::ModelReady);
            }
            Err(err) => {
                *self.model.lock().await = None;
                let percent = self.status().percent;
                self.set_status(HostPhase::Failed, percent);
                error!("failed to load grammar model: {err}");
                self.emit(HostEvent::ModelError {
                    error: err.to_string(),
                });
            }
        }
        *in_flight = None;
        outcome
    }

    async fn load_and_test(&self) -> Result<(), HostError> {
        let (sink, mut progress_rx) = progress::channel();
        let mut aggregator = ProgressAggregator::new();

        let load = tokio::time::timeout(self.config.load_timeout, self.loader.load(sink));
        tokio::pin!(load);
        let loaded = loop {
            tokio::select! {
                result = &mut load => break result,
                Some(update) = progress_rx.recv() => self.record_progress(&mut aggregator, &update),
            }
        };
        while let Ok(update) = progress_rx.try_recv() {
            self.record_progress(&mut aggregator, &update);
        }

        let model = match loaded {
            Ok(Ok(model)) => model,
            Ok(Err(err)) => return Err(HostError::Model(err.to_string())),
            Err(_) => return Err(HostError::LoadTimeout(self.config.load_timeout.as_secs())),
        };

        self.set_status(HostPhase::Testing, 100);
        self.emit(HostEvent::ProgressUpdate {
            progress: 100,
            status: ProgressPhase::Testing,
        });
        info!(text = self.config.self_test_text.as_str(), "testing grammar model");

        let self_test = tokio::time::timeout(
            self.config.inference_timeout,
            model.generate(&self.config.self_test_text),
        )
        .await;
        match self_test {
            Ok(Ok(output)) => debug!(output = output.as_str(), "model self-test passed"),
            Ok(Err(err)) => return Err(HostError::Model(err.to_string())),
            Err(_) => {
                return Err(HostError::InferenceTimeout(
                    self.config.inference_timeout.as_secs(),
                ));
            }
        }

        *self.model.lock().await = Some(model);
        Ok(())
    }

    fn record_progress(&self, aggregator: &mut ProgressAggregator, update: &ResourceProgress) {
        let Some(percent) = aggregator.record(update) else {
            return;
        };

        debug!(
            resource = update.resource.as_str(),
            percent, "model loading progress"
        );
        self.set_status(HostPhase::Loading, percent);
        self.emit(HostEvent::ProgressUpdate {
            progress: percent,
            status: ProgressPhase::Downloading,
        });
    }

    fn set_status(&self, phase: HostPhase, percent: u8) {
        self.status_tx.send_replace(HostStatus::new(phase, percent));
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            debug!("no coordinator is listening for host events");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeLoader, corrector_model};

    fn host_with(loader: Arc<FakeLoader>) -> (Arc<ModelHost>, mpsc::UnboundedReceiver<HostEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let host = Arc::new(ModelHost::new(loader, HostConfig::default(), events_tx));
        (host, events_rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_initialize_loads_once() {
        let loader = Arc::new(FakeLoader::new(corrector_model()).with_delay(Duration::from_secs(2)));
        let (host, _events) = host_with(Arc::clone(&loader));

        let calls = (0..8).map(|_| {
            let host = Arc::clone(&host);
            tokio::spawn(async move { host.initialize().await })
        });
        for call in calls.collect::<Vec<_>>() {
            call.await.expect("task should join").expect("load should succeed");
        }

        assert_eq!(loader.load_calls(), 1);
        assert!(host.status().ready);

        host.initialize().await.expect("ready host returns immediately");
        assert_eq!(loader.load_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_load_walks_through_testing_phase() {
        let loader = Arc::new(FakeLoader::new(corrector_model()).with_progress(vec![
            ("onnx/encoder_model.onnx", 100.0),
            ("onnx/decoder_model_merged.onnx", 100.0),
        ]));
        let (host, mut events) = host_with(loader);

        host.initialize().await.expect("load should succeed");
        let events = drain(&mut events);

        assert!(events.contains(&HostEvent::ProgressUpdate {
            progress: 100,
            status: ProgressPhase::Testing,
        }));
        assert_eq!(events.last(), Some(&HostEvent::ModelReady));
        assert_eq!(host.status(), HostStatus::new(HostPhase::Ready, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn load_timeout_marks_failed_and_allows_retry() {
        let loader = Arc::new(FakeLoader::new(corrector_model()).with_delay(Duration::from_secs(600)));
        let (host, mut events) = host_with(Arc::clone(&loader));

        let err = host.initialize().await.expect_err("load should time out");
        assert_eq!(err, HostError::LoadTimeout(300));
        assert_eq!(host.status().phase, HostPhase::Failed);
        assert!(matches!(
            drain(&mut events).last(),
            Some(HostEvent::ModelError { .. })
        ));

        loader.set_delay(Duration::ZERO);
        host.initialize().await.expect("retry should succeed");
        assert_eq!(loader.load_calls(), 2);
        assert!(host.status().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_self_test_does_not_mark_ready() {
        let loader = Arc::new(FakeLoader::new(Arc::new(crate::test_support::FailingModel)));
        let (host, _events) = host_with(loader);

        let err = host.initialize().await.expect_err("self-test should fail");
        assert!(matches!(err, HostError::Model(_)));
        assert_eq!(host.status().phase, HostPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn correct_requires_ready_host() {
        let loader = Arc::new(FakeLoader::new(corrector_model()));
        let (host, _events) = host_with(loader);

        let err = host
            .correct("My name are Naimur")
            .await
            .expect_err("unloaded host should refuse");
        assert_eq!(
            err,
            HostError::NotReady {
                phase: HostPhase::Unloaded,
                percent: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn correct_validates_and_truncates_input() {
        let model = corrector_model();
        let loader = Arc::new(FakeLoader::new(model.clone()));
        let (host, _events) = host_with(loader);
        host.initialize().await.expect("load should succeed");

        assert_eq!(
            host.correct("  ok ").await,
            Err(HostError::InputTooShort { min: 3 })
        );

        let corrected = host
            .correct("My name are Naimur")
            .await
            .expect("correction should succeed");
        assert_eq!(corrected, "My name is Naimur");

        let long_text = "a".repeat(800);
        host.correct(&long_text).await.expect("long text is truncated, not rejected");
        assert_eq!(model.last_input().map(|input| input.chars().count()), Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_inference_times_out() {
        let model = corrector_model();
        let loader = Arc::new(FakeLoader::new(model.clone()));
        let (host, _events) = host_with(loader);
        host.initialize().await.expect("load should succeed");

        model.set_delay(Duration::from_secs(45));
        assert_eq!(
            host.correct("My name are Naimur").await,
            Err(HostError::InferenceTimeout(30))
        );
    }
}
