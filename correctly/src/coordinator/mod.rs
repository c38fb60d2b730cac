//! Process-wide relay between pages and the single model host.

pub mod action_badge;
pub mod broadcast;
pub mod throttle;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::host::context::{HostContext, HostReply};
use crate::host::{HostError, ModelHost};
use crate::metrics::DiagnosticsReport;
use crate::protocol::{Envelope, ErrorResponse, HostEvent, Notification, Request, Response};
use crate::settings::CheckerSettings;
use crate::state::{AppState, HostStatus, ProgressSnapshot};
use crate::tracker::client::{PageClient, PageConnection};
use action_badge::ActionBadge;
use broadcast::{Broadcaster, DeliveryReport};

const NOT_READY_MESSAGE: &str = "Model not ready yet. Please wait...";
const TOO_SHORT_MESSAGE: &str = "Text too short";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("model host unavailable: {0}")]
    HostUnavailable(String),
    #[error("model host setup failed after {attempts} attempts: {reason}")]
    SetupFailed { attempts: u8, reason: String },
}

impl From<&CoordinatorError> for ErrorResponse {
    fn from(err: &CoordinatorError) -> Self {
        match err {
            CoordinatorError::Host(HostError::NotReady { phase, percent }) => ErrorResponse {
                error: NOT_READY_MESSAGE.to_string(),
                loading: Some(phase.is_loading()),
                progress: Some(*percent),
            },
            CoordinatorError::Host(HostError::InputTooShort { .. }) => {
                ErrorResponse::new(TOO_SHORT_MESSAGE)
            }
            other => ErrorResponse::new(other.to_string()),
        }
    }
}

/// Connection from the coordinator to the host's execution context.
#[async_trait]
pub trait HostLink: Send + Sync {
    /// Makes sure the context exists. Returns `true` when it had to be created.
    async fn ensure_context(&self) -> Result<bool, CoordinatorError>;

    async fn call(&self, request: Request) -> Result<HostReply, CoordinatorError>;
}

/// Runs the host context as a task inside this process.
pub struct LocalHostLink {
    host: Arc<ModelHost>,
    context: Mutex<Option<HostContext>>,
}

impl LocalHostLink {
    pub fn new(host: Arc<ModelHost>) -> Self {
        Self {
            host,
            context: Mutex::new(None),
        }
    }
}

#[async_trait]
impl HostLink for LocalHostLink {
    async fn ensure_context(&self) -> Result<bool, CoordinatorError> {
        let mut context = self.context.lock().await;
        if context.as_ref().is_some_and(HostContext::is_alive) {
            return Ok(false);
        }

        let (spawned, _worker) = HostContext::spawn(Arc::clone(&self.host));
        *context = Some(spawned);
        Ok(true)
    }

    async fn call(&self, request: Request) -> Result<HostReply, CoordinatorError> {
        let context = self.context.lock().await.clone();
        let Some(context) = context else {
            return Err(CoordinatorError::HostUnavailable(
                "host context has not been created".to_string(),
            ));
        };

        context
            .call(request)
            .await
            .map_err(|err| CoordinatorError::HostUnavailable(err.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub startup_delay: Duration,
    pub retry_attempts: u8,
    pub retry_backoff: Duration,
    pub progress_step: u8,
}

impl From<&CheckerSettings> for CoordinatorConfig {
    fn from(settings: &CheckerSettings) -> Self {
        Self {
            startup_delay: settings.host_startup_delay(),
            retry_attempts: settings.load_retry_attempts,
            retry_backoff: settings.load_retry_backoff(),
            progress_step: settings.progress_broadcast_step,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from(&CheckerSettings::default())
    }
}

pub struct Coordinator {
    link: Arc<dyn HostLink>,
    config: CoordinatorConfig,
    state: AppState,
    broadcaster: Broadcaster,
}

impl Coordinator {
    pub fn new(link: Arc<dyn HostLink>, config: CoordinatorConfig) -> Arc<Self> {
        let state = AppState::new(config.progress_step);
        Arc::new(Self {
            link,
            config,
            state,
            broadcaster: Broadcaster::new(),
        })
    }

    pub fn spawn_event_dispatcher(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<HostEvent>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                coordinator.dispatch(Envelope::Host(event)).await;
            }
            warn!("host event channel closed");
        })
    }

    pub async fn connect_page(self: &Arc<Self>) -> PageConnection {
        let (page_id, notifications) = self.broadcaster.register().await;
        PageConnection {
            page_id,
            client: PageClient::new(Arc::clone(self)),
            notifications,
        }
    }

    /// Routes one message by the role of its sender.
    pub async fn dispatch(self: &Arc<Self>, envelope: Envelope) -> Option<Response> {
        debug!(role = ?envelope.role(), "coordinator received message");
        match envelope {
            Envelope::Page(request) => Some(self.handle_request(request).await),
            Envelope::Host(event) => {
                self.handle_host_event(event).await;
                None
            }
            Envelope::Coordinator(notification) => {
                warn!(?notification, "ignoring coordinator-role message sent to the coordinator");
                None
            }
        }
    }

    pub async fn handle_request(self: &Arc<Self>, request: Request) -> Response {
        debug!(action = request.action(), "forwarding page request");
        match request {
            Request::LoadModel => match self.load_model().await {
                Ok(()) => Response::Loaded { success: true },
                Err(CoordinatorError::Host(err)) => {
                    // The failure reaches pages through the modelError broadcast.
                    debug!("model load finished with error: {err}");
                    Response::Loaded { success: true }
                }
                Err(err) => Response::Error(ErrorResponse::from(&err)),
            },
            Request::GetModelStatus => match self.model_status().await {
                Ok(status) => Response::Status(status.into()),
                Err(err) => Response::Error(ErrorResponse::from(&err)),
            },
            Request::CorrectGrammar { text } => match self.correct(&text).await {
                Ok(corrected) => Response::corrected(corrected),
                Err(err) => Response::Error(ErrorResponse::from(&err)),
            },
        }
    }

    pub async fn load_model(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        match self.forward(Request::LoadModel).await? {
            HostReply::Loaded(outcome) => outcome.map_err(CoordinatorError::from),
            other => Err(unexpected_reply(&other)),
        }
    }

    pub async fn model_status(self: &Arc<Self>) -> Result<HostStatus, CoordinatorError> {
        match self.forward(Request::GetModelStatus).await? {
            HostReply::Status(status) => Ok(status),
            other => Err(unexpected_reply(&other)),
        }
    }

    pub async fn correct(self: &Arc<Self>, text: &str) -> Result<String, CoordinatorError> {
        let started = Instant::now();
        let reply = self
            .forward(Request::CorrectGrammar {
                text: text.to_string(),
            })
            .await?;

        match reply {
            HostReply::Corrected(Ok(corrected)) => {
                let runtime = self.state.runtime();
                let mut metrics = runtime.metrics.lock().await;
                metrics.record_inference(started.elapsed().as_millis() as u64);
                Ok(corrected)
            }
            HostReply::Corrected(Err(err)) => Err(err.into()),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Creates the host context when needed and kicks off the model load once.
    pub async fn ensure_host(self: &Arc<Self>) -> Result<(), CoordinatorError> {
        let created = self.link.ensure_context().await.map_err(|err| match err {
            CoordinatorError::HostUnavailable(_) => err,
            other => CoordinatorError::HostUnavailable(other.to_string()),
        })?;

        let runtime = self.state.runtime();
        let already_requested = runtime.load_requested.swap(true, Ordering::SeqCst);
        if already_requested && !created {
            return Ok(());
        }

        self.spawn_model_load(created);
        Ok(())
    }

    pub fn action_badge(&self) -> watch::Receiver<ActionBadge> {
        self.state.runtime().action_badge.subscribe()
    }

    pub async fn progress(&self) -> Option<ProgressSnapshot> {
        *self.state.runtime().progress.lock().await
    }

    pub async fn diagnostics(&self) -> DiagnosticsReport {
        self.state.runtime().metrics.lock().await.report()
    }

    async fn forward(self: &Arc<Self>, request: Request) -> Result<HostReply, CoordinatorError> {
        self.ensure_host().await?;
        let result = self.link.call(request).await;
        if let Err(CoordinatorError::HostUnavailable(reason)) = &result {
            warn!("model host unreachable: {reason}");
            let runtime = self.state.runtime();
            runtime.metrics.lock().await.record_host_unavailable();
        }
        result
    }

    fn spawn_model_load(self: &Arc<Self>, fresh_context: bool) {
        let coordinator = Arc::clone(self);
        let runtime = self.state.runtime();
        runtime.action_badge.send_replace(ActionBadge::starting());

        tokio::spawn(async move {
            if fresh_context && !coordinator.config.startup_delay.is_zero() {
                tokio::time::sleep(coordinator.config.startup_delay).await;
            }

            if let Err(err) = coordinator.request_model_load().await {
                error!("{err}");
                runtime.load_requested.store(false, Ordering::SeqCst);
                runtime
                    .action_badge
                    .send_replace(ActionBadge::error("Failed to load model"));
                coordinator
                    .broadcast(Notification::ModelError {
                        error: err.to_string(),
                    })
                    .await;
            }
        });
    }

    async fn request_model_load(&self) -> Result<(), CoordinatorError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            info!(attempt, "requesting model load from host");
            let started = Instant::now();
            let reply = match self.link.ensure_context().await {
                Ok(_) => self.link.call(Request::LoadModel).await,
                Err(err) => Err(err),
            };

            match reply {
                Ok(HostReply::Loaded(outcome)) => {
                    if outcome.is_ok() {
                        let runtime = self.state.runtime();
                        let mut metrics = runtime.metrics.lock().await;
                        metrics.record_model_load(started.elapsed().as_millis() as u64);
                    }
                    // Load failures are reported by the host's own modelError event.
                    return Ok(());
                }
                Ok(other) => {
                    last_error = Some(unexpected_reply(&other).to_string());
                }
                Err(err) => {
                    warn!(attempt, "model load request failed: {err}");
                    last_error = Some(err.to_string());
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(CoordinatorError::SetupFailed {
            attempts,
            reason: last_error.unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    async fn handle_host_event(&self, event: HostEvent) {
        let runtime = self.state.runtime();
        match event {
            HostEvent::ProgressUpdate { progress, status } => {
                let snapshot = ProgressSnapshot {
                    percent: progress.min(100),
                    phase: status,
                };
                *runtime.progress.lock().await = Some(snapshot);
                if let Some(badge) = ActionBadge::for_progress(snapshot) {
                    runtime.action_badge.send_replace(badge);
                }

                let due = runtime.throttle.lock().await.should_broadcast(snapshot);
                if !due {
                    runtime.metrics.lock().await.record_throttled_progress();
                    return;
                }

                self.broadcast(Notification::ModelLoadingProgress {
                    progress: snapshot.percent,
                    status,
                })
                .await;
            }
            HostEvent::ModelReady => {
                info!("model ready; notifying pages");
                runtime.action_badge.send_replace(ActionBadge::ready());
                self.broadcast(Notification::ModelReady).await;
            }
            HostEvent::ModelError { error } => {
                error!("model host reported an error: {error}");
                runtime.load_requested.store(false, Ordering::SeqCst);
                runtime.throttle.lock().await.reset();
                runtime.action_badge.send_replace(ActionBadge::error(&error));
                self.broadcast(Notification::ModelError { error }).await;
            }
        }
    }

    async fn broadcast(&self, notification: Notification) -> DeliveryReport {
        let report = self.broadcaster.broadcast(&notification).await;
        let runtime = self.state.runtime();
        runtime
            .metrics
            .lock()
            .await
            .record_broadcast(report.delivered, report.dropped);
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast notification to pages"
        );
        report
    }
}

fn unexpected_reply(reply: &HostReply) -> CoordinatorError {
    CoordinatorError::HostUnavailable(format!("unexpected host reply: {reply:?}"))
}
