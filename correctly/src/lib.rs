pub mod coordinator;
pub mod diff;
mod error;
pub mod host;
pub mod metrics;
pub mod protocol;
pub mod settings;
pub mod state;
pub mod tracker;
mod utils;

#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub use error::AppError;

use coordinator::{Coordinator, CoordinatorConfig, LocalHostLink};
use host::{HostConfig, ModelHost, ModelLoader};
use settings::{CheckerSettings, load_settings, validate_settings};
use state::HostStatus;
use tracker::dom::PageDom;
use tracker::{FieldTracker, TrackerConfig};

const LOG_FILTER_ENV: &str = "CORRECTLY_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

pub fn init_logging() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

/// One running grammar checker: the model host, the coordinator in front of it
/// and any number of tracked pages.
///
/// Must be created inside a tokio runtime.
pub struct Extension {
    settings: CheckerSettings,
    host: Arc<ModelHost>,
    coordinator: Arc<Coordinator>,
    dispatcher: JoinHandle<()>,
}

impl Extension {
    pub fn launch(loader: Arc<dyn ModelLoader>, settings: CheckerSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let host = Arc::new(ModelHost::new(
            loader,
            HostConfig::from(&settings),
            events_tx,
        ));
        let link = Arc::new(LocalHostLink::new(Arc::clone(&host)));
        let coordinator = Coordinator::new(link, CoordinatorConfig::from(&settings));
        let dispatcher = coordinator.spawn_event_dispatcher(events_rx);

        info!(
            debounce_ms = settings.debounce_ms,
            diff_mode = ?settings.diff_mode,
            "grammar checker started"
        );
        Self {
            settings,
            host,
            coordinator,
            dispatcher,
        }
    }

    /// Like [`Extension::launch`], rejecting out-of-range settings.
    pub fn launch_validated(
        loader: Arc<dyn ModelLoader>,
        settings: CheckerSettings,
    ) -> Result<Self, AppError> {
        let settings = validate_settings(settings)?;
        Ok(Self::launch(loader, settings))
    }

    pub fn launch_with_settings_file(
        loader: Arc<dyn ModelLoader>,
        path: &Path,
    ) -> Result<Self, AppError> {
        let settings = load_settings(path)?;
        Ok(Self::launch(loader, settings))
    }

    pub fn settings(&self) -> &CheckerSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn host_status(&self) -> HostStatus {
        self.host.status()
    }

    /// Connects a page to the coordinator and starts tracking its fields.
    pub async fn open_page(&self, dom: Arc<dyn PageDom>) -> Arc<FieldTracker> {
        let connection = self.coordinator.connect_page().await;
        debug!(page_id = connection.page_id, "opening page session");

        let tracker = FieldTracker::new(
            dom,
            Arc::new(connection.client),
            TrackerConfig::from(&self.settings),
        );
        tracker.spawn_notification_listener(connection.notifications);
        tracker.sync_model_status().await;
        tracker
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
