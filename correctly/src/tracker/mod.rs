//! Per-page field tracking: eligibility, debounced checks, badges and patches.

pub mod badge;
pub mod client;
pub mod dom;
pub mod eligibility;
pub mod popup;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::diff::DiffMode;
use crate::diff::patch::CorrectionRecord;
use crate::protocol::{ErrorResponse, Notification};
use crate::settings::CheckerSettings;
use badge::{Badge, BadgeState, position_for};
use client::CorrectionService;
use dom::{ElementId, PageDom};
use eligibility::{editable_root, has_enough_text, is_valid_text_field};
use popup::{PopupAction, PopupView};

/// Page events the tracker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    FocusIn,
    Input,
    Paste,
    Cut,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Focus,
    Edit,
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Finished,
    Pending { remaining: usize },
    NothingToApply,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub debounce: Duration,
    pub forced_recheck_delay: Duration,
    pub diff_mode: DiffMode,
}

impl From<&CheckerSettings> for TrackerConfig {
    fn from(settings: &CheckerSettings) -> Self {
        Self {
            debounce: settings.debounce(),
            forced_recheck_delay: settings.forced_recheck_delay(),
            diff_mode: settings.diff_mode,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&CheckerSettings::default())
    }
}

#[derive(Debug, Default)]
struct TrackedField {
    snapshot: String,
    last_checked: Option<String>,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every restart; responses carrying an older value are stale.
    generation: u64,
    /// Generation of the check currently awaiting a response.
    checking: Option<u64>,
    badge: Badge,
    /// Badge state of the last completed check.
    settled: BadgeState,
    record: Option<CorrectionRecord>,
}

impl TrackedField {
    /// The record only describes the field while its text is the checked text
    /// and no newer check is running.
    fn current_record(&self, text: &str) -> Option<&CorrectionRecord> {
        let settled = self.checking.is_none() && self.last_checked.as_deref() == Some(text);
        self.record.as_ref().filter(|_| settled)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

pub struct FieldTracker {
    dom: Arc<dyn PageDom>,
    service: Arc<dyn CorrectionService>,
    config: TrackerConfig,
    fields: Mutex<HashMap<ElementId, TrackedField>>,
    popup: Mutex<Option<ElementId>>,
    model_ready: AtomicBool,
}

impl FieldTracker {
    pub fn new(
        dom: Arc<dyn PageDom>,
        service: Arc<dyn CorrectionService>,
        config: TrackerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            dom,
            service,
            config,
            fields: Mutex::new(HashMap::new()),
            popup: Mutex::new(None),
            model_ready: AtomicBool::new(false),
        })
    }

    pub async fn handle_event(self: &Arc<Self>, target: ElementId, event: FieldEvent) {
        if event == FieldEvent::Removed {
            self.forget(target).await;
            return;
        }

        let Some(root) = editable_root(self.dom.as_ref(), target) else {
            return;
        };
        if !self
            .dom
            .element(root)
            .is_some_and(|info| is_valid_text_field(&info))
        {
            return;
        }

        match event {
            FieldEvent::FocusIn => self.handle_field_input(root, Trigger::Focus).await,
            FieldEvent::Input => self.handle_field_input(root, Trigger::Edit).await,
            FieldEvent::Paste | FieldEvent::Cut => self.schedule_forced_recheck(root).await,
            FieldEvent::Removed => {}
        }
    }

    /// Writes `corrected` into the field and settles it as checked.
    pub async fn apply_correction(&self, root: ElementId, corrected: &str) {
        let mut fields = self.fields.lock().await;
        let entry = fields.entry(root).or_default();
        self.finalize(root, entry, corrected);
        self.close_popup_for(root).await;
    }

    pub async fn apply_all(&self, root: ElementId) -> ApplyOutcome {
        let mut fields = self.fields.lock().await;
        let Some(entry) = fields.get_mut(&root) else {
            return ApplyOutcome::NothingToApply;
        };
        let current = self
            .dom
            .text(root)
            .unwrap_or_else(|| entry.snapshot.clone());
        let Some(record) = entry.current_record(&current) else {
            debug!(field = %root, "suggestion is outdated; nothing applied");
            return ApplyOutcome::NothingToApply;
        };

        let corrected = record.corrected.clone();
        info!(field = %root, differences = record.count(), "applying all corrections");
        self.finalize(root, entry, &corrected);
        self.close_popup_for(root).await;
        ApplyOutcome::Finished
    }

    /// Applies the first pending change, then re-diffs against the target.
    pub async fn apply_next(&self, root: ElementId) -> ApplyOutcome {
        let mut fields = self.fields.lock().await;
        let Some(entry) = fields.get_mut(&root) else {
            return ApplyOutcome::NothingToApply;
        };
        let current = self
            .dom
            .text(root)
            .unwrap_or_else(|| entry.snapshot.clone());
        if entry.current_record(&current).is_none() {
            return ApplyOutcome::NothingToApply;
        }
        let Some(record) = entry.record.as_mut() else {
            return ApplyOutcome::NothingToApply;
        };
        let Some(updated) = record.apply_next(&current, self.config.diff_mode) else {
            return ApplyOutcome::NothingToApply;
        };

        if record.is_complete() {
            let corrected = record.corrected.clone();
            debug!(field = %root, "last pending change applied");
            self.finalize(root, entry, &corrected);
            self.close_popup_for(root).await;
            return ApplyOutcome::Finished;
        }

        let remaining = record.count();
        debug!(field = %root, remaining, "applied one correction");
        entry.cancel_timer();
        entry.generation += 1;
        entry.last_checked = Some(updated.clone());
        entry.snapshot = updated.clone();
        entry.settled = BadgeState::Errors(remaining);
        self.dom.set_text(root, &updated);
        self.dom.dispatch_change(root);
        self.set_badge(root, entry, BadgeState::Errors(remaining));
        self.refresh_popup(root, entry).await;
        ApplyOutcome::Pending { remaining }
    }

    /// Opens the suggestion popup for a badge click. Returns `false` when the
    /// field has nothing to suggest.
    pub async fn open_popup(&self, root: ElementId) -> bool {
        let fields = self.fields.lock().await;
        let Some(entry) = fields.get(&root) else {
            return false;
        };
        let current = self
            .dom
            .text(root)
            .unwrap_or_else(|| entry.snapshot.clone());
        let Some(record) = entry.current_record(&current) else {
            return false;
        };
        let view = PopupView::new(record, &current, self.config.diff_mode);

        let mut popup = self.popup.lock().await;
        if let Some(previous) = popup.replace(root) {
            if previous != root {
                self.dom.render_popup(previous, None);
            }
        }
        self.dom.render_popup(root, Some(&view));
        true
    }

    pub async fn handle_popup(&self, action: PopupAction) -> Option<ApplyOutcome> {
        let root = (*self.popup.lock().await)?;
        match action {
            PopupAction::ApplyAll => Some(self.apply_all(root).await),
            PopupAction::Next => Some(self.apply_next(root).await),
            PopupAction::Skip => {
                self.discard_suggestion(root).await;
                None
            }
            PopupAction::Close | PopupAction::OutsideClick | PopupAction::Escape => {
                debug!(field = %root, ?action, "popup dismissed");
                self.close_popup_for(root).await;
                None
            }
        }
    }

    /// Drops the pending suggestion. The text stays cached as checked, so it is
    /// not offered again until the field changes.
    pub async fn discard_suggestion(&self, root: ElementId) {
        let mut fields = self.fields.lock().await;
        if let Some(entry) = fields.get_mut(&root) {
            if entry.record.take().is_some() {
                debug!(field = %root, "suggestion skipped");
            }
            entry.settled = BadgeState::Hidden;
            self.set_badge(root, entry, BadgeState::Hidden);
        }
        self.close_popup_for(root).await;
    }

    pub async fn badge(&self, root: ElementId) -> Option<Badge> {
        self.fields.lock().await.get(&root).map(|entry| entry.badge)
    }

    pub async fn record(&self, root: ElementId) -> Option<CorrectionRecord> {
        let fields = self.fields.lock().await;
        fields.get(&root).and_then(|entry| entry.record.clone())
    }

    pub async fn last_checked(&self, root: ElementId) -> Option<String> {
        let fields = self.fields.lock().await;
        fields.get(&root).and_then(|entry| entry.last_checked.clone())
    }

    pub async fn popup_field(&self) -> Option<ElementId> {
        *self.popup.lock().await
    }

    /// Drops all state of a field that left the page.
    pub async fn forget(&self, root: ElementId) {
        let mut fields = self.fields.lock().await;
        if let Some(mut entry) = fields.remove(&root) {
            entry.cancel_timer();
            debug!(field = %root, "stopped tracking field");
        }
        self.close_popup_for(root).await;
    }

    pub fn is_model_ready(&self) -> bool {
        self.model_ready.load(Ordering::SeqCst)
    }

    pub async fn sync_model_status(&self) {
        match self.service.model_status().await {
            Ok(status) if status.ready => {
                info!("grammar model already loaded");
                self.model_ready.store(true, Ordering::SeqCst);
            }
            Ok(status) => {
                if status.loading {
                    info!(progress = status.progress, "grammar model loading");
                }
                self.model_ready.store(false, Ordering::SeqCst);
            }
            Err(error) => warn!("could not query model status: {}", error.error),
        }
    }

    pub fn handle_notification(&self, notification: &Notification) {
        match notification {
            Notification::ModelLoadingProgress { progress, status } => {
                debug!(progress, status = status.as_str(), "model loading");
            }
            Notification::ModelReady => {
                info!("grammar model is ready");
                self.model_ready.store(true, Ordering::SeqCst);
            }
            Notification::ModelError { error } => {
                warn!("grammar model failed to load: {error}");
                self.model_ready.store(false, Ordering::SeqCst);
            }
        }
    }

    pub fn spawn_notification_listener(
        self: &Arc<Self>,
        mut notifications: mpsc::UnboundedReceiver<Notification>,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                tracker.handle_notification(&notification);
            }
            debug!("page notification channel closed");
        })
    }

    async fn handle_field_input(self: &Arc<Self>, root: ElementId, trigger: Trigger) {
        let text = self.dom.text(root).unwrap_or_default();
        let mut fields = self.fields.lock().await;
        let entry = fields.entry(root).or_default();
        entry.snapshot = text.clone();

        if !has_enough_text(&text) {
            entry.cancel_timer();
            entry.generation += 1;
            entry.last_checked = None;
            entry.record = None;
            entry.settled = BadgeState::Hidden;
            self.set_badge(root, entry, BadgeState::Hidden);
            return;
        }

        if trigger == Trigger::Focus && entry.last_checked.as_deref() == Some(text.as_str()) {
            let state = entry.badge.state;
            self.set_badge(root, entry, state);
            return;
        }

        let same_as_checked = entry.last_checked.as_deref() == Some(text.as_str());
        if trigger != Trigger::Forced && same_as_checked && entry.checking.is_some() {
            // The in-flight check covers this text already.
            entry.cancel_timer();
            self.set_badge(root, entry, BadgeState::Loading);
            return;
        }

        entry.cancel_timer();
        if entry.checking.is_some() {
            // The in-flight result will be discarded, so its text never settled.
            entry.last_checked = None;
        }
        entry.generation += 1;
        let generation = entry.generation;
        self.set_badge(root, entry, BadgeState::Loading);

        let tracker = Arc::clone(self);
        let delay = self.config.debounce;
        let forced = trigger == Trigger::Forced;
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracker.fire(root, generation, forced).await;
        }));
    }

    async fn schedule_forced_recheck(self: &Arc<Self>, root: ElementId) {
        let mut fields = self.fields.lock().await;
        let entry = fields.entry(root).or_default();
        entry.cancel_timer();
        entry.last_checked = None;

        let tracker = Arc::clone(self);
        let delay = self.config.forced_recheck_delay;
        entry.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tracker.release_timer(root).await {
                tracker.handle_field_input(root, Trigger::Forced).await;
            }
        }));
    }

    /// Detaches a fired timer from its field. Returns `false` once the field is
    /// no longer tracked.
    async fn release_timer(&self, root: ElementId) -> bool {
        let mut fields = self.fields.lock().await;
        match fields.get_mut(&root) {
            Some(entry) => {
                entry.timer = None;
                true
            }
            None => false,
        }
    }

    async fn fire(&self, root: ElementId, generation: u64, forced: bool) {
        let text = self.dom.text(root).unwrap_or_default();
        {
            let mut fields = self.fields.lock().await;
            let Some(entry) = fields.get_mut(&root) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.timer = None;
            entry.snapshot = text.clone();

            if !has_enough_text(&text) {
                entry.last_checked = None;
                entry.settled = BadgeState::Hidden;
                self.set_badge(root, entry, BadgeState::Hidden);
                return;
            }

            if !forced && entry.last_checked.as_deref() == Some(text.as_str()) {
                debug!(field = %root, "text unchanged since last check; skipping");
                let settled = entry.settled;
                self.set_badge(root, entry, settled);
                return;
            }

            entry.last_checked = Some(text.clone());
            entry.checking = Some(generation);
        }

        debug!(field = %root, chars = text.chars().count(), "requesting grammar check");
        let result = self.service.correct(&text).await;
        self.finish_check(root, generation, &text, result).await;
    }

    async fn finish_check(
        &self,
        root: ElementId,
        generation: u64,
        checked: &str,
        result: Result<String, ErrorResponse>,
    ) {
        let mut fields = self.fields.lock().await;
        let Some(entry) = fields.get_mut(&root) else {
            debug!(field = %root, "field went away before the check finished");
            return;
        };
        if entry.checking == Some(generation) {
            entry.checking = None;
        }
        if entry.generation != generation {
            debug!(field = %root, "discarding stale grammar check result");
            return;
        }

        match result {
            Ok(corrected) => {
                let record = CorrectionRecord::new(checked, &corrected, self.config.diff_mode);
                let state = match &record {
                    Some(record) => BadgeState::Errors(record.count()),
                    None => BadgeState::Success,
                };
                info!(
                    field = %root,
                    differences = record.as_ref().map_or(0, CorrectionRecord::count),
                    "grammar check finished"
                );
                entry.record = record;
                entry.settled = state;
                self.set_badge(root, entry, state);
                self.refresh_popup(root, entry).await;
            }
            Err(error) => {
                warn!(field = %root, "grammar check failed: {}", error.error);
                entry.record = None;
                entry.last_checked = None;
                entry.settled = BadgeState::Hidden;
                self.set_badge(root, entry, BadgeState::Hidden);
                self.close_popup_for(root).await;
            }
        }
    }

    fn finalize(&self, root: ElementId, entry: &mut TrackedField, corrected: &str) {
        entry.cancel_timer();
        entry.generation += 1;
        // Set before dispatching so the echoed input event does not re-check.
        entry.last_checked = Some(corrected.to_string());
        entry.snapshot = corrected.to_string();
        entry.record = None;
        entry.settled = BadgeState::Success;
        self.dom.set_text(root, corrected);
        self.dom.dispatch_change(root);
        self.set_badge(root, entry, BadgeState::Success);
    }

    fn set_badge(&self, root: ElementId, entry: &mut TrackedField, state: BadgeState) {
        entry.badge = Badge {
            state,
            position: self.dom.bounds(root).map(position_for),
        };
        self.dom.render_badge(root, &entry.badge);
    }

    async fn refresh_popup(&self, root: ElementId, entry: &TrackedField) {
        let mut popup = self.popup.lock().await;
        if *popup != Some(root) {
            return;
        }
        match entry.record.as_ref() {
            Some(record) => {
                let view = PopupView::new(record, &entry.snapshot, self.config.diff_mode);
                self.dom.render_popup(root, Some(&view));
            }
            None => {
                *popup = None;
                self.dom.render_popup(root, None);
            }
        }
    }

    async fn close_popup_for(&self, root: ElementId) {
        let mut popup = self.popup.lock().await;
        if *popup == Some(root) {
            *popup = None;
            self.dom.render_popup(root, None);
        }
    }
}
