//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::host::progress::ProgressSink;
use crate::host::{GrammarModel, ModelError, ModelLoader};
use crate::protocol::{ErrorResponse, ModelStatusResponse};
use crate::tracker::badge::Badge;
use crate::tracker::client::CorrectionService;
use crate::tracker::dom::{ElementId, ElementInfo, PageDom, Rect};
use crate::tracker::popup::PopupView;

fn known_correction(text: &str) -> String {
    match text {
        "My name are Naimur" => "My name is Naimur".to_string(),
        other => other.to_string(),
    }
}

/// Echoes its input except for a few known mistakes.
#[derive(Default)]
pub struct FakeModel {
    delay: Mutex<Duration>,
    last_input: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().expect("input lock").clone()
    }
}

#[async_trait]
impl GrammarModel for FakeModel {
    async fn generate(&self, text: &str) -> Result<String, ModelError> {
        *self.last_input.lock().expect("input lock") = Some(text.to_string());
        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(known_correction(text))
    }
}

pub fn corrector_model() -> Arc<FakeModel> {
    Arc::new(FakeModel::default())
}

pub struct FailingModel;

#[async_trait]
impl GrammarModel for FailingModel {
    async fn generate(&self, _text: &str) -> Result<String, ModelError> {
        Err(ModelError::new("inference backend crashed"))
    }
}

pub struct FakeLoader {
    model: Arc<dyn GrammarModel>,
    delay: Mutex<Duration>,
    progress: Vec<(String, f64)>,
    calls: AtomicUsize,
}

impl FakeLoader {
    pub fn new<M: GrammarModel + 'static>(model: Arc<M>) -> Self {
        Self {
            model,
            delay: Mutex::new(Duration::ZERO),
            progress: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn with_progress(mut self, progress: Vec<(&str, f64)>) -> Self {
        self.progress = progress
            .into_iter()
            .map(|(resource, percent)| (resource.to_string(), percent))
            .collect();
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }

    pub fn load_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for FakeLoader {
    async fn load(&self, progress: ProgressSink) -> Result<Arc<dyn GrammarModel>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (resource, percent) in &self.progress {
            progress.report(resource.as_str(), *percent, Some("progress"));
            tokio::task::yield_now().await;
        }

        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(Arc::clone(&self.model))
    }
}

struct FakeNode {
    info: ElementInfo,
    parent: Option<ElementId>,
    text: String,
    bounds: Rect,
}

/// In-memory page with render and change-event recording.
pub struct FakeDom {
    next_id: AtomicU64,
    nodes: Mutex<HashMap<ElementId, FakeNode>>,
    badges: Mutex<HashMap<ElementId, Badge>>,
    popup: Mutex<Option<(ElementId, PopupView)>>,
    changes: Mutex<HashMap<ElementId, usize>>,
}

impl FakeDom {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            nodes: Mutex::new(HashMap::new()),
            badges: Mutex::new(HashMap::new()),
            popup: Mutex::new(None),
            changes: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, info: ElementInfo, parent: Option<ElementId>, text: &str) -> ElementId {
        let id = ElementId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let node = FakeNode {
            info,
            parent,
            text: text.to_string(),
            bounds: Rect {
                left: 10.0,
                top: 10.0,
                width: 300.0,
                height: 40.0,
            },
        };
        self.nodes.lock().expect("nodes lock").insert(id, node);
        id
    }

    /// Changes the text the way a user edit would, without firing events.
    pub fn set_value(&self, id: ElementId, text: &str) {
        if let Some(node) = self.nodes.lock().expect("nodes lock").get_mut(&id) {
            node.text = text.to_string();
        }
    }

    pub fn value(&self, id: ElementId) -> Option<String> {
        self.text(id)
    }

    pub fn visible_badge(&self, id: ElementId) -> Option<Badge> {
        self.badges
            .lock()
            .expect("badges lock")
            .get(&id)
            .copied()
            .filter(|badge| badge.state.is_visible())
    }

    pub fn open_popup(&self) -> Option<PopupView> {
        self.popup
            .lock()
            .expect("popup lock")
            .as_ref()
            .map(|(_, view)| view.clone())
    }

    pub fn change_count(&self, id: ElementId) -> usize {
        self.changes
            .lock()
            .expect("changes lock")
            .get(&id)
            .copied()
            .unwrap_or(0)
    }
}

impl PageDom for FakeDom {
    fn element(&self, id: ElementId) -> Option<ElementInfo> {
        let nodes = self.nodes.lock().expect("nodes lock");
        nodes.get(&id).map(|node| node.info.clone())
    }

    fn parent(&self, id: ElementId) -> Option<ElementId> {
        let nodes = self.nodes.lock().expect("nodes lock");
        nodes.get(&id).and_then(|node| node.parent)
    }

    fn text(&self, id: ElementId) -> Option<String> {
        let nodes = self.nodes.lock().expect("nodes lock");
        nodes.get(&id).map(|node| node.text.clone())
    }

    fn set_text(&self, id: ElementId, text: &str) {
        self.set_value(id, text);
    }

    fn dispatch_change(&self, id: ElementId) {
        *self
            .changes
            .lock()
            .expect("changes lock")
            .entry(id)
            .or_default() += 1;
    }

    fn bounds(&self, id: ElementId) -> Option<Rect> {
        let nodes = self.nodes.lock().expect("nodes lock");
        nodes.get(&id).map(|node| node.bounds)
    }

    fn render_badge(&self, id: ElementId, badge: &Badge) {
        self.badges.lock().expect("badges lock").insert(id, *badge);
    }

    fn render_popup(&self, id: ElementId, popup: Option<&PopupView>) {
        let mut current = self.popup.lock().expect("popup lock");
        *current = popup.map(|view| (id, view.clone()));
    }
}

/// Correction service that answers from a reply table, echoing unknown text.
pub struct FakeService {
    replies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
    delay: Duration,
    failing: bool,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            failing: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn set_reply(&self, text: &str, corrected: &str) {
        self.replies
            .lock()
            .expect("replies lock")
            .insert(text.to_string(), corrected.to_string());
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CorrectionService for FakeService {
    async fn correct(&self, text: &str) -> Result<String, ErrorResponse> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(text.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing {
            return Err(ErrorResponse::new("model host unavailable"));
        }

        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .get(text)
            .cloned();
        Ok(reply.unwrap_or_else(|| known_correction(text)))
    }

    async fn model_status(&self) -> Result<ModelStatusResponse, ErrorResponse> {
        Ok(ModelStatusResponse {
            ready: true,
            loading: false,
            progress: 100,
            phase: Some("ready".to_string()),
        })
    }
}
