use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::protocol::Notification;

pub type PageId = u64;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("page {0} has no notification listener")]
    RecipientUnavailable(PageId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Best-effort fan-out of notifications to every connected page.
///
/// Pages come and go without telling anyone; a failed delivery only prunes the
/// recipient and is counted, never surfaced.
pub struct Broadcaster {
    next_id: AtomicU64,
    recipients: Mutex<HashMap<PageId, mpsc::UnboundedSender<Notification>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            recipients: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self) -> (PageId, mpsc::UnboundedReceiver<Notification>) {
        let page_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.recipients.lock().await.insert(page_id, tx);
        debug!(page_id, "page connected");
        (page_id, rx)
    }

    pub async fn recipient_count(&self) -> usize {
        self.recipients.lock().await.len()
    }

    pub async fn broadcast(&self, notification: &Notification) -> DeliveryReport {
        let mut recipients = self.recipients.lock().await;
        let mut report = DeliveryReport::default();
        let mut gone = Vec::new();

        for (page_id, tx) in recipients.iter() {
            match deliver(*page_id, tx, notification) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    debug!("dropping notification: {err}");
                    report.dropped += 1;
                    gone.push(*page_id);
                }
            }
        }

        for page_id in gone {
            recipients.remove(&page_id);
        }

        report
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(
    page_id: PageId,
    tx: &mpsc::UnboundedSender<Notification>,
    notification: &Notification,
) -> Result<(), DeliveryError> {
    tx.send(notification.clone())
        .map_err(|_| DeliveryError::RecipientUnavailable(page_id))
}
