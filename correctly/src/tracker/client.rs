use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::coordinator::Coordinator;
use crate::coordinator::broadcast::PageId;
use crate::protocol::{
    Envelope, ErrorResponse, ModelStatusResponse, Notification, Request, Response,
};

/// What a page needs from the coordinator.
#[async_trait]
pub trait CorrectionService: Send + Sync {
    async fn correct(&self, text: &str) -> Result<String, ErrorResponse>;

    async fn model_status(&self) -> Result<ModelStatusResponse, ErrorResponse>;
}

/// Page-side end of the message channel to the coordinator.
#[derive(Clone)]
pub struct PageClient {
    coordinator: Arc<Coordinator>,
}

impl PageClient {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }

    async fn send(&self, request: Request) -> Result<Response, ErrorResponse> {
        self.coordinator
            .dispatch(Envelope::Page(request))
            .await
            .ok_or_else(|| ErrorResponse::new("coordinator sent no reply"))
    }
}

#[async_trait]
impl CorrectionService for PageClient {
    async fn correct(&self, text: &str) -> Result<String, ErrorResponse> {
        self.send(Request::CorrectGrammar {
            text: text.to_string(),
        })
        .await?
        .into_corrected_text()
    }

    async fn model_status(&self) -> Result<ModelStatusResponse, ErrorResponse> {
        match self.send(Request::GetModelStatus).await? {
            Response::Status(status) => Ok(status),
            Response::Error(error) => Err(error),
            other => Err(ErrorResponse::new(format!(
                "unexpected reply to getModelStatus: {other:?}"
            ))),
        }
    }
}

/// A page registered with the coordinator.
pub struct PageConnection {
    pub page_id: PageId,
    pub client: PageClient,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}
