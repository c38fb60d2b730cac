use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{HostError, ModelHost};
use crate::protocol::Request;
use crate::state::HostStatus;

const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("host context is closed")]
    Closed,
    #[error("host context dropped the request without replying")]
    NoReply,
}

/// Typed reply of the host context to one [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostReply {
    Loaded(Result<(), HostError>),
    Status(HostStatus),
    Corrected(Result<String, HostError>),
}

struct HostCommand {
    request: Request,
    reply_tx: oneshot::Sender<HostReply>,
}

/// Handle to the isolated execution context that serves the model host.
///
/// Requests are queued to a dedicated task; each one is answered on its own
/// task so a long load never blocks status queries.
#[derive(Clone)]
pub struct HostContext {
    command_tx: mpsc::Sender<HostCommand>,
}

impl HostContext {
    pub fn spawn(host: Arc<ModelHost>) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let worker = tokio::spawn(serve(host, command_rx));
        info!("host context created");
        (Self { command_tx }, worker)
    }

    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    pub async fn call(&self, request: Request) -> Result<HostReply, ContextError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(HostCommand { request, reply_tx })
            .await
            .map_err(|_| ContextError::Closed)?;
        reply_rx.await.map_err(|_| ContextError::NoReply)
    }
}

async fn serve(host: Arc<ModelHost>, mut command_rx: mpsc::Receiver<HostCommand>) {
    while let Some(command) = command_rx.recv().await {
        let host = Arc::clone(&host);
        tokio::spawn(async move {
            let action = command.request.action();
            let reply = match command.request {
                Request::LoadModel => HostReply::Loaded(host.initialize().await),
                Request::GetModelStatus => HostReply::Status(host.status()),
                Request::CorrectGrammar { text } => HostReply::Corrected(host.correct(&text).await),
            };
            if command.reply_tx.send(reply).is_err() {
                debug!(action, "requester went away before the host replied");
            }
        });
    }
    info!("host context stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostConfig;
    use crate::state::HostPhase;
    use crate::test_support::{FakeLoader, corrector_model};

    #[tokio::test(start_paused = true)]
    async fn context_serves_requests_until_dropped() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let host = Arc::new(ModelHost::new(
            Arc::new(FakeLoader::new(corrector_model())),
            HostConfig::default(),
            events_tx,
        ));
        let (context, worker) = HostContext::spawn(host);

        let status = context
            .call(Request::GetModelStatus)
            .await
            .expect("status should be served");
        assert_eq!(status, HostReply::Status(HostStatus::new(HostPhase::Unloaded, 0)));

        let loaded = context.call(Request::LoadModel).await.expect("load should be served");
        assert_eq!(loaded, HostReply::Loaded(Ok(())));

        let corrected = context
            .call(Request::CorrectGrammar {
                text: "My name are Naimur".to_string(),
            })
            .await
            .expect("correction should be served");
        assert_eq!(
            corrected,
            HostReply::Corrected(Ok("My name is Naimur".to_string()))
        );

        let handle = context.clone();
        drop(context);
        assert!(handle.is_alive());
        worker.abort();
        let _ = worker.await;
        assert!(!handle.is_alive());
        assert_eq!(
            handle.call(Request::GetModelStatus).await,
            Err(ContextError::Closed)
        );
    }
}
