//! Messages exchanged between pages, the coordinator and the model host.
//!
//! Every message travels inside an [`Envelope`] whose `role` names the sending
//! context, so routing never has to guess the origin from a sender URL.

use serde::{Deserialize, Serialize};

use crate::state::{HostStatus, ProgressPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Page,
    Coordinator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", content = "message", rename_all = "lowercase")]
pub enum Envelope {
    Page(Request),
    Host(HostEvent),
    Coordinator(Notification),
}

impl Envelope {
    pub fn role(&self) -> Role {
        match self {
            Envelope::Page(_) => Role::Page,
            Envelope::Host(_) => Role::Host,
            Envelope::Coordinator(_) => Role::Coordinator,
        }
    }
}

/// Request actions a page may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    LoadModel,
    GetModelStatus,
    CorrectGrammar { text: String },
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::LoadModel => "loadModel",
            Request::GetModelStatus => "getModelStatus",
            Request::CorrectGrammar { .. } => "correctGrammar",
        }
    }
}

/// Events the model host pushes to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostEvent {
    ProgressUpdate { progress: u8, status: ProgressPhase },
    ModelReady,
    ModelError { error: String },
}

/// Push notifications the coordinator broadcasts to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Notification {
    ModelLoadingProgress { progress: u8, status: ProgressPhase },
    ModelReady,
    ModelError { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub generated_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatusResponse {
    pub ready: bool,
    pub loading: bool,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

impl From<HostStatus> for ModelStatusResponse {
    fn from(status: HostStatus) -> Self {
        Self {
            ready: status.ready,
            loading: status.loading,
            progress: status.percent,
            phase: Some(status.phase.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            loading: None,
            progress: None,
        }
    }
}

/// Reply to a page [`Request`].
///
/// Variants are untagged on the wire; the order matters for deserialization
/// because serde tries them top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Corrected { result: Vec<GeneratedText> },
    Error(ErrorResponse),
    Status(ModelStatusResponse),
    Loaded { success: bool },
}

impl Response {
    pub fn corrected(text: impl Into<String>) -> Self {
        Response::Corrected {
            result: vec![GeneratedText {
                generated_text: text.into(),
            }],
        }
    }

    /// Extracts the corrected text of a `correctGrammar` reply.
    pub fn into_corrected_text(self) -> Result<String, ErrorResponse> {
        match self {
            Response::Corrected { result } => result
                .into_iter()
                .next()
                .map(|generated| generated.generated_text)
                .ok_or_else(|| ErrorResponse::new("empty correction result")),
            Response::Error(error) => Err(error),
            other => Err(ErrorResponse::new(format!(
                "unexpected reply to correctGrammar: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HostPhase;

    #[test]
    fn envelope_carries_explicit_role_tag() {
        let envelope = Envelope::Page(Request::CorrectGrammar {
            text: "My name are Naimur".to_string(),
        });
        let serialized = serde_json::to_string(&envelope).expect("envelope should serialize");

        assert!(serialized.contains("\"role\":\"page\""));
        assert!(serialized.contains("\"action\":\"correctGrammar\""));
        assert_eq!(envelope.role(), Role::Page);
    }

    #[test]
    fn host_events_parse_from_type_tag() {
        let payload = r#"{"role":"host","message":{"type":"progressUpdate","progress":42,"status":"downloading"}}"#;
        let parsed: Envelope = serde_json::from_str(payload).expect("host envelope should parse");

        assert_eq!(
            parsed,
            Envelope::Host(HostEvent::ProgressUpdate {
                progress: 42,
                status: ProgressPhase::Downloading,
            })
        );
    }

    #[test]
    fn notification_uses_action_names() {
        let serialized = serde_json::to_string(&Notification::ModelLoadingProgress {
            progress: 55,
            status: ProgressPhase::Downloading,
        })
        .expect("notification should serialize");

        assert_eq!(
            serialized,
            r#"{"action":"modelLoadingProgress","progress":55,"status":"downloading"}"#
        );
    }

    #[test]
    fn error_response_omits_absent_fields() {
        let serialized = serde_json::to_string(&Response::Error(ErrorResponse::new("Text too short")))
            .expect("error should serialize");
        assert_eq!(serialized, r#"{"error":"Text too short"}"#);
    }

    #[test]
    fn correction_reply_parses_back_into_text() {
        let payload = r#"{"result":[{"generated_text":"My name is Naimur"}]}"#;
        let parsed: Response = serde_json::from_str(payload).expect("reply should parse");

        assert_eq!(
            parsed.into_corrected_text().expect("text should be present"),
            "My name is Naimur"
        );
    }

    #[test]
    fn not_ready_error_parses_with_progress() {
        let payload = r#"{"error":"Model not ready yet. Please wait...","loading":true,"progress":30}"#;
        let parsed: Response = serde_json::from_str(payload).expect("reply should parse");

        let error = parsed
            .into_corrected_text()
            .expect_err("error reply should not yield text");
        assert_eq!(error.loading, Some(true));
        assert_eq!(error.progress, Some(30));
    }

    #[test]
    fn status_response_includes_phase_name() {
        let response = ModelStatusResponse::from(HostStatus::new(HostPhase::Loading, 12));
        assert_eq!(response.phase.as_deref(), Some("loading"));
        assert!(response.loading);
        assert_eq!(response.progress, 12);
    }
}
