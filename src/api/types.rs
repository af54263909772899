//! API request and response types

use crate::llm::Provider;
use crate::process::Marking;
use crate::state_machine::{InputMode, SessionState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Request to create a new session
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub mode: InputMode,
}

/// AI settings sent with a request; omitted fields fall back to the server
/// configuration
#[derive(Debug, Default, Deserialize)]
pub struct AiSettings {
    pub provider: Option<Provider>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
}

/// Request to switch the input mode
#[derive(Debug, Deserialize)]
pub struct SelectModeRequest {
    pub mode: InputMode,
}

/// Request to generate a model
///
/// Text mode uses `text`; the upload modes use `file_name` and
/// `content_base64`.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub text: Option<String>,
    pub file_name: Option<String>,
    pub content_base64: Option<String>,
    #[serde(default)]
    pub ai: AiSettings,
}

/// Request to apply one round of feedback
#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub text: String,
    #[serde(default)]
    pub ai: AiSettings,
}

/// Query of the view endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(rename = "type")]
    pub view: Option<String>,
    pub format: Option<String>,
}

/// Query of the BPMN export endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub encoding: Option<String>,
}

/// Response with a session snapshot
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub state: Arc<SessionState>,
}

/// Response of a finished generate or feedback call
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub model_id: Uuid,
    pub state: Arc<SessionState>,
}

/// Rendered view metadata; the image and both export documents are carried
/// as text
#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub model_id: Uuid,
    pub digest: String,
    pub view: String,
    pub content_type: &'static str,
    pub image: String,
    /// UTF-8 BPMN 2.0 document of the same model
    pub bpmn_xml: String,
    pub pnml: String,
    pub initial_marking: Marking,
    pub final_marking: Marking,
}

/// AI provider with its defaults
#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub id: Provider,
    pub name: &'static str,
    pub default_model: &'static str,
    pub api_key_env_var: &'static str,
    pub help: &'static str,
    /// A fallback key is configured on the server
    pub has_server_key: bool,
}

/// Response for the provider list
#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
    pub default: Provider,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
