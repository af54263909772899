//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    AiSettings, CreateSessionRequest, ErrorResponse, ExportQuery, FeedbackRequest,
    GenerateRequest, OperationResponse, ProviderInfo, ProvidersResponse, SelectModeRequest,
    SessionResponse, SuccessResponse, ViewQuery, ViewResponse,
};
use super::AppState;
use crate::convert::{RenderFormat, ViewType, XmlEncoding};
use crate::llm::{AiConfig, Provider};
use crate::runtime::{SessionError, SessionHandle, SseEvent};
use crate::state_machine::{GenerationInput, InputMode};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use uuid::Uuid;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(close_session))
        // Mutations
        .route("/api/sessions/:id/mode", post(select_mode))
        .route("/api/sessions/:id/generate", post(generate))
        .route("/api/sessions/:id/feedback", post(apply_feedback))
        .route("/api/sessions/:id/dismiss", post(dismiss_error))
        // Views and exports
        .route("/api/sessions/:id/view", get(select_view))
        .route("/api/sessions/:id/export/bpmn", get(export_bpmn))
        .route("/api/sessions/:id/export/pnml", get(export_pnml))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // Provider info
        .route("/api/providers", get(list_providers))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Json<SessionResponse> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let handle = state.sessions.create(req.mode).await;
    Json(snapshot_response(&handle))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    Ok(Json(snapshot_response(&handle)))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.close(id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

fn snapshot_response(handle: &SessionHandle) -> SessionResponse {
    SessionResponse {
        id: handle.id(),
        state: handle.snapshot(),
    }
}

// ============================================================
// Mutations
// ============================================================

async fn select_mode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SelectModeRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    handle.select_input_mode(req.mode).await?;
    Ok(Json(snapshot_response(&handle)))
}

async fn generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    let mode = handle.snapshot().input_mode;
    let input = generation_input(&state, mode, req)?;

    tracing::info!(session_id = %id, mode = %mode, "Generate requested");
    let model_id = handle.generate(input).await?;
    Ok(Json(OperationResponse {
        model_id,
        state: handle.snapshot(),
    }))
}

async fn apply_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<OperationResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    let ai = resolve_ai(&state, req.ai);

    tracing::info!(session_id = %id, provider = %ai.provider, "Feedback requested");
    let model_id = handle.apply_feedback(req.text, ai).await?;
    Ok(Json(OperationResponse {
        model_id,
        state: handle.snapshot(),
    }))
}

async fn dismiss_error(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    handle.dismiss_error().await?;
    Ok(Json(snapshot_response(&handle)))
}

fn resolve_ai(state: &AppState, settings: AiSettings) -> AiConfig {
    state
        .llm
        .resolve(settings.provider, settings.model_name, settings.api_key)
}

/// Build the payload for the session's current mode
fn generation_input(
    state: &AppState,
    mode: InputMode,
    req: GenerateRequest,
) -> Result<GenerationInput, AppError> {
    match mode {
        InputMode::Text => Ok(GenerationInput::Text {
            description: req.text.unwrap_or_default(),
            ai: resolve_ai(state, req.ai),
        }),
        InputMode::EventLog | InputMode::ExistingModel => {
            let file_name = req
                .file_name
                .ok_or_else(|| AppError::BadRequest("file_name is required".to_string()))?;
            let content = match req.content_base64 {
                Some(encoded) => base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| AppError::BadRequest(format!("Invalid base64 content: {e}")))?,
                None => Vec::new(),
            };
            Ok(if mode == InputMode::EventLog {
                GenerationInput::EventLog { file_name, content }
            } else {
                GenerationInput::ExistingModel { file_name, content }
            })
        }
    }
}

// ============================================================
// Views and Exports
// ============================================================

async fn select_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ViewResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    let view = match query.view {
        Some(v) => v.parse::<ViewType>().map_err(AppError::BadRequest)?,
        None => handle.snapshot().view,
    };
    let format = match query.format {
        Some(f) => f.parse::<RenderFormat>().map_err(AppError::BadRequest)?,
        None => RenderFormat::default(),
    };

    let rendered = handle.select_view(view, format)?;
    Ok(Json(ViewResponse {
        model_id: rendered.model_id,
        digest: rendered.digest.clone(),
        view: rendered.view.to_string(),
        content_type: rendered.format.content_type(),
        image: String::from_utf8_lossy(&rendered.image).into_owned(),
        bpmn_xml: String::from_utf8_lossy(&rendered.bpmn_xml).into_owned(),
        pnml: String::from_utf8_lossy(&rendered.pnml).into_owned(),
        initial_marking: rendered.initial_marking.clone(),
        final_marking: rendered.final_marking.clone(),
    }))
}

async fn export_bpmn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let handle = state.sessions.get(id).await?;
    let encoding = match query.encoding {
        Some(e) => e.parse::<XmlEncoding>().map_err(AppError::BadRequest)?,
        None => XmlEncoding::default(),
    };
    let bytes = handle.export_bpmn(encoding)?;
    let content_type = format!("application/xml; charset={}", encoding.label());
    Ok(download(&content_type, "process_model.bpmn", bytes))
}

async fn export_pnml(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let handle = state.sessions.get(id).await?;
    let bytes = handle.export_pnml()?;
    Ok(download("application/xml", "process_model.pnml", bytes))
}

fn download(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(id).await?;
    // Subscribe before reading the snapshot so no change falls in between
    let broadcast_rx = handle.subscribe();
    let init = SseEvent::Init {
        state: serde_json::to_value(&*handle.snapshot()).unwrap_or_default(),
    };
    Ok(sse_stream(init, broadcast_rx))
}

// ============================================================
// Provider Info
// ============================================================

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = Provider::ALL
        .into_iter()
        .map(|provider| ProviderInfo {
            id: provider,
            name: provider.display_name(),
            default_model: provider.default_model(),
            api_key_env_var: provider.api_key_env_var(),
            help: provider.key_help(),
            has_server_key: state.llm.gateway.is_some()
                || state.llm.api_keys.contains_key(&provider),
        })
        .collect();

    Json(ProvidersResponse {
        providers,
        default: state.llm.default_provider,
    })
}

async fn get_version() -> &'static str {
    concat!("promoai ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        let message = e.to_string();
        match e {
            SessionError::Validation(_) => AppError::BadRequest(message),
            SessionError::Busy { .. }
            | SessionError::NoModel
            | SessionError::Superseded
            | SessionError::InvalidRequest(_) => AppError::Conflict(message),
            SessionError::NotFound(_) | SessionError::SessionClosed => AppError::NotFound(message),
            SessionError::Gateway(_) => AppError::BadGateway(message),
            SessionError::Conversion(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
