//! Runtime for executing sessions
//!
//! Each session runs its own event loop ([`SessionRuntime`]); callers hold a
//! cloneable [`SessionHandle`]. Mutations travel to the loop as commands with
//! a oneshot reply, read-only queries use the latest published state.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use traits::*;

use crate::convert::{self, ConversionError, RenderFormat, RenderedView, ViewCache, ViewType, XmlEncoding};
use crate::llm::AiConfig;
use crate::process::CanonicalModel;
use crate::state_machine::{
    GenerationInput, InputMode, SessionContext, SessionState, TransitionError, ValidationError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use uuid::Uuid;

/// Settings shared by every session runtime
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Where uploads are staged while they are parsed
    pub upload_dir: PathBuf,
    pub gateway_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            upload_dir: std::env::temp_dir().join("promoai-uploads"),
            gateway_timeout: Duration::from_secs(600),
        }
    }
}

/// Errors reported to callers at the session boundary
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Session is busy ({phase}); wait for the current operation to finish")]
    Busy { phase: &'static str },
    #[error("No process model available")]
    NoModel,
    #[error(transparent)]
    Gateway(GatewayError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Operation abandoned because the input mode changed")]
    Superseded,
    #[error("Session is closed")]
    SessionClosed,
    #[error("Session not found: {0}")]
    NotFound(Uuid),
    #[error("{0}")]
    InvalidRequest(String),
}

impl From<TransitionError> for SessionError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Validation(v) => SessionError::Validation(v),
            TransitionError::Busy { phase } => SessionError::Busy { phase },
            TransitionError::NoModel => SessionError::NoModel,
            TransitionError::StaleResult { .. } | TransitionError::InvalidTransition(_) => {
                SessionError::InvalidRequest(e.to_string())
            }
        }
    }
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init { state: serde_json::Value },
    StateChange { state: serde_json::Value },
    Notice { message: String },
    Error { message: String },
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Requests handled by the session loop
#[derive(Debug)]
pub(crate) enum Command {
    SelectInputMode {
        mode: InputMode,
        reply: Reply<()>,
    },
    Generate {
        input: GenerationInput,
        reply: Reply<Uuid>,
    },
    ApplyFeedback {
        text: String,
        ai: AiConfig,
        reply: Reply<Uuid>,
    },
    DismissError {
        reply: Reply<()>,
    },
    /// Remember the selected view; nobody waits for it
    RecordView { view: ViewType },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<Arc<SessionState>>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    cache: Arc<ViewCache>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Latest published state
    pub fn snapshot(&self) -> Arc<SessionState> {
        Arc::clone(&self.state_rx.borrow())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.broadcast_tx.subscribe()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    pub async fn select_input_mode(&self, mode: InputMode) -> Result<(), SessionError> {
        self.request(|reply| Command::SelectInputMode { mode, reply })
            .await
    }

    /// Resolves when the generation finishes, with the new model's id
    pub async fn generate(&self, input: GenerationInput) -> Result<Uuid, SessionError> {
        self.request(|reply| Command::Generate { input, reply }).await
    }

    /// Resolves when the feedback round finishes, with the new model's id
    pub async fn apply_feedback(
        &self,
        text: impl Into<String>,
        ai: AiConfig,
    ) -> Result<Uuid, SessionError> {
        let text = text.into();
        self.request(|reply| Command::ApplyFeedback { text, ai, reply })
            .await
    }

    pub async fn dismiss_error(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::DismissError { reply }).await
    }

    fn current_model(&self) -> Result<Arc<CanonicalModel>, SessionError> {
        self.snapshot().model.clone().ok_or(SessionError::NoModel)
    }

    /// Render the current model; available while an operation is in flight
    pub fn select_view(
        &self,
        view: ViewType,
        format: RenderFormat,
    ) -> Result<Arc<RenderedView>, SessionError> {
        let model = self.current_model()?;
        let rendered = self.cache.get_or_render(&model, view, format)?;
        if self.command_tx.try_send(Command::RecordView { view }).is_err() {
            tracing::debug!(session_id = %self.id, view = %view, "View selection not recorded");
        }
        Ok(rendered)
    }

    pub fn export_bpmn(&self, encoding: XmlEncoding) -> Result<Vec<u8>, SessionError> {
        let model = self.current_model()?;
        Ok(convert::export_bpmn(&model, encoding)?)
    }

    pub fn export_pnml(&self) -> Result<Vec<u8>, SessionError> {
        let model = self.current_model()?;
        Ok(convert::export_pnml(&model)?)
    }
}

/// Manager for all session runtimes
pub struct SessionManager {
    gateway: Arc<dyn ModelGateway>,
    settings: RuntimeSettings,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionManager {
    pub fn new(gateway: Arc<dyn ModelGateway>, settings: RuntimeSettings) -> Self {
        Self {
            gateway,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session loop
    pub async fn create(&self, mode: InputMode) -> SessionHandle {
        let context = SessionContext::new(Uuid::new_v4());
        let handle = spawn_session(
            context,
            SessionState::new(mode),
            Arc::clone(&self.gateway),
            self.settings.clone(),
        );
        self.sessions
            .write()
            .await
            .insert(handle.id(), handle.clone());
        tracing::info!(session_id = %handle.id(), mode = %mode, "Session created");
        handle
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Forget a session; its loop stops once the last handle is dropped
    pub async fn close(&self, id: Uuid) -> Result<(), SessionError> {
        if self.sessions.write().await.remove(&id).is_none() {
            return Err(SessionError::NotFound(id));
        }
        tracing::info!(session_id = %id, "Session closed");
        Ok(())
    }
}

/// Spawn the loop of one session and return its handle
pub fn spawn_session<G>(
    context: SessionContext,
    state: SessionState,
    gateway: Arc<G>,
    settings: RuntimeSettings,
) -> SessionHandle
where
    G: ModelGateway + ?Sized + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(Arc::new(state.clone()));
    let (broadcast_tx, _) = broadcast::channel(128);
    let cache = Arc::new(ViewCache::new());

    let handle = SessionHandle {
        id: context.session_id,
        command_tx,
        state_rx,
        broadcast_tx: broadcast_tx.clone(),
        cache: Arc::clone(&cache),
    };

    let runtime = SessionRuntime::new(
        context,
        state,
        gateway,
        settings,
        command_rx,
        state_tx,
        broadcast_tx,
        cache,
    );
    tokio::spawn(runtime.run());

    handle
}
