//! Session runtime executor

use super::traits::{GatewayError, ModelGateway};
use super::{Command, Reply, RuntimeSettings, SessionError, SseEvent};

use crate::convert::ViewCache;
use crate::ingest::{self, IngestError, ScopedUpload};
use crate::llm::AiConfig;
use crate::process::CanonicalModel;
use crate::state_machine::{
    transition, Effect, Event, GenerationInput, OperationTicket, SessionContext, SessionState,
    TransitionError,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

/// Event loop of one session, generic over the gateway it dispatches to
pub struct SessionRuntime<G: ModelGateway + ?Sized + 'static> {
    context: SessionContext,
    state: SessionState,
    gateway: Arc<G>,
    settings: RuntimeSettings,
    command_rx: mpsc::Receiver<Command>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    state_tx: watch::Sender<Arc<SessionState>>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    cache: Arc<ViewCache>,
    /// Callers waiting for a generate or feedback round to finish
    pending: HashMap<OperationTicket, Reply<Uuid>>,
}

impl<G: ModelGateway + ?Sized + 'static> SessionRuntime<G> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: SessionContext,
        state: SessionState,
        gateway: Arc<G>,
        settings: RuntimeSettings,
        command_rx: mpsc::Receiver<Command>,
        state_tx: watch::Sender<Arc<SessionState>>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        cache: Arc<ViewCache>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            context,
            state,
            gateway,
            settings,
            command_rx,
            event_rx,
            event_tx,
            state_tx,
            broadcast_tx,
            cache,
            pending: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        let session_id = self.context.session_id;
        tracing::info!(session_id = %session_id, "Starting session runtime");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    // Every handle is gone
                    None => break,
                },
                Some(event) = self.event_rx.recv() => self.handle_completion(event),
            }
        }

        tracing::info!(
            session_id = %session_id,
            abandoned = self.pending.len(),
            "Session runtime stopped"
        );
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SelectInputMode { mode, reply } => {
                let outcome = self.apply(Event::SelectInputMode { mode });
                let _ = reply.send(outcome.map_err(SessionError::from));
            }
            Command::Generate { input, reply } => {
                self.dispatch(Event::Generate { input }, reply);
            }
            Command::ApplyFeedback { text, ai, reply } => {
                self.dispatch(Event::ApplyFeedback { text, ai }, reply);
            }
            Command::DismissError { reply } => {
                let outcome = self.apply(Event::DismissError);
                let _ = reply.send(outcome.map_err(SessionError::from));
            }
            Command::RecordView { view } => {
                if let Err(e) = self.apply(Event::SelectView { view }) {
                    tracing::debug!(error = %e, "View selection ignored");
                }
            }
        }
    }

    /// Start an operation; the reply is kept until its completion arrives
    fn dispatch(&mut self, event: Event, reply: Reply<Uuid>) {
        let result = match transition(&self.state, &self.context, event) {
            Ok(result) => result,
            Err(e) => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    phase = self.state.phase.name(),
                    error = %e,
                    "Operation refused"
                );
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        if let Some(ticket) = result.new_state.phase.pending_ticket() {
            self.pending.insert(ticket, reply);
        }
        self.commit(result.new_state, result.effects);
    }

    fn handle_completion(&mut self, event: Event) {
        let name = event.name();
        match self.apply(event) {
            Ok(()) => {}
            Err(TransitionError::StaleResult { ticket }) => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    ticket = %ticket,
                    event = name,
                    "Discarded stale result"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    event = name,
                    error = %e,
                    "Completion rejected"
                );
            }
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), TransitionError> {
        let result = transition(&self.state, &self.context, event)?;
        self.commit(result.new_state, result.effects);
        Ok(())
    }

    fn commit(&mut self, new_state: SessionState, effects: Vec<Effect>) {
        if new_state.phase != self.state.phase {
            tracing::info!(
                session_id = %self.context.session_id,
                from = self.state.phase.name(),
                to = new_state.phase.name(),
                model_id = ?new_state.model_id(),
                "Phase change"
            );
        }
        self.state = new_state;
        self.state_tx.send_replace(Arc::new(self.state.clone()));

        for effect in effects {
            self.execute_effect(effect);
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::RunGeneration { ticket, input } => {
                let gateway = Arc::clone(&self.gateway);
                let upload_dir = self.settings.upload_dir.clone();
                let operation = run_generation(gateway, upload_dir, input);
                self.spawn_operation("generate", ticket, operation, |ticket, outcome| {
                    match outcome {
                        Ok(model) => Event::GenerationSucceeded { ticket, model },
                        Err(error) => Event::GenerationFailed { ticket, error },
                    }
                });
            }

            Effect::RunUpdate {
                ticket,
                model,
                feedback,
                ai,
            } => {
                let gateway = Arc::clone(&self.gateway);
                let operation = run_update(gateway, model, feedback, ai);
                self.spawn_operation("update", ticket, operation, |ticket, outcome| {
                    match outcome {
                        Ok(model) => Event::UpdateSucceeded { ticket, model },
                        Err(error) => Event::UpdateFailed { ticket, error },
                    }
                });
            }

            Effect::ResolveOperation { ticket, outcome } => {
                if let Some(reply) = self.pending.remove(&ticket) {
                    let _ = reply.send(outcome.map_err(SessionError::Gateway));
                }
            }

            Effect::AbandonOperation { ticket } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    ticket = %ticket,
                    "Abandoned pending operation"
                );
                if let Some(reply) = self.pending.remove(&ticket) {
                    let _ = reply.send(Err(SessionError::Superseded));
                }
            }

            Effect::RetainViews { model_id } => {
                self.cache.retain_model(model_id);
            }

            Effect::NotifyClient { event_type, data } => {
                let event = match event_type.as_str() {
                    "state_change" => SseEvent::StateChange {
                        state: serde_json::to_value(&self.state).unwrap_or(Value::Null),
                    },
                    "error" => SseEvent::Error {
                        message: message_of(&data),
                    },
                    _ => SseEvent::Notice {
                        message: message_of(&data),
                    },
                };
                let _ = self.broadcast_tx.send(event);
            }
        }
    }

    /// Run a gateway call as a background task that reports back as an event
    fn spawn_operation<F>(
        &self,
        operation: &'static str,
        ticket: OperationTicket,
        call: F,
        to_event: fn(OperationTicket, Result<CanonicalModel, GatewayError>) -> Event,
    ) where
        F: Future<Output = Result<CanonicalModel, GatewayError>> + Send + 'static,
    {
        let event_tx = self.event_tx.clone();
        let session_id = self.context.session_id;
        let timeout = self.settings.gateway_timeout;

        tracing::info!(
            session_id = %session_id,
            ticket = %ticket,
            operation,
            "Dispatching gateway call"
        );

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = with_timeout(timeout, call).await;
            let duration_ms = started.elapsed().as_millis();
            match &outcome {
                Ok(model) => tracing::info!(
                    session_id = %session_id,
                    ticket = %ticket,
                    operation,
                    duration_ms,
                    model_id = %model.id,
                    "Gateway call succeeded"
                ),
                Err(e) => tracing::warn!(
                    session_id = %session_id,
                    ticket = %ticket,
                    operation,
                    duration_ms,
                    kind = %e.kind,
                    error = %e,
                    "Gateway call failed"
                ),
            }
            // The loop may already be gone
            let _ = event_tx.send(to_event(ticket, outcome)).await;
        });
    }
}

fn message_of(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn with_timeout<F>(limit: Duration, call: F) -> Result<CanonicalModel, GatewayError>
where
    F: Future<Output = Result<CanonicalModel, GatewayError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::timeout(limit)))
}

async fn run_generation<G: ModelGateway + ?Sized>(
    gateway: Arc<G>,
    upload_dir: PathBuf,
    input: GenerationInput,
) -> Result<CanonicalModel, GatewayError> {
    match input {
        GenerationInput::Text { description, ai } => {
            gateway.generate_from_text(&description, &ai).await
        }
        GenerationInput::EventLog { file_name, content } => {
            let log =
                read_upload(upload_dir, file_name.clone(), content, ingest::read_event_log).await?;
            gateway.generate_from_log(&file_name, log).await
        }
        GenerationInput::ExistingModel { file_name, content } => {
            let model =
                read_upload(upload_dir, file_name.clone(), content, ingest::read_model).await?;
            gateway.generate_from_model(&file_name, model).await
        }
    }
}

async fn run_update<G: ModelGateway + ?Sized>(
    gateway: Arc<G>,
    model: Arc<CanonicalModel>,
    feedback: String,
    ai: AiConfig,
) -> Result<CanonicalModel, GatewayError> {
    gateway.update(&model, &feedback, &ai).await
}

/// Stage the bytes, parse them once on a blocking thread, and remove the file
async fn read_upload<T: Send + 'static>(
    upload_dir: PathBuf,
    file_name: String,
    content: Vec<u8>,
    read: fn(ScopedUpload) -> Result<T, IngestError>,
) -> Result<T, GatewayError> {
    let parsed = tokio::task::spawn_blocking(move || {
        let upload = ScopedUpload::stage(&upload_dir, &file_name, &content)?;
        read(upload)
    })
    .await?;
    Ok(parsed?)
}
