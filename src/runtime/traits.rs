//! Trait abstractions for runtime I/O
//!
//! The executor talks to the slow, failure-prone engines only through
//! [`ModelGateway`], so it can be tested with mock implementations.

use crate::engine::{self, AiEngine, EngineError, PlayoutLimits};
use crate::ingest::IngestError;
use crate::llm::{AiConfig, LlmError, LlmErrorKind};
use crate::process::{CanonicalModel, EventLog, ModelOrigin, ParsedModel, TreeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Cause of a failed gateway call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    Network,
    Auth,
    RateLimit,
    MalformedResponse,
    Parse,
    Discovery,
    Timeout,
    Internal,
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayErrorKind::Network => "network",
            GatewayErrorKind::Auth => "auth",
            GatewayErrorKind::RateLimit => "rate_limit",
            GatewayErrorKind::MalformedResponse => "malformed_response",
            GatewayErrorKind::Parse => "parse",
            GatewayErrorKind::Discovery => "discovery",
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Failure of a generate or update call; the model it was given is untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            format!("Operation timed out after {}s", after.as_secs()),
        )
    }
}

impl From<LlmError> for GatewayError {
    fn from(e: LlmError) -> Self {
        let kind = match e.kind {
            LlmErrorKind::Network | LlmErrorKind::ServerError => GatewayErrorKind::Network,
            LlmErrorKind::RateLimit => GatewayErrorKind::RateLimit,
            LlmErrorKind::Auth => GatewayErrorKind::Auth,
            LlmErrorKind::InvalidRequest | LlmErrorKind::Unknown => GatewayErrorKind::Internal,
        };
        Self::new(kind, e.message)
    }
}

impl From<EngineError> for GatewayError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Llm(e) => e.into(),
            EngineError::Malformed { .. } => {
                Self::new(GatewayErrorKind::MalformedResponse, e.to_string())
            }
            EngineError::Unsupported(_) => Self::new(GatewayErrorKind::Parse, e.to_string()),
            EngineError::Discovery(_) | EngineError::Playout(_) => {
                Self::new(GatewayErrorKind::Discovery, e.to_string())
            }
        }
    }
}

impl From<IngestError> for GatewayError {
    fn from(e: IngestError) -> Self {
        let kind = match e {
            IngestError::Io(_) => GatewayErrorKind::Internal,
            _ => GatewayErrorKind::Parse,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::new(GatewayErrorKind::Internal, format!("Worker task failed: {e}"))
    }
}

/// The external operations a session dispatches off its event loop
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate_from_text(
        &self,
        description: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError>;

    async fn generate_from_log(
        &self,
        file_name: &str,
        log: EventLog,
    ) -> Result<CanonicalModel, GatewayError>;

    async fn generate_from_model(
        &self,
        file_name: &str,
        model: ParsedModel,
    ) -> Result<CanonicalModel, GatewayError>;

    /// A new model value; `model` itself is never modified
    async fn update(
        &self,
        model: &CanonicalModel,
        feedback: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError>;
}

// ============================================================================
// Arc implementation for trait objects
// ============================================================================

#[async_trait]
impl<T: ModelGateway + ?Sized> ModelGateway for Arc<T> {
    async fn generate_from_text(
        &self,
        description: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        (**self).generate_from_text(description, ai).await
    }

    async fn generate_from_log(
        &self,
        file_name: &str,
        log: EventLog,
    ) -> Result<CanonicalModel, GatewayError> {
        (**self).generate_from_log(file_name, log).await
    }

    async fn generate_from_model(
        &self,
        file_name: &str,
        model: ParsedModel,
    ) -> Result<CanonicalModel, GatewayError> {
        (**self).generate_from_model(file_name, model).await
    }

    async fn update(
        &self,
        model: &CanonicalModel,
        feedback: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        (**self).update(model, feedback, ai).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Gateway backed by the AI engine, discovery and play-out
pub struct EngineGateway {
    ai: AiEngine,
    limits: PlayoutLimits,
}

impl EngineGateway {
    pub fn new(ai: AiEngine, limits: PlayoutLimits) -> Self {
        Self { ai, limits }
    }
}

fn invalid_tree(kind: GatewayErrorKind) -> impl Fn(TreeError) -> GatewayError {
    move |e| GatewayError::new(kind, e.to_string())
}

#[async_trait]
impl ModelGateway for EngineGateway {
    async fn generate_from_text(
        &self,
        description: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        let tree = self.ai.generate(ai, description).await?;
        CanonicalModel::new(
            tree,
            ModelOrigin::Text {
                description: description.to_string(),
            },
        )
        .map_err(invalid_tree(GatewayErrorKind::MalformedResponse))
    }

    async fn generate_from_log(
        &self,
        file_name: &str,
        log: EventLog,
    ) -> Result<CanonicalModel, GatewayError> {
        let traces = log.len();
        let started = Instant::now();
        let tree = tokio::task::spawn_blocking(move || engine::discover(&log)).await??;
        tracing::info!(
            file_name = %file_name,
            traces,
            duration_ms = started.elapsed().as_millis(),
            "Discovered process tree"
        );
        CanonicalModel::new(
            tree,
            ModelOrigin::EventLog {
                file_name: file_name.to_string(),
                traces,
            },
        )
        .map_err(invalid_tree(GatewayErrorKind::Discovery))
    }

    async fn generate_from_model(
        &self,
        file_name: &str,
        model: ParsedModel,
    ) -> Result<CanonicalModel, GatewayError> {
        let format = model.format();
        let limits = self.limits;
        let started = Instant::now();
        let tree = tokio::task::spawn_blocking(move || {
            let net = match model {
                ParsedModel::Bpmn(graph) => engine::bpmn_to_petri(&graph)?,
                ParsedModel::PetriNet(net) => net,
            };
            let log = engine::play_out(&net, limits)?;
            engine::discover(&log)
        })
        .await??;
        tracing::info!(
            file_name = %file_name,
            format = ?format,
            duration_ms = started.elapsed().as_millis(),
            "Imported existing model"
        );
        CanonicalModel::new(
            tree,
            ModelOrigin::ExistingModel {
                file_name: file_name.to_string(),
                format,
            },
        )
        .map_err(invalid_tree(GatewayErrorKind::Discovery))
    }

    async fn update(
        &self,
        model: &CanonicalModel,
        feedback: &str,
        ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        let tree = self
            .ai
            .update(ai, model.tree(), model.description(), feedback)
            .await?;
        model
            .derive(tree)
            .map_err(invalid_tree(GatewayErrorKind::MalformedResponse))
    }
}
