//! Mock implementations for testing
//!
//! These mocks enable integration testing of the session loop without
//! provider calls or engines.

use super::traits::*;
use super::{spawn_session, RuntimeSettings, SessionHandle};
use crate::llm::{AiConfig, LlmError, LlmRequest, LlmResponse, LlmService, Usage};
use crate::process::{CanonicalModel, EventLog, ModelOrigin, ParsedModel, ProcessTree};
use crate::state_machine::{InputMode, SessionContext, SessionState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text answer
    pub fn queue_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(LlmResponse {
            text: text.to_string(),
            usage: Usage::default(),
        }));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Gateway
// ============================================================================

/// Mock gateway that answers every call with the next queued tree
///
/// A gated mock holds each call until [`MockGateway::release`] is notified,
/// which lets tests act while an operation is in flight.
pub struct MockGateway {
    results: Mutex<VecDeque<Result<ProcessTree, GatewayError>>>,
    /// One line per call, `operation:argument`
    pub calls: Mutex<Vec<String>>,
    gated: bool,
    /// Notified when a call starts (for test synchronization)
    pub call_started: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gated: false,
            call_started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    pub fn queue_tree(&self, tree: ProcessTree) {
        self.results.lock().unwrap().push_back(Ok(tree));
    }

    pub fn queue_error(&self, error: GatewayError) {
        self.results.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn next(&self, call: String) -> Result<ProcessTree, GatewayError> {
        self.calls.lock().unwrap().push(call);
        self.call_started.notify_one();
        if self.gated {
            self.release.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(GatewayError::new(
                    GatewayErrorKind::Internal,
                    "No mock result queued",
                ))
            })
    }

    fn install(tree: ProcessTree, origin: ModelOrigin) -> Result<CanonicalModel, GatewayError> {
        CanonicalModel::new(tree, origin)
            .map_err(|e| GatewayError::new(GatewayErrorKind::MalformedResponse, e.to_string()))
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn generate_from_text(
        &self,
        description: &str,
        _ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        let tree = self.next(format!("generate_from_text:{description}")).await?;
        Self::install(
            tree,
            ModelOrigin::Text {
                description: description.to_string(),
            },
        )
    }

    async fn generate_from_log(
        &self,
        file_name: &str,
        log: EventLog,
    ) -> Result<CanonicalModel, GatewayError> {
        let traces = log.len();
        let tree = self
            .next(format!("generate_from_log:{file_name}:{traces}"))
            .await?;
        Self::install(
            tree,
            ModelOrigin::EventLog {
                file_name: file_name.to_string(),
                traces,
            },
        )
    }

    async fn generate_from_model(
        &self,
        file_name: &str,
        model: ParsedModel,
    ) -> Result<CanonicalModel, GatewayError> {
        let format = model.format();
        let tree = self
            .next(format!("generate_from_model:{file_name}"))
            .await?;
        Self::install(
            tree,
            ModelOrigin::ExistingModel {
                file_name: file_name.to_string(),
                format,
            },
        )
    }

    async fn update(
        &self,
        model: &CanonicalModel,
        feedback: &str,
        _ai: &AiConfig,
    ) -> Result<CanonicalModel, GatewayError> {
        let tree = self.next(format!("update:{feedback}")).await?;
        model
            .derive(tree)
            .map_err(|e| GatewayError::new(GatewayErrorKind::MalformedResponse, e.to_string()))
    }
}

// ============================================================================
// Test Session
// ============================================================================

/// A running session wired to a mock gateway and a private upload directory
pub struct TestSession {
    pub handle: SessionHandle,
    pub gateway: Arc<MockGateway>,
    pub upload_dir: TempDir,
}

impl TestSession {
    pub fn new(mode: InputMode, gateway: MockGateway) -> Self {
        Self::with_timeout(mode, gateway, Duration::from_secs(10))
    }

    pub fn with_timeout(mode: InputMode, gateway: MockGateway, timeout: Duration) -> Self {
        let upload_dir = TempDir::new().unwrap();
        let gateway = Arc::new(gateway);
        let settings = RuntimeSettings {
            upload_dir: upload_dir.path().to_path_buf(),
            gateway_timeout: timeout,
        };
        let handle = spawn_session(
            SessionContext::new(Uuid::new_v4()),
            SessionState::new(mode),
            Arc::clone(&gateway),
            settings,
        );
        Self {
            handle,
            gateway,
            upload_dir,
        }
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&Arc<SessionState>) -> bool,
        timeout: Duration,
    ) -> bool {
        let mut rx = self.handle.state_rx.clone();
        let reached = matches!(
            tokio::time::timeout(timeout, rx.wait_for(predicate)).await,
            Ok(Ok(_))
        );
        reached
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }
}

pub fn test_ai() -> AiConfig {
    AiConfig {
        provider: crate::llm::Provider::Google,
        model_name: "gemini-2.5-pro".to_string(),
        api_key: "test-key".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{RenderFormat, ViewType, XmlEncoding};
    use crate::runtime::{SessionError, SessionManager, SseEvent};
    use crate::state_machine::state::Phase;
    use crate::state_machine::GenerationInput;

    const WAIT: Duration = Duration::from_secs(2);

    fn approve_reject() -> ProcessTree {
        ProcessTree::sequence(vec![
            ProcessTree::activity("approve"),
            ProcessTree::activity("reject"),
        ])
    }

    fn text(description: &str) -> GenerationInput {
        GenerationInput::Text {
            description: description.to_string(),
            ai: test_ai(),
        }
    }

    const ORDERS_XES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log xes.version="1.0">
  <trace>
    <string key="concept:name" value="case-1"/>
    <event><string key="concept:name" value="register"/></event>
    <event><string key="concept:name" value="approve"/></event>
  </trace>
  <trace>
    <string key="concept:name" value="case-2"/>
    <event><string key="concept:name" value="register"/></event>
    <event><string key="concept:name" value="reject"/></event>
  </trace>
</log>"#;

    #[tokio::test]
    async fn test_mock_llm_service() {
        let mock = MockLlmService::new("test-model");
        mock.queue_text("Hello");

        let request = LlmRequest {
            system: String::new(),
            messages: vec![],
            max_tokens: Some(100),
        };

        let response = mock.complete(&request).await.unwrap();
        assert_eq!(response.text, "Hello");

        // Second call should fail (no more responses)
        assert!(mock.complete(&request).await.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    /// Text mode: generate, then one feedback round
    #[tokio::test]
    async fn test_text_generate_then_feedback() {
        let gateway = MockGateway::new();
        gateway.queue_tree(approve_reject());
        gateway.queue_tree(ProcessTree::activity("approve"));
        let session = TestSession::new(InputMode::Text, gateway);

        let first = session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap();
        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Ready);
        assert!(state.ledger.is_empty());
        assert_eq!(state.model_id(), Some(first));

        let second = session
            .handle
            .apply_feedback("skip the reject step", test_ai())
            .await
            .unwrap();
        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.ledger.all(), vec!["skip the reject step"]);
        assert_ne!(second, first);
        let model = state.model.as_ref().unwrap();
        assert_eq!(model.id, second);
        assert_eq!(model.parent, Some(first));

        assert_eq!(
            session.gateway.recorded_calls(),
            [
                "generate_from_text:approve then reject",
                "update:skip the reject step"
            ]
        );
    }

    /// Event log mode: a malformed upload fails in the gateway path
    #[tokio::test]
    async fn test_malformed_log_fails_without_model() {
        let session = TestSession::new(InputMode::EventLog, MockGateway::new());

        let err = session
            .handle
            .generate(GenerationInput::EventLog {
                file_name: "orders.xes".to_string(),
                content: b"<log><trace>".to_vec(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Gateway(ref e) if e.kind == GatewayErrorKind::Parse));
        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Failed);
        assert!(state.model.is_none());
        assert_eq!(
            state.last_error.as_ref().map(|e| e.kind),
            Some(GatewayErrorKind::Parse)
        );
        assert!(session.gateway.recorded_calls().is_empty());
        assert_eq!(session.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_log_upload_parsed_and_removed() {
        let gateway = MockGateway::new();
        gateway.queue_tree(approve_reject());
        let session = TestSession::new(InputMode::EventLog, gateway);

        session
            .handle
            .generate(GenerationInput::EventLog {
                file_name: "orders.xes".to_string(),
                content: ORDERS_XES.as_bytes().to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(
            session.gateway.recorded_calls(),
            ["generate_from_log:orders.xes:2"]
        );
        assert_eq!(session.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_extension_never_reaches_gateway() {
        let session = TestSession::new(InputMode::ExistingModel, MockGateway::new());

        let err = session
            .handle
            .generate(GenerationInput::ExistingModel {
                file_name: "diagram.png".to_string(),
                content: vec![1, 2, 3],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(session.handle.snapshot().phase, Phase::Empty);
        assert!(session.gateway.recorded_calls().is_empty());
    }

    /// Petri net and BPMN views of one model carry the same markings
    #[tokio::test]
    async fn test_views_share_model_snapshot() {
        let gateway = MockGateway::new();
        gateway.queue_tree(approve_reject());
        let session = TestSession::new(InputMode::Text, gateway);
        session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap();

        let petri = session
            .handle
            .select_view(ViewType::PetriNet, RenderFormat::Svg)
            .unwrap();
        let bpmn = session
            .handle
            .select_view(ViewType::Bpmn, RenderFormat::Svg)
            .unwrap();

        assert_eq!(petri.model_id, bpmn.model_id);
        assert_eq!(petri.initial_marking, bpmn.initial_marking);
        assert_eq!(petri.final_marking, bpmn.final_marking);
        assert_eq!(petri.pnml, bpmn.pnml);
        assert!(
            session
                .wait_until(|s| s.view == ViewType::Bpmn, WAIT)
                .await
        );
    }

    #[tokio::test]
    async fn test_queries_without_model() {
        let session = TestSession::new(InputMode::Text, MockGateway::new());

        assert!(matches!(
            session.handle.select_view(ViewType::Bpmn, RenderFormat::Svg),
            Err(SessionError::NoModel)
        ));
        assert!(matches!(
            session.handle.export_bpmn(XmlEncoding::Utf8),
            Err(SessionError::NoModel)
        ));
        assert!(matches!(
            session.handle.export_pnml(),
            Err(SessionError::NoModel)
        ));
        assert!(matches!(
            session.handle.apply_feedback("more", test_ai()).await,
            Err(SessionError::NoModel)
        ));
    }

    /// Switching modes while busy abandons the call; its late result is dropped
    #[tokio::test]
    async fn test_mode_switch_discards_late_result() {
        let gateway = MockGateway::gated();
        gateway.queue_tree(approve_reject());
        let session = TestSession::new(InputMode::Text, gateway);

        let handle = session.handle.clone();
        let pending = tokio::spawn(async move { handle.generate(text("approve then reject")).await });
        session.gateway.call_started.notified().await;

        session
            .handle
            .select_input_mode(InputMode::EventLog)
            .await
            .unwrap();
        assert!(matches!(
            pending.await.unwrap(),
            Err(SessionError::Superseded)
        ));

        session.gateway.release.notify_one();
        // Let the stale completion reach the loop
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Empty);
        assert_eq!(state.input_mode, InputMode::EventLog);
        assert!(state.model.is_none());
        assert_eq!(state.epoch, 1);
    }

    #[tokio::test]
    async fn test_busy_session_refuses_second_generate() {
        let gateway = MockGateway::gated();
        gateway.queue_tree(approve_reject());
        let session = TestSession::new(InputMode::Text, gateway);

        let handle = session.handle.clone();
        let first = tokio::spawn(async move { handle.generate(text("approve then reject")).await });
        session.gateway.call_started.notified().await;

        let err = session.handle.generate(text("again")).await.unwrap_err();
        assert!(matches!(err, SessionError::Busy { phase: "generating" }));

        session.gateway.release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(session.gateway.recorded_calls().len(), 1);
    }

    /// Views stay available while a feedback round is in flight
    #[tokio::test]
    async fn test_view_during_update() {
        let gateway = MockGateway::gated();
        gateway.queue_tree(approve_reject());
        gateway.queue_tree(ProcessTree::activity("approve"));
        let session = TestSession::new(InputMode::Text, gateway);

        session.gateway.release.notify_one();
        let first = session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap();

        let handle = session.handle.clone();
        let update =
            tokio::spawn(async move { handle.apply_feedback("skip the reject step", test_ai()).await });
        session.gateway.call_started.notified().await;
        assert!(
            session
                .wait_until(|s| s.phase.name() == "updating", WAIT)
                .await
        );

        let view = session
            .handle
            .select_view(ViewType::ProcessTree, RenderFormat::Dot)
            .unwrap();
        assert_eq!(view.model_id, first);
        assert!(session.handle.export_pnml().is_ok());

        session.gateway.release.notify_one();
        let second = update.await.unwrap().unwrap();
        let view = session
            .handle
            .select_view(ViewType::ProcessTree, RenderFormat::Dot)
            .unwrap();
        assert_eq!(view.model_id, second);
    }

    #[tokio::test]
    async fn test_failed_feedback_keeps_model_and_recovers() {
        let gateway = MockGateway::new();
        gateway.queue_tree(approve_reject());
        gateway.queue_error(GatewayError::new(
            GatewayErrorKind::MalformedResponse,
            "no JSON object in answer",
        ));
        let session = TestSession::new(InputMode::Text, gateway);
        let first = session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap();
        let before = session.handle.snapshot().model.clone().unwrap();

        let err = session
            .handle
            .apply_feedback("skip the reject step", test_ai())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Gateway(_)));

        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Failed);
        assert!(Arc::ptr_eq(state.model.as_ref().unwrap(), &before));
        assert!(state.ledger.is_empty());

        session.handle.dismiss_error().await.unwrap();
        let state = session.handle.snapshot();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.model_id(), Some(first));
    }

    #[tokio::test]
    async fn test_gateway_timeout() {
        let session = TestSession::with_timeout(
            InputMode::Text,
            MockGateway::gated(),
            Duration::from_millis(50),
        );

        let err = session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Gateway(ref e) if e.kind == GatewayErrorKind::Timeout));
        assert_eq!(session.handle.snapshot().phase, Phase::Failed);
    }

    #[tokio::test]
    async fn test_clients_see_state_changes() {
        let gateway = MockGateway::new();
        gateway.queue_tree(approve_reject());
        let session = TestSession::new(InputMode::Text, gateway);
        let mut events = session.handle.subscribe();

        session
            .handle
            .generate(text("approve then reject"))
            .await
            .unwrap();

        let mut phases = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SseEvent::StateChange { state } = event {
                phases.push(state["phase"]["type"].as_str().unwrap_or_default().to_string());
            }
        }
        assert_eq!(phases, ["generating", "ready"]);
    }

    #[tokio::test]
    async fn test_manager_lifecycle() {
        let gateway: Arc<dyn ModelGateway> = Arc::new(MockGateway::new());
        let manager = SessionManager::new(gateway, RuntimeSettings::default());

        let handle = manager.create(InputMode::ExistingModel).await;
        let found = manager.get(handle.id()).await.unwrap();
        assert_eq!(found.snapshot().input_mode, InputMode::ExistingModel);

        manager.close(handle.id()).await.unwrap();
        assert!(matches!(
            manager.get(handle.id()).await,
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            manager.close(handle.id()).await,
            Err(SessionError::NotFound(_))
        ));
    }
}
