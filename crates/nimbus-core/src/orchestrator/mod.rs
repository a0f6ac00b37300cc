//! Orchestrator: drives one conversation turn through resolution, completion,
//! confirmation and dispatch.

mod gateway;

pub use gateway::{
    ExecutionOutput, HandlerRegistry, OperationHandler, Resource, ResourceGateway, ResourceKind,
};

use crate::call::OperationCall;
use crate::catalog::OperationCatalog;
use crate::completion::{self, Progress};
use crate::confirmation::{ConfirmationGate, Decision, PendingConfirmation};
use crate::error::CommandError;
use crate::resolver::{IntentResolver, Resolution, UnderstandingEngine};
use crate::response::{CommandReply, CommandRequest, CommandResponse, StructuredInput, UnderstoodCommand};
use crate::session::{Clock, ConversationState, HistoryEntry, Phase, SessionStore, SystemClock};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(900);

pub struct Orchestrator {
    catalog: Arc<OperationCatalog>,
    resolver: IntentResolver,
    gateway: ResourceGateway,
    gate: ConfirmationGate,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<OperationCatalog>,
        engine: Arc<dyn UnderstandingEngine>,
        registry: Arc<HandlerRegistry>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            resolver: IntentResolver::new(Arc::clone(&catalog), engine),
            catalog,
            gateway: ResourceGateway::new(registry),
            gate: ConfirmationGate,
            sessions,
            clock: Arc::new(SystemClock),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn catalog(&self) -> &Arc<OperationCatalog> {
        &self.catalog
    }

    pub fn engine_name(&self) -> &str {
        self.resolver.engine_name()
    }

    /// Catalog operations without a handler (logged at startup).
    pub fn unhandled_operations(&self) -> Vec<String> {
        self.gateway.unhandled(&self.catalog)
    }

    /// Applies one turn. Always yields a reply; failures become `error` responses.
    pub async fn handle(&self, request: CommandRequest) -> CommandReply {
        let conversation_id = request
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let _guard = self.sessions.lock(&conversation_id).await;
        let now = self.clock.now();
        let mut state = self
            .sessions
            .get(&conversation_id)
            .await
            .unwrap_or_else(|| ConversationState::new(conversation_id.clone(), now));

        let expired = if !state.is_idle() && state.is_expired(now, self.idle_timeout) {
            let operation = state.pending_operation().map(str::to_string);
            tracing::info!(target: "nimbus::session", conversation_id = %conversation_id, operation = ?operation, "conversation expired; pending request dropped");
            state.reset();
            operation
        } else {
            None
        };
        state.touch(now);

        let (next, response) = match (expired, std::mem::take(&mut state.phase)) {
            (Some(operation), _) => (Phase::Idle, expired_response(&operation, &request)),
            (None, Phase::Idle) => self.on_idle(&request).await,
            (None, Phase::Collecting(call)) => self.on_collecting(call, &request).await,
            (None, Phase::Confirming(pending)) => self.on_confirming(pending, &request).await,
        };
        state.phase = next;
        if let CommandResponse::Success {
            output,
            understood_command: Some(command),
            ..
        } = &response
        {
            state.record(HistoryEntry::new(command.clone(), output.clone()));
        }
        self.sessions.put(state).await;

        tracing::info!(
            target: "nimbus::session",
            conversation_id = %conversation_id,
            status = response.status(),
            "turn handled"
        );
        CommandReply {
            conversation_id,
            response,
        }
    }

    /// Explicit cancel by conversation id; discards whatever is pending.
    pub async fn cancel(&self, conversation_id: &str) -> CommandReply {
        let _guard = self.sessions.lock(conversation_id).await;
        let was_pending = match self.sessions.get(conversation_id).await {
            Some(state) => !state.is_idle(),
            None => false,
        };
        self.sessions.delete(conversation_id).await;
        let message = if was_pending {
            tracing::info!(target: "nimbus::session", conversation_id, "conversation canceled");
            "Canceled. Nothing was executed."
        } else {
            "Nothing to cancel."
        };
        CommandReply {
            conversation_id: conversation_id.to_string(),
            response: CommandResponse::info(message),
        }
    }

    /// Memory hygiene only; expiry itself is checked lazily in [`Self::handle`].
    pub async fn sweep_expired(&self) -> usize {
        self.sessions
            .purge_expired(self.clock.now(), self.idle_timeout)
            .await
    }

    pub async fn active_conversations(&self) -> usize {
        self.sessions.active_count().await
    }

    /// Most recent executed commands of a conversation, oldest first.
    pub async fn history(&self, conversation_id: &str) -> Vec<HistoryEntry> {
        let _guard = self.sessions.lock(conversation_id).await;
        self.sessions
            .get(conversation_id)
            .await
            .map(|state| state.history.into_iter().collect())
            .unwrap_or_default()
    }

    async fn on_idle(&self, request: &CommandRequest) -> (Phase, CommandResponse) {
        if request.is_cancel() {
            return (Phase::Idle, CommandResponse::info("Nothing to cancel."));
        }
        if let Some(StructuredInput::Confirmation { .. }) = &request.structured_input {
            let err = CommandError::StaleConfirmation(
                "no action is awaiting confirmation in this conversation".into(),
            );
            return (Phase::Idle, err.into());
        }
        let Some(utterance) = request.trimmed_utterance() else {
            return (
                Phase::Idle,
                CommandResponse::info("Tell me what you would like to do, e.g. \"list all servers\"."),
            );
        };

        match self.resolver.resolve(utterance).await {
            Err(err) => (Phase::Idle, err.into()),
            Ok(Resolution::Unresolved(message)) => (Phase::Idle, CommandResponse::info(message)),
            Ok(Resolution::Call(mut call)) => {
                if let Some(StructuredInput::Parameters(answers)) = &request.structured_input {
                    completion::apply_answers(&mut call, answers);
                }
                self.advance(call).await
            }
        }
    }

    async fn on_collecting(
        &self,
        mut call: OperationCall,
        request: &CommandRequest,
    ) -> (Phase, CommandResponse) {
        if request.is_cancel() {
            let message = format!("Canceled {}. Nothing was executed.", call.name());
            return (Phase::Idle, CommandResponse::info(message));
        }
        match (&request.structured_input, request.trimmed_utterance()) {
            (Some(StructuredInput::Confirmation { .. }), _) => {
                let err = CommandError::StaleConfirmation(
                    "no action is awaiting confirmation; the pending request was discarded".into(),
                );
                return (Phase::Idle, err.into());
            }
            (Some(StructuredInput::Parameters(answers)), _) => {
                completion::apply_answers(&mut call, answers)
            }
            (_, Some(text)) => completion::apply_free_text(&mut call, text),
            _ => {}
        }
        self.advance(call).await
    }

    async fn on_confirming(
        &self,
        pending: PendingConfirmation,
        request: &CommandRequest,
    ) -> (Phase, CommandResponse) {
        if request.is_cancel() {
            let message = format!("Canceled {}. Nothing was executed.", pending.call().name());
            return (Phase::Idle, CommandResponse::info(message));
        }
        let response = match self.gate.resolve(pending, request.structured_input.as_ref()) {
            Ok(Decision::Confirmed(call)) => self.dispatch(&call).await,
            Ok(Decision::Declined(call)) => CommandResponse::info(format!(
                "Canceled. {} was not executed.",
                call.summary()
            )),
            Err(err) => err.into(),
        };
        (Phase::Idle, response)
    }

    async fn advance(&self, call: OperationCall) -> (Phase, CommandResponse) {
        match completion::evaluate(&call) {
            Progress::Collecting {
                message,
                missing_params,
            } => {
                let response = CommandResponse::MissingParameters {
                    message,
                    operation: call.name().to_string(),
                    missing_params,
                };
                (Phase::Collecting(call), response)
            }
            Progress::Ready if call.operation().destructive => {
                let pending = self.gate.issue(call);
                let response = CommandResponse::ConfirmationRequired {
                    message: format!(
                        "{} is destructive and cannot be undone. Confirm to proceed.",
                        pending.call().name()
                    ),
                    action_details: pending.summary().to_string(),
                    confirmation_token: pending.token().as_str().to_string(),
                };
                (Phase::Confirming(pending), response)
            }
            Progress::Ready => (Phase::Idle, self.dispatch(&call).await),
        }
    }

    async fn dispatch(&self, call: &OperationCall) -> CommandResponse {
        let started = Instant::now();
        match self.gateway.execute(call).await {
            Ok(output) => CommandResponse::Success {
                output: output.output_lines(),
                raw_output: output.raw_output(),
                resources: output.into_resources(),
                understood_command: Some(UnderstoodCommand {
                    operation: call.name().to_string(),
                    arguments: call.arguments().clone(),
                }),
                execution_time_ms: Some(started.elapsed().as_millis() as u64),
            },
            Err(err) => err.into(),
        }
    }
}

/// Reply for the first turn after a pending request timed out. Nothing from the turn is applied.
fn expired_response(operation: &str, request: &CommandRequest) -> CommandResponse {
    if let Some(StructuredInput::Confirmation { .. }) = &request.structured_input {
        return CommandError::StaleConfirmation(format!(
            "the pending {} request expired before it was confirmed",
            operation
        ))
        .into();
    }
    CommandResponse::info(format!(
        "Your pending {} request expired; please start again.",
        operation
    ))
}
