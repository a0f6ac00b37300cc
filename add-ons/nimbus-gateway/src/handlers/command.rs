//! Conversation endpoints: command turns, cancel, recent history, and the catalog listing
//! a client can use to render forms.

use crate::AppState;
use axum::extract::{Json, Path, State};
use nimbus_core::{CommandReply, CommandRequest, HistoryEntry, OperationSpec};

/// POST /api/v1/command – applies one turn; every well-formed body yields 200 with a reply.
pub(crate) async fn command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandReply> {
    tracing::debug!(
        target: "nimbus::http",
        conversation_id = request.conversation_id.as_deref().unwrap_or("<new>"),
        has_utterance = request.utterance.is_some(),
        has_structured_input = request.structured_input.is_some(),
        "command received"
    );
    Json(state.orchestrator.handle(request).await)
}

/// DELETE /api/v1/conversations/:id – drops any pending call for the conversation.
pub(crate) async fn cancel_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<CommandReply> {
    Json(state.orchestrator.cancel(&conversation_id).await)
}

/// GET /api/v1/conversations/:id/history – the last executed commands, oldest first.
pub(crate) async fn conversation_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<Vec<HistoryEntry>> {
    Json(state.orchestrator.history(&conversation_id).await)
}

/// GET /api/v1/operations
pub(crate) async fn list_operations(State(state): State<AppState>) -> Json<serde_json::Value> {
    let operations: Vec<&OperationSpec> = state
        .orchestrator
        .catalog()
        .all()
        .iter()
        .map(|op| op.as_ref())
        .collect();
    Json(serde_json::json!({
        "count": operations.len(),
        "operations": operations,
    }))
}
