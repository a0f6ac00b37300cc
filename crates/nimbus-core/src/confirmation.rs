//! Confirmation gate for destructive operations.

use crate::call::OperationCall;
use crate::error::CommandError;
use crate::response::StructuredInput;

/// Opaque single-use handle bound to one frozen call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A ready call waiting for the caller's acknowledgment. Consumed by [`ConfirmationGate::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    token: ConfirmationToken,
    call: OperationCall,
    summary: String,
}

impl PendingConfirmation {
    pub fn token(&self) -> &ConfirmationToken {
        &self.token
    }

    pub fn call(&self) -> &OperationCall {
        &self.call
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Confirmed(OperationCall),
    Declined(OperationCall),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfirmationGate;

impl ConfirmationGate {
    /// Freezes a ready call behind a fresh token.
    pub fn issue(&self, call: OperationCall) -> PendingConfirmation {
        let token = ConfirmationToken::fresh();
        let summary = call.summary();
        tracing::info!(
            target: "nimbus::gate",
            operation = %call.name(),
            token = %token.as_str(),
            "confirmation requested"
        );
        PendingConfirmation {
            token,
            call,
            summary,
        }
    }

    /// Consumes the pending confirmation. Anything other than a confirm/decline addressed to
    /// its token is stale; the pending call is dropped in every case.
    pub fn resolve(
        &self,
        pending: PendingConfirmation,
        input: Option<&StructuredInput>,
    ) -> Result<Decision, CommandError> {
        match input {
            Some(StructuredInput::Confirmation { token, confirm }) if *token == pending.token.0 => {
                tracing::info!(
                    target: "nimbus::gate",
                    operation = %pending.call.name(),
                    confirmed = *confirm,
                    "confirmation resolved"
                );
                if *confirm {
                    Ok(Decision::Confirmed(pending.call))
                } else {
                    Ok(Decision::Declined(pending.call))
                }
            }
            Some(StructuredInput::Confirmation { .. }) => {
                tracing::warn!(target: "nimbus::gate", operation = %pending.call.name(), "token mismatch");
                Err(CommandError::StaleConfirmation(
                    "confirmation token does not match the pending action; request discarded".into(),
                ))
            }
            _ => {
                tracing::warn!(target: "nimbus::gate", operation = %pending.call.name(), "expected confirm/decline");
                Err(CommandError::StaleConfirmation(
                    "expected a confirm or decline for the pending action; request discarded".into(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use serde_json::json;

    fn pending() -> PendingConfirmation {
        let op = OperationCatalog::standard().lookup("delete_server").unwrap();
        let args = json!({"server_id_or_name": "vm-123"});
        let call = OperationCall::new(op, args.as_object().unwrap());
        ConfirmationGate.issue(call)
    }

    #[test]
    fn matching_token_confirms_the_frozen_call() {
        let pending = pending();
        assert_eq!(pending.summary(), "delete_server(server_id_or_name=vm-123)");
        let input = StructuredInput::Confirmation {
            token: pending.token().as_str().to_string(),
            confirm: true,
        };
        match ConfirmationGate.resolve(pending, Some(&input)).unwrap() {
            Decision::Confirmed(call) => assert_eq!(call.arguments()["server_id_or_name"], "vm-123"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn foreign_token_or_plain_text_is_stale() {
        let input = StructuredInput::Confirmation {
            token: "not-the-token".into(),
            confirm: true,
        };
        let err = ConfirmationGate.resolve(pending(), Some(&input)).unwrap_err();
        assert_eq!(err.code(), "stale_confirmation");
        let err = ConfirmationGate.resolve(pending(), None).unwrap_err();
        assert_eq!(err.code(), "stale_confirmation");
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        assert_ne!(pending().token(), pending().token());
    }
}
