//! Intent resolution: utterance + catalog -> understanding engine -> normalized call.

mod normalize;
mod prompt;

pub use normalize::{normalize, parse_validation, Interpretation, ValidationReport};
pub use prompt::{build_instruction, build_validation_instruction, SYSTEM_PROMPT};

use crate::call::OperationCall;
use crate::catalog::OperationCatalog;
use crate::error::CommandError;
use serde_json::{Map, Value};
use std::sync::Arc;

type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Natural-language understanding backend (LLM or a keyword stand-in).
#[async_trait::async_trait]
pub trait UnderstandingEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the engine's raw reply for `utterance` given the available operations.
    async fn interpret(
        &self,
        utterance: &str,
        catalog: &OperationCatalog,
    ) -> Result<String, EngineError>;

    /// Second pass over a first-pass call (see [`build_validation_instruction`]). Engines
    /// without one return `None` and the call is used as interpreted.
    async fn validate(
        &self,
        _utterance: &str,
        _operation: &str,
        _arguments: &Map<String, Value>,
        _catalog: &OperationCatalog,
    ) -> Result<Option<String>, EngineError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Call(OperationCall),
    Unresolved(String),
}

pub struct IntentResolver {
    catalog: Arc<OperationCatalog>,
    engine: Arc<dyn UnderstandingEngine>,
}

impl IntentResolver {
    pub fn new(catalog: Arc<OperationCatalog>, engine: Arc<dyn UnderstandingEngine>) -> Self {
        Self { catalog, engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// First-turn interpretation plus the optional validation pass. Never creates partial
    /// state on failure.
    pub async fn resolve(&self, utterance: &str) -> Result<Resolution, CommandError> {
        let raw = self
            .engine
            .interpret(utterance, &self.catalog)
            .await
            .map_err(|e| {
                tracing::warn!(target: "nimbus::resolver", engine = self.engine.name(), error = %e, "engine call failed");
                CommandError::Interpretation(e.to_string())
            })?;
        tracing::debug!(target: "nimbus::resolver", raw = %raw, "engine reply");

        match normalize(&raw) {
            Interpretation::Resolved {
                operation,
                mut arguments,
            } => {
                let spec = self.catalog.lookup(&operation).ok_or_else(|| {
                    tracing::warn!(target: "nimbus::resolver", operation = %operation, "engine named unknown operation");
                    CommandError::UnknownOperation(operation.clone())
                })?;
                let report = self.validate(utterance, &operation, &arguments).await;
                let mut requested = Vec::new();
                if let Some(report) = report {
                    arguments.extend(report.suggested_corrections);
                    requested = report.missing_by_intent;
                }
                let mut call = OperationCall::new(spec, &arguments);
                for name in &requested {
                    call.request(name);
                }
                tracing::info!(
                    target: "nimbus::resolver",
                    operation = %operation,
                    missing = ?call.missing(),
                    requested = ?call.requested(),
                    "utterance resolved"
                );
                Ok(Resolution::Call(call))
            }
            Interpretation::Unresolved { message } => Ok(Resolution::Unresolved(message)),
            Interpretation::Malformed { reason } => {
                tracing::warn!(target: "nimbus::resolver", reason = %reason, "malformed engine output");
                Err(CommandError::Interpretation(reason))
            }
        }
    }

    /// A failed or unreadable validation leaves the first pass untouched.
    async fn validate(
        &self,
        utterance: &str,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Option<ValidationReport> {
        let raw = match self
            .engine
            .validate(utterance, operation, arguments, &self.catalog)
            .await
        {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(target: "nimbus::resolver", engine = self.engine.name(), error = %e, "validation call failed");
                return None;
            }
        };
        let Some(report) = parse_validation(&raw) else {
            tracing::warn!(target: "nimbus::resolver", raw = %raw, "unreadable validation reply");
            return None;
        };
        tracing::info!(
            target: "nimbus::resolver",
            operation,
            is_valid = report.is_valid,
            feedback = %report.feedback,
            corrections = report.suggested_corrections.len(),
            missing_by_intent = ?report.missing_by_intent,
            "first pass validated"
        );
        Some(report)
    }
}
