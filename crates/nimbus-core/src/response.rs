//! Request/response contract between callers (HTTP, tests) and the orchestrator.

use crate::error::CommandError;
use crate::orchestrator::Resource;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One caller turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Absent or empty starts a new conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub utterance: Option<String>,
    #[serde(default)]
    pub structured_input: Option<StructuredInput>,
}

impl CommandRequest {
    pub fn utterance(conversation_id: Option<&str>, text: &str) -> Self {
        Self {
            conversation_id: conversation_id.map(str::to_string),
            utterance: Some(text.to_string()),
            structured_input: None,
        }
    }

    pub fn structured(conversation_id: &str, input: StructuredInput) -> Self {
        Self {
            conversation_id: Some(conversation_id.to_string()),
            utterance: None,
            structured_input: Some(input),
        }
    }

    /// True for a `cancel` utterance or `{"cancel": true}`.
    pub fn is_cancel(&self) -> bool {
        matches!(self.structured_input, Some(StructuredInput::Cancel { cancel: true }))
            || self
                .utterance
                .as_deref()
                .map(|u| u.trim().eq_ignore_ascii_case("cancel"))
                .unwrap_or(false)
    }

    pub fn trimmed_utterance(&self) -> Option<&str> {
        self.utterance
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Structured continuation payload. Variant order matters for untagged matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructuredInput {
    Confirmation {
        #[serde(alias = "confirmation_id", alias = "confirmation_token")]
        token: String,
        #[serde(alias = "confirmed")]
        confirm: bool,
    },
    /// Only `{"cancel": true}` matches; any other `cancel` value falls through to parameters.
    Cancel {
        #[serde(deserialize_with = "only_true")]
        cancel: bool,
    },
    /// Parameter answers keyed by parameter name.
    Parameters(Map<String, Value>),
}

fn only_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    if bool::deserialize(deserializer)? {
        Ok(true)
    } else {
        Err(serde::de::Error::custom("cancel must be true"))
    }
}

/// Parameter still needed from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingParam {
    pub name: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub type_label: String,
}

/// Operation and final arguments echoed back on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnderstoodCommand {
    pub operation: String,
    pub arguments: Map<String, Value>,
}

/// Exactly one variant per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    Success {
        output: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        resources: Vec<Resource>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        understood_command: Option<UnderstoodCommand>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time_ms: Option<u64>,
    },
    Error {
        error: String,
        message: String,
    },
    MissingParameters {
        message: String,
        operation: String,
        missing_params: Vec<MissingParam>,
    },
    ConfirmationRequired {
        message: String,
        action_details: String,
        confirmation_token: String,
    },
    Info {
        message: String,
    },
}

impl CommandResponse {
    pub fn info(message: impl Into<String>) -> Self {
        CommandResponse::Info {
            message: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            CommandResponse::Success { .. } => "success",
            CommandResponse::Error { .. } => "error",
            CommandResponse::MissingParameters { .. } => "missing_parameters",
            CommandResponse::ConfirmationRequired { .. } => "confirmation_required",
            CommandResponse::Info { .. } => "info",
        }
    }
}

impl From<CommandError> for CommandResponse {
    fn from(err: CommandError) -> Self {
        CommandResponse::Error {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Response plus the conversation it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub conversation_id: String,
    #[serde(flatten)]
    pub response: CommandResponse,
}
