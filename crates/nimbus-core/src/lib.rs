//! nimbus-core: command interpretation core.
//!
//! Maps a natural-language utterance onto a catalog operation, collects missing parameters
//! over several turns, gates destructive operations behind a single-use confirmation token,
//! and dispatches ready calls through the resource gateway. Every public entry point
//! returns a tagged [`CommandResponse`]; nothing panics past [`Orchestrator::handle`].

mod call;
mod catalog;
mod completion;
mod confirmation;
mod error;
mod orchestrator;
mod resolver;
mod response;
mod session;
mod shared;

pub use shared::CoreConfig;

pub use error::{CloudError, CommandError, FailureKind};

pub use catalog::{CatalogError, OperationCatalog, OperationSpec, ParamType, ParameterSpec};

pub use call::OperationCall;
pub use completion::{apply_answers, apply_free_text, evaluate, Progress};
pub use confirmation::{ConfirmationGate, ConfirmationToken, Decision, PendingConfirmation};

pub use resolver::{
    build_instruction, build_validation_instruction, normalize, parse_validation, IntentResolver,
    Interpretation, Resolution, UnderstandingEngine, ValidationReport, SYSTEM_PROMPT,
};

pub use response::{
    CommandReply, CommandRequest, CommandResponse, MissingParam, StructuredInput,
    UnderstoodCommand,
};

pub use session::{
    Clock, ConversationState, HistoryEntry, InMemorySessionStore, ManualClock, Phase, SessionGuard,
    SessionStore, SystemClock,
};

pub use orchestrator::{
    ExecutionOutput, HandlerRegistry, OperationHandler, Orchestrator, Resource, ResourceGateway,
    ResourceKind,
};
