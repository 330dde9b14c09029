use a11y_types::{RequestId, TerminalStatus, TransitionError};
use thiserror::Error;

use crate::events::Stage;

/// Orchestration failures
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Request {0} is already in the pipeline")]
    DuplicateRequest(RequestId),

    #[error("Unknown request {0}")]
    UnknownRequest(RequestId),

    #[error("The {0} queue is closed")]
    QueueClosed(Stage),

    #[error("Invalid stage transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Orchestrator task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures of the outbound status collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Request {request_id} is already {recorded:?}, refusing {requested:?}")]
    Conflict {
        request_id: RequestId,
        recorded: TerminalStatus,
        requested: TerminalStatus,
    },
}
