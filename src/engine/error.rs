// SPDX-License-Identifier: MIT

//! Typed error handling for the workflow engine
//!
//! Steps raise [`StepError`]. The engine folds every step outcome into a
//! tagged `RunResult`, so only lookups of unknown threads and checkpoint
//! storage failures ever reach a caller as [`EngineError`].

use thiserror::Error;

use crate::engine::interrupt::Interrupt;

/// Signals a step can raise back to the engine
#[derive(Debug, Error)]
pub enum StepError {
    /// The step needs a human answer before it can finish
    #[error("awaiting input: {}", .0.message)]
    Suspended(Box<Interrupt>),

    /// Cooperative cancellation was observed at a safe point
    #[error("workflow cancelled")]
    Cancelled,

    /// Unhandled failure inside the step; surfaced verbatim
    #[error("{0}")]
    Failed(String),

    /// Misuse of the state API
    #[error(transparent)]
    State(#[from] StateError),
}

impl StepError {
    /// Create a terminal step failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap an interrupt as a suspension signal
    pub fn suspended(interrupt: Interrupt) -> Self {
        Self::Suspended(Box::new(interrupt))
    }
}

impl From<serde_json::Error> for StepError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Errors from reading or writing workflow state
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// Reserved fields are written through their typed accessors only
    #[error("'{0}' is a reserved state field")]
    ReservedField(String),

    /// A snapshot lacks one of the required fields
    #[error("state snapshot is missing required field '{0}'")]
    MissingField(String),

    /// A value does not match the declared field type
    #[error("state field '{field}' has an invalid value: {message}")]
    InvalidField { field: String, message: String },
}

/// Graph construction and routing errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("entry point is not set")]
    MissingEntry,

    #[error("step '{0}' is not defined")]
    UnknownStep(String),

    #[error("step '{0}' is defined more than once")]
    DuplicateStep(String),

    #[error("step '{0}' has no outgoing transition")]
    MissingTransition(String),

    #[error("step '{0}' already has an outgoing transition")]
    DuplicateTransition(String),

    #[error("no interrupt config registered for type '{0}'")]
    UnknownInterrupt(String),

    #[error("interrupt type '{0}' is registered more than once")]
    DuplicateInterrupt(String),

    #[error("invalid condition '{condition}': {message}")]
    InvalidCondition { condition: String, message: String },

    #[error("no branch matched after step '{0}'")]
    NoBranchMatched(String),

    #[error("step '{from}' routed to unknown step '{target}'")]
    UnknownRoute { from: String, target: String },
}

/// Condition expression parse failure
#[derive(Debug, Error, PartialEq)]
#[error("could not parse condition: {0}")]
pub struct ConditionError(pub String);

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint for thread '{0}'")]
    NotFound(String),

    #[error("invalid thread id '{0}'")]
    InvalidThreadId(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Errors surfaced by `Engine::resume` and the snapshot accessors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown thread, or a thread whose run already finished
    #[error("no resumable workflow for thread '{thread_id}'")]
    NotFound { thread_id: String },

    #[error(transparent)]
    Checkpoint(CheckpointError),
}

impl EngineError {
    pub fn not_found(thread_id: impl Into<String>) -> Self {
        Self::NotFound {
            thread_id: thread_id.into(),
        }
    }
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(thread_id) => Self::NotFound { thread_id },
            other => Self::Checkpoint(other),
        }
    }
}
