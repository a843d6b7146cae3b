// SPDX-License-Identifier: MIT

//! Typed error handling for the application tier
//!
//! Engine errors keep their own types in `crate::engine::error`; this
//! module wraps them for the CLI, server and workflow loading.

use thiserror::Error;

use crate::engine::error::{CheckpointError, EngineError, GraphError};

/// Top-level error type for waypoint
#[derive(Debug, Error)]
pub enum WaypointError {
    /// Configuration errors (invalid file, bad env values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow definition errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Graph validation failed
    #[error("Invalid workflow graph: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors in YAML workflow definitions and the step registry
#[derive(Debug, Error, PartialEq)]
pub enum WorkflowError {
    /// `uses:` names a step kind the registry does not know
    #[error("Unknown step kind '{kind}' for step '{step}'")]
    UnknownStepKind { step: String, kind: String },

    /// A step declares neither `uses` nor `interrupt`, or both
    #[error("Step '{0}' must declare exactly one of 'uses' or 'interrupt'")]
    AmbiguousStep(String),

    /// A step references an interrupt missing from `interrupts:`
    #[error("Step '{step}' references undefined interrupt '{interrupt}'")]
    UndefinedInterrupt { step: String, interrupt: String },

    /// An edge declares neither `to` nor `branches`, or both
    #[error("Edge from '{0}' must declare exactly one of 'to' or 'branches'")]
    AmbiguousEdge(String),

    /// `with:` parameters do not fit the step kind
    #[error("Invalid parameters for step '{step}': {message}")]
    InvalidParams { step: String, message: String },

    /// No built-in workflow with this name
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Workflow file not found: {0}")]
    FileNotFound(String),
}

impl WaypointError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for WaypointError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for WaypointError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WaypointError::config("WAYPOINT_PORT must be a number");
        assert_eq!(
            err.to_string(),
            "Configuration error: WAYPOINT_PORT must be a number"
        );

        let err: WaypointError = WorkflowError::UnknownStepKind {
            step: "prepare".into(),
            kind: "teleport".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Workflow error: Unknown step kind 'teleport' for step 'prepare'"
        );
    }

    #[test]
    fn test_graph_error_conversion() {
        let err: WaypointError = GraphError::MissingEntry.into();
        assert!(matches!(err, WaypointError::Graph(GraphError::MissingEntry)));
    }
}
