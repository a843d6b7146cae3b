// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! A definition only describes topology: which step kinds run, how they
//! connect, and which questions are asked. Step behaviour comes from the
//! [`StepRegistry`](super::registry::StepRegistry).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::engine::StateSchema;

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Id of the first step
    pub entry: String,
    /// Optional schema for open state fields
    pub state: Option<StateSchema>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Interrupt types keyed by name
    #[serde(default)]
    pub interrupts: BTreeMap<String, InterruptDefinition>,
}

/// A node in the workflow graph
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StepDefinition {
    pub id: String,
    /// Registered step kind (`set`, `log`, `fail`, `wait`, ...)
    pub uses: Option<String>,
    /// Parameters handed to the step kind's factory
    #[serde(default, rename = "with")]
    pub params: Map<String, Value>,
    /// Name of an entry in `interrupts:`; makes this a human interaction step
    pub interrupt: Option<String>,
}

/// Outgoing transition of one step
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: Option<String>,
    #[serde(default)]
    pub branches: Vec<BranchDefinition>,
    /// Fallback target when no branch matches
    pub otherwise: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BranchDefinition {
    /// Condition expression, e.g. `confirmed == true`
    pub when: String,
    pub to: String,
}

/// A question put to the human
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct InterruptDefinition {
    pub message: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
    /// Accepted answers and the state values each one writes
    #[serde(default)]
    pub choices: BTreeMap<String, Map<String, Value>>,
    /// Field that receives unmatched answers verbatim; unset rejects them
    pub free_text: Option<String>,
    /// Re-prompt message for rejected answers
    pub error_message: Option<String>,
}
