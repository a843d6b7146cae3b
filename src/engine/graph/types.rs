// SPDX-License-Identifier: MIT

//! Graph transition and run result types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::condition::{self, Expression};
use crate::engine::error::GraphError;
use crate::engine::interrupt::{Interrupt, InterruptData};
use crate::engine::state::{WorkflowState, WorkflowStatus};

/// Terminal marker; routing here completes the run
pub const END: &str = "__end__";

/// Routing function: picks the next step (or a path-map key) from state
pub type RouteFn = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

/// One conditional edge of a [`Transition::Branches`]
#[derive(Debug, Clone)]
pub struct Branch {
    pub condition: String,
    pub expr: Expression,
    pub target: String,
}

/// Outgoing edge of a step
#[derive(Clone)]
pub enum Transition {
    /// Always go to the named step
    Direct(String),
    /// Ask a routing function; an optional path map translates its answer
    Route {
        route: RouteFn,
        path_map: Option<HashMap<String, String>>,
    },
    /// Conditional edges evaluated in declaration order; first match wins
    Branches {
        branches: Vec<Branch>,
        otherwise: Option<String>,
    },
}

impl Transition {
    /// Resolve the next step name (or [`END`]) after `from`
    pub fn resolve(&self, from: &str, state: &WorkflowState) -> Result<String, GraphError> {
        match self {
            Transition::Direct(target) => Ok(target.clone()),
            Transition::Route { route, path_map } => {
                let key = route(state);
                match path_map {
                    None => Ok(key),
                    Some(map) => map.get(&key).cloned().ok_or(GraphError::UnknownRoute {
                        from: from.to_string(),
                        target: key,
                    }),
                }
            }
            Transition::Branches {
                branches,
                otherwise,
            } => branches
                .iter()
                .find(|branch| condition::evaluate(&branch.expr, state))
                .map(|branch| branch.target.clone())
                .or_else(|| otherwise.clone())
                .ok_or_else(|| GraphError::NoBranchMatched(from.to_string())),
        }
    }

    /// Targets known before the run; routing functions without a path map
    /// are only checked at runtime
    pub fn static_targets(&self) -> Vec<&str> {
        match self {
            Transition::Direct(target) => vec![target.as_str()],
            Transition::Route { path_map, .. } => path_map
                .iter()
                .flat_map(|map| map.values().map(String::as_str))
                .collect(),
            Transition::Branches {
                branches,
                otherwise,
            } => branches
                .iter()
                .map(|b| b.target.as_str())
                .chain(otherwise.as_deref())
                .collect(),
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Direct(target) => f.debug_tuple("Direct").field(target).finish(),
            Transition::Route { path_map, .. } => f
                .debug_struct("Route")
                .field("path_map", path_map)
                .finish_non_exhaustive(),
            Transition::Branches {
                branches,
                otherwise,
            } => f
                .debug_struct("Branches")
                .field("branches", branches)
                .field("otherwise", otherwise)
                .finish(),
        }
    }
}

/// Caller-facing status of one `run`/`resume` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    AwaitingInput,
    Error,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Completed => "completed",
            RunStatus::AwaitingInput => "awaiting_input",
            RunStatus::Error => "error",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Keys a final-state field may not shadow in a serialized result
const RESULT_KEYS: [&str; 6] = ["status", "thread_id", "message", "data", "error", "current_step"];

/// Tagged outcome of `run`/`resume`. Callers never see step errors
/// directly, only one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The prompt, while awaiting input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InterruptData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    /// Open fields of the final state
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RunResult {
    fn base(status: RunStatus, thread_id: &str, state: Option<&WorkflowState>) -> Self {
        let fields = state
            .map(|s| {
                s.fields()
                    .iter()
                    .filter(|(k, _)| !RESULT_KEYS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            status,
            thread_id: thread_id.to_string(),
            message: None,
            data: None,
            error: state.and_then(|s| s.error.clone()),
            current_step: state.map(|s| s.current_step.clone()),
            fields,
        }
    }

    /// Result for a run that stopped in `state`
    pub fn from_state(thread_id: &str, state: &WorkflowState) -> Self {
        let status = match state.status {
            WorkflowStatus::Completed => RunStatus::Completed,
            WorkflowStatus::Cancelled => RunStatus::Cancelled,
            WorkflowStatus::AwaitingInput => RunStatus::AwaitingInput,
            WorkflowStatus::Error | WorkflowStatus::Running => RunStatus::Error,
        };
        Self::base(status, thread_id, Some(state))
    }

    /// Result for a run suspended on `interrupt`
    pub fn awaiting(thread_id: &str, state: &WorkflowState, interrupt: &Interrupt) -> Self {
        let mut result = Self::base(RunStatus::AwaitingInput, thread_id, Some(state));
        result.message = Some(interrupt.message.clone());
        result.data = Some(interrupt.data.clone());
        result
    }

    /// Cancelled result with a caller-facing message
    pub fn cancelled(
        thread_id: &str,
        state: Option<&WorkflowState>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::base(RunStatus::Cancelled, thread_id, state);
        result.message = Some(message.into());
        result
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::AwaitingInput
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// Progress notifications from a streamed invocation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    StepStarted {
        thread_id: String,
        step: String,
    },
    StepCompleted {
        thread_id: String,
        step: String,
        next: String,
    },
    Suspended {
        thread_id: String,
        step: String,
        interrupt: Interrupt,
    },
    Finished {
        result: RunResult,
    },
}
