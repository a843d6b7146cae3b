// SPDX-License-Identifier: MIT

//! Resumable workflow engine
//!
//! A workflow is a directed graph of named steps operating on a
//! [`WorkflowState`]. The [`Engine`] walks the graph one step at a time,
//! persisting a [`Checkpoint`] after every transition. A step may suspend
//! to wait for a human answer; a later `resume` re-enters that step with
//! the raw answer. Long-running steps poll a [`CancellationToken`].

pub mod cancel;
pub mod checkpoint;
pub mod condition;
pub mod error;
pub mod graph;
pub mod interrupt;
pub mod state;
pub mod step;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use checkpoint::{Checkpoint, CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore};
pub use error::{CheckpointError, EngineError, GraphError, StateError, StepError};
pub use graph::{Engine, EngineEvent, Graph, GraphBuilder, RunResult, RunStatus, END};
pub use interrupt::{
    HumanInteractionNode, InteractionHooks, Interrupt, InterruptConfig, InterruptData, Validation,
};
pub use state::{StateSchema, WorkflowState, WorkflowStatus};
pub use step::{step_fn, Step, StepContext};
