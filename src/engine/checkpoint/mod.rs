// SPDX-License-Identifier: MIT

//! Checkpoint storage
//!
//! One checkpoint per thread id, overwritten after every step transition
//! and at every suspend/resume boundary. `save` replaces the whole
//! snapshot atomically: a concurrent `load` for the same thread sees the
//! old or the new checkpoint, never a mix.

mod file;
mod memory;

pub use file::JsonFileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::CheckpointError;
use crate::engine::interrupt::Interrupt;
use crate::engine::state::WorkflowState;

/// Persisted snapshot of one workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: WorkflowState,
    /// Step to re-enter on resume, set while awaiting input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_step: Option<String>,
    /// The prompt the instance is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: WorkflowState) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            suspended_step: None,
            interrupt: None,
            updated_at: Utc::now(),
        }
    }

    pub fn suspended(mut self, step: impl Into<String>, interrupt: Interrupt) -> Self {
        self.suspended_step = Some(step.into());
        self.interrupt = Some(interrupt);
        self
    }
}

/// Pluggable backing store for checkpoints
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or replace the checkpoint for `checkpoint.thread_id`
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Fails with [`CheckpointError::NotFound`] for unknown threads
    async fn load(&self, thread_id: &str) -> Result<Checkpoint, CheckpointError>;

    /// Returns whether a checkpoint existed
    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError>;

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError>;
}
