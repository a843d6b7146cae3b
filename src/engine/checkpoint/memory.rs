// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{Checkpoint, CheckpointStore};
use crate::engine::error::CheckpointError;

/// In-process checkpoint store.
///
/// Entries are sharded by thread id, so different threads never contend
/// on one lock. Any string is a valid thread id. Checkpoints live until
/// deleted or purged.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: DashMap<String, Arc<Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict checkpoints not updated within `age`. Returns the count removed.
    pub fn purge_older_than(&self, age: Duration) -> usize {
        let Ok(age) = chrono::Duration::from_std(age) else {
            return 0;
        };
        let cutoff = Utc::now() - age;
        let before = self.entries.len();
        self.entries.retain(|_, checkpoint| checkpoint.updated_at >= cutoff);
        before.saturating_sub(self.entries.len())
    }

    /// Purge expired checkpoints every `interval` until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.purge_older_than(ttl);
                if removed > 0 {
                    log::info!("Evicted {} expired checkpoint(s)", removed);
                }
            }
        })
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.entries
            .insert(checkpoint.thread_id.clone(), Arc::new(checkpoint));
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Checkpoint, CheckpointError> {
        self.entries
            .get(thread_id)
            .map(|entry| entry.value().as_ref().clone())
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))
    }

    async fn delete(&self, thread_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.entries.remove(thread_id).is_some())
    }

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
