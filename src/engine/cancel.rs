// SPDX-License-Identifier: MIT

//! Cooperative cancellation
//!
//! A [`CancellationToken`] is created per `run`/`resume` invocation and
//! shared into every step through the [`StepContext`](super::StepContext).
//! Cancellation only takes effect where a step (or the engine, between
//! steps) checks the token. A step that never polls may complete anyway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::engine::error::StepError;

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Every clone observes it.
    pub fn request_cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Guard for the top of long-running step bodies and loop iterations
    pub fn check(&self) -> Result<(), StepError> {
        if self.is_cancellation_requested() {
            return Err(StepError::Cancelled);
        }
        Ok(())
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Sleep for `duration`, waking early with `Cancelled` if the token is set
    pub async fn sleep(&self, duration: Duration) -> Result<(), StepError> {
        tokio::select! {
            _ = self.inner.cancelled() => Err(StepError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Tokens of in-flight invocations, keyed by thread id
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, thread_id: &str, token: CancellationToken) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(thread_id.to_string(), token);
    }

    pub async fn get(&self, thread_id: &str) -> Option<CancellationToken> {
        let tokens = self.tokens.read().await;
        tokens.get(thread_id).cloned()
    }

    pub async fn remove(&self, thread_id: &str) -> Option<CancellationToken> {
        let mut tokens = self.tokens.write().await;
        tokens.remove(thread_id)
    }

    /// Request cancellation of the in-flight invocation for `thread_id`.
    /// Returns false when nothing is running under that id.
    pub async fn cancel(&self, thread_id: &str) -> bool {
        match self.get(thread_id).await {
            Some(token) => {
                token.request_cancel();
                true
            }
            None => false,
        }
    }
}
